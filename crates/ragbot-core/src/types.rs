//! Core domain types for the vector-store layer.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Namespace name that resolves to the configured default namespace.
pub const DEFAULT_NAMESPACE_ALIAS: &str = "default_table_name";

/// Source tag stored when a record carries none.
pub const UNKNOWN_SOURCE: &str = "Unknown";

/// Maximum namespace name length accepted by every backend.
const MAX_NAMESPACE_LEN: usize = 63;

/// Check that a namespace name is safe to use as a table or collection name.
pub fn validate_namespace(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let first = chars
        .next()
        .ok_or_else(|| RagError::invalid_argument("namespace name must not be empty"))?;

    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(RagError::invalid_argument(format!(
            "namespace '{}' must start with a letter or underscore",
            name
        )));
    }

    if name.len() > MAX_NAMESPACE_LEN {
        return Err(RagError::invalid_argument(format!(
            "namespace '{}' exceeds {} characters",
            name, MAX_NAMESPACE_LEN
        )));
    }

    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(RagError::invalid_argument(format!(
            "namespace '{}' may only contain ASCII letters, digits, '_' and '-'",
            name
        )));
    }

    Ok(())
}

/// Vector-store backend families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Networked vector service speaking the set/store/get protocol.
    Http,
    /// Relational table store with the sqlite-vec extension.
    Sqlite,
    /// Dedicated approximate-nearest-neighbor engine.
    Qdrant,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Http => "http",
            Self::Sqlite => "sqlite",
            Self::Qdrant => "qdrant",
        };
        write!(f, "{}", s)
    }
}

/// Operations and guarantees a backend declares it supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// `delete_by_source` removes records instead of failing.
    pub delete_by_source: bool,

    /// Search is exhaustive rather than approximate.
    pub exact_search: bool,

    /// Records are searchable as soon as `insert_batch` returns.
    pub synchronous_writes: bool,
}

/// Readiness of a backend's similarity index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IndexStatus {
    Ready,
    Building,
    Failed(String),
}

impl std::fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Building => write!(f, "building"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Check that an embedding can be compared by distance: non-empty, finite
/// and not all zeros.
pub fn validate_embedding(embedding: &[f32]) -> Result<()> {
    if embedding.is_empty() {
        return Err(RagError::invalid_argument("embeddings must not be empty vectors"));
    }
    if embedding.iter().any(|x| !x.is_finite()) {
        return Err(RagError::invalid_argument("embedding contains a non-finite value"));
    }
    if embedding.iter().all(|x| *x == 0.0) {
        return Err(RagError::invalid_argument("embedding must not be the zero vector"));
    }
    Ok(())
}

/// A validated batch of records to insert into the active namespace.
#[derive(Debug, Clone)]
pub struct RecordBatch {
    contents: Vec<String>,
    embeddings: Vec<Vec<f32>>,
    sources: Vec<String>,
}

impl RecordBatch {
    /// Build a batch, checking that all three sequences line up and that
    /// every embedding shares one non-zero dimensionality and passes
    /// [`validate_embedding`]. Empty source tags are stored as
    /// [`UNKNOWN_SOURCE`].
    pub fn new(
        contents: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        sources: Vec<String>,
    ) -> Result<Self> {
        if contents.is_empty() {
            return Err(RagError::invalid_argument("record batch must not be empty"));
        }

        if contents.len() != embeddings.len() || contents.len() != sources.len() {
            return Err(RagError::invalid_argument(format!(
                "contents ({}), embeddings ({}) and sources ({}) must have the same length",
                contents.len(),
                embeddings.len(),
                sources.len()
            )));
        }

        let dimension = embeddings[0].len();
        if dimension == 0 {
            return Err(RagError::invalid_argument("embeddings must not be empty vectors"));
        }

        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }
        for embedding in &embeddings {
            validate_embedding(embedding)?;
        }

        let sources = sources
            .into_iter()
            .map(|s| if s.is_empty() { UNKNOWN_SOURCE.to_string() } else { s })
            .collect();

        Ok(Self {
            contents,
            embeddings,
            sources,
        })
    }

    /// Number of records in the batch.
    pub fn len(&self) -> usize {
        self.contents.len()
    }

    /// Always false for a constructed batch.
    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// Embedding dimensionality shared by every record.
    pub fn dimension(&self) -> usize {
        self.embeddings[0].len()
    }

    pub fn contents(&self) -> &[String] {
        &self.contents
    }

    pub fn embeddings(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Iterate over `(content, embedding, source)` rows.
    pub fn rows(&self) -> impl Iterator<Item = (&str, &[f32], &str)> {
        self.contents
            .iter()
            .zip(self.embeddings.iter())
            .zip(self.sources.iter())
            .map(|((c, e), s)| (c.as_str(), e.as_slice(), s.as_str()))
    }
}

/// Inclusion filter over record sources.
///
/// An empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFilter {
    sources: BTreeSet<String>,
}

impl SourceFilter {
    /// A filter that matches every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Build a filter from source tags.
    pub fn from_sources<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sources: sources.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_match_all(&self) -> bool {
        self.sources.is_empty()
    }

    /// Whether a record with this source passes the filter.
    pub fn matches(&self, source: &str) -> bool {
        self.is_match_all() || self.sources.contains(source)
    }

    /// Source tags in sorted order.
    pub fn to_vec(&self) -> Vec<String> {
        self.sources.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for SourceFilter {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::from_sources(iter)
    }
}

/// Score as reported natively by a backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawScore {
    /// Lower is better.
    Distance(f32),
    /// Higher is better.
    Similarity(f32),
}

impl RawScore {
    /// Convert to a higher-is-better similarity.
    pub fn similarity(self) -> f32 {
        match self {
            Self::Distance(d) => 1.0 - d,
            Self::Similarity(s) => s,
        }
    }
}

/// A backend-native search row before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub content: String,
    pub score: RawScore,
    pub source: String,
}

/// A normalized search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Stored chunk text.
    pub content: String,

    /// Similarity score (higher is better).
    pub score: f32,

    /// Source tag of the record.
    pub source: String,
}

impl From<RawHit> for SearchHit {
    fn from(hit: RawHit) -> Self {
        Self {
            content: hit.content,
            score: hit.score.similarity(),
            source: hit.source,
        }
    }
}

/// Ordered search results, best first.
pub type QueryResult = Vec<SearchHit>;

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(dims: &[usize]) -> Result<RecordBatch> {
        let n = dims.len();
        RecordBatch::new(
            (0..n).map(|i| format!("content {}", i)).collect(),
            dims.iter().map(|d| vec![0.5; *d]).collect(),
            vec!["src".to_string(); n],
        )
    }

    #[test]
    fn test_validate_namespace() {
        assert!(validate_namespace("documents").is_ok());
        assert!(validate_namespace("_tmp-2").is_ok());
        assert!(validate_namespace("").is_err());
        assert!(validate_namespace("1abc").is_err());
        assert!(validate_namespace("docs; DROP TABLE x").is_err());
        assert!(validate_namespace(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_record_batch_validation() {
        let ok = batch(&[3, 3]).unwrap();
        assert_eq!(ok.len(), 2);
        assert_eq!(ok.dimension(), 3);

        assert!(matches!(
            RecordBatch::new(vec![], vec![], vec![]),
            Err(RagError::InvalidArgument { .. })
        ));
        assert!(matches!(
            RecordBatch::new(vec!["a".into()], vec![vec![1.0]], vec![]),
            Err(RagError::InvalidArgument { .. })
        ));
        assert!(matches!(
            batch(&[3, 2]),
            Err(RagError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
        assert!(matches!(batch(&[0]), Err(RagError::InvalidArgument { .. })));
    }

    #[test]
    fn test_zero_and_non_finite_embeddings_rejected() {
        assert!(validate_embedding(&[0.3, -0.1]).is_ok());
        assert!(validate_embedding(&[]).is_err());
        assert!(validate_embedding(&[0.0, 0.0]).is_err());
        assert!(validate_embedding(&[f32::NAN, 1.0]).is_err());

        let zero_row = RecordBatch::new(
            vec!["blank".into(), "cats".into()],
            vec![vec![0.0, 0.0], vec![1.0, 0.0]],
            vec!["s".into(), "s".into()],
        );
        assert!(matches!(zero_row, Err(RagError::InvalidArgument { .. })));
    }

    #[test]
    fn test_record_batch_rows() {
        let b = RecordBatch::new(
            vec!["cats".into(), "dogs".into()],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            vec!["catA".into(), "dogA".into()],
        )
        .unwrap();

        let rows: Vec<_> = b.rows().collect();
        assert_eq!(rows[1], ("dogs", &[0.0, 1.0][..], "dogA"));
    }

    #[test]
    fn test_empty_source_becomes_unknown() {
        let b = RecordBatch::new(vec!["x".into()], vec![vec![1.0]], vec![String::new()]).unwrap();
        assert_eq!(b.sources(), &[UNKNOWN_SOURCE.to_string()]);
    }

    #[test]
    fn test_source_filter() {
        let all = SourceFilter::all();
        assert!(all.is_match_all());
        assert!(all.matches("anything"));

        let filter: SourceFilter = ["b", "a"].into_iter().collect();
        assert!(filter.matches("a"));
        assert!(!filter.matches("c"));
        assert_eq!(filter.to_vec(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_score_normalization() {
        assert_eq!(RawScore::Distance(0.0).similarity(), 1.0);
        assert_eq!(RawScore::Distance(0.25).similarity(), 0.75);
        assert_eq!(RawScore::Similarity(0.9).similarity(), 0.9);

        let hit = SearchHit::from(RawHit {
            content: "x".into(),
            score: RawScore::Distance(0.5),
            source: "s".into(),
        });
        assert_eq!(hit.score, 0.5);
    }
}
