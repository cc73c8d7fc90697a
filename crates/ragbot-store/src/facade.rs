//! Backend-independent vector store.

use tracing::{debug, info};

use ragbot_core::{
    validate_embedding, BackendKind, Capabilities, IndexStatus, QueryResult, RagError,
    RecordBatch, Result, SourceFilter, StoreConfig, VectorBackend, DEFAULT_NAMESPACE_ALIAS,
};

use crate::http::HttpStore;
use crate::normalize::normalize_hits;
use crate::qdrant::QdrantStore;
use crate::sqlite::SqliteVecStore;

/// Uniform vector store over any [`VectorBackend`].
///
/// Validates arguments, resolves the default namespace alias and returns
/// results in one shape: higher-is-better scores, filtered, best first.
pub struct VectorStore {
    backend: Box<dyn VectorBackend>,
    default_namespace: String,
}

impl VectorStore {
    /// Wrap an already-connected backend.
    pub fn new(backend: Box<dyn VectorBackend>, default_namespace: impl Into<String>) -> Self {
        Self {
            backend,
            default_namespace: default_namespace.into(),
        }
    }

    /// Connect the backend selected by `config` and bind its default namespace.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let namespace = config.default_namespace.as_str();
        let reset = config.reset_on_start;

        let backend: Box<dyn VectorBackend> = match config.backend {
            BackendKind::Http => Box::new(HttpStore::connect(&config.http, namespace, reset).await?),
            BackendKind::Sqlite => {
                Box::new(SqliteVecStore::open(&config.sqlite.path, namespace, reset)?)
            }
            BackendKind::Qdrant => {
                Box::new(QdrantStore::connect(&config.qdrant, namespace, reset).await?)
            }
        };

        info!(
            "Vector store ready: backend {}, namespace {}, reset {}",
            config.backend, namespace, reset
        );
        Ok(Self::new(backend, namespace))
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.backend.capabilities()
    }

    /// Active namespace.
    pub fn namespace(&self) -> &str {
        self.backend.namespace()
    }

    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    /// Dimensionality of the active namespace, if established.
    pub fn dimension(&self) -> Option<usize> {
        self.backend.dimension()
    }

    /// Map the default alias to the configured default namespace.
    pub fn resolve_namespace<'a>(&'a self, name: &'a str) -> &'a str {
        if name == DEFAULT_NAMESPACE_ALIAS {
            &self.default_namespace
        } else {
            name
        }
    }

    /// Append records to the active namespace.
    pub async fn insert_batch(
        &mut self,
        contents: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        sources: Vec<String>,
    ) -> Result<()> {
        let batch = RecordBatch::new(contents, embeddings, sources)?;
        self.insert(&batch).await
    }

    /// Append a prepared batch to the active namespace.
    pub async fn insert(&mut self, batch: &RecordBatch) -> Result<()> {
        if let Some(expected) = self.backend.dimension() {
            if expected != batch.dimension() {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: batch.dimension(),
                });
            }
        }

        self.backend.insert_batch(batch).await
    }

    /// Up to `k` records passing `filter`, best first.
    pub async fn search(&self, query: &[f32], filter: &SourceFilter, k: usize) -> Result<QueryResult> {
        if k == 0 {
            return Err(RagError::invalid_argument("k must be at least 1"));
        }
        validate_embedding(query)?;

        let raw = self.backend.search(query, filter, k).await?;
        let hits = normalize_hits(raw, filter, k);

        debug!(
            "Search in {} returned {} hits (filter {} sources)",
            self.namespace(),
            hits.len(),
            filter.len()
        );
        Ok(hits)
    }

    /// Make `name` (or the default alias) the active namespace.
    pub async fn switch_namespace(&mut self, name: &str) -> Result<()> {
        let name = self.resolve_namespace(name).to_string();
        self.backend.switch_namespace(&name).await?;
        info!("Switched to namespace {}", name);
        Ok(())
    }

    /// Drop every record in the active namespace.
    pub async fn reset_namespace(&mut self) -> Result<()> {
        self.backend.reset_namespace().await
    }

    /// Remove every record in the active namespace tagged `source`.
    pub async fn delete_by_source(&mut self, source: &str) -> Result<u64> {
        if !self.backend.capabilities().delete_by_source {
            return Err(RagError::unsupported(
                self.backend.kind().to_string(),
                "delete_by_source",
            ));
        }

        let deleted = self.backend.delete_by_source(source).await?;
        info!("Deleted {} records with source {}", deleted, source);
        Ok(deleted)
    }

    pub async fn index_status(&self) -> Result<IndexStatus> {
        self.backend.index_status().await
    }
}
