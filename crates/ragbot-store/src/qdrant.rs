//! Approximate-nearest-neighbor engine backend (Qdrant).
//!
//! Collections are created on first write with a fixed dimension and the
//! payload fields `file_id`, `content` and `source`. Writes wait for the
//! engine to apply them, so inserted points are searchable on return.
//!
//! Point identifiers are never handed out twice in a collection: binding an
//! existing collection resumes after its highest `file_id`, and the client
//! remembers how far it got in every collection it has written to.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    value::Kind, vectors_config::Config as VectorsConfig, CollectionInfo, CollectionStatus,
    Condition, CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    DeletePointsBuilder, Direction, Distance, FieldType, Filter, OrderBy, PointStruct, Query,
    QueryPointsBuilder, ScrollPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tracing::{debug, info, warn};

use ragbot_core::{
    validate_namespace, BackendKind, Capabilities, IndexStatus, QdrantStoreConfig, RagError,
    RawHit, RawScore, RecordBatch, Result, SourceFilter, VectorBackend, UNKNOWN_SOURCE,
};

const BACKEND: &str = "qdrant";

/// Whether the active collection exists on the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CollectionState {
    /// Collection exists with this vector size.
    Ready { dimension: usize },

    /// Collection will be created by the next insert. `cleared` is set when
    /// this client dropped it, in which case searches see an empty namespace.
    Pending { cleared: bool },
}

/// Client for a Qdrant collection per namespace.
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    state: CollectionState,

    /// Identifier for the next point.
    next_id: u64,

    /// `next_id` last reached in each collection written by this client.
    issued: HashMap<String, u64>,
}

impl QdrantStore {
    /// Connect and bind `namespace`, dropping it first when `reset` is set.
    pub async fn connect(config: &QdrantStoreConfig, namespace: &str, reset: bool) -> Result<Self> {
        validate_namespace(namespace)?;

        let client = Qdrant::from_url(&config.url)
            .api_key(config.api_key.clone())
            .build()
            .map_err(|e| RagError::unavailable(BACKEND, e))?;

        let mut store = Self {
            client,
            collection: namespace.to_string(),
            state: CollectionState::Pending { cleared: false },
            next_id: 1,
            issued: HashMap::new(),
        };

        if reset {
            store.drop_collection().await?;
        } else {
            store.bind(namespace).await?;
        }

        info!("Connected to Qdrant at {} (collection {})", config.url, namespace);
        Ok(store)
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        self.client
            .collection_exists(name)
            .await
            .map_err(|e| RagError::unavailable(BACKEND, e))
    }

    async fn info(&self) -> Result<CollectionInfo> {
        self.client
            .collection_info(self.collection.as_str())
            .await
            .map_err(|e| RagError::unavailable(BACKEND, e))?
            .result
            .ok_or_else(|| RagError::protocol("collection info missing from response"))
    }

    /// Bind an existing collection, or mark the client pending.
    async fn bind(&mut self, name: &str) -> Result<()> {
        self.collection = name.to_string();
        self.next_id = self.issued.get(name).copied().unwrap_or(1);

        if !self.exists(name).await? {
            self.state = CollectionState::Pending { cleared: false };
            debug!("Collection {} does not exist yet", name);
            return Ok(());
        }

        let info = self.info().await?;
        let dimension = collection_dimension(&info)
            .ok_or_else(|| RagError::protocol(format!("collection {} has no vector size", name)))?;

        self.next_id = self.resume_id(&info).await;
        self.state = CollectionState::Ready { dimension };
        debug!(
            "Bound collection {} (dimension {}, next id {})",
            name, dimension, self.next_id
        );
        Ok(())
    }

    async fn drop_collection(&mut self) -> Result<()> {
        if self.exists(&self.collection).await? {
            self.client
                .delete_collection(self.collection.as_str())
                .await
                .map_err(|e| RagError::unavailable(BACKEND, e))?;
        }

        self.state = CollectionState::Pending { cleared: true };
        self.issued.remove(&self.collection);
        self.next_id = 1;
        Ok(())
    }

    /// Highest `file_id` stored in the active collection, read through the
    /// integer index on that field.
    async fn highest_file_id(&self) -> Result<Option<u64>> {
        let order = OrderBy {
            key: "file_id".to_string(),
            direction: Some(Direction::Desc.into()),
            start_from: None,
        };

        let response = self
            .client
            .scroll(
                ScrollPointsBuilder::new(self.collection.as_str())
                    .limit(1)
                    .with_payload(true)
                    .order_by(order),
            )
            .await
            .map_err(|e| RagError::unavailable(BACKEND, e))?;

        Ok(response
            .result
            .first()
            .and_then(|point| payload_id(&point.payload, "file_id")))
    }

    /// First identifier that is free in the active collection.
    async fn resume_id(&self, info: &CollectionInfo) -> u64 {
        // Collections created elsewhere may lack the `file_id` index.
        let highest = match self.highest_file_id().await {
            Ok(highest) => highest,
            Err(e) => {
                warn!("Cannot read highest file_id in {}: {}", self.collection, e);
                None
            }
        };

        next_id_after(
            highest,
            info.points_count.unwrap_or(0),
            self.issued.get(&self.collection).copied(),
        )
    }

    /// Create the collection and its `source` and `file_id` indexes for
    /// vectors of `dimension`.
    async fn create_collection(&mut self, dimension: usize) -> Result<()> {
        if self.exists(&self.collection).await? {
            let info = self.info().await?;
            if let Some(existing) = collection_dimension(&info) {
                if existing != dimension {
                    return Err(RagError::DimensionMismatch {
                        expected: existing,
                        actual: dimension,
                    });
                }
            }
            self.next_id = self.next_id.max(self.resume_id(&info).await);
        } else {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(self.collection.as_str())
                        .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Euclid)),
                )
                .await
                .map_err(|e| RagError::unavailable(BACKEND, e))?;

            for (field, kind) in [("source", FieldType::Keyword), ("file_id", FieldType::Integer)] {
                self.client
                    .create_field_index(
                        CreateFieldIndexCollectionBuilder::new(self.collection.as_str(), field, kind)
                            .wait(true),
                    )
                    .await
                    .map_err(|e| RagError::unavailable(BACKEND, e))?;
            }

            info!("Created collection {} (dimension {})", self.collection, dimension);
        }

        self.state = CollectionState::Ready { dimension };
        Ok(())
    }

    /// Collection to query, or `None` when the namespace is known to be empty.
    fn readable(&self) -> Result<Option<usize>> {
        match self.state {
            CollectionState::Ready { dimension } => Ok(Some(dimension)),
            CollectionState::Pending { cleared: true } => Ok(None),
            CollectionState::Pending { cleared: false } => {
                Err(RagError::namespace_not_found(self.collection.clone()))
            }
        }
    }
}

/// Vector size declared by a collection's config.
fn collection_dimension(info: &CollectionInfo) -> Option<usize> {
    let config = info
        .config
        .as_ref()?
        .params
        .as_ref()?
        .vectors_config
        .as_ref()?
        .config
        .as_ref()?;

    match config {
        VectorsConfig::Params(params) => Some(params.size as usize),
        VectorsConfig::ParamsMap(map) => map.map.values().next().map(|p| p.size as usize),
    }
}

/// Map a collection status code to index readiness.
fn index_status_from(status: i32) -> IndexStatus {
    match CollectionStatus::try_from(status) {
        Ok(CollectionStatus::Green) => IndexStatus::Ready,
        Ok(CollectionStatus::Yellow) | Ok(CollectionStatus::Grey) => IndexStatus::Building,
        Ok(CollectionStatus::Red) => IndexStatus::Failed("collection status is red".to_string()),
        _ => IndexStatus::Failed(format!("unknown collection status {}", status)),
    }
}

/// Payload filter restricting `source`, or `None` to match everything.
fn source_condition(filter: &SourceFilter) -> Option<Filter> {
    if filter.is_match_all() {
        None
    } else {
        Some(Filter::must([Condition::matches("source", filter.to_vec())]))
    }
}

fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    match payload.get(key) {
        Some(Value {
            kind: Some(Kind::StringValue(s)),
        }) => Some(s.clone()),
        _ => None,
    }
}

fn payload_id(payload: &HashMap<String, Value>, key: &str) -> Option<u64> {
    match payload.get(key) {
        Some(Value {
            kind: Some(Kind::IntegerValue(n)),
        }) => u64::try_from(*n).ok(),
        _ => None,
    }
}

/// Next free identifier given the highest stored `file_id`, the point
/// count and what this client already issued. Identifiers start at 1.
fn next_id_after(highest: Option<u64>, points_count: u64, issued: Option<u64>) -> u64 {
    [
        highest.map_or(1, |id| id + 1),
        points_count + 1,
        issued.unwrap_or(1),
    ]
    .into_iter()
    .max()
    .unwrap_or(1)
}

fn point_payload(id: u64, content: &str, source: &str) -> Payload {
    let mut payload = Payload::new();
    payload.insert("file_id", id as i64);
    payload.insert("content", content.to_string());
    payload.insert("source", source.to_string());
    payload
}

#[async_trait]
impl VectorBackend for QdrantStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Qdrant
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            delete_by_source: true,
            exact_search: false,
            synchronous_writes: true,
        }
    }

    fn namespace(&self) -> &str {
        &self.collection
    }

    fn dimension(&self) -> Option<usize> {
        match self.state {
            CollectionState::Ready { dimension } => Some(dimension),
            CollectionState::Pending { .. } => None,
        }
    }

    async fn insert_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        let state = self.state;
        match state {
            CollectionState::Ready { dimension } if dimension != batch.dimension() => {
                return Err(RagError::DimensionMismatch {
                    expected: dimension,
                    actual: batch.dimension(),
                });
            }
            CollectionState::Ready { .. } => {}
            CollectionState::Pending { .. } => self.create_collection(batch.dimension()).await?,
        }

        let first_id = self.next_id;
        let points: Vec<PointStruct> = batch
            .rows()
            .enumerate()
            .map(|(i, (content, embedding, source))| {
                let id = first_id + i as u64;
                PointStruct::new(id, embedding.to_vec(), point_payload(id, content, source))
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(self.collection.as_str(), points).wait(true))
            .await
            .map_err(|e| RagError::unavailable(BACKEND, e))?;

        self.next_id = first_id + batch.len() as u64;
        self.issued.insert(self.collection.clone(), self.next_id);
        debug!(
            "Upserted {} points into {} (ids {}..{})",
            batch.len(),
            self.collection,
            first_id,
            self.next_id
        );
        Ok(())
    }

    async fn search(&self, query: &[f32], filter: &SourceFilter, k: usize) -> Result<Vec<RawHit>> {
        let dimension = match self.readable()? {
            Some(dimension) => dimension,
            None => return Ok(Vec::new()),
        };

        if dimension != query.len() {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }

        let mut request = QueryPointsBuilder::new(self.collection.as_str())
            .query(Query::new_nearest(query.to_vec()))
            .limit(k as u64)
            .with_payload(true);
        if let Some(condition) = source_condition(filter) {
            request = request.filter(condition);
        }

        let response = self
            .client
            .query(request)
            .await
            .map_err(|e| RagError::unavailable(BACKEND, e))?;

        let hits: Vec<RawHit> = response
            .result
            .into_iter()
            .map(|point| RawHit {
                content: payload_string(&point.payload, "content").unwrap_or_default(),
                score: RawScore::Distance(point.score),
                source: payload_string(&point.payload, "source")
                    .unwrap_or_else(|| UNKNOWN_SOURCE.to_string()),
            })
            .collect();

        debug!("Search in {} returned {} points", self.collection, hits.len());
        Ok(hits)
    }

    async fn switch_namespace(&mut self, name: &str) -> Result<()> {
        validate_namespace(name)?;
        self.bind(name).await
    }

    async fn reset_namespace(&mut self) -> Result<()> {
        self.drop_collection().await?;
        info!("Reset collection {}", self.collection);
        Ok(())
    }

    async fn delete_by_source(&mut self, source: &str) -> Result<u64> {
        if self.readable()?.is_none() {
            return Ok(0);
        }

        let filter = Filter::must([Condition::matches("source", source.to_string())]);

        let matching = self
            .client
            .count(
                CountPointsBuilder::new(self.collection.as_str())
                    .filter(filter.clone())
                    .exact(true),
            )
            .await
            .map_err(|e| RagError::unavailable(BACKEND, e))?
            .result
            .map(|r| r.count)
            .unwrap_or(0);

        if matching > 0 {
            self.client
                .delete_points(
                    DeletePointsBuilder::new(self.collection.as_str())
                        .points(filter)
                        .wait(true),
                )
                .await
                .map_err(|e| RagError::unavailable(BACKEND, e))?;
        }

        debug!("Deleted {} points with source {} from {}", matching, source, self.collection);
        Ok(matching)
    }

    async fn index_status(&self) -> Result<IndexStatus> {
        if self.readable()?.is_none() {
            return Ok(IndexStatus::Ready);
        }

        let info = self.info().await?;
        Ok(index_status_from(info.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrant_client::qdrant::{CollectionConfig, CollectionParams, VectorParams, VectorsConfig as VectorsConfigMsg};

    fn info_with_size(size: u64) -> CollectionInfo {
        CollectionInfo {
            config: Some(CollectionConfig {
                params: Some(CollectionParams {
                    vectors_config: Some(VectorsConfigMsg {
                        config: Some(VectorsConfig::Params(VectorParams {
                            size,
                            distance: Distance::Euclid.into(),
                            ..Default::default()
                        })),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_collection_dimension() {
        assert_eq!(collection_dimension(&info_with_size(384)), Some(384));
        assert_eq!(collection_dimension(&CollectionInfo::default()), None);
    }

    #[test]
    fn test_index_status_mapping() {
        assert_eq!(index_status_from(CollectionStatus::Green as i32), IndexStatus::Ready);
        assert_eq!(index_status_from(CollectionStatus::Yellow as i32), IndexStatus::Building);
        assert_eq!(index_status_from(CollectionStatus::Grey as i32), IndexStatus::Building);
        assert!(matches!(
            index_status_from(CollectionStatus::Red as i32),
            IndexStatus::Failed(_)
        ));
        assert!(matches!(index_status_from(99), IndexStatus::Failed(_)));
    }

    #[test]
    fn test_source_condition() {
        assert!(source_condition(&SourceFilter::all()).is_none());

        let filter = source_condition(&SourceFilter::from_sources(["catA", "dogA"])).unwrap();
        assert_eq!(filter.must.len(), 1);
    }

    #[test]
    fn test_payload_round_trip() {
        let point = PointStruct::new(3u64, vec![1.0, 0.0], point_payload(3, "cats are mammals", "catA"));
        let payload = point.payload;

        assert_eq!(
            payload_string(&payload, "content").as_deref(),
            Some("cats are mammals")
        );
        assert_eq!(payload_string(&payload, "source").as_deref(), Some("catA"));
        assert_eq!(payload_string(&payload, "file_id"), None);
        assert_eq!(payload_string(&payload, "missing"), None);
        assert_eq!(payload_id(&payload, "file_id"), Some(3));
        assert_eq!(payload_id(&payload, "content"), None);
    }

    #[test]
    fn test_next_id_skips_past_deleted_points() {
        // Ids 1..=3 stored, id 1 deleted: two points left, highest is 3.
        assert_eq!(next_id_after(Some(3), 2, None), 4);

        // Without the index the client's own record still prevents reuse.
        assert_eq!(next_id_after(None, 2, Some(4)), 4);

        assert_eq!(next_id_after(None, 0, None), 1);
        assert_eq!(next_id_after(None, 5, None), 6);
    }
}
