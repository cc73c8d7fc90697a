//! Networked vector service backend.
//!
//! The service stores vectors per namespace but does not allocate record
//! identifiers, so the client keeps an insertion cursor and sends it as
//! `start_id` with every batch. The cursor only moves forward: it is raised
//! to whatever the service reports and lowered only by a reset.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use ragbot_core::{
    validate_namespace, BackendKind, Capabilities, HttpStoreConfig, RagError, RawHit, RawScore,
    RecordBatch, Result, SourceFilter, VectorBackend,
};

use self::wire::{Ack, DeleteRequest, GetRequest, GetResponse, SetRequest, SourceMeta, StoreRequest};

const BACKEND: &str = "http";

/// JSON bodies exchanged with the vector service.
pub mod wire {
    use serde::{Deserialize, Serialize};

    use ragbot_core::UNKNOWN_SOURCE;

    /// `POST /set`: bind (and optionally reset) a namespace.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SetRequest {
        pub reset: bool,
        #[serde(rename = "table_name")]
        pub namespace: String,
    }

    /// `POST /store`: append a batch starting at `start_id`.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct StoreRequest {
        pub embeddings: Vec<Vec<f32>>,
        pub sources: Vec<SourceMeta>,
        #[serde(rename = "files")]
        pub contents: Vec<String>,
        pub start_id: u64,
        #[serde(rename = "table_name")]
        pub namespace: String,
    }

    /// `GET /get`: top-k search. A missing filter matches every source.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct GetRequest {
        pub embedding: Vec<f32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub filter: Option<Vec<String>>,
        pub k: usize,
        #[serde(rename = "table_name")]
        pub namespace: String,
    }

    /// Search response. Each field holds one inner list per query; only
    /// the first is read.
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct GetResponse {
        #[serde(default)]
        pub documents: Vec<Vec<String>>,
        #[serde(default)]
        pub distances: Vec<Vec<f32>>,
        #[serde(default)]
        pub metadatas: Vec<Vec<Option<SourceMeta>>>,
    }

    /// Per-record metadata.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct SourceMeta {
        #[serde(default = "unknown_source")]
        pub source: String,
    }

    impl SourceMeta {
        pub fn new(source: impl Into<String>) -> Self {
            Self {
                source: source.into(),
            }
        }
    }

    fn unknown_source() -> String {
        UNKNOWN_SOURCE.to_string()
    }

    /// `POST /delete`: remove every record with `source`.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct DeleteRequest {
        pub source: String,
        #[serde(rename = "table_name")]
        pub namespace: String,
    }

    /// Acknowledgement for `set`, `store` and `delete`. Every field is
    /// optional and an empty body is a valid acknowledgement.
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct Ack {
        /// Records now stored in the namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub count: Option<u64>,

        /// Identifier the service expects for the next record. Unlike
        /// `count` it does not drop when records are deleted.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub next_id: Option<u64>,

        /// Dimensionality of the namespace, once established.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub dimension: Option<usize>,

        /// Records removed by `delete`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub deleted: Option<u64>,
    }
}

/// Client for the networked vector service.
pub struct HttpStore {
    client: Client,
    base_url: String,
    namespace: String,

    /// Identifier of the next record to store. Only moves after the service
    /// acknowledges a write.
    cursor: u64,

    /// Cursor last reached in each namespace bound by this client.
    high_water: HashMap<String, u64>,

    dimension: Option<usize>,
}

impl HttpStore {
    /// Connect to the service and bind `namespace`, resetting it if asked.
    pub async fn connect(config: &HttpStoreConfig, namespace: &str, reset: bool) -> Result<Self> {
        Self::connect_url(config.base_url(), namespace, reset).await
    }

    /// Connect using an explicit base URL.
    pub async fn connect_url(
        base_url: impl Into<String>,
        namespace: &str,
        reset: bool,
    ) -> Result<Self> {
        validate_namespace(namespace)?;

        let client = Client::builder()
            .build()
            .map_err(|e| RagError::unavailable(BACKEND, e))?;

        let mut store = Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            namespace: namespace.to_string(),
            cursor: 0,
            high_water: HashMap::new(),
            dimension: None,
        };

        store.set(namespace, reset).await?;
        info!(
            "Connected to vector service at {} (namespace {})",
            store.base_url, store.namespace
        );
        Ok(store)
    }

    /// Identifier that the next stored record will receive.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn set(&mut self, namespace: &str, reset: bool) -> Result<()> {
        let request = SetRequest {
            reset,
            namespace: namespace.to_string(),
        };
        let ack: Ack = self.call("set", self.client.post(self.url("set")), &request).await?;

        self.namespace = namespace.to_string();
        if reset {
            self.cursor = 0;
            self.high_water.remove(namespace);
            self.dimension = None;
        } else {
            self.cursor = self.high_water.get(namespace).copied().unwrap_or(0);
            self.reconcile(&ack);
            self.dimension = ack.dimension;
        }

        debug!(
            "Bound namespace {} (reset {}, cursor {})",
            namespace, reset, self.cursor
        );
        Ok(())
    }

    /// Raise the cursor to what the service reports. `count` is a lower
    /// bound on the next free identifier, `next_id` the exact value.
    fn reconcile(&mut self, ack: &Ack) {
        let reported = ack.next_id.into_iter().chain(ack.count).max().unwrap_or(0);
        self.cursor = self.cursor.max(reported);
        self.high_water.insert(self.namespace.clone(), self.cursor);
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    /// Send a JSON body and decode the JSON reply, mapping HTTP failures
    /// onto the error taxonomy.
    async fn call<B, R>(&self, endpoint: &str, request: reqwest::RequestBuilder, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned + Default,
    {
        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| RagError::unavailable(BACKEND, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RagError::unavailable(BACKEND, e))?;

        if !status.is_success() {
            return Err(self.status_error(endpoint, status, &text));
        }

        if text.trim().is_empty() {
            return Ok(R::default());
        }

        serde_json::from_str(&text)
            .map_err(|e| RagError::protocol(format!("malformed /{} response: {}", endpoint, e)))
    }

    fn status_error(&self, endpoint: &str, status: StatusCode, body: &str) -> RagError {
        if endpoint == "delete"
            && matches!(
                status,
                StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
            )
        {
            return RagError::unsupported(BACKEND, "delete_by_source");
        }

        if status == StatusCode::NOT_FOUND {
            return RagError::namespace_not_found(self.namespace.clone());
        }

        if status.is_server_error() {
            return RagError::unavailable(BACKEND, format!("/{} returned {}: {}", endpoint, status, body));
        }

        RagError::protocol(format!("/{} returned {}: {}", endpoint, status, body))
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        match self.dimension {
            Some(expected) if expected != actual => {
                Err(RagError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }
}

/// Zip the first inner list of each parallel array into raw hits.
pub(crate) fn parse_get_response(response: GetResponse) -> Result<Vec<RawHit>> {
    let documents = response.documents.into_iter().next().unwrap_or_default();
    let distances = response.distances.into_iter().next().unwrap_or_default();
    let metadatas = response.metadatas.into_iter().next().unwrap_or_default();

    if documents.len() != distances.len() || documents.len() != metadatas.len() {
        return Err(RagError::protocol(format!(
            "/get returned {} documents, {} distances and {} metadatas",
            documents.len(),
            distances.len(),
            metadatas.len()
        )));
    }

    Ok(documents
        .into_iter()
        .zip(distances)
        .zip(metadatas)
        .map(|((content, distance), meta)| RawHit {
            content,
            score: RawScore::Distance(distance),
            source: meta
                .map(|m| m.source)
                .unwrap_or_else(|| ragbot_core::UNKNOWN_SOURCE.to_string()),
        })
        .collect())
}

#[async_trait]
impl VectorBackend for HttpStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Http
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            delete_by_source: true,
            exact_search: false,
            synchronous_writes: true,
        }
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    async fn insert_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        self.check_dimension(batch.dimension())?;

        let request = StoreRequest {
            embeddings: batch.embeddings().to_vec(),
            sources: batch.sources().iter().map(SourceMeta::new).collect(),
            contents: batch.contents().to_vec(),
            start_id: self.cursor,
            namespace: self.namespace.clone(),
        };

        let ack: Ack = self
            .call("store", self.client.post(self.url("store")), &request)
            .await?;

        self.cursor += batch.len() as u64;
        self.reconcile(&ack);
        self.dimension = Some(batch.dimension());

        debug!(
            "Stored {} records in {} (cursor {})",
            batch.len(),
            self.namespace,
            self.cursor
        );
        Ok(())
    }

    async fn search(&self, query: &[f32], filter: &SourceFilter, k: usize) -> Result<Vec<RawHit>> {
        self.check_dimension(query.len())?;

        let request = GetRequest {
            embedding: query.to_vec(),
            filter: (!filter.is_match_all()).then(|| filter.to_vec()),
            k,
            namespace: self.namespace.clone(),
        };

        let response: GetResponse = self
            .call("get", self.client.get(self.url("get")), &request)
            .await?;
        let hits = parse_get_response(response)?;

        debug!("Search in {} returned {} rows", self.namespace, hits.len());
        Ok(hits)
    }

    async fn switch_namespace(&mut self, name: &str) -> Result<()> {
        validate_namespace(name)?;
        self.set(name, false).await
    }

    async fn reset_namespace(&mut self) -> Result<()> {
        let namespace = self.namespace.clone();
        self.set(&namespace, true).await?;
        info!("Reset namespace {}", namespace);
        Ok(())
    }

    async fn delete_by_source(&mut self, source: &str) -> Result<u64> {
        let request = DeleteRequest {
            source: source.to_string(),
            namespace: self.namespace.clone(),
        };

        let ack: Ack = self
            .call("delete", self.client.post(self.url("delete")), &request)
            .await?;

        self.reconcile(&ack);

        let deleted = ack.deleted.unwrap_or(0);
        debug!("Deleted {} records with source {} from {}", deleted, source, self.namespace);
        Ok(deleted)
    }
}
