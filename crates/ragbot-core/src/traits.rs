//! Core traits defining the interfaces between components.

use async_trait::async_trait;

use crate::error::{RagError, Result};
use crate::types::{
    BackendKind, Capabilities, IndexStatus, RawHit, RecordBatch, SourceFilter,
};

/// A vector-store backend bound to one active namespace at a time.
///
/// The active namespace is client-local state: switching it never affects
/// other clients connected to the same backend instance.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Backend family.
    fn kind(&self) -> BackendKind;

    /// Operations this backend truly supports.
    fn capabilities(&self) -> Capabilities;

    /// Name of the active namespace.
    fn namespace(&self) -> &str;

    /// Dimensionality of the active namespace, if known.
    fn dimension(&self) -> Option<usize>;

    /// Append a batch to the active namespace, creating it on first write.
    async fn insert_batch(&mut self, batch: &RecordBatch) -> Result<()>;

    /// Return up to `k` backend-native hits whose source passes `filter`.
    async fn search(&self, query: &[f32], filter: &SourceFilter, k: usize) -> Result<Vec<RawHit>>;

    /// Make `name` the active namespace (already alias-resolved).
    async fn switch_namespace(&mut self, name: &str) -> Result<()>;

    /// Drop and recreate the active namespace empty.
    async fn reset_namespace(&mut self) -> Result<()>;

    /// Remove every record whose source equals `source`, returning the count.
    async fn delete_by_source(&mut self, _source: &str) -> Result<u64> {
        Err(RagError::unsupported(self.kind().to_string(), "delete_by_source"))
    }

    /// Readiness of the similarity index for the active namespace.
    async fn index_status(&self) -> Result<IndexStatus> {
        Ok(IndexStatus::Ready)
    }
}

/// Embedding provider trait.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input in the same order.
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding("provider returned no vector for query"))
    }

    /// Model identifier used by the provider.
    fn model_name(&self) -> &str;
}

/// Hosted chat model trait.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Complete a single prompt.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Model identifier used by the provider.
    fn model_name(&self) -> &str;
}

/// Text splitting strategy.
pub trait Splitter: Send + Sync {
    /// Split text into chunks ready for embedding.
    fn split(&self, text: &str) -> Result<Vec<String>>;
}
