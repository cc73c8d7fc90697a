//! ragbot-embed - Embedding providers
//!
//! This crate turns text into fixed-length vectors for the vector store.
//!
//! # Providers
//!
//! - [`OpenAiEmbedder`]: any OpenAI-compatible `/embeddings` endpoint
//! - [`MockEmbedder`]: deterministic bag-of-words hashing, for tests and
//!   offline use

mod mock;
mod openai;

pub use mock::MockEmbedder;
pub use openai::OpenAiEmbedder;

// Re-export the Embedder trait for convenience
pub use ragbot_core::Embedder;
