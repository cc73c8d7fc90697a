//! ragbot-store - Vector-store backends behind one contract
//!
//! Three backend families implement [`VectorBackend`]:
//!
//! - [`HttpStore`]: a networked vector service speaking the
//!   `set`/`store`/`get`/`delete` JSON protocol.
//! - [`SqliteVecStore`]: one SQLite table per namespace, searched exactly
//!   with the sqlite-vec distance functions.
//! - [`QdrantStore`]: a dedicated approximate-nearest-neighbor engine with
//!   schema-on-first-write collections.
//!
//! [`VectorStore`] selects a backend from configuration and normalizes
//! scoring direction, filtering and result shape across all of them.

mod facade;
mod http;
mod normalize;
mod qdrant;
mod schema;
mod sqlite;

pub use facade::VectorStore;
pub use http::{wire, HttpStore};
pub use normalize::normalize_hits;
pub use qdrant::QdrantStore;
pub use sqlite::SqliteVecStore;

pub use ragbot_core::{
    BackendKind, Capabilities, IndexStatus, QueryResult, SearchHit, SourceFilter, VectorBackend,
};
