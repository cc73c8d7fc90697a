//! ragbot-core - Core types and traits for the ragbot agent
//!
//! This crate provides the error taxonomy, the record/result data model,
//! the capability traits implemented by vector-store backends, embedders
//! and chat models, and the configuration surface shared by every crate.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{RagError, Result};
pub use traits::*;
pub use types::*;
