//! ragbot-chunk - Text splitting
//!
//! This crate splits documents into pieces small enough to embed.
//!
//! # Example
//!
//! ```rust
//! use ragbot_chunk::{RecursiveSplitter, Splitter};
//!
//! let splitter = RecursiveSplitter::new(20, 5).unwrap();
//! let chunks = splitter.split("Cats are mammals.\n\nDogs bark at night.").unwrap();
//! assert_eq!(chunks, vec!["Cats are mammals.", "Dogs bark at night."]);
//! ```

mod recursive;

pub use recursive::RecursiveSplitter;

// Re-export types for convenience
pub use ragbot_core::{Splitter, SplitterConfig};
