//! # Error Handling
//!
//! Error types for the meshcheck analyzer, defined with `thiserror`.
//!
//! Per-record problems (an unparseable host, a second MeshPolicy, two destination
//! rules fighting over one tier) are recoverable: the analyzer turns them into
//! findings and keeps going. Listing failures abort the pass.

pub mod types;

pub use types::{MeshcheckError, Result};
