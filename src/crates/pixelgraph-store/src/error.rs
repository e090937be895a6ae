//! Storage error types
//!
//! Not-found lookups, optimistic-concurrency conflicts, and the usual
//! serialization/database/filesystem failures, with `From` conversions so
//! backend code can use `?` throughout.

use pixelgraph_core::{GraphId, ImageId};
use thiserror::Error;

/// Convenience result type using [`StoreError`]
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("image graph {0} not found")]
    GraphNotFound(GraphId),

    #[error("layout for graph {0} not found")]
    LayoutNotFound(GraphId),

    #[error("viewport for graph {0} not found")]
    ViewportNotFound(GraphId),

    #[error("image {0} not found")]
    ImageNotFound(ImageId),

    #[error("aggregate {0} already exists")]
    AlreadyExists(String),

    #[error("aggregate {id} was modified concurrently (expected version {expected})")]
    VersionConflict { id: String, expected: u64 },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
