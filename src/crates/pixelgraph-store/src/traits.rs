//! Storage abstractions
//!
//! [`Backend`] is the repository surface the unit of work drives: load and
//! store whole aggregates, with an optimistic version check on store. Two
//! implementations ship with the crate - [`MemoryBackend`](crate::memory::MemoryBackend)
//! for tests and development, [`SqliteBackend`](crate::sqlite::SqliteBackend)
//! for persistence - and the aggregate model is identical for both.
//!
//! [`BlobStore`] is the content-addressed byte surface for PNG image blobs.
//! Operations are atomic per image id; `remove` of an absent blob succeeds,
//! since cleanup paths may be delivered more than once.

use crate::error::Result;
use async_trait::async_trait;
use pixelgraph_core::{GraphId, ImageGraph, ImageId, Layout, Viewport};

/// Aggregate persistence backend
///
/// `expected_version` carries the persisted version observed at load time:
/// `None` means the aggregate is new (the store must fail on a duplicate
/// id), `Some(v)` means the row must still be at `v` or the store fails
/// with [`StoreError::VersionConflict`](crate::error::StoreError::VersionConflict).
#[async_trait]
pub trait Backend: Send + Sync {
    async fn load_graph(&self, id: GraphId) -> Result<Option<ImageGraph>>;
    async fn store_graph(&self, graph: &ImageGraph, expected_version: Option<u64>) -> Result<()>;

    async fn load_layout(&self, graph_id: GraphId) -> Result<Option<Layout>>;
    async fn store_layout(&self, layout: &Layout, expected_version: Option<u64>) -> Result<()>;

    async fn load_viewport(&self, graph_id: GraphId) -> Result<Option<Viewport>>;
    async fn store_viewport(&self, viewport: &Viewport, expected_version: Option<u64>)
        -> Result<()>;
}

/// Content-addressed store for PNG-encoded image bytes
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn save(&self, id: ImageId, bytes: Vec<u8>) -> Result<()>;

    /// Fetch a blob; [`StoreError::ImageNotFound`](crate::error::StoreError::ImageNotFound)
    /// when absent
    async fn get(&self, id: ImageId) -> Result<Vec<u8>>;

    async fn exists(&self, id: ImageId) -> Result<bool>;

    /// Delete a blob; removing an absent blob is not an error
    async fn remove(&self, id: ImageId) -> Result<()>;
}
