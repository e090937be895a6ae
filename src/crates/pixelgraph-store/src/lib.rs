//! # pixelgraph-store - Persistence for the pixelgraph aggregates
//!
//! The transactional envelope around aggregate mutations and the
//! content-addressed byte store for image blobs:
//!
//! - **[`UnitOfWork`]** - fetch-or-create aggregates through an identity
//!   map, commit atomically, and get the drained domain events back.
//! - **[`Backend`]** - the repository trait; [`MemoryBackend`] for tests
//!   and development, [`SqliteBackend`] for durable storage (one JSON
//!   document row per aggregate, integer version column for optimistic
//!   concurrency).
//! - **[`BlobStore`]** - save/get/exists/remove of PNG bytes keyed by
//!   [`ImageId`](pixelgraph_core::ImageId); [`MemoryBlobStore`] and
//!   [`FsBlobStore`].

pub mod blob;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;
pub mod uow;

pub use blob::FsBlobStore;
pub use error::{Result, StoreError};
pub use memory::{MemoryBackend, MemoryBlobStore};
pub use sqlite::SqliteBackend;
pub use traits::{Backend, BlobStore};
pub use uow::UnitOfWork;
