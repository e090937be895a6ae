//! # pixelgraph-engine - Reactive recomputation over the image graph
//!
//! The event-driven machinery between the aggregate model and the outside
//! world:
//!
//! - **[`MessageBus`]** - commands run inline on the caller (one handler
//!   per kind), events cascade on a single worker task.
//! - **[`GraphCommandHandler`](handlers::GraphCommandHandler)** - thin
//!   translation of external intents into aggregate calls under a unit of
//!   work.
//! - **Event handlers** - generation triggers, downstream propagation,
//!   blob garbage collection, and subscriber notifications.
//! - **[`generate`]** - the closed `NodeType → transform` dispatch with
//!   version-guarded write-back through the [`NodeUpdater`] port.
//! - **[`Notifier`]** - per-graph fan-out with drop-slowest semantics.
//! - **[`transforms`]** - the `image`-crate transform kernels.
//!
//! [`EngineBuilder`] assembles all of it over a storage backend and a blob
//! store:
//!
//! ```rust,no_run
//! use pixelgraph_engine::{Command, EngineBuilder};
//! use pixelgraph_store::{MemoryBackend, MemoryBlobStore};
//! use pixelgraph_core::GraphId;
//! use std::sync::Arc;
//!
//! # async fn demo() -> pixelgraph_engine::Result<()> {
//! let engine = EngineBuilder::new(
//!     Arc::new(MemoryBackend::new()),
//!     Arc::new(MemoryBlobStore::new()),
//! )
//! .build()?;
//!
//! engine
//!     .handle_command(Command::CreateGraph {
//!         graph_id: GraphId::new(),
//!         name: "my pipeline".to_string(),
//!     })
//!     .await?;
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod error;
pub mod generate;
pub mod handlers;
pub mod message;
pub mod notifier;
pub mod runtime;
pub mod transforms;
pub mod updater;

pub use bus::{CommandHandler, EventHandler, MessageBus, Shutdown};
pub use error::{EngineError, Result};
pub use generate::{GenerationContext, GenerationJob};
pub use message::{Command, CommandKind, EventKind};
pub use notifier::{NodeUpdate, NodeUpdateState, Notification, Notifier, SubscriptionId};
pub use runtime::{Engine, EngineBuilder};
pub use transforms::{ImageTransforms, PngTransforms, TransformError};
pub use updater::{BusNodeUpdater, NodeUpdater};
