//! Engine assembly
//!
//! [`EngineBuilder`] wires a storage backend, blob store, and transform set
//! into a message bus with every handler registered, and starts the bus
//! worker. The resulting [`Engine`] is what the server binary and the
//! scenario tests drive.

use crate::bus::{MessageBus, Shutdown};
use crate::error::Result;
use crate::generate::GenerationContext;
use crate::handlers::{
    BlobCleanupHandler, GenerationHandler, GraphCommandHandler, LayoutNotificationHandler,
    NotificationHandler, PropagationHandler,
};
use crate::message::{Command, CommandKind, EventKind};
use crate::notifier::Notifier;
use crate::transforms::{ImageTransforms, PngTransforms};
use crate::updater::BusNodeUpdater;
use pixelgraph_core::DomainEvent;
use pixelgraph_store::{Backend, BlobStore};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Builder for a fully wired [`Engine`]
pub struct EngineBuilder {
    backend: Arc<dyn Backend>,
    blobs: Arc<dyn BlobStore>,
    transforms: Arc<dyn ImageTransforms>,
}

impl EngineBuilder {
    pub fn new(backend: Arc<dyn Backend>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            backend,
            blobs,
            transforms: Arc::new(PngTransforms::new()),
        }
    }

    /// Substitute the transform set (tests use deterministic stubs)
    pub fn with_transforms(mut self, transforms: Arc<dyn ImageTransforms>) -> Self {
        self.transforms = transforms;
        self
    }

    pub fn build(self) -> Result<Engine> {
        let (shutdown_tx, shutdown) = Shutdown::channel();
        let bus = MessageBus::new(shutdown);
        let notifier = Arc::new(Notifier::new());

        let command_handler = Arc::new(GraphCommandHandler::new(self.backend.clone()));
        for kind in CommandKind::ALL {
            bus.register_command(kind, command_handler.clone())?;
        }

        let context = GenerationContext {
            blobs: self.blobs.clone(),
            transforms: self.transforms,
            updater: Arc::new(BusNodeUpdater::new(bus.clone())),
        };

        bus.subscribe(
            EventKind::NodeNeedsOutputs,
            Arc::new(GenerationHandler::new(context.clone())),
        );
        bus.subscribe(
            EventKind::NodeOutputImageSet,
            Arc::new(PropagationHandler::new(
                self.backend.clone(),
                context,
                notifier.clone(),
            )),
        );
        let cleanup = Arc::new(BlobCleanupHandler::new(self.backend.clone(), self.blobs));
        bus.subscribe(EventKind::NodeOutputImageUnset, cleanup.clone());
        bus.subscribe(EventKind::NodePreviewUnset, cleanup);

        let notifications = Arc::new(NotificationHandler::new(notifier.clone()));
        for kind in [
            EventKind::NodeAdded,
            EventKind::NodeRemoved,
            EventKind::NodeInputConnected,
            EventKind::NodeInputDisconnected,
            EventKind::NodeNeedsOutputs,
            EventKind::NodePreviewSet,
        ] {
            bus.subscribe(kind, notifications.clone());
        }
        let layout_notifications = Arc::new(LayoutNotificationHandler::new(notifier.clone()));
        bus.subscribe(EventKind::LayoutUpdated, layout_notifications.clone());
        bus.subscribe(EventKind::ViewportUpdated, layout_notifications);

        let worker = bus.spawn_worker();
        Ok(Engine {
            bus,
            notifier,
            shutdown_tx,
            worker,
        })
    }
}

/// A running pixelgraph engine
pub struct Engine {
    bus: Arc<MessageBus>,
    notifier: Arc<Notifier>,
    shutdown_tx: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

impl Engine {
    pub async fn handle_command(&self, command: Command) -> Result<Vec<DomainEvent>> {
        self.bus.handle_command(command).await
    }

    pub fn bus(&self) -> Arc<MessageBus> {
        self.bus.clone()
    }

    pub fn notifier(&self) -> Arc<Notifier> {
        self.notifier.clone()
    }

    /// Cancel the root token, terminate subscribers, and wait out the worker
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        self.notifier.close();
        if let Err(err) = self.worker.await {
            tracing::warn!(error = %err, "bus worker did not stop cleanly");
        }
    }
}
