//! In-process message bus
//!
//! Routes two message kinds: **commands** (exactly one handler per kind,
//! run inline on the caller's task, returning the committed events) and
//! **events** (any number of handlers per kind, dispatched by a single
//! worker task).
//!
//! `handle_command` returns after the direct handler completes; the events
//! it committed are enqueued onto the worker's queue and cascade from
//! there. Events produced by event handlers stay on the worker's local
//! queue, so the bounded channel can never deadlock against the worker
//! itself. Events emitted by one mutation are delivered in emission order;
//! events from different mutations interleave in arrival order.
//!
//! Handler errors never propagate across handlers: the worker logs them
//! and keeps draining, matching the rule that a failed reaction must not
//! stall graph mutations.

use crate::error::{EngineError, Result};
use crate::message::{Command, CommandKind, EventKind};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use pixelgraph_core::DomainEvent;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Cooperative cancellation handle threaded through every handler
///
/// Handlers check it before blocking I/O; generators check it between
/// steps. Backed by a `watch` channel whose sender lives on the engine.
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// A channel pair: keep the sender to trigger, hand out the receiver
    pub fn channel() -> (watch::Sender<bool>, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (tx, Shutdown { rx })
    }

    /// A handle that never fires; test helper
    pub fn never() -> Shutdown {
        let (tx, rx) = watch::channel(false);
        // Leak the sender so the channel stays open.
        std::mem::forget(tx);
        Shutdown { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is signalled (or the engine is gone)
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Single-handler reaction to a [`Command`]
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, command: Command, shutdown: &Shutdown) -> Result<Vec<DomainEvent>>;
}

/// Many-handler reaction to a [`DomainEvent`]; returned events cascade
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent, shutdown: &Shutdown) -> Result<Vec<DomainEvent>>;
}

/// The router
pub struct MessageBus {
    command_handlers: RwLock<HashMap<CommandKind, Arc<dyn CommandHandler>>>,
    event_handlers: RwLock<HashMap<EventKind, Vec<Arc<dyn EventHandler>>>>,
    event_tx: mpsc::Sender<DomainEvent>,
    event_rx: Mutex<Option<mpsc::Receiver<DomainEvent>>>,
    shutdown: Shutdown,
}

impl MessageBus {
    pub fn new(shutdown: Shutdown) -> Arc<Self> {
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        Arc::new(Self {
            command_handlers: RwLock::new(HashMap::new()),
            event_handlers: RwLock::new(HashMap::new()),
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
            shutdown,
        })
    }

    /// Register the single handler for a command kind
    pub fn register_command(
        &self,
        kind: CommandKind,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<()> {
        let mut handlers = self.command_handlers.write();
        if handlers.contains_key(&kind) {
            return Err(EngineError::DuplicateHandler(kind));
        }
        handlers.insert(kind, handler);
        Ok(())
    }

    /// Add an event handler; handlers run in registration order
    pub fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.event_handlers.write().entry(kind).or_default().push(handler);
    }

    /// Run a command inline and enqueue its events for the worker
    ///
    /// Returns once the direct handler has committed - cascaded event
    /// handling continues on the worker after this returns.
    pub async fn handle_command(&self, command: Command) -> Result<Vec<DomainEvent>> {
        if self.shutdown.is_cancelled() {
            return Err(EngineError::ShuttingDown);
        }
        let kind = command.kind();
        let handler = self
            .command_handlers
            .read()
            .get(&kind)
            .cloned()
            .ok_or(EngineError::NoHandler(kind))?;
        tracing::debug!(command = %kind, graph_id = %command.graph_id(), "handling command");
        let events = handler.handle(command, &self.shutdown).await?;
        for event in &events {
            if self.event_tx.send(event.clone()).await.is_err() {
                tracing::warn!("bus worker stopped; dropping remaining events");
                break;
            }
        }
        Ok(events)
    }

    /// Start the single worker draining the event queue
    ///
    /// May be called once; later calls return a no-op handle.
    pub fn spawn_worker(self: &Arc<Self>) -> JoinHandle<()> {
        let Some(rx) = self.event_rx.lock().take() else {
            return tokio::spawn(async {});
        };
        let bus = Arc::clone(self);
        tokio::spawn(async move { bus.run_worker(rx).await })
    }

    async fn run_worker(self: Arc<Self>, mut rx: mpsc::Receiver<DomainEvent>) {
        let shutdown = self.shutdown.clone();
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = rx.recv() => match received {
                    Some(event) => event,
                    None => break,
                },
            };
            // Cascaded events stay on a local queue so the worker never
            // blocks on its own bounded channel.
            let mut pending = VecDeque::from([event]);
            while let Some(event) = pending.pop_front() {
                if shutdown.is_cancelled() {
                    return;
                }
                let kind = EventKind::of(&event);
                let handlers: Vec<Arc<dyn EventHandler>> = self
                    .event_handlers
                    .read()
                    .get(&kind)
                    .cloned()
                    .unwrap_or_default();
                for handler in handlers {
                    match handler.handle(&event, &shutdown).await {
                        Ok(follow_ups) => pending.extend(follow_ups),
                        Err(err) => {
                            tracing::error!(
                                event = %kind,
                                graph_id = %event.graph_id(),
                                error = %err,
                                "event handler failed"
                            );
                        }
                    }
                }
            }
        }
        tracing::debug!("bus worker stopped");
    }
}
