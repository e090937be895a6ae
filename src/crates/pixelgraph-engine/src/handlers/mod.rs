//! Command and event handlers wired into the bus

pub mod commands;
pub mod events;

pub use commands::GraphCommandHandler;
pub use events::{
    BlobCleanupHandler, GenerationHandler, LayoutNotificationHandler, NotificationHandler,
    PropagationHandler,
};
