//! Engine error types

use crate::message::CommandKind;
use crate::transforms::TransformError;
use pixelgraph_core::{GraphError, NodeId};
use pixelgraph_store::StoreError;
use thiserror::Error;

/// Convenience result type using [`EngineError`]
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no handler registered for command '{0}'")]
    NoHandler(CommandKind),

    #[error("a handler is already registered for command '{0}'")]
    DuplicateHandler(CommandKind),

    #[error(transparent)]
    Domain(#[from] GraphError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("node {node} is missing required input '{input}'")]
    MissingInput { node: NodeId, input: String },

    #[error("engine is shutting down")]
    ShuttingDown,
}
