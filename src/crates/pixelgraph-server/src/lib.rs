//! # pixelgraph-server - HTTP/WebSocket gateway
//!
//! The outer surface of pixelgraph: REST endpoints that translate requests
//! into engine commands, a per-graph WebSocket feed of node and layout
//! updates, and the TOML-configured server binary. Everything interesting
//! happens below this crate - handlers here stay one command deep.

pub mod api;
pub mod config;

pub use api::{create_router, AppState};
pub use config::{DatabaseDriver, ServerConfig};
