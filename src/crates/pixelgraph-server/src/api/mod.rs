//! HTTP API
//!
//! A thin request-to-command adapter: handlers parse the request, submit
//! one command to the engine, and map the result. Reads go straight to the
//! backend. No domain logic lives here.

pub mod graphs;
pub mod images;
pub mod ws;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use pixelgraph_core::GraphError;
use pixelgraph_engine::{Engine, EngineError};
use pixelgraph_store::{Backend, BlobStore, StoreError};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub backend: Arc<dyn Backend>,
    pub blobs: Arc<dyn BlobStore>,
}

/// Build the full router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/graphs", post(graphs::create_graph))
        .route("/api/v1/graphs/:graph_id", get(graphs::get_graph))
        .route("/api/v1/graphs/:graph_id/nodes", post(graphs::add_node))
        .route(
            "/api/v1/graphs/:graph_id/nodes/:node_id",
            axum::routing::delete(graphs::remove_node),
        )
        .route(
            "/api/v1/graphs/:graph_id/nodes/:node_id/name",
            put(graphs::set_node_name),
        )
        .route(
            "/api/v1/graphs/:graph_id/nodes/:node_id/config",
            put(graphs::set_node_config),
        )
        .route(
            "/api/v1/graphs/:graph_id/nodes/:node_id/outputs/:output/image",
            post(graphs::upload_output_image),
        )
        .route(
            "/api/v1/graphs/:graph_id/connections",
            post(graphs::connect).delete(graphs::disconnect),
        )
        .route(
            "/api/v1/graphs/:graph_id/layout",
            get(graphs::get_layout).put(graphs::set_layout),
        )
        .route(
            "/api/v1/graphs/:graph_id/viewport",
            get(graphs::get_viewport).put(graphs::set_viewport),
        )
        .route("/api/v1/graphs/:graph_id/updates", get(ws::graph_updates))
        .route("/api/v1/images/:image_id", get(images::get_image))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

/// Error envelope mapped onto HTTP status codes
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({"error": self.message}))).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::Domain(_) => StatusCode::BAD_REQUEST,
            EngineError::Store(store) => store_status(store),
            EngineError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self {
            status: store_status(&err),
            message: err.to_string(),
        }
    }
}

impl From<GraphError> for ApiError {
    fn from(err: GraphError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: err.to_string(),
        }
    }
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::GraphNotFound(_)
        | StoreError::LayoutNotFound(_)
        | StoreError::ViewportNotFound(_)
        | StoreError::ImageNotFound(_) => StatusCode::NOT_FOUND,
        StoreError::AlreadyExists(_) | StoreError::VersionConflict { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
