//! WebSocket endpoint: one topic per graph
//!
//! Upgrades the connection, subscribes to the graph's notifier feed, and
//! forwards each notification as a JSON text frame until either side goes
//! away. Slow clients are dropped by the notifier itself, not here.

use crate::api::{ApiError, AppState};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use pixelgraph_core::GraphId;
use pixelgraph_store::StoreError;

/// GET `/api/v1/graphs/:graph_id/updates`
pub async fn graph_updates(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(graph_id): Path<String>,
) -> Result<Response, ApiError> {
    let graph_id: GraphId = graph_id
        .parse()
        .map_err(|_| ApiError::bad_request(format!("malformed graph id '{graph_id}'")))?;
    // Reject subscriptions to graphs that do not exist.
    if state.backend.load_graph(graph_id).await?.is_none() {
        return Err(StoreError::GraphNotFound(graph_id).into());
    }
    Ok(ws.on_upgrade(move |socket| forward_updates(socket, state, graph_id)))
}

async fn forward_updates(mut socket: WebSocket, state: AppState, graph_id: GraphId) {
    let notifier = state.engine.notifier();
    let (subscription, mut updates) = notifier.subscribe(graph_id);
    tracing::debug!(graph_id = %graph_id, "websocket subscriber attached");

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(notification) => {
                    let Ok(text) = serde_json::to_string(&notification) else {
                        continue;
                    };
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                // Notifier closed (engine shutdown or we were dropped as slow).
                None => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }

    notifier.unsubscribe(graph_id, subscription);
    tracing::debug!(graph_id = %graph_id, "websocket subscriber detached");
}
