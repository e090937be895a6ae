//! Graph, node, edge, layout, and viewport endpoints

use crate::api::{ApiError, AppState};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use pixelgraph_core::{GraphId, ImageId, NodeConfig, NodeId, NodePosition, NodeType};
use pixelgraph_engine::Command;
use pixelgraph_store::StoreError;
use serde::Deserialize;
use serde_json::{json, Value};

type ApiResult = Result<(StatusCode, Json<Value>), ApiError>;

fn parse_graph_id(raw: &str) -> Result<GraphId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("malformed graph id '{raw}'")))
}

fn parse_node_id(raw: &str) -> Result<NodeId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("malformed node id '{raw}'")))
}

#[derive(Deserialize)]
pub struct CreateGraphRequest {
    pub name: String,
}

pub async fn create_graph(
    State(state): State<AppState>,
    Json(request): Json<CreateGraphRequest>,
) -> ApiResult {
    let graph_id = GraphId::new();
    state
        .engine
        .handle_command(Command::CreateGraph {
            graph_id,
            name: request.name,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"graph_id": graph_id.to_string()})),
    ))
}

pub async fn get_graph(State(state): State<AppState>, Path(graph_id): Path<String>) -> ApiResult {
    let graph_id = parse_graph_id(&graph_id)?;
    let graph = state
        .backend
        .load_graph(graph_id)
        .await?
        .ok_or(StoreError::GraphNotFound(graph_id))?;
    Ok((StatusCode::OK, Json(serde_json::to_value(&graph).map_err(StoreError::from)?)))
}

#[derive(Deserialize)]
pub struct AddNodeRequest {
    pub node_type: NodeType,
    pub name: String,
}

pub async fn add_node(
    State(state): State<AppState>,
    Path(graph_id): Path<String>,
    Json(request): Json<AddNodeRequest>,
) -> ApiResult {
    let graph_id = parse_graph_id(&graph_id)?;
    let node_id = NodeId::new();
    state
        .engine
        .handle_command(Command::AddNode {
            graph_id,
            node_id,
            node_type: request.node_type,
            name: request.name,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"node_id": node_id.to_string()})),
    ))
}

pub async fn remove_node(
    State(state): State<AppState>,
    Path((graph_id, node_id)): Path<(String, String)>,
) -> ApiResult {
    let graph_id = parse_graph_id(&graph_id)?;
    let node_id = parse_node_id(&node_id)?;
    state
        .engine
        .handle_command(Command::RemoveNode { graph_id, node_id })
        .await?;
    Ok((StatusCode::OK, Json(json!({"status": "removed"}))))
}

#[derive(Deserialize)]
pub struct SetNameRequest {
    pub name: String,
}

pub async fn set_node_name(
    State(state): State<AppState>,
    Path((graph_id, node_id)): Path<(String, String)>,
    Json(request): Json<SetNameRequest>,
) -> ApiResult {
    let graph_id = parse_graph_id(&graph_id)?;
    let node_id = parse_node_id(&node_id)?;
    state
        .engine
        .handle_command(Command::SetNodeName {
            graph_id,
            node_id,
            name: request.name,
        })
        .await?;
    Ok((StatusCode::OK, Json(json!({"status": "renamed"}))))
}

pub async fn set_node_config(
    State(state): State<AppState>,
    Path((graph_id, node_id)): Path<(String, String)>,
    Json(config): Json<NodeConfig>,
) -> ApiResult {
    let graph_id = parse_graph_id(&graph_id)?;
    let node_id = parse_node_id(&node_id)?;
    state
        .engine
        .handle_command(Command::SetNodeConfig {
            graph_id,
            node_id,
            config,
        })
        .await?;
    Ok((StatusCode::OK, Json(json!({"status": "configured"}))))
}

/// Upload PNG bytes and set them as a node output (the input-node upload
/// path); the manual call leaves the version to the handler
pub async fn upload_output_image(
    State(state): State<AppState>,
    Path((graph_id, node_id, output)): Path<(String, String, String)>,
    body: Bytes,
) -> ApiResult {
    let graph_id = parse_graph_id(&graph_id)?;
    let node_id = parse_node_id(&node_id)?;
    if body.is_empty() {
        return Err(ApiError::bad_request("image body is empty"));
    }
    let image_id = ImageId::new();
    state.blobs.save(image_id, body.to_vec()).await?;
    state
        .engine
        .handle_command(Command::SetNodeOutputImage {
            graph_id,
            node_id,
            output,
            image_id,
            expected_version: None,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"image_id": image_id.to_string()})),
    ))
}

#[derive(Deserialize)]
pub struct EdgeRequest {
    pub from: String,
    pub output: String,
    pub to: String,
    pub input: String,
}

impl EdgeRequest {
    fn parse(&self) -> Result<(NodeId, NodeId), ApiError> {
        Ok((parse_node_id(&self.from)?, parse_node_id(&self.to)?))
    }
}

pub async fn connect(
    State(state): State<AppState>,
    Path(graph_id): Path<String>,
    Json(request): Json<EdgeRequest>,
) -> ApiResult {
    let graph_id = parse_graph_id(&graph_id)?;
    let (from, to) = request.parse()?;
    state
        .engine
        .handle_command(Command::ConnectNodes {
            graph_id,
            from,
            output: request.output,
            to,
            input: request.input,
        })
        .await?;
    Ok((StatusCode::OK, Json(json!({"status": "connected"}))))
}

pub async fn disconnect(
    State(state): State<AppState>,
    Path(graph_id): Path<String>,
    Json(request): Json<EdgeRequest>,
) -> ApiResult {
    let graph_id = parse_graph_id(&graph_id)?;
    let (from, to) = request.parse()?;
    state
        .engine
        .handle_command(Command::DisconnectNodes {
            graph_id,
            from,
            output: request.output,
            to,
            input: request.input,
        })
        .await?;
    Ok((StatusCode::OK, Json(json!({"status": "disconnected"}))))
}

pub async fn get_layout(State(state): State<AppState>, Path(graph_id): Path<String>) -> ApiResult {
    let graph_id = parse_graph_id(&graph_id)?;
    let layout = state
        .backend
        .load_layout(graph_id)
        .await?
        .ok_or(StoreError::LayoutNotFound(graph_id))?;
    Ok((
        StatusCode::OK,
        Json(serde_json::to_value(&layout).map_err(StoreError::from)?),
    ))
}

#[derive(Deserialize)]
pub struct SetLayoutRequest {
    pub positions: Vec<NodePosition>,
}

pub async fn set_layout(
    State(state): State<AppState>,
    Path(graph_id): Path<String>,
    Json(request): Json<SetLayoutRequest>,
) -> ApiResult {
    let graph_id = parse_graph_id(&graph_id)?;
    state
        .engine
        .handle_command(Command::SetLayout {
            graph_id,
            positions: request.positions,
        })
        .await?;
    Ok((StatusCode::OK, Json(json!({"status": "updated"}))))
}

pub async fn get_viewport(
    State(state): State<AppState>,
    Path(graph_id): Path<String>,
) -> ApiResult {
    let graph_id = parse_graph_id(&graph_id)?;
    let viewport = state
        .backend
        .load_viewport(graph_id)
        .await?
        .ok_or(StoreError::ViewportNotFound(graph_id))?;
    Ok((
        StatusCode::OK,
        Json(serde_json::to_value(&viewport).map_err(StoreError::from)?),
    ))
}

#[derive(Deserialize)]
pub struct SetViewportRequest {
    pub zoom: f64,
    pub pan_x: f64,
    pub pan_y: f64,
}

pub async fn set_viewport(
    State(state): State<AppState>,
    Path(graph_id): Path<String>,
    Json(request): Json<SetViewportRequest>,
) -> ApiResult {
    let graph_id = parse_graph_id(&graph_id)?;
    state
        .engine
        .handle_command(Command::SetViewport {
            graph_id,
            zoom: request.zoom,
            pan_x: request.pan_x,
            pan_y: request.pan_y,
        })
        .await?;
    Ok((StatusCode::OK, Json(json!({"status": "updated"}))))
}
