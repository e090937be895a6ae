//! Image blob endpoint

use crate::api::{ApiError, AppState};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use pixelgraph_core::ImageId;

/// GET `/api/v1/images/:image_id` - the PNG bytes of one blob
pub async fn get_image(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
) -> Result<Response, ApiError> {
    let image_id: ImageId = image_id
        .parse()
        .map_err(|_| ApiError::bad_request(format!("malformed image id '{image_id}'")))?;
    let bytes = state.blobs.get(image_id).await?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "image/png")],
        bytes,
    )
        .into_response())
}
