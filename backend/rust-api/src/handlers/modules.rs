use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use super::{content_error, parse_object_id, ApiError};
use crate::services::AppState;

/// Ordered placements of a module, each with its target's title.
pub async fn get_module_items(
    State(state): State<Arc<AppState>>,
    Path(module_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let module_id = parse_object_id(&module_id)?;
    tracing::debug!("Listing items of module {}", module_id);

    let outline = state
        .content()
        .module_outline(&module_id)
        .await
        .map_err(content_error)?;
    Ok(Json(outline))
}
