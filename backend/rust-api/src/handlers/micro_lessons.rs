use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use super::{api_error, content_error, parse_object_id, ApiError};
use crate::models::attempt::ProgressQuery;
use crate::services::AppState;

/// Whether the learner may move past the micro-lesson, and what blocks them.
pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    Path(micro_lesson_id): Path<String>,
    Query(query): Query<ProgressQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let micro_lesson_id = parse_object_id(&micro_lesson_id)?;
    query
        .validate()
        .map_err(|e| api_error(StatusCode::UNPROCESSABLE_ENTITY, format!("Validation error: {}", e)))?;

    let report = state
        .attempts()
        .progress(&query.learner_id, &micro_lesson_id)
        .await
        .map_err(content_error)?;
    Ok(Json(report))
}
