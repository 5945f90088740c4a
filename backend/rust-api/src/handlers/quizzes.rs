use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use super::{content_error, parse_object_id, ApiError};
use crate::extractors::AppJson;
use crate::models::quiz::QuizSubmissionRequest;
use crate::services::AppState;

pub async fn submit_quiz(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
    AppJson(req): AppJson<QuizSubmissionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let quiz_id = parse_object_id(&quiz_id)?;
    tracing::info!("Scoring quiz {} for {}", quiz_id, req.learner_id);

    let score = state
        .attempts()
        .submit_quiz(&quiz_id, &req)
        .await
        .map_err(content_error)?;
    Ok(Json(score))
}
