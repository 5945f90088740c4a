use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use super::{api_error, content_error, parse_object_id, ApiError};
use crate::extractors::AppJson;
use crate::models::attempt::SubmitAttemptRequest;
use crate::models::exercise::ExerciseView;
use crate::services::AppState;

/// Learner-facing exercise: prompt and options, never the answer.
pub async fn get_exercise(
    State(state): State<Arc<AppState>>,
    Path(exercise_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let exercise_id = parse_object_id(&exercise_id)?;
    let exercise = state
        .content()
        .get_exercise(&exercise_id)
        .await
        .map_err(content_error)?;

    let spec = exercise.spec().map_err(|e| {
        tracing::error!("Stored exercise {} has an unusable spec: {}", exercise_id, e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Exercise is misconfigured")
    })?;
    Ok(Json(ExerciseView::from_parts(&exercise, &spec)))
}

pub async fn submit_attempt(
    State(state): State<Arc<AppState>>,
    Path(exercise_id): Path<String>,
    AppJson(req): AppJson<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let exercise_id = parse_object_id(&exercise_id)?;
    tracing::info!(
        "Submitting {} attempt for exercise {} by {}",
        req.attempt.kind(),
        exercise_id,
        req.learner_id
    );

    let feedback = state
        .attempts()
        .submit(&exercise_id, req)
        .await
        .map_err(content_error)?;
    Ok((StatusCode::OK, Json(feedback)))
}
