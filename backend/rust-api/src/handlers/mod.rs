use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use mongodb::bson::oid::ObjectId;
use serde_json::json;
use std::sync::Arc;

use crate::error::ContentError;
use crate::metrics;
use crate::services::AppState;

pub mod exercises;
pub mod micro_lessons;
pub mod modules;
pub mod quizzes;

/// JSON error body shared by every API handler.
pub type ApiError = (StatusCode, Json<serde_json::Value>);

pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(json!({
            "message": message.into(),
            "status": status.as_u16()
        })),
    )
}

pub(crate) fn content_error(err: ContentError) -> ApiError {
    let status = match &err {
        ContentError::NotFound { .. } => StatusCode::NOT_FOUND,
        ContentError::DanglingReference { .. }
        | ContentError::InvalidExerciseSpec { .. }
        | ContentError::InvalidQuiz { .. }
        | ContentError::InvalidQuestion { .. }
        | ContentError::InvalidRecord { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ContentError::SequenceConflict { .. } | ContentError::Conflict { .. } => {
            StatusCode::CONFLICT
        }
        ContentError::InvalidKey { .. } | ContentError::Malformed { .. } | ContentError::Store(_) => {
            tracing::error!("Content store failure: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    api_error(status, err.to_string())
}

pub(crate) fn parse_object_id(raw: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(raw)
        .map_err(|_| api_error(StatusCode::BAD_REQUEST, format!("Invalid id: {}", raw)))
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut dependencies = serde_json::Map::new();

    let store_health = check_store(&state).await;
    let store_ok = store_health.get("status").and_then(|v| v.as_str()) == Some("healthy");
    dependencies.insert("mongodb".to_string(), json!(store_health));

    let redis_health = check_redis(&state).await;
    let redis_ok = matches!(
        redis_health.get("status").and_then(|v| v.as_str()),
        Some("healthy") | Some("disabled")
    );
    dependencies.insert("redis".to_string(), json!(redis_health));

    let (status_code, status) = if store_ok && redis_ok {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        Json(json!({
            "status": status,
            "service": "courseware-api",
            "version": env!("CARGO_PKG_VERSION"),
            "dependencies": dependencies
        })),
    )
}

async fn check_store(state: &AppState) -> serde_json::Map<String, serde_json::Value> {
    let mut result = serde_json::Map::new();

    match tokio::time::timeout(std::time::Duration::from_secs(1), state.store.ping()).await {
        Ok(Ok(())) => {
            result.insert("status".to_string(), json!("healthy"));
            result.insert("message".to_string(), json!("Content store reachable"));
        }
        Ok(Err(e)) => {
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert("error".to_string(), json!(e.to_string()));
        }
        Err(_) => {
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert("error".to_string(), json!("Content store timeout after 1s"));
        }
    }

    result
}

async fn check_redis(state: &AppState) -> serde_json::Map<String, serde_json::Value> {
    let mut result = serde_json::Map::new();

    let Some(redis) = &state.redis else {
        result.insert("status".to_string(), json!("disabled"));
        return result;
    };

    let mut conn = redis.clone();
    match tokio::time::timeout(
        std::time::Duration::from_millis(500),
        redis::cmd("PING").query_async::<String>(&mut conn),
    )
    .await
    {
        Ok(Ok(_)) => {
            result.insert("status".to_string(), json!("healthy"));
            result.insert("message".to_string(), json!("Redis connection successful"));
        }
        Ok(Err(e)) => {
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert("error".to_string(), json!(format!("Redis error: {}", e)));
        }
        Err(_) => {
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert("error".to_string(), json!("Redis timeout after 500ms"));
        }
    }

    result
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

/// HTTP Basic auth in front of `/metrics`, checked against `metrics_auth`.
pub async fn metrics_auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let encoded = auth_header
        .strip_prefix("Basic ")
        .ok_or(StatusCode::UNAUTHORIZED)?;
    let decoded = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    let credentials = String::from_utf8(decoded).map_err(|_| StatusCode::UNAUTHORIZED)?;

    if credentials != state.config.metrics_auth {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EntityKind;

    #[test]
    fn content_errors_map_to_statuses() {
        let not_found = ContentError::NotFound {
            kind: EntityKind::Exercise,
            key: "x".to_string(),
        };
        assert_eq!(content_error(not_found).0, StatusCode::NOT_FOUND);

        let conflict = ContentError::SequenceConflict {
            module: "Docker".to_string(),
            sequence_order: 1,
        };
        assert_eq!(content_error(conflict).0, StatusCode::CONFLICT);

        let store = ContentError::Store("down".to_string());
        assert_eq!(content_error(store).0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn object_ids_are_validated() {
        assert!(parse_object_id("65f1c2a9e4b0a1b2c3d4e5f6").is_ok());
        let (status, _) = parse_object_id("not-an-id").unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
