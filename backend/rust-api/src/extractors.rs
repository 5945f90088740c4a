use axum::{
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use validator::Validate;

/// JSON body extractor whose rejections are JSON too, in the same shape as
/// the API's other errors.
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: serde::de::DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let value = match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => value,
            Err(rejection) => {
                let message = format!("Failed to parse JSON request body: {}", rejection);
                tracing::warn!("{}", message);
                return Err(reject(StatusCode::BAD_REQUEST, message));
            }
        };

        if let Err(errors) = value.validate() {
            let message = format!("Validation error: {}", errors);
            tracing::warn!("{}", message);
            return Err(reject(StatusCode::UNPROCESSABLE_ENTITY, message));
        }
        Ok(AppJson(value))
    }
}

fn reject(status: StatusCode, message: String) -> Response {
    let body = json!({
        "message": message,
        "status": status.as_u16()
    });
    (status, Json(body)).into_response()
}
