use axum::response::{IntoResponse, Response};
use axum::Json;

pub async fn handler() -> Response {
    Json(serde_json::json!({"status": "ok"})).into_response()
}
