use axum::response::{IntoResponse, Response};

use crate::http_server::response::Envelope;

pub async fn not_found_handler() -> Response {
    Envelope::not_found().into_response()
}
