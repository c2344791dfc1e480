use reqwest::StatusCode;

use crate::http_server::response::Envelope;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("invalid authorization token")]
    InvalidToken,
    #[error("remote URL cannot carry a path: {0}")]
    CannotBeABase(String),
    #[error("HTTP status {0}: {1}")]
    HttpStatus(StatusCode, String),
}

impl ApiError {
    /// The server's JSON envelope, when an error response carried one
    pub fn envelope(&self) -> Option<Envelope> {
        match self {
            ApiError::HttpStatus(_, body) => serde_json::from_str(body).ok(),
            _ => None,
        }
    }
}
