//! The JSON body every non-download response carries.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::prelude::{FileDigest, TransferError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    InvalidFilename,
    InvalidPath,
    MissingField,
    BadRequest,
    Unauthorized,
    NotFound,
    Conflict,
    InternalError,
}

impl Status {
    pub fn http_status(&self) -> StatusCode {
        match self {
            Status::Ok => StatusCode::OK,
            Status::InvalidFilename
            | Status::InvalidPath
            | Status::MissingField
            | Status::BadRequest => StatusCode::BAD_REQUEST,
            Status::Unauthorized => StatusCode::FORBIDDEN,
            Status::NotFound => StatusCode::NOT_FOUND,
            Status::Conflict => StatusCode::CONFLICT,
            Status::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub status: Status,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_file_hash: Option<FileDigest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_file_hash: Option<FileDigest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl Envelope {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            existing_file_hash: None,
            uploaded_file_hash: None,
            size: None,
        }
    }

    pub fn uploaded(message: String, digest: FileDigest, size: u64) -> Self {
        Self {
            uploaded_file_hash: Some(digest),
            size: Some(size),
            ..Self::new(Status::Ok, message)
        }
    }

    pub fn conflict(existing: FileDigest, uploaded: FileDigest) -> Self {
        Self {
            existing_file_hash: Some(existing),
            uploaded_file_hash: Some(uploaded),
            ..Self::new(Status::Conflict, "file already exists")
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(Status::Unauthorized, "unauthorized")
    }

    pub fn not_found() -> Self {
        Self::new(Status::NotFound, "not found")
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        (self.status.http_status(), Json(self)).into_response()
    }
}

/// Map a transfer failure onto the envelope. Internal details stay in the
/// logs; clients get a generic message.
pub fn transfer_failure(err: TransferError) -> Envelope {
    match err {
        TransferError::InvalidFilename(_) => Envelope::new(Status::InvalidFilename, "invalid filename"),
        TransferError::InvalidPath(_) => Envelope::new(Status::InvalidPath, "invalid path"),
        TransferError::MissingField(field) => {
            Envelope::new(Status::MissingField, format!("{} is not found", field))
        }
        TransferError::NotFound(_) => Envelope::new(Status::NotFound, "file not found"),
        TransferError::Conflict {
            existing, uploaded, ..
        } => Envelope::conflict(existing, uploaded),
        TransferError::DestinationIsDirectory(_) => {
            Envelope::new(Status::Conflict, "a directory already exists at the destination")
        }
        TransferError::Interrupted(reason) => {
            tracing::warn!("upload interrupted: {}", reason);
            Envelope::new(Status::BadRequest, "upload interrupted")
        }
        TransferError::Io { context, source } => {
            tracing::error!("{}: {}", context, source);
            Envelope::new(Status::InternalError, context)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    #[test]
    fn test_conflict_body_shape() {
        let body = serde_json::to_value(Envelope::conflict(
            FileDigest::of(b"abc"),
            FileDigest::of(b"xyz"),
        ))
        .unwrap();

        assert_eq!(body["status"], "conflict");
        assert_eq!(body["message"], "file already exists");
        assert_eq!(body["existingFileHash"], FileDigest::of(b"abc").to_hex());
        assert_eq!(body["uploadedFileHash"], FileDigest::of(b"xyz").to_hex());
        assert!(body.get("size").is_none());
    }

    #[test]
    fn test_error_mapping() {
        let cases = [
            (TransferError::InvalidFilename("%zz".into()), StatusCode::BAD_REQUEST),
            (TransferError::MissingField("to"), StatusCode::BAD_REQUEST),
            (TransferError::NotFound(PathBuf::from("/x")), StatusCode::NOT_FOUND),
            (
                TransferError::DestinationIsDirectory(PathBuf::from("/x")),
                StatusCode::CONFLICT,
            ),
            (
                TransferError::Io {
                    context: "error saving uploaded file",
                    source: std::io::Error::other("disk full"),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let envelope = transfer_failure(err);
            assert_eq!(envelope.status.http_status(), expected);
            assert!(!envelope.message.contains("disk full"));
        }
    }

    #[test]
    fn test_missing_field_message() {
        let envelope = transfer_failure(TransferError::MissingField("to"));
        assert_eq!(envelope.status, Status::MissingField);
        assert_eq!(envelope.message, "to is not found");
    }
}
