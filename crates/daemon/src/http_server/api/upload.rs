use std::time::Instant;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use reqwest::{Client, RequestBuilder, Url};

use common::prelude::{TransferAction, TransferError, TransferRecord};
use common::transfer::SpooledUpload;

use crate::http_server::api::client::ApiRequest;
use crate::http_server::client_ip::ClientIp;
use crate::http_server::response::{transfer_failure, Envelope, Status};
use crate::ServiceState;

pub const FILE_FIELD: &str = "file";
pub const TO_FIELD: &str = "to";

pub async fn handler(
    State(state): State<ServiceState>,
    Extension(client_ip): Extension<ClientIp>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, UploadError> {
    let started = Instant::now();
    let mut multipart = multipart.map_err(|e| UploadError::Multipart(e.body_text()))?;
    let transfers = state.transfers();

    let mut to: Option<String> = None;
    let mut staged: Option<(String, SpooledUpload)> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::warn!("Multipart parsing error: {}", e);
        UploadError::Multipart(e.to_string())
    })? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            TO_FIELD => {
                let text = field.text().await.map_err(|e| {
                    tracing::warn!("Error reading {} field: {}", TO_FIELD, e);
                    UploadError::Multipart(e.to_string())
                })?;
                // a file that already arrived gets checked against the
                //  destination before we bother reading further
                if let Some((filename, _)) = &staged {
                    transfers.upload_destination(&text, filename)?;
                }
                to = Some(text);
            }
            FILE_FIELD => {
                if staged.is_some() {
                    tracing::warn!("Ignoring additional {} field", FILE_FIELD);
                    continue;
                }
                let filename = field.file_name().unwrap_or_default().to_string();
                if let Some(to) = &to {
                    transfers.upload_destination(to, &filename)?;
                }

                tracing::debug!(client_ip = %client_ip, "Receiving file: {}", filename);
                let spooled = transfers.spool(field).await?;
                staged = Some((filename, spooled));
            }
            _ => {
                tracing::warn!("Ignoring unknown field: {}", field_name);
            }
        }
    }

    let to = to.ok_or(TransferError::MissingField(TO_FIELD))?;
    let (filename, spooled) = staged.ok_or(TransferError::MissingField(FILE_FIELD))?;

    let destination = transfers.upload_destination(&to, &filename)?;
    let uploaded = match transfers.commit(spooled, &destination).await {
        Ok(uploaded) => uploaded,
        Err(err) => {
            if let TransferError::Conflict { path, .. } = &err {
                tracing::info!(client_ip = %client_ip, path = ?path, "upload rejected, file exists");
            }
            return Err(err.into());
        }
    };

    let record = TransferRecord {
        action: TransferAction::Uploaded,
        client_ip: client_ip.to_string(),
        path: uploaded
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(filename),
        size: uploaded.size,
        elapsed: started.elapsed(),
    };
    let message = record.log();

    Ok(Envelope::uploaded(message, uploaded.digest, uploaded.size).into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Multipart error: {0}")]
    Multipart(String),
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        match self {
            UploadError::Multipart(msg) => {
                Envelope::new(Status::BadRequest, format!("Bad request: {}", msg)).into_response()
            }
            UploadError::Transfer(err) => transfer_failure(err).into_response(),
        }
    }
}

/// Client side of an upload: a file body sent as the `file` part.
#[derive(Debug)]
pub struct UploadRequest {
    pub upload_prefix: String,
    pub to: String,
    pub filename: String,
    pub length: u64,
    pub body: reqwest::Body,
}

impl ApiRequest for UploadRequest {
    type Response = Envelope;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        let mut url = base_url.clone();
        url.set_path(&self.upload_prefix);

        let part = reqwest::multipart::Part::stream_with_length(self.body, self.length)
            .file_name(self.filename);
        let form = reqwest::multipart::Form::new()
            .text(TO_FIELD, self.to)
            .part(FILE_FIELD, part);

        client.post(url).multipart(form)
    }
}
