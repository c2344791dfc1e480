use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use bytes::Bytes;
use futures::Stream;
use tokio_util::io::ReaderStream;

use common::prelude::{TransferAction, TransferError, TransferRecord};

use crate::http_server::client_ip::ClientIp;
use crate::http_server::response::transfer_failure;
use crate::http_server::Config;
use crate::ServiceState;

pub async fn handler(
    State(state): State<ServiceState>,
    Extension(config): Extension<Config>,
    Extension(client_ip): Extension<ClientIp>,
    uri: Uri,
) -> Result<Response, DownloadError> {
    let started = Instant::now();

    // the router only sends us paths under the prefix
    let escaped = config
        .download_path(uri.path())
        .ok_or_else(|| TransferError::InvalidFilename(uri.path().to_string()))?;

    let download = state.transfers().open_download(escaped).await?;

    let mime = mime_guess::from_path(&download.path).first_or_octet_stream();
    let content_type = HeaderValue::from_str(mime.as_ref())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let file_name = download
        .path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("download");
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        file_name.replace(['"', '\\'], "_")
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    let record = TransferRecord {
        action: TransferAction::Downloaded,
        client_ip: client_ip.to_string(),
        path: escaped.to_string(),
        size: 0,
        elapsed: Default::default(),
    };
    let body = Body::from_stream(MeteredStream::new(
        ReaderStream::new(download.file),
        record,
        started,
    ));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_LENGTH, HeaderValue::from(download.size)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// Counts bytes as the body goes out and logs the transfer once the file
/// has been streamed to the end.
struct MeteredStream<S> {
    inner: S,
    record: TransferRecord,
    started: Instant,
    finished: bool,
}

impl<S> MeteredStream<S> {
    fn new(inner: S, record: TransferRecord, started: Instant) -> Self {
        Self {
            inner,
            record,
            started,
            finished: false,
        }
    }
}

impl<S> Stream for MeteredStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>> + Unpin,
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let polled = Pin::new(&mut this.inner).poll_next(cx);
        match &polled {
            Poll::Ready(Some(Ok(chunk))) => this.record.size += chunk.len() as u64,
            Poll::Ready(Some(Err(e))) => {
                tracing::error!(path = %this.record.path, "error streaming download: {}", e);
            }
            Poll::Ready(None) if !this.finished => {
                this.finished = true;
                this.record.elapsed = this.started.elapsed();
                this.record.log();
            }
            _ => {}
        }
        polled
    }
}

impl<S> Drop for MeteredStream<S> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(
                client_ip = %self.record.client_ip,
                path = %self.record.path,
                sent = self.record.size,
                "download aborted before completion"
            );
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl IntoResponse for DownloadError {
    fn into_response(self) -> Response {
        match self {
            DownloadError::Transfer(err) => transfer_failure(err).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use futures::StreamExt;

    fn record() -> TransferRecord {
        TransferRecord {
            action: TransferAction::Downloaded,
            client_ip: "10.0.0.5".to_string(),
            path: "a.txt".to_string(),
            size: 0,
            elapsed: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_metered_stream_counts_bytes() {
        let chunks = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"ab")),
            Ok(Bytes::from_static(b"cde")),
        ]);
        let mut stream = MeteredStream::new(chunks, record(), Instant::now());

        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }

        assert_eq!(collected, b"abcde");
        assert_eq!(stream.record.size, 5);
        assert!(stream.finished);
    }

    #[tokio::test]
    async fn test_metered_stream_not_finished_when_dropped_early() {
        let chunks = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"ab")),
            Ok(Bytes::from_static(b"cde")),
        ]);
        let mut stream = MeteredStream::new(chunks, record(), Instant::now());

        stream.next().await.unwrap().unwrap();
        assert_eq!(stream.record.size, 2);
        assert!(!stream.finished);
    }
}
