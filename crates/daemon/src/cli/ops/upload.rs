use std::path::PathBuf;

use clap::Args;
use tokio_util::io::ReaderStream;

use ferry_daemon::http_server::api::client::ApiError;
use ferry_daemon::http_server::api::upload::UploadRequest;
use ferry_daemon::http_server::response::Status;

#[derive(Args, Debug, Clone)]
pub struct Upload {
    /// Local file to upload
    pub file: PathBuf,

    /// Destination directory on the server, relative to the served root
    #[arg(long)]
    pub to: String,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} has no file name")]
    NoFileName(PathBuf),
    #[error("file already exists on the server\n  existing: {existing}\n  uploaded: {uploaded}")]
    Conflict { existing: String, uploaded: String },
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Upload {
    type Error = UploadError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let read_err = |source| UploadError::Read {
            path: self.file.clone(),
            source,
        };

        let filename = self
            .file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| UploadError::NoFileName(self.file.clone()))?
            .to_string();
        let file = tokio::fs::File::open(&self.file).await.map_err(read_err)?;
        let length = file.metadata().await.map_err(read_err)?.len();

        let request = UploadRequest {
            upload_prefix: ctx.upload_prefix.clone(),
            to: self.to.clone(),
            filename,
            length,
            body: reqwest::Body::wrap_stream(ReaderStream::new(file)),
        };

        let mut client = ctx.client.clone();
        match client.call(request).await {
            Ok(envelope) => Ok(format!(
                "{}\nsha256: {}",
                envelope.message,
                envelope
                    .uploaded_file_hash
                    .map(|d| d.to_hex())
                    .unwrap_or_default()
            )),
            Err(err) => match err.envelope() {
                Some(envelope) if envelope.status == Status::Conflict => {
                    Err(UploadError::Conflict {
                        existing: digest_or_unknown(envelope.existing_file_hash),
                        uploaded: digest_or_unknown(envelope.uploaded_file_hash),
                    })
                }
                _ => Err(err.into()),
            },
        }
    }
}

fn digest_or_unknown(digest: Option<common::prelude::FileDigest>) -> String {
    digest
        .map(|d| d.to_hex())
        .unwrap_or_else(|| "unknown".to_string())
}
