use std::path::PathBuf;

use clap::Args;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use ferry_daemon::http_server::api::client::ApiError;

#[derive(Args, Debug, Clone)]
pub struct Download {
    /// Path of the file on the server, relative to the served root
    pub path: String,

    /// Where to save it (defaults to the file name in the current directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("{0} has no file name; pass --output")]
    NoFileName(String),
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Download {
    type Error = DownloadError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let output = match &self.output {
            Some(path) => path.clone(),
            None => self
                .path
                .rsplit('/')
                .find(|s| !s.is_empty())
                .map(PathBuf::from)
                .ok_or_else(|| DownloadError::NoFileName(self.path.clone()))?,
        };
        let write_err = |source| DownloadError::Write {
            path: output.clone(),
            source,
        };

        let response = ctx.client.download(&self.path).await?;

        // never replace a local file either
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&output)
            .await
            .map_err(write_err)?;

        let copied = async {
            let mut written = 0u64;
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(ApiError::from)?;
                file.write_all(&chunk).await.map_err(write_err)?;
                written += chunk.len() as u64;
            }
            file.flush().await.map_err(write_err)?;
            Ok::<_, DownloadError>(written)
        }
        .await;

        let written = match copied {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&output).await;
                return Err(e);
            }
        };

        Ok(format!(
            "Saved {} to {} ({} bytes)",
            self.path,
            output.display(),
            written
        ))
    }
}
