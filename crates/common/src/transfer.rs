//! Uploads and downloads under the served root.
//!
//! Downloads resolve, stat and open a file for the HTTP layer to stream.
//! Uploads are spooled into a temporary file inside the root while they are
//! digested, then committed with an exclusive rename so an existing file is
//! never replaced and a half-written file never shows up at its final path.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use crate::hash::{digest_file, ContentHasher, FileDigest};
use crate::path::{PathError, PathResolver};

/// Prefix for upload spool files created inside the root
pub const SPOOL_PREFIX: &str = ".ferry-upload-";

const MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("invalid filename: {0}")]
    InvalidFilename(String),
    #[error("invalid path: {0}")]
    InvalidPath(PathError),
    #[error("missing form field: {0}")]
    MissingField(&'static str),
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("file already exists: {}", .path.display())]
    Conflict {
        path: PathBuf,
        existing: FileDigest,
        uploaded: FileDigest,
    },
    #[error("destination is a directory: {}", .0.display())]
    DestinationIsDirectory(PathBuf),
    #[error("upload stream interrupted: {0}")]
    Interrupted(String),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
}

impl TransferError {
    fn io(context: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Io { context, source }
    }
}

impl From<PathError> for TransferError {
    fn from(err: PathError) -> Self {
        match err {
            PathError::Malformed(raw) => TransferError::InvalidFilename(raw),
            other => TransferError::InvalidPath(other),
        }
    }
}

/// An opened download target.
#[derive(Debug)]
pub struct Download {
    pub path: PathBuf,
    pub size: u64,
    pub file: tokio::fs::File,
}

/// Upload content parked in a temporary file inside the root.
///
/// Dropping it removes the temporary file.
#[derive(Debug)]
pub struct SpooledUpload {
    temp: NamedTempFile,
    size: u64,
    digest: FileDigest,
}

/// A committed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uploaded {
    pub path: PathBuf,
    pub size: u64,
    pub digest: FileDigest,
}

#[derive(Debug, Clone)]
pub struct TransferService {
    resolver: PathResolver,
}

impl TransferService {
    pub fn new(resolver: PathResolver) -> Self {
        Self { resolver }
    }

    pub fn root(&self) -> &Path {
        self.resolver.root()
    }

    /// Resolve, stat and open the file a client asked for.
    ///
    /// Directories are reported as not found; nothing here lists them. So
    /// are upload spool files, finished or not.
    pub async fn open_download(&self, escaped_path: &str) -> Result<Download, TransferError> {
        let path = self.resolver.resolve_escaped(escaped_path)?;
        if is_spool_file(&path) {
            return Err(TransferError::NotFound(path));
        }

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TransferError::NotFound(path))
            }
            Err(e) => return Err(TransferError::io("error getting file info")(e)),
        };
        if !metadata.is_file() {
            return Err(TransferError::NotFound(path));
        }

        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TransferError::NotFound(path))
            }
            Err(e) => return Err(TransferError::io("error opening file")(e)),
        };

        Ok(Download {
            path,
            size: metadata.len(),
            file,
        })
    }

    /// Where an upload of `filename` into the `to` directory would land.
    ///
    /// Only the final component of the declared filename is used, exactly
    /// as declared.
    pub fn upload_destination(&self, to: &str, filename: &str) -> Result<PathBuf, TransferError> {
        let name = base_name(filename)
            .ok_or_else(|| TransferError::InvalidFilename(filename.to_string()))?;
        Ok(self.resolver.resolve_parts(&[to, name])?)
    }

    /// Stream upload content into a temporary file inside the root,
    /// digesting it on the way.
    pub async fn spool<S, E>(&self, stream: S) -> Result<SpooledUpload, TransferError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: fmt::Display,
    {
        let root = self.root().to_path_buf();
        let temp = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(SPOOL_PREFIX)
                .tempfile_in(root)
        })
        .await
        .map_err(|e| TransferError::io("spool task failed")(io::Error::other(e)))?
        .map_err(TransferError::io("error creating spool file"))?;

        let handle = temp
            .as_file()
            .try_clone()
            .map_err(TransferError::io("error opening spool file"))?;
        let mut file = tokio::fs::File::from_std(handle);

        futures::pin_mut!(stream);
        let mut hasher = ContentHasher::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| TransferError::Interrupted(e.to_string()))?;
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(TransferError::io("error writing spool file"))?;
        }
        file.flush()
            .await
            .map_err(TransferError::io("error writing spool file"))?;
        file.sync_all()
            .await
            .map_err(TransferError::io("error syncing spool file"))?;

        let size = hasher.len();
        tracing::debug!(spool = ?temp.path(), size, "upload spooled");

        Ok(SpooledUpload {
            temp,
            size,
            digest: hasher.finalize(),
        })
    }

    /// Move spooled content to `destination`, refusing to replace anything.
    ///
    /// When the destination exists, whether it was there before the check or
    /// was created by a concurrent upload in between, the result is a
    /// [`TransferError::Conflict`] carrying both digests.
    pub async fn commit(
        &self,
        spooled: SpooledUpload,
        destination: &Path,
    ) -> Result<Uploaded, TransferError> {
        if tokio::fs::symlink_metadata(destination).await.is_ok() {
            return self.conflict(destination, spooled.digest).await;
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(TransferError::io("error creating destination directory"))?;
        }

        let SpooledUpload { temp, size, digest } = spooled;
        let target = destination.to_path_buf();
        let persisted = tokio::task::spawn_blocking(move || {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(temp.path(), std::fs::Permissions::from_mode(0o644))?;
            }
            Ok::<_, io::Error>(temp.persist_noclobber(&target))
        })
        .await
        .map_err(|e| TransferError::io("commit task failed")(io::Error::other(e)))?
        .map_err(TransferError::io("error preparing upload"))?;

        match persisted {
            Ok(_) => Ok(Uploaded {
                path: destination.to_path_buf(),
                size,
                digest,
            }),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                tracing::debug!(path = ?destination, "lost upload race to a concurrent writer");
                self.conflict(destination, digest).await
            }
            Err(e) => Err(TransferError::io("error saving uploaded file")(e.error)),
        }
    }

    /// Resolve, spool and commit in one go.
    pub async fn upload<S, E>(
        &self,
        to: &str,
        filename: &str,
        stream: S,
    ) -> Result<Uploaded, TransferError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: fmt::Display,
    {
        let destination = self.upload_destination(to, filename)?;
        let spooled = self.spool(stream).await?;
        self.commit(spooled, &destination).await
    }

    async fn conflict<T>(&self, destination: &Path, uploaded: FileDigest) -> Result<T, TransferError> {
        let metadata = tokio::fs::metadata(destination)
            .await
            .map_err(TransferError::io("error inspecting existing file"))?;
        if metadata.is_dir() {
            return Err(TransferError::DestinationIsDirectory(
                destination.to_path_buf(),
            ));
        }

        let existing = digest_file(destination)
            .await
            .map_err(TransferError::io("error calculating existing file hash"))?;

        Err(TransferError::Conflict {
            path: destination.to_path_buf(),
            existing,
            uploaded,
        })
    }
}

/// Final component of a client-declared filename, if it names a file.
fn base_name(filename: &str) -> Option<&str> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    match name {
        "." | ".." => None,
        name if name.trim().is_empty() => None,
        name if name.contains('\0') || name.starts_with(SPOOL_PREFIX) => None,
        name => Some(name),
    }
}

fn is_spool_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(SPOOL_PREFIX))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferAction {
    Uploaded,
    Downloaded,
}

impl fmt::Display for TransferAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferAction::Uploaded => f.write_str("Uploaded"),
            TransferAction::Downloaded => f.write_str("Downloaded"),
        }
    }
}

/// Size and speed of one finished transfer, for the logs.
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub action: TransferAction,
    pub client_ip: String,
    pub path: String,
    pub size: u64,
    pub elapsed: Duration,
}

impl TransferRecord {
    /// Throughput in MB/s (1 MB = 1024 * 1024 bytes).
    pub fn speed_mbps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64().max(1e-6);
        self.size as f64 / (MB * secs)
    }

    /// Emit the record as a tracing event and return its message.
    pub fn log(&self) -> String {
        let message = self.to_string();
        tracing::info!(
            client_ip = %self.client_ip,
            action = %self.action,
            path = %self.path,
            size = self.size,
            elapsed_ms = self.elapsed.as_millis() as u64,
            speed_mbps = self.speed_mbps(),
            "{}",
            message
        );
        message
    }
}

impl fmt::Display for TransferRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IP: {} | {} file: {} | Size: {} bytes | Speed: {:.2} MB/s",
            self.client_ip,
            self.action,
            self.path,
            self.size,
            self.speed_mbps()
        )
    }
}
