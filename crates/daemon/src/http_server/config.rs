use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct Config {
    // Listen address
    pub listen_addr: SocketAddr,
    // Route prefix for downloads, normalized: leading '/', no trailing '/'
    pub download_prefix: String,
    // Route prefix for uploads, normalized the same way
    pub upload_prefix: String,
    // Largest accepted request body
    pub max_upload_bytes: usize,
    // log level for http tracing
    pub log_level: tracing::Level,
}

impl Config {
    pub fn new(
        listen_addr: SocketAddr,
        download_prefix: &str,
        upload_prefix: &str,
        max_upload_bytes: usize,
    ) -> Result<Self, ConfigError> {
        let download_prefix = normalize_prefix(download_prefix);
        // downloads hang a wildcard off the prefix, which would swallow
        //  every other route if mounted at the root
        if download_prefix.is_empty() {
            return Err(ConfigError::RootDownloadPrefix);
        }
        let upload_prefix = match normalize_prefix(upload_prefix) {
            prefix if prefix.is_empty() => "/".to_string(),
            prefix => prefix,
        };
        if upload_prefix.starts_with(&format!("{}/", download_prefix)) {
            return Err(ConfigError::OverlappingPrefixes(upload_prefix));
        }

        tracing::info!(
            "Creating HTTP server Config: listen_addr={}, download_prefix={}, upload_prefix={}",
            listen_addr,
            download_prefix,
            upload_prefix
        );
        Ok(Self {
            listen_addr,
            download_prefix,
            upload_prefix,
            max_upload_bytes,
            log_level: tracing::Level::INFO,
        })
    }

    /// The still-escaped client path of a download request, if `path` is
    /// under the download prefix.
    pub fn download_path<'a>(&self, path: &'a str) -> Option<&'a str> {
        path.strip_prefix(self.download_prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
    }
}

/// `download/` becomes `/download`; `/` becomes the empty string.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("download prefix must not be the root")]
    RootDownloadPrefix,
    #[error("upload prefix {0} lies under the download prefix")]
    OverlappingPrefixes(String),
}
