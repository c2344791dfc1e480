use std::net::SocketAddr;
use std::path::PathBuf;

use common::prelude::AccessPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    // http server configuration
    /// address the HTTP server listens on
    pub listen_addr: SocketAddr,
    /// route prefix for downloads, e.g. `/download`
    pub download_prefix: String,
    /// route prefix for uploads, e.g. `/upload`
    pub upload_prefix: String,
    /// largest request body accepted on the upload route
    pub max_upload_bytes: usize,

    // transfer configuration
    /// directory served to clients; created if missing
    pub work_path: PathBuf,

    // access control
    /// policy loaded from the auth file at startup
    pub policy: AccessPolicy,
    /// proxies allowed to report the client address via forwarding headers
    pub trusted_proxies: Vec<String>,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}
