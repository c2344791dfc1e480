use std::net::SocketAddr;
use std::{fs, path::Path, path::PathBuf};

use common::prelude::{AccessPolicy, PolicyError};
use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "ferry";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const AUTH_FILE_NAME: &str = "auth.toml";
pub const FILES_DIR_NAME: &str = "files";

pub const DEFAULT_DOWNLOAD_PREFIX: &str = "/download";
pub const DEFAULT_UPLOAD_PREFIX: &str = "/upload";
/// 500 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 500 * 1024 * 1024;

/// Templates written into a fresh ferry directory
#[derive(RustEmbed)]
#[folder = "defaults"]
struct Defaults;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the server binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Directory served to clients; relative paths are taken from the
    ///  ferry directory
    #[serde(default = "default_work_path")]
    pub work_path: PathBuf,
    #[serde(default = "default_download_prefix")]
    pub download_prefix: String,
    #[serde(default = "default_upload_prefix")]
    pub upload_prefix: String,
    /// Authorization config; relative paths are taken from the ferry directory
    #[serde(default = "default_auth_file")]
    pub auth_file: PathBuf,
    /// Proxies whose forwarding headers are believed
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_work_path() -> PathBuf {
    PathBuf::from(FILES_DIR_NAME)
}

fn default_download_prefix() -> String {
    DEFAULT_DOWNLOAD_PREFIX.to_string()
}

fn default_upload_prefix() -> String {
    DEFAULT_UPLOAD_PREFIX.to_string()
}

fn default_auth_file() -> PathBuf {
    PathBuf::from(AUTH_FILE_NAME)
}

fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            work_path: default_work_path(),
            download_prefix: default_download_prefix(),
            upload_prefix: default_upload_prefix(),
            auth_file: default_auth_file(),
            trusted_proxies: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the ferry directory (~/.ferry)
    pub ferry_dir: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Path to the authorization config
    pub auth_path: PathBuf,
    /// Directory served to clients
    pub work_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the ferry directory path (custom or default ~/.ferry)
    pub fn ferry_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new ferry directory: config, default auth file and the
    ///  served directory
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let ferry_dir = Self::ferry_dir(custom_path)?;

        if ferry_dir.join(CONFIG_FILE_NAME).exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&ferry_dir)?;

        let config = config.unwrap_or_default();
        let config_path = ferry_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        let state = Self::from_parts(ferry_dir, config_path, config);
        fs::create_dir_all(&state.work_path)?;
        state.ensure_auth_file()?;

        Ok(state)
    }

    /// Load existing state from the ferry directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let ferry_dir = Self::ferry_dir(custom_path)?;

        if !ferry_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let config_path = ferry_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self::from_parts(ferry_dir, config_path, config))
    }

    fn from_parts(ferry_dir: PathBuf, config_path: PathBuf, config: AppConfig) -> Self {
        let auth_path = ferry_dir.join(&config.auth_file);
        let work_path = ferry_dir.join(&config.work_path);
        Self {
            ferry_dir,
            config_path,
            auth_path,
            work_path,
            config,
        }
    }

    /// Write the packaged auth template if no auth file exists yet.
    ///
    /// Returns whether a file was written.
    pub fn ensure_auth_file(&self) -> Result<bool, StateError> {
        if self.auth_path.exists() {
            return Ok(false);
        }

        let template = Defaults::get(AUTH_FILE_NAME)
            .ok_or_else(|| StateError::MissingTemplate(AUTH_FILE_NAME.to_string()))?;
        if let Some(parent) = self.auth_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.auth_path, template.data.as_ref())?;

        tracing::info!(path = ?self.auth_path, "wrote default auth config");
        Ok(true)
    }

    /// Load the access policy, bootstrapping the auth file first if needed
    pub fn load_policy(&self) -> Result<AccessPolicy, StateError> {
        self.ensure_auth_file()?;
        load_policy_file(&self.auth_path)
    }
}

/// Read and parse an auth file. All-or-nothing: one bad entry fails the load.
pub fn load_policy_file(path: &Path) -> Result<AccessPolicy, StateError> {
    let source = fs::read_to_string(path).map_err(PolicyError::from)?;
    Ok(AccessPolicy::from_toml(&source)?)
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("ferry directory not initialized. Run 'ferry init' first")]
    NotInitialized,

    #[error("ferry directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("missing packaged template: {0}")]
    MissingTemplate(String),

    #[error("auth config error: {0}")]
    Policy(#[from] PolicyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
