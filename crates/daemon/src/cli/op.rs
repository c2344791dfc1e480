use std::error::Error;
use std::path::PathBuf;

use url::Url;

use ferry_daemon::http_server::api::client::{ApiClient, ApiError};
use ferry_daemon::state::{AppState, DEFAULT_UPLOAD_PREFIX};

/// Resolve the remote URL for the API client.
///
/// Priority: explicit `--remote` flag > config file `listen_addr` port > hardcoded 8080.
pub fn resolve_remote(explicit: Option<Url>, config_path: Option<PathBuf>) -> Url {
    if let Some(url) = explicit {
        return url;
    }
    if let Ok(state) = AppState::load(config_path) {
        let port = state.config.listen_addr.port();
        if let Ok(url) = Url::parse(&format!("http://localhost:{}", port)) {
            return url;
        }
    }
    Url::parse("http://localhost:8080").expect("hardcoded URL must parse")
}

#[derive(Clone)]
pub struct OpContext {
    /// API client (always initialized with default or custom URL)
    pub client: ApiClient,
    /// Upload route prefix, from the local config when there is one
    pub upload_prefix: String,
    /// Optional custom config path (defaults to ~/.ferry)
    pub config_path: Option<PathBuf>,
}

impl OpContext {
    /// Create context with custom remote URL, optional token and optional config path
    pub fn new(
        remote: Url,
        token: Option<&str>,
        config_path: Option<PathBuf>,
    ) -> Result<Self, ApiError> {
        let local = AppState::load(config_path.clone()).ok();

        let mut client = ApiClient::new(&remote, token)?;
        let mut upload_prefix = DEFAULT_UPLOAD_PREFIX.to_string();
        if let Some(state) = local {
            client = client.with_download_prefix(&state.config.download_prefix);
            upload_prefix = state.config.upload_prefix;
        }

        Ok(Self {
            client,
            upload_prefix,
            config_path,
        })
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::cli::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::cli::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}
