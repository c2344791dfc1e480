use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Args;

use ferry_daemon::state::{AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Address the server should listen on
    #[arg(long)]
    pub listen_addr: Option<SocketAddr>,

    /// Directory to serve (relative paths are taken from the config directory)
    #[arg(long)]
    pub work_path: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("state error: {0}")]
    State(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = AppConfig::default();
        if let Some(addr) = self.listen_addr {
            config.listen_addr = addr;
        }
        if let Some(path) = &self.work_path {
            config.work_path = path.clone();
        }

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        Ok(format!(
            "Initialized ferry directory at {}\n  config:  {}\n  auth:    {}\n  serving: {}",
            state.ferry_dir.display(),
            state.config_path.display(),
            state.auth_path.display(),
            state.work_path.display()
        ))
    }
}
