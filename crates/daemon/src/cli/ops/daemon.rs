use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Args;

use ferry_daemon::state::AppState;
use ferry_daemon::{spawn_service, ServiceConfig};

#[derive(Args, Debug, Clone)]
pub struct Daemon {
    /// Override the listen address (default from config)
    #[arg(long)]
    pub listen_addr: Option<SocketAddr>,

    /// Override the served directory (default from config)
    #[arg(long)]
    pub work_path: Option<PathBuf>,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("state error: {0}")]
    StateError(#[from] ferry_daemon::state::StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Daemon {
    type Error = DaemonError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        // Load state from config path (or default ~/.ferry)
        let state = AppState::load(ctx.config_path.clone())?;

        // The policy is read once here; a bad auth file stops us before we serve
        let policy = state.load_policy()?;

        let config = ServiceConfig {
            listen_addr: self.listen_addr.unwrap_or(state.config.listen_addr),
            download_prefix: state.config.download_prefix.clone(),
            upload_prefix: state.config.upload_prefix.clone(),
            max_upload_bytes: state.config.max_upload_bytes,
            work_path: self.work_path.clone().unwrap_or(state.work_path.clone()),
            policy,
            trusted_proxies: state.config.trusted_proxies.clone(),
            log_level: tracing::Level::INFO,
            log_dir: self.log_dir.clone(),
        };

        spawn_service(&config).await;
        Ok("daemon ended".to_string())
    }
}
