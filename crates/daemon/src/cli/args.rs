pub use clap::Parser;

use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "ferry")]
#[command(about = "Authenticated file upload and download server")]
pub struct Args {
    /// Server URL (defaults to the port in the local config, then 8080)
    #[arg(long, global = true)]
    pub remote: Option<Url>,

    /// Path to the ferry config directory (defaults to ~/.ferry)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Shared secret sent in the Authorization header
    #[arg(long, global = true, env = "FERRY_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: crate::Command,
}
