use axum::routing::{get, post};
use axum::Router;

pub mod client;
pub mod download;
pub mod upload;

use super::Config;
use crate::ServiceState;

pub fn router(config: &Config, state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route(
            &format!("{}/*path", config.download_prefix),
            get(download::handler),
        )
        .route(&config.upload_prefix, post(upload::handler))
        .with_state(state)
}
