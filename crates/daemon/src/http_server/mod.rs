use std::iter::once;
use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use axum::http::header::AUTHORIZATION;
use axum::{middleware, Extension, Router};
use tokio::sync::watch;
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::trace::TraceLayer;
use tower_http::trace::{DefaultOnFailure, DefaultOnResponse};
use tower_http::LatencyUnit;

pub mod api;
mod auth;
mod client_ip;
mod config;
mod handlers;
mod health;
pub mod response;

pub use client_ip::{ClientIp, ClientIpResolver};
pub use config::{normalize_prefix, Config, ConfigError};

use crate::ServiceState;

const STATUS_PREFIX: &str = "/_status";

/// Build the full router: transfer routes, status routes and the fallback,
/// all behind the authorization gate.
pub fn router(config: &Config, state: ServiceState) -> Router {
    let log_level = config.log_level;
    let trace_layer = TraceLayer::new_for_http()
        .on_response(
            DefaultOnResponse::new()
                .include_headers(false)
                .level(log_level)
                .latency_unit(LatencyUnit::Micros),
        )
        .on_failure(DefaultOnFailure::new().latency_unit(LatencyUnit::Micros));

    Router::new()
        .nest(STATUS_PREFIX, health::router(state.clone()))
        .merge(api::router(config, state.clone()))
        .fallback(handlers::not_found_handler)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(Extension(config.clone()))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_authorization,
        ))
        .with_state(state)
        .layer(trace_layer)
        .layer(SetSensitiveRequestHeadersLayer::new(once(AUTHORIZATION)))
}

/// Run the HTTP server until the shutdown signal fires.
pub async fn run(
    config: Config,
    state: ServiceState,
    mut shutdown_rx: watch::Receiver<()>,
) -> Result<(), HttpServerError> {
    let listen_addr = config.listen_addr;
    let router = router(&config, state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(addr = ?listener.local_addr()?, "HTTP server listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown_rx.changed().await;
    })
    .await?;

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    #[error("an error occurred running the HTTP server: {0}")]
    ServingFailed(#[from] std::io::Error),
}
