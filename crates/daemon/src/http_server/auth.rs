use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::client_ip::ClientIp;
use super::response::Envelope;
use crate::ServiceState;

/// Gate every request on the access policy.
///
/// Authorized requests carry their resolved [`ClientIp`] as an extension so
/// handlers can attribute transfers without resolving it again.
pub async fn require_authorization(
    State(state): State<ServiceState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    mut request: Request,
    next: Next,
) -> Response {
    let peer = connect_info.map(|ConnectInfo(addr)| addr.ip());
    let client_ip = ClientIp(state.client_ip().resolve(peer, request.headers()));

    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if !state.policy().authorize(client_ip.0, header) {
        tracing::warn!(
            client_ip = %client_ip,
            method = %request.method(),
            path = %request.uri().path(),
            "unauthorized request"
        );
        return Envelope::unauthorized().into_response();
    }

    request.extensions_mut().insert(client_ip);
    next.run(request).await
}
