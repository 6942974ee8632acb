//! Connection limit middleware for WebSocket upgrades.
//!
//! Enforces the global WebSocket connection cap and the per-IP cap before a
//! connection is upgraded. Plain HTTP requests pass through untouched. On
//! success a [`ClientIp`] extension is injected so the handler can release
//! the slot when the connection ends.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::state::{AppState, ConnectionLimitError};

/// The client IP that holds a connection slot, carried to the handler so it
/// can release the slot on teardown.
#[derive(Clone, Copy, Debug)]
pub struct ClientIp(pub std::net::IpAddr);

/// Gate WebSocket upgrades on connection limits.
///
/// Returns 503 when the global limit is reached and 429 when the per-IP
/// limit is reached.
pub async fn connection_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let is_ws_upgrade = request
        .headers()
        .get("upgrade")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    if !is_ws_upgrade {
        return next.run(request).await;
    }

    let ip = addr.ip();
    match state.try_acquire_connection(ip) {
        Ok(()) => {
            request.extensions_mut().insert(ClientIp(ip));
            next.run(request).await
        }
        Err(ConnectionLimitError::GlobalLimitReached) => {
            tracing::warn!(ip = %ip, "rejecting connection: global limit reached");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Server at capacity. Please try again later.",
            )
                .into_response()
        }
        Err(ConnectionLimitError::PerIpLimitReached) => {
            tracing::warn!(ip = %ip, "rejecting connection: per-IP limit reached");
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many connections from your IP address.",
            )
                .into_response()
        }
    }
}
