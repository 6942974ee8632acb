//! Relay WebSocket route configuration.

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::relay_handler;
use crate::state::AppState;

/// Create the relay WebSocket router.
///
/// # Endpoint
///
/// `GET /calls/{call_id}` - WebSocket upgrade for one call connection
///
/// # Protocol
///
/// After the upgrade the server immediately sends a `config` frame and
/// starts its heartbeat. The platform then sends `call_details` once,
/// followed by `ping_pong`, `update_only`, `response_required`, and
/// `reminder_required` events for the life of the call. The server streams
/// back `response` frames; each response id ends in exactly one frame with
/// `content_complete: true`.
pub fn create_relay_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/calls/{call_id}", get(relay_handler))
        .layer(TraceLayer::new_for_http())
}
