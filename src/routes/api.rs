//! REST route configuration.

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::health_check;
use crate::state::AppState;

/// Create the REST router.
///
/// # Endpoints
///
/// `GET /health` - liveness probe
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
}
