//! HTTP and WebSocket handlers.

use axum::Json;
use serde_json::{Value, json};

pub mod relay;

pub use relay::relay_handler;

/// Liveness probe.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "voxrelay",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
