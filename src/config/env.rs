//! Environment variable configuration source.
//!
//! Reads every `ServerConfig` field from process environment variables,
//! falling back to the built-in defaults for anything unset. Parse failures
//! on numeric variables fall back to the default rather than aborting; the
//! validation pass in `mod.rs` catches genuinely unusable values.

use super::{ServerConfig, TlsConfig};
use std::path::PathBuf;

/// Read an optional string variable, treating empty strings as unset.
fn opt_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Read a parseable variable, keeping `default` when unset or unparseable.
fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    opt_var(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Build a `ServerConfig` from the process environment.
pub(super) fn load_from_env() -> ServerConfig {
    let defaults = ServerConfig::default();

    let tls = match (opt_var("TLS_CERT_PATH"), opt_var("TLS_KEY_PATH")) {
        (Some(cert), Some(key)) => Some(TlsConfig {
            cert_path: PathBuf::from(cert),
            key_path: PathBuf::from(key),
        }),
        _ => None,
    };

    ServerConfig {
        host: opt_var("HOST").unwrap_or_else(|| defaults.host.clone()),
        port: parsed_var("PORT", defaults.port),
        tls,
        llm_base_url: opt_var("LLM_BASE_URL").unwrap_or_else(|| defaults.llm_base_url.clone()),
        llm_api_key: opt_var("LLM_API_KEY").or_else(|| opt_var("OPENAI_API_KEY")),
        llm_model: opt_var("LLM_MODEL").unwrap_or_else(|| defaults.llm_model.clone()),
        platform_base_url: opt_var("PLATFORM_BASE_URL")
            .unwrap_or_else(|| defaults.platform_base_url.clone()),
        platform_api_key: opt_var("PLATFORM_API_KEY"),
        crm_base_url: opt_var("CRM_BASE_URL").unwrap_or_else(|| defaults.crm_base_url.clone()),
        places_base_url: opt_var("PLACES_BASE_URL")
            .unwrap_or_else(|| defaults.places_base_url.clone()),
        places_api_key: opt_var("PLACES_API_KEY").or_else(|| opt_var("RAPID_API_KEY")),
        property_primary_base_url: opt_var("PROPERTY_PRIMARY_BASE_URL")
            .unwrap_or_else(|| defaults.property_primary_base_url.clone()),
        property_secondary_base_url: opt_var("PROPERTY_SECONDARY_BASE_URL")
            .unwrap_or_else(|| defaults.property_secondary_base_url.clone()),
        property_api_key: opt_var("PROPERTY_API_KEY").or_else(|| opt_var("RAPID_API_KEY")),
        assistant_name: opt_var("ASSISTANT_NAME")
            .unwrap_or_else(|| defaults.assistant_name.clone()),
        heartbeat_interval_secs: parsed_var(
            "HEARTBEAT_INTERVAL_SECS",
            defaults.heartbeat_interval_secs,
        ),
        receive_timeout_secs: parsed_var("RECEIVE_TIMEOUT_SECS", defaults.receive_timeout_secs),
        summary_retry_attempts: parsed_var(
            "SUMMARY_RETRY_ATTEMPTS",
            defaults.summary_retry_attempts,
        ),
        summary_retry_delay_secs: parsed_var(
            "SUMMARY_RETRY_DELAY_SECS",
            defaults.summary_retry_delay_secs,
        ),
        cache_ttl_seconds: opt_var("CACHE_TTL_SECONDS")
            .and_then(|v| v.parse().ok())
            .or(defaults.cache_ttl_seconds),
        cors_allowed_origins: opt_var("CORS_ALLOWED_ORIGINS"),
        rate_limit_requests_per_second: parsed_var(
            "RATE_LIMIT_REQUESTS_PER_SECOND",
            defaults.rate_limit_requests_per_second,
        ),
        rate_limit_burst_size: parsed_var("RATE_LIMIT_BURST_SIZE", defaults.rate_limit_burst_size),
        max_websocket_connections: opt_var("MAX_WEBSOCKET_CONNECTIONS")
            .and_then(|v| v.parse().ok()),
        max_connections_per_ip: parsed_var(
            "MAX_CONNECTIONS_PER_IP",
            defaults.max_connections_per_ip,
        ),
    }
}
