//! Configuration module for the voxrelay server
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `env`: Environment variable loading
//! - `yaml`: YAML configuration file loading and overlay
//!
//! # Example
//! ```rust,no_run
//! use voxrelay::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable fallbacks
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

mod env;
mod yaml;

use crate::utils::RetryPolicy;

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains all configuration needed to run the voxrelay server, including:
/// - Server settings (host, port, TLS)
/// - LLM backend settings (base URL, API key, model)
/// - Voice platform settings (call-detail API)
/// - CRM backend settings (communications, bookings, dispatches)
/// - Tool backend settings (places and property search APIs)
/// - Relay timing (heartbeat interval, receive timeout, summary polling)
/// - Security settings (CORS, rate limiting, connection limits)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    // LLM backend (OpenAI-compatible chat completions)
    pub llm_base_url: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,

    // Voice platform (call-detail/analysis API)
    pub platform_base_url: String,
    pub platform_api_key: Option<String>,

    // CRM backend (communications history, bookings, call/message dispatch)
    pub crm_base_url: String,

    // Tool backends
    pub places_base_url: String,
    pub places_api_key: Option<String>,
    pub property_primary_base_url: String,
    pub property_secondary_base_url: String,
    pub property_api_key: Option<String>,

    /// Display name the assistant introduces itself with when the peer
    /// supplies no override in the call's dynamic variables.
    pub assistant_name: String,

    // Relay timing
    /// Interval between keepalive pings on an open call connection.
    pub heartbeat_interval_secs: u64,
    /// How long the receive loop waits for an inbound frame before probing
    /// the peer.
    pub receive_timeout_secs: u64,
    /// Attempts made while polling the platform for a post-call summary.
    pub summary_retry_attempts: u32,
    /// Fixed delay between summary polling attempts.
    pub summary_retry_delay_secs: u64,

    // Tool response cache
    pub cache_ttl_seconds: Option<u64>,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,

    // Rate limiting configuration
    /// Maximum requests per second per IP address
    /// Default: 60
    pub rate_limit_requests_per_second: u32,
    /// Maximum burst size for rate limiting
    /// Default: 10
    pub rate_limit_burst_size: u32,

    // Connection limits
    /// Maximum concurrent WebSocket connections
    /// Default: None (unlimited)
    pub max_websocket_connections: Option<usize>,
    /// Maximum connections per IP address
    /// Default: 100
    pub max_connections_per_ip: u32,
}

/// Implement Drop to zeroize all secret fields when ServerConfig is dropped.
/// This ensures sensitive data is cleared from memory immediately after use.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.llm_api_key {
            key.zeroize();
        }
        if let Some(ref mut key) = self.platform_api_key {
            key.zeroize();
        }
        if let Some(ref mut key) = self.places_api_key {
            key.zeroize();
        }
        if let Some(ref mut key) = self.property_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables (and any `.env` file
    /// already loaded by the caller).
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = env::load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, with environment variables
    /// filling any values the file does not set.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let overlay: yaml::YamlConfig = serde_yaml::from_str(&raw)?;

        let mut config = env::load_from_env();
        yaml::apply(&mut config, overlay);
        config.validate()?;
        Ok(config)
    }

    /// The socket address string the server binds to.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether TLS serving is configured.
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Keepalive ping interval for open call connections.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Receive-loop inactivity timeout before the peer is probed.
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_secs(self.receive_timeout_secs)
    }

    /// Retry policy for post-call summary polling.
    pub fn summary_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.summary_retry_attempts,
            Duration::from_secs(self.summary_retry_delay_secs),
        )
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        if self.llm_model.is_empty() {
            return Err(ConfigError::Invalid("llm model must not be empty".into()));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "heartbeat interval must be at least 1 second".into(),
            ));
        }
        if self.receive_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "receive timeout must be at least 1 second".into(),
            ));
        }
        if self.summary_retry_attempts == 0 {
            return Err(ConfigError::Invalid(
                "summary retry attempts must be at least 1".into(),
            ));
        }
        for (name, url) in [
            ("llm base url", &self.llm_base_url),
            ("platform base url", &self.platform_base_url),
            ("crm base url", &self.crm_base_url),
            ("places base url", &self.places_base_url),
            ("property primary base url", &self.property_primary_base_url),
            (
                "property secondary base url",
                &self.property_secondary_base_url,
            ),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Invalid(format!(
                    "{name} must start with http:// or https:// (got {url:?})"
                )));
            }
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            tls: None,
            llm_base_url: "https://api.openai.com/v1".to_string(),
            llm_api_key: None,
            llm_model: "gpt-4o".to_string(),
            platform_base_url: "https://api.retellai.com".to_string(),
            platform_api_key: None,
            crm_base_url: "http://localhost:5000".to_string(),
            places_base_url: "https://google-map-places.p.rapidapi.com".to_string(),
            places_api_key: None,
            property_primary_base_url: "https://zillow-com1.p.rapidapi.com".to_string(),
            property_secondary_base_url: "https://zillow56.p.rapidapi.com".to_string(),
            property_api_key: None,
            assistant_name: "Ava".to_string(),
            heartbeat_interval_secs: 20,
            receive_timeout_secs: 30,
            summary_retry_attempts: 3,
            summary_retry_delay_secs: 2,
            cache_ttl_seconds: Some(1800),
            cors_allowed_origins: None,
            rate_limit_requests_per_second: 60,
            rate_limit_burst_size: 10,
            max_websocket_connections: None,
            max_connections_per_ip: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.address(), "0.0.0.0:8080");
        assert!(!config.is_tls_enabled());
    }

    // ServerConfig implements Drop (secret zeroization), so tests mutate a
    // default instance instead of using struct-update syntax.

    #[test]
    fn rejects_empty_model() {
        let mut config = ServerConfig::default();
        config.llm_model = String::new();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_non_http_backend_url() {
        let mut config = ServerConfig::default();
        config.crm_base_url = "localhost:5000".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_zero_heartbeat() {
        let mut config = ServerConfig::default();
        config.heartbeat_interval_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn summary_retry_policy_reflects_settings() {
        let mut config = ServerConfig::default();
        config.summary_retry_attempts = 5;
        config.summary_retry_delay_secs = 7;
        let policy = config.summary_retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay, Duration::from_secs(7));
    }
}
