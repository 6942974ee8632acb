//! YAML configuration file source.
//!
//! All fields are optional to allow partial configuration; anything the file
//! does not set keeps the value already loaded from the environment.
//!
//! # Example YAML structure
//! ```yaml
//! server:
//!   host: "0.0.0.0"
//!   port: 8080
//!   tls:
//!     cert_path: "/etc/voxrelay/cert.pem"
//!     key_path: "/etc/voxrelay/key.pem"
//!
//! llm:
//!   base_url: "https://api.openai.com/v1"
//!   api_key: "sk-..."
//!   model: "gpt-4o"
//!
//! platform:
//!   base_url: "https://api.retellai.com"
//!   api_key: "platform-key"
//!
//! crm:
//!   base_url: "https://crm.example.com"
//!
//! tools:
//!   places_base_url: "https://google-map-places.p.rapidapi.com"
//!   places_api_key: "rapid-key"
//!   property_api_key: "rapid-key"
//!
//! relay:
//!   assistant_name: "Ava"
//!   heartbeat_interval_secs: 20
//!   receive_timeout_secs: 30
//!   summary_retry_attempts: 3
//!   summary_retry_delay_secs: 2
//!
//! cache:
//!   ttl_seconds: 1800
//!
//! security:
//!   cors_allowed_origins: "*"
//!   rate_limit_requests_per_second: 60
//!   rate_limit_burst_size: 10
//!   max_websocket_connections: 4096
//!   max_connections_per_ip: 100
//! ```

use serde::Deserialize;
use std::path::PathBuf;

use super::{ServerConfig, TlsConfig};

/// Complete YAML configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub(super) struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub llm: Option<LlmYaml>,
    pub platform: Option<PlatformYaml>,
    pub crm: Option<CrmYaml>,
    pub tools: Option<ToolsYaml>,
    pub relay: Option<RelayYaml>,
    pub cache: Option<CacheYaml>,
    pub security: Option<SecurityYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub(super) struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub(super) struct TlsYaml {
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub(super) struct LlmYaml {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub(super) struct PlatformYaml {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub(super) struct CrmYaml {
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub(super) struct ToolsYaml {
    pub places_base_url: Option<String>,
    pub places_api_key: Option<String>,
    pub property_primary_base_url: Option<String>,
    pub property_secondary_base_url: Option<String>,
    pub property_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub(super) struct RelayYaml {
    pub assistant_name: Option<String>,
    pub heartbeat_interval_secs: Option<u64>,
    pub receive_timeout_secs: Option<u64>,
    pub summary_retry_attempts: Option<u32>,
    pub summary_retry_delay_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub(super) struct CacheYaml {
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub(super) struct SecurityYaml {
    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: Option<u32>,
    pub rate_limit_burst_size: Option<u32>,
    pub max_websocket_connections: Option<usize>,
    pub max_connections_per_ip: Option<u32>,
}

/// Overlay YAML values onto an environment-derived configuration.
pub(super) fn apply(config: &mut ServerConfig, overlay: YamlConfig) {
    if let Some(server) = overlay.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(tls) = server.tls
            && let (Some(cert), Some(key)) = (tls.cert_path, tls.key_path)
        {
            config.tls = Some(TlsConfig {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            });
        }
    }
    if let Some(llm) = overlay.llm {
        if let Some(base_url) = llm.base_url {
            config.llm_base_url = base_url;
        }
        if llm.api_key.is_some() {
            config.llm_api_key = llm.api_key;
        }
        if let Some(model) = llm.model {
            config.llm_model = model;
        }
    }
    if let Some(platform) = overlay.platform {
        if let Some(base_url) = platform.base_url {
            config.platform_base_url = base_url;
        }
        if platform.api_key.is_some() {
            config.platform_api_key = platform.api_key;
        }
    }
    if let Some(crm) = overlay.crm
        && let Some(base_url) = crm.base_url
    {
        config.crm_base_url = base_url;
    }
    if let Some(tools) = overlay.tools {
        if let Some(url) = tools.places_base_url {
            config.places_base_url = url;
        }
        if tools.places_api_key.is_some() {
            config.places_api_key = tools.places_api_key;
        }
        if let Some(url) = tools.property_primary_base_url {
            config.property_primary_base_url = url;
        }
        if let Some(url) = tools.property_secondary_base_url {
            config.property_secondary_base_url = url;
        }
        if tools.property_api_key.is_some() {
            config.property_api_key = tools.property_api_key;
        }
    }
    if let Some(relay) = overlay.relay {
        if let Some(name) = relay.assistant_name {
            config.assistant_name = name;
        }
        if let Some(secs) = relay.heartbeat_interval_secs {
            config.heartbeat_interval_secs = secs;
        }
        if let Some(secs) = relay.receive_timeout_secs {
            config.receive_timeout_secs = secs;
        }
        if let Some(attempts) = relay.summary_retry_attempts {
            config.summary_retry_attempts = attempts;
        }
        if let Some(secs) = relay.summary_retry_delay_secs {
            config.summary_retry_delay_secs = secs;
        }
    }
    if let Some(cache) = overlay.cache
        && cache.ttl_seconds.is_some()
    {
        config.cache_ttl_seconds = cache.ttl_seconds;
    }
    if let Some(security) = overlay.security {
        if security.cors_allowed_origins.is_some() {
            config.cors_allowed_origins = security.cors_allowed_origins;
        }
        if let Some(rps) = security.rate_limit_requests_per_second {
            config.rate_limit_requests_per_second = rps;
        }
        if let Some(burst) = security.rate_limit_burst_size {
            config.rate_limit_burst_size = burst;
        }
        if security.max_websocket_connections.is_some() {
            config.max_websocket_connections = security.max_websocket_connections;
        }
        if let Some(per_ip) = security.max_connections_per_ip {
            config.max_connections_per_ip = per_ip;
        }
    }
}
