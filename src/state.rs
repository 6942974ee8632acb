//! Shared application state.
//!
//! One [`AppState`] is constructed from the loaded configuration and shared
//! by every handler. It owns the backend clients, the response engine, and
//! the connection accounting: a per-call-id registry (exactly one live
//! connection per call) plus global and per-IP connection limits.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use crate::backend::{CrmClient, VoicePlatformClient};
use crate::config::ServerConfig;
use crate::llm::{OpenAiChatClient, ResponseEngine};
use crate::session::CallSession;
use crate::tools::{PlacesClient, PropertyClient, ToolCache, ToolInvoker};

/// Why a connection attempt was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLimitError {
    GlobalLimitReached,
    PerIpLimitReached,
}

/// Process-wide shared state.
pub struct AppState {
    pub config: ServerConfig,

    engine: Arc<ResponseEngine>,
    crm: Arc<CrmClient>,
    platform: Arc<VoicePlatformClient>,

    /// Call ids with a live connection.
    active_calls: DashMap<String, ()>,
    /// Total open WebSocket connections.
    ws_connections: AtomicUsize,
    /// Open connections per client IP.
    connections_per_ip: DashMap<IpAddr, u32>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let crm = Arc::new(CrmClient::new(config.crm_base_url.clone()));
        let platform = Arc::new(VoicePlatformClient::new(
            config.platform_base_url.clone(),
            config.platform_api_key.clone(),
        ));

        let chat = Arc::new(OpenAiChatClient::new(
            config.llm_base_url.clone(),
            config.llm_api_key.clone(),
            config.llm_model.clone(),
        ));
        let invoker = Arc::new(ToolInvoker::new(
            Arc::clone(&crm),
            PlacesClient::new(config.places_base_url.clone(), config.places_api_key.clone()),
            PropertyClient::new(
                config.property_primary_base_url.clone(),
                config.property_secondary_base_url.clone(),
                config.property_api_key.clone(),
            ),
            ToolCache::from_ttl_seconds(config.cache_ttl_seconds),
        ));
        let engine = Arc::new(ResponseEngine::new(
            chat,
            invoker,
            config.assistant_name.clone(),
        ));

        Arc::new(Self {
            config,
            engine,
            crm,
            platform,
            active_calls: DashMap::new(),
            ws_connections: AtomicUsize::new(0),
            connections_per_ip: DashMap::new(),
        })
    }

    /// The shared response engine.
    pub fn engine(&self) -> Arc<ResponseEngine> {
        Arc::clone(&self.engine)
    }

    /// Build a fresh session for one call connection.
    pub fn new_session(&self) -> Arc<CallSession> {
        CallSession::new(
            self.config.assistant_name.clone(),
            self.config.summary_retry_policy(),
            Arc::clone(&self.crm),
            Arc::clone(&self.platform),
        )
    }

    // ── Per-call registry ─────────────────────────────────────────────

    /// Claim the call id for this connection. Returns false when the call
    /// already has a live connection.
    pub fn try_register_call(&self, call_id: &str) -> bool {
        use dashmap::mapref::entry::Entry;
        match self.active_calls.entry(call_id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(());
                true
            }
        }
    }

    pub fn release_call(&self, call_id: &str) {
        self.active_calls.remove(call_id);
    }

    pub fn active_call_count(&self) -> usize {
        self.active_calls.len()
    }

    // ── Connection limits ─────────────────────────────────────────────

    /// Try to take one connection slot for `ip`.
    pub fn try_acquire_connection(&self, ip: IpAddr) -> Result<(), ConnectionLimitError> {
        if let Some(max) = self.config.max_websocket_connections
            && self.ws_connections.load(Ordering::SeqCst) >= max
        {
            return Err(ConnectionLimitError::GlobalLimitReached);
        }

        {
            let mut per_ip = self.connections_per_ip.entry(ip).or_insert(0);
            if *per_ip >= self.config.max_connections_per_ip {
                return Err(ConnectionLimitError::PerIpLimitReached);
            }
            *per_ip += 1;
        }

        self.ws_connections.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Release a slot taken by [`Self::try_acquire_connection`].
    pub fn release_connection(&self, ip: IpAddr) {
        let mut remove = false;
        if let Some(mut per_ip) = self.connections_per_ip.get_mut(&ip) {
            *per_ip = per_ip.saturating_sub(1);
            remove = *per_ip == 0;
        }
        if remove {
            self.connections_per_ip.remove_if(&ip, |_, count| *count == 0);
        }

        let _ = self
            .ws_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                count.checked_sub(1)
            });
    }

    pub fn ws_connection_count(&self) -> usize {
        self.ws_connections.load(Ordering::SeqCst)
    }

    pub fn ip_connection_count(&self, ip: &IpAddr) -> u32 {
        self.connections_per_ip
            .get(ip)
            .map(|count| *count)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn state_with_limits(global: Option<usize>, per_ip: u32) -> Arc<AppState> {
        // ServerConfig implements Drop, so build by mutation.
        let mut config = ServerConfig::default();
        config.max_websocket_connections = global;
        config.max_connections_per_ip = per_ip;
        AppState::new(config)
    }

    #[test]
    fn call_registry_enforces_one_connection_per_call() {
        let state = state_with_limits(None, 100);
        assert!(state.try_register_call("call-1"));
        assert!(!state.try_register_call("call-1"));
        assert!(state.try_register_call("call-2"));
        assert_eq!(state.active_call_count(), 2);

        state.release_call("call-1");
        assert!(state.try_register_call("call-1"));
    }

    #[test]
    fn per_ip_limit_is_enforced_and_released() {
        let state = state_with_limits(Some(10), 3);
        let ip: IpAddr = Ipv4Addr::new(192, 168, 1, 100).into();

        assert_eq!(state.ws_connection_count(), 0);
        for _ in 0..3 {
            assert!(state.try_acquire_connection(ip).is_ok());
        }
        assert_eq!(state.ip_connection_count(&ip), 3);
        assert_eq!(
            state.try_acquire_connection(ip),
            Err(ConnectionLimitError::PerIpLimitReached)
        );

        state.release_connection(ip);
        assert_eq!(state.ip_connection_count(&ip), 2);
        assert!(state.try_acquire_connection(ip).is_ok());
    }

    #[test]
    fn global_limit_is_enforced() {
        let state = state_with_limits(Some(5), 10);
        let ips: Vec<IpAddr> = (1..=6u8)
            .map(|i| Ipv4Addr::new(10, 0, 0, i).into())
            .collect();

        for ip in &ips[0..5] {
            assert!(state.try_acquire_connection(*ip).is_ok());
        }
        assert_eq!(
            state.try_acquire_connection(ips[5]),
            Err(ConnectionLimitError::GlobalLimitReached)
        );

        state.release_connection(ips[0]);
        assert!(state.try_acquire_connection(ips[5]).is_ok());
    }

    #[test]
    fn release_without_acquire_is_harmless() {
        let state = state_with_limits(Some(5), 10);
        let ip: IpAddr = Ipv4Addr::new(10, 0, 0, 1).into();
        state.release_connection(ip);
        assert_eq!(state.ws_connection_count(), 0);
        assert_eq!(state.ip_connection_count(&ip), 0);
    }
}
