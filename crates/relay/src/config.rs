use relaycraft_registry::CacheConfig;

/// Relay service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Log relay validation failures
    pub relay_errors: bool,
    /// How many sessions behind the latest a client may still be
    pub client_session_sync_allowance: u64,
    /// Per-identity store settings, used when stores are opened lazily
    pub cache: CacheConfig,
}

impl ServiceConfig {
    pub fn new(cache: CacheConfig) -> Self {
        Self {
            relay_errors: true,
            client_session_sync_allowance: 1,
            cache,
        }
    }
}
