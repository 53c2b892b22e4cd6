use std::time::Duration;

/// Default relay URLs.
pub const DEFAULT_RELAYS: &[&str] = &["wss://relay.damus.io", "wss://relay.primal.net"];

/// Configuration for [`CatalogSync`](crate::service::CatalogSync).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Nostr relay URLs to connect to.
    pub relays: Vec<String>,
    /// Timeout for one-shot fetch operations.
    pub fetch_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            relays: DEFAULT_RELAYS.iter().map(|s| s.to_string()).collect(),
            fetch_timeout: Duration::from_secs(15),
        }
    }
}
