//! Configuration options for the bridge

use std::time::Duration;

/// Upper bound on the relay directory; relay ids are recycled modulo this value.
pub const DEFAULT_MAX_RELAYS: usize = 256;

/// How often the manager checks whether a resubscription is needed.
pub const DEFAULT_RESUBSCRIBE_INTERVAL: Duration = Duration::from_secs(60);

/// How often expired registrations and aged dedup rows are purged.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// How long a non-refreshed registration stays alive.
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// How long forwarded-event records are kept for deduplication.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Per-request timeout for outbound webhook POSTs.
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Main configuration for the bridge
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Maximum number of rows in the relay directory
    pub max_relays: usize,
    /// Interval between resubscription checks
    pub resubscribe_interval: Duration,
    /// Interval between cleanup sweeps
    pub cleanup_interval: Duration,
    /// Registrations older than this are purged
    pub expiry: Duration,
    /// Forwarded-event records older than this are purged
    pub retention: Duration,
    /// Timeout for a single webhook delivery attempt
    pub webhook_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_relays: DEFAULT_MAX_RELAYS,
            resubscribe_interval: DEFAULT_RESUBSCRIBE_INTERVAL,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            expiry: DEFAULT_EXPIRY,
            retention: DEFAULT_RETENTION,
            webhook_timeout: DEFAULT_WEBHOOK_TIMEOUT,
        }
    }
}

impl BridgeConfig {
    /// Set the relay directory bound
    pub fn with_max_relays(mut self, max_relays: usize) -> Self {
        self.max_relays = max_relays;
        self
    }

    /// Set the resubscription check interval
    pub fn with_resubscribe_interval(mut self, interval: Duration) -> Self {
        self.resubscribe_interval = interval;
        self
    }

    /// Set the cleanup sweep interval
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Set the registration expiry window
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    /// Set the forwarded-event retention window
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Set the webhook delivery timeout
    pub fn with_webhook_timeout(mut self, timeout: Duration) -> Self {
        self.webhook_timeout = timeout;
        self
    }
}
