//! Registry of webhook registrations and the forwarded-event ledger

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use nostr_sdk::Timestamp;
use std::collections::HashSet;

use crate::error::Result;

/// A webhook registration for one `(wallet_service_pubkey, app_pubkey)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Webhook {
    /// Hex-encoded 33-byte compressed secp256k1 key of the wallet service
    pub wallet_service_pubkey: String,
    /// Hex-encoded 32-byte x-only Nostr key the subscription filters on
    pub app_pubkey: String,
    /// Absolute HTTPS URL the notification is POSTed to
    pub url: String,
    /// Relay websocket URLs, first-seen order, duplicates collapsed
    pub relays: Vec<String>,
}

impl Webhook {
    /// Whether this registration is keyed by the given pair.
    pub fn matches(&self, wallet_service_pubkey: &str, app_pubkey: &str) -> bool {
        self.wallet_service_pubkey == wallet_service_pubkey && self.app_pubkey == app_pubkey
    }

    /// Collapse duplicate relay URLs, preserving first-seen order.
    pub(crate) fn dedup_relays(&mut self) {
        let mut seen = HashSet::new();
        self.relays.retain(|relay| seen.insert(relay.clone()));
    }
}

/// The sole stateful seam of the bridge.
///
/// Implementations must be safe to share across the registration
/// endpoint, the subscription manager, the dispatcher, and the sweeper.
/// Cancellation flows through the callers' task scopes.
#[async_trait]
pub trait NwcStore: Send + Sync {
    /// Upsert by `(wallet_service_pubkey, app_pubkey)`, refreshing the
    /// registration timestamp.
    async fn set(&self, webhook: Webhook) -> Result<()>;

    /// Look up a registration. `None` when absent, not an error.
    async fn get(&self, wallet_service_pubkey: &str, app_pubkey: &str) -> Result<Option<Webhook>>;

    /// Delete a registration. Idempotent.
    async fn delete(&self, wallet_service_pubkey: &str, app_pubkey: &str) -> Result<()>;

    /// App pubkeys across live registrations, sorted and deduplicated so
    /// callers can compare sets cheaply.
    async fn app_pubkeys(&self) -> Result<Vec<String>>;

    /// Relay URLs to subscribe on.
    async fn relays(&self) -> Result<Vec<String>>;

    /// Purge registrations last updated before `cutoff`.
    async fn delete_expired(&self, cutoff: Timestamp) -> Result<()>;

    /// Whether a notification for this event id was already delivered.
    async fn is_event_forwarded(&self, event_id: &str) -> Result<bool>;

    /// Record a successful delivery. Marking the same event id twice is
    /// not an error and leaves a single record.
    async fn mark_event_forwarded(
        &self,
        event_id: &str,
        wallet_service_pubkey: &str,
        app_pubkey: &str,
        webhook_url: &str,
    ) -> Result<()>;

    /// Purge forwarded-event records older than `cutoff`.
    async fn delete_old_forwarded_events(&self, cutoff: Timestamp) -> Result<()>;
}
