//! Background expiry of registrations and dedup records

use nostr_sdk::Timestamp;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::BridgeConfig;
use crate::store::NwcStore;

/// Periodically purges expired registrations and aged forwarded-event
/// records.
pub struct CleanupService {
    store: Arc<dyn NwcStore>,
    config: BridgeConfig,
}

impl CleanupService {
    pub fn new(store: Arc<dyn NwcStore>, config: BridgeConfig) -> Self {
        Self { store, config }
    }

    /// Sweep on every tick until `token` is cancelled.
    pub async fn run(&self, token: CancellationToken) {
        loop {
            self.sweep_once().await;
            tokio::select! {
                _ = tokio::time::sleep(self.config.cleanup_interval) => {}
                _ = token.cancelled() => return,
            }
        }
    }

    /// One sweep. The two deletions are independent; a failed one is
    /// logged and retried on the next tick.
    async fn sweep_once(&self) {
        let now = Timestamp::now().as_u64();

        let registration_cutoff = Timestamp::from(now.saturating_sub(self.config.expiry.as_secs()));
        if let Err(e) = self.store.delete_expired(registration_cutoff).await {
            warn!("failed to remove expired registrations before {registration_cutoff}: {e}");
        }

        let ledger_cutoff = Timestamp::from(now.saturating_sub(self.config.retention.as_secs()));
        if let Err(e) = self.store.delete_old_forwarded_events(ledger_cutoff).await {
            warn!("failed to remove old forwarded events before {ledger_cutoff}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::Webhook;

    fn webhook(wsp: &str, app: &str) -> Webhook {
        Webhook {
            wallet_service_pubkey: wsp.to_string(),
            app_pubkey: app.to_string(),
            url: "https://push.example/hook".to_string(),
            relays: vec!["wss://r1.example".to_string()],
        }
    }

    #[tokio::test]
    async fn sweep_purges_expired_registrations_and_old_ledger_rows() {
        let store = Arc::new(MemoryStore::new());
        let now = Timestamp::now().as_u64();
        let eight_days_ago = Timestamp::from(now - 8 * 24 * 60 * 60);

        store.set_with_updated_at(webhook("02aa", "beef"), eight_days_ago);
        store.set(webhook("02bb", "cafe")).await.unwrap();
        store.mark_forwarded_at("f00d", eight_days_ago);
        store
            .mark_event_forwarded("d00f", "02bb", "cafe", "https://push.example/hook")
            .await
            .unwrap();

        let service = CleanupService::new(Arc::clone(&store) as Arc<dyn NwcStore>, BridgeConfig::default());
        service.sweep_once().await;

        assert!(store.get("02aa", "beef").await.unwrap().is_none());
        assert!(store.get("02bb", "cafe").await.unwrap().is_some());
        assert!(!store.is_event_forwarded("f00d").await.unwrap());
        assert!(store.is_event_forwarded("d00f").await.unwrap());
    }

    #[tokio::test]
    async fn run_exits_on_cancellation() {
        let store = Arc::new(MemoryStore::new());
        let service = CleanupService::new(store, BridgeConfig::default());
        let token = CancellationToken::new();

        let cancel = token.clone();
        let handle = tokio::spawn(async move { service.run(cancel).await });
        token.cancel();
        handle.await.unwrap();
    }
}
