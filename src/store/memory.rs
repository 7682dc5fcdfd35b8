//! In-memory registry backend
//!
//! Backs tests and single-node deployments without a database. Expiry
//! and retention sweeps work against real timestamps so the cleanup
//! service behaves the same as with the relational backend.

use async_trait::async_trait;
use nostr_sdk::Timestamp;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{NwcStore, Webhook};
use crate::error::Result;

struct Registration {
    webhook: Webhook,
    updated_at: Timestamp,
}

/// Registry store held entirely in process memory.
#[derive(Default)]
pub struct MemoryStore {
    registrations: RwLock<Vec<Registration>>,
    forwarded: RwLock<HashMap<String, Timestamp>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn set_with_updated_at(&self, mut webhook: Webhook, updated_at: Timestamp) {
        webhook.dedup_relays();
        self.registrations.write().push(Registration {
            webhook,
            updated_at,
        });
    }

    #[cfg(test)]
    pub(crate) fn mark_forwarded_at(&self, event_id: &str, forwarded_at: Timestamp) {
        self.forwarded
            .write()
            .entry(event_id.to_string())
            .or_insert(forwarded_at);
    }
}

#[async_trait]
impl NwcStore for MemoryStore {
    async fn set(&self, mut webhook: Webhook) -> Result<()> {
        webhook.dedup_relays();
        let mut registrations = self.registrations.write();
        let updated_at = Timestamp::now();
        for registration in registrations.iter_mut() {
            if registration
                .webhook
                .matches(&webhook.wallet_service_pubkey, &webhook.app_pubkey)
            {
                registration.webhook = webhook;
                registration.updated_at = updated_at;
                return Ok(());
            }
        }
        registrations.push(Registration {
            webhook,
            updated_at,
        });
        Ok(())
    }

    async fn get(&self, wallet_service_pubkey: &str, app_pubkey: &str) -> Result<Option<Webhook>> {
        Ok(self
            .registrations
            .read()
            .iter()
            .find(|r| r.webhook.matches(wallet_service_pubkey, app_pubkey))
            .map(|r| r.webhook.clone()))
    }

    async fn delete(&self, wallet_service_pubkey: &str, app_pubkey: &str) -> Result<()> {
        self.registrations
            .write()
            .retain(|r| !r.webhook.matches(wallet_service_pubkey, app_pubkey));
        Ok(())
    }

    async fn app_pubkeys(&self) -> Result<Vec<String>> {
        let mut pubkeys: Vec<String> = self
            .registrations
            .read()
            .iter()
            .map(|r| r.webhook.app_pubkey.clone())
            .collect();
        pubkeys.sort();
        pubkeys.dedup();
        Ok(pubkeys)
    }

    async fn relays(&self) -> Result<Vec<String>> {
        let mut relays: Vec<String> = self
            .registrations
            .read()
            .iter()
            .flat_map(|r| r.webhook.relays.iter().cloned())
            .collect();
        relays.sort();
        relays.dedup();
        Ok(relays)
    }

    async fn delete_expired(&self, cutoff: Timestamp) -> Result<()> {
        self.registrations
            .write()
            .retain(|r| r.updated_at >= cutoff);
        Ok(())
    }

    async fn is_event_forwarded(&self, event_id: &str) -> Result<bool> {
        Ok(self.forwarded.read().contains_key(event_id))
    }

    async fn mark_event_forwarded(
        &self,
        event_id: &str,
        _wallet_service_pubkey: &str,
        _app_pubkey: &str,
        _webhook_url: &str,
    ) -> Result<()> {
        self.forwarded
            .write()
            .entry(event_id.to_string())
            .or_insert_with(Timestamp::now);
        Ok(())
    }

    async fn delete_old_forwarded_events(&self, cutoff: Timestamp) -> Result<()> {
        self.forwarded
            .write()
            .retain(|_, forwarded_at| *forwarded_at >= cutoff);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webhook(wsp: &str, app: &str, url: &str, relays: &[&str]) -> Webhook {
        Webhook {
            wallet_service_pubkey: wsp.to_string(),
            app_pubkey: app.to_string(),
            url: url.to_string(),
            relays: relays.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let store = MemoryStore::new();
        store
            .set(webhook(
                "02aa",
                "beef",
                "https://push.example/hook",
                &["wss://r1", "wss://r1", "wss://r2"],
            ))
            .await
            .unwrap();

        let found = store.get("02aa", "beef").await.unwrap().unwrap();
        assert_eq!(found.url, "https://push.example/hook");
        assert_eq!(found.relays, vec!["wss://r1", "wss://r2"]);

        assert!(store.get("02aa", "other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_twice_upserts_single_row() {
        let store = MemoryStore::new();
        store
            .set(webhook("02aa", "beef", "https://one.example", &["wss://r1"]))
            .await
            .unwrap();
        store
            .set(webhook("02aa", "beef", "https://two.example", &["wss://r2"]))
            .await
            .unwrap();

        let found = store.get("02aa", "beef").await.unwrap().unwrap();
        assert_eq!(found.url, "https://two.example");
        assert_eq!(store.app_pubkeys().await.unwrap(), vec!["beef"]);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new();
        store
            .set(webhook("02aa", "beef", "https://push.example", &["wss://r1"]))
            .await
            .unwrap();

        store.delete("02aa", "beef").await.unwrap();
        store.delete("02aa", "beef").await.unwrap();
        assert!(store.get("02aa", "beef").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn app_pubkeys_are_sorted_and_deduplicated() {
        let store = MemoryStore::new();
        store
            .set(webhook("02aa", "cafe", "https://a.example", &["wss://r1"]))
            .await
            .unwrap();
        store
            .set(webhook("02bb", "cafe", "https://b.example", &["wss://r2"]))
            .await
            .unwrap();
        store
            .set(webhook("02aa", "beef", "https://c.example", &["wss://r1"]))
            .await
            .unwrap();

        assert_eq!(store.app_pubkeys().await.unwrap(), vec!["beef", "cafe"]);
    }

    #[tokio::test]
    async fn relays_union_across_registrations() {
        let store = MemoryStore::new();
        store
            .set(webhook(
                "02aa",
                "beef",
                "https://a.example",
                &["wss://r2", "wss://r1"],
            ))
            .await
            .unwrap();
        store
            .set(webhook("02bb", "cafe", "https://b.example", &["wss://r2"]))
            .await
            .unwrap();

        assert_eq!(store.relays().await.unwrap(), vec!["wss://r1", "wss://r2"]);
    }

    #[tokio::test]
    async fn mark_event_forwarded_is_idempotent() {
        let store = MemoryStore::new();
        assert!(!store.is_event_forwarded("f00d").await.unwrap());

        store
            .mark_event_forwarded("f00d", "02aa", "beef", "https://push.example")
            .await
            .unwrap();
        store
            .mark_event_forwarded("f00d", "02aa", "beef", "https://push.example")
            .await
            .unwrap();

        assert!(store.is_event_forwarded("f00d").await.unwrap());
    }

    #[tokio::test]
    async fn expiry_removes_only_stale_rows() {
        let store = MemoryStore::new();
        let now = Timestamp::now();
        let stale = Timestamp::from(now.as_u64() - 8 * 24 * 60 * 60);

        store.set_with_updated_at(
            webhook("02aa", "beef", "https://old.example", &["wss://r1"]),
            stale,
        );
        store
            .set(webhook("02bb", "cafe", "https://new.example", &["wss://r1"]))
            .await
            .unwrap();

        let cutoff = Timestamp::from(now.as_u64() - 7 * 24 * 60 * 60);
        store.delete_expired(cutoff).await.unwrap();

        assert!(store.get("02aa", "beef").await.unwrap().is_none());
        assert!(store.get("02bb", "cafe").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn retention_removes_only_old_ledger_rows() {
        let store = MemoryStore::new();
        let now = Timestamp::now();
        store.mark_forwarded_at("old", Timestamp::from(now.as_u64() - 8 * 24 * 60 * 60));
        store
            .mark_event_forwarded("new", "02aa", "beef", "https://push.example")
            .await
            .unwrap();

        let cutoff = Timestamp::from(now.as_u64() - 7 * 24 * 60 * 60);
        store.delete_old_forwarded_events(cutoff).await.unwrap();

        assert!(!store.is_event_forwarded("old").await.unwrap());
        assert!(store.is_event_forwarded("new").await.unwrap());
    }
}
