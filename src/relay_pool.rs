//! Seam between the subscription manager and the Nostr relay client
//!
//! The relay client library is an external collaborator, so the manager
//! talks to it through the [`RelayPool`] trait. The production
//! implementation wraps `nostr_sdk`'s pool; tests substitute a scripted
//! fake.

use async_trait::async_trait;
use nostr_sdk::prelude::{
    Event, Filter, PublicKey, RelayOptions, RelayPoolNotification, SubscribeOptions,
    SubscriptionId,
};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// A multiplexed subscription source over a fleet of relays.
#[async_trait]
pub trait RelayPool: Send + Sync {
    /// Open a multiplexed subscription for events authored by `authors`
    /// across `relays`. The returned receiver yields events until
    /// `token` is cancelled or the pool shuts down; a disconnected
    /// receiver means the upstream closed.
    async fn subscribe(
        &self,
        relays: &[String],
        authors: &[String],
        token: CancellationToken,
    ) -> Result<flume::Receiver<Event>>;

    /// Disconnect from all relays.
    async fn shutdown(&self);
}

/// Relay pool backed by `nostr_sdk`.
pub struct NostrPool {
    pool: nostr_sdk::RelayPool,
    sub_counter: AtomicU64,
}

impl NostrPool {
    pub fn new() -> Self {
        Self {
            pool: nostr_sdk::RelayPool::default(),
            sub_counter: AtomicU64::new(0),
        }
    }
}

impl Default for NostrPool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelayPool for NostrPool {
    async fn subscribe(
        &self,
        relays: &[String],
        authors: &[String],
        token: CancellationToken,
    ) -> Result<flume::Receiver<Event>> {
        for relay_url in relays {
            if let Err(e) = self.pool.add_relay(relay_url, RelayOptions::default()).await {
                warn!("failed to add relay {relay_url}: {e}");
            }
        }
        self.pool.connect().await;

        let mut parsed = Vec::with_capacity(authors.len());
        for pubkey_hex in authors {
            match pubkey_hex.parse::<PublicKey>() {
                Ok(pubkey) => parsed.push(pubkey),
                Err(e) => warn!("skipping unparseable app pubkey {pubkey_hex}: {e}"),
            }
        }
        if parsed.is_empty() {
            return Err(Error::relay_pool("no usable app pubkeys to subscribe for"));
        }
        let filter = Filter::new().authors(parsed);

        // Relays may skip re-delivery when a subscription id is reused
        // with a new filter, so every subscription gets a fresh id.
        let seq = self.sub_counter.fetch_add(1, Ordering::Relaxed);
        let sub_id = SubscriptionId::new(format!("nwc-bridge-{seq}"));
        self.pool
            .subscribe_with_id(sub_id.clone(), filter, SubscribeOptions::default())
            .await
            .map_err(|e| Error::relay_pool(e.to_string()))?;

        let (tx, rx) = flume::bounded(1024);
        let mut notifications = self.pool.notifications();
        let pool = self.pool.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    notification = notifications.recv() => match notification {
                        Ok(RelayPoolNotification::Event { subscription_id, event, .. })
                            if subscription_id == sub_id =>
                        {
                            if tx.send_async(*event).await.is_err() {
                                break;
                            }
                        }
                        Ok(RelayPoolNotification::Shutdown) => break,
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("notification stream lagged, skipped {skipped} messages");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            // Tear the subscription down at the relays once its scope ends.
            let _ = pool.unsubscribe(sub_id).await;
            debug!("relay subscription bridge exited");
        });

        Ok(rx)
    }

    async fn shutdown(&self) {
        self.pool.disconnect().await;
    }
}
