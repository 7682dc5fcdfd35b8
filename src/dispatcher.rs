//! Event fan-in: verify, deduplicate, route, deliver
//!
//! One forwarder runs per live subscription (transiently two while the
//! manager swaps subscriptions). Deliveries run detached so a slow
//! webhook cannot stall the stream; they are bound to the root scope,
//! not the subscription scope, so a resubscribe never aborts a POST
//! already in flight.

use nostr_sdk::prelude::Event;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::store::NwcStore;
use crate::webhook::WebhookClient;

/// Drop and delivery counters, shared across subscription generations.
#[derive(Debug, Default)]
pub struct DispatcherStats {
    delivered: AtomicU64,
    duplicate_drops: AtomicU64,
    no_target_drops: AtomicU64,
    invalid_signature_drops: AtomicU64,
}

impl DispatcherStats {
    /// Events delivered and recorded in the ledger.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Events dropped because their id was already in the ledger.
    pub fn duplicate_drops(&self) -> u64 {
        self.duplicate_drops.load(Ordering::Relaxed)
    }

    /// Events dropped for carrying no `p` tag.
    pub fn no_target_drops(&self) -> u64 {
        self.no_target_drops.load(Ordering::Relaxed)
    }

    /// Events dropped for failing signature verification.
    pub fn invalid_signature_drops(&self) -> u64 {
        self.invalid_signature_drops.load(Ordering::Relaxed)
    }
}

/// Consumes one multiplexed event stream and forwards notifications.
pub struct EventDispatcher {
    store: Arc<dyn NwcStore>,
    webhooks: WebhookClient,
    stats: Arc<DispatcherStats>,
}

impl EventDispatcher {
    pub fn new(
        store: Arc<dyn NwcStore>,
        webhooks: WebhookClient,
        stats: Arc<DispatcherStats>,
    ) -> Self {
        Self {
            store,
            webhooks,
            stats,
        }
    }

    /// Run until the stream disconnects or either scope is cancelled.
    /// Deliveries spawn on `tracker` under `root_token`.
    pub async fn run(
        self,
        events: flume::Receiver<Event>,
        sub_token: CancellationToken,
        root_token: CancellationToken,
        tracker: TaskTracker,
    ) {
        loop {
            tokio::select! {
                _ = sub_token.cancelled() => break,
                _ = root_token.cancelled() => break,
                event = events.recv_async() => match event {
                    Ok(event) => self.dispatch(event, &root_token, &tracker).await,
                    Err(_) => {
                        debug!("subscription stream closed");
                        break;
                    }
                },
            }
        }
    }

    async fn dispatch(&self, event: Event, root_token: &CancellationToken, tracker: &TaskTracker) {
        let event_id = event.id.to_hex();
        debug!("got incoming event {event_id}");

        if let Err(e) = event.verify() {
            self.stats
                .invalid_signature_drops
                .fetch_add(1, Ordering::Relaxed);
            warn!("failed to verify signature for event {event_id}: {e}");
            return;
        }

        let Some(wallet_service_pubkey) = first_p_tag(&event) else {
            self.stats.no_target_drops.fetch_add(1, Ordering::Relaxed);
            warn!("failed to identify user for event {event_id}: no wallet service pubkey provided");
            return;
        };

        match self.store.is_event_forwarded(&event_id).await {
            Ok(true) => {
                self.stats.duplicate_drops.fetch_add(1, Ordering::Relaxed);
                debug!("event {event_id} already forwarded, skipping duplicate");
                return;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("failed to check if event {event_id} was already forwarded: {e}");
                return;
            }
        }

        let app_pubkey = event.pubkey.to_hex();
        let webhook = match self.store.get(&wallet_service_pubkey, &app_pubkey).await {
            Ok(Some(webhook)) => webhook,
            Ok(None) => {
                debug!("webhook not found for event {event_id}, skipping");
                return;
            }
            Err(e) => {
                warn!("failed to retrieve webhook for event {event_id}: {e}");
                return;
            }
        };

        let store = Arc::clone(&self.store);
        let client = self.webhooks.clone();
        let stats = Arc::clone(&self.stats);
        let token = root_token.clone();
        tracker.spawn(async move {
            debug!("forwarding event {event_id} to notify service");
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("delivery of event {event_id} cancelled by shutdown");
                }
                delivery = client.notify(&webhook.url, &event_id) => match delivery {
                    Ok(()) => {
                        // Mark only after a confirmed 2xx so a failed POST is
                        // retried by the next duplicate from another relay.
                        match store
                            .mark_event_forwarded(
                                &event_id,
                                &wallet_service_pubkey,
                                &app_pubkey,
                                &webhook.url,
                            )
                            .await
                        {
                            Ok(()) => {
                                stats.delivered.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(e) => {
                                warn!("failed to mark event {event_id} as forwarded: {e}");
                            }
                        }
                    }
                    Err(e) => {
                        warn!("failed to send webhook message for event {event_id}: {e}");
                    }
                },
            }
        });
    }
}

/// Value of the first `p` tag: the wallet-service pubkey the event is
/// addressed to.
fn first_p_tag(event: &Event) -> Option<String> {
    event.tags.iter().find_map(|tag| {
        let values = tag.as_slice();
        (values.len() >= 2 && values[0] == "p").then(|| values[1].clone())
    })
}
