//! Owns the single multiplexed Nostr subscription
//!
//! The set of app pubkeys to subscribe for is derived from the registry
//! and changes arbitrarily; the manager re-subscribes atomically when it
//! does. A new subscription is live before the previous one is torn
//! down, keeping the window with no active subscription minimal; the
//! dedup ledger absorbs any event delivered by both.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::config::BridgeConfig;
use crate::dispatcher::{DispatcherStats, EventDispatcher};
use crate::error::{Error, Result};
use crate::relay_pool::RelayPool;
use crate::store::NwcStore;
use crate::webhook::WebhookClient;

/// Builds a fresh relay pool each time the manager starts.
pub type RelayPoolFactory = Box<dyn Fn() -> Arc<dyn RelayPool> + Send + Sync>;

/// Cancellation scope of the active subscription.
struct SubscriptionHandle {
    token: CancellationToken,
}

struct ManagerState {
    is_running: bool,
    /// Bumped on every start so a resubscribe that raced a restart can
    /// tell its snapshot is stale.
    generation: u64,
    root_token: CancellationToken,
    tracker: TaskTracker,
    pool: Option<Arc<dyn RelayPool>>,
    subscription: Option<SubscriptionHandle>,
    last_app_pubkeys: Option<Vec<String>>,
}

pub struct SubscriptionManager {
    store: Arc<dyn NwcStore>,
    config: BridgeConfig,
    webhooks: WebhookClient,
    stats: Arc<DispatcherStats>,
    pool_factory: RelayPoolFactory,
    state: Mutex<ManagerState>,
    /// Serialises whole resubscribe bodies, including the relay I/O.
    /// Start and stop never take it, so shutdown cannot wedge behind a
    /// slow relay.
    resubscribe_lock: Mutex<()>,
}

impl SubscriptionManager {
    pub fn new(
        store: Arc<dyn NwcStore>,
        config: BridgeConfig,
        pool_factory: RelayPoolFactory,
    ) -> Self {
        let webhooks = WebhookClient::new(config.webhook_timeout);
        Self {
            store,
            config,
            webhooks,
            stats: Arc::new(DispatcherStats::default()),
            pool_factory,
            state: Mutex::new(ManagerState {
                is_running: false,
                generation: 0,
                root_token: CancellationToken::new(),
                tracker: TaskTracker::new(),
                pool: None,
                subscription: None,
                last_app_pubkeys: None,
            }),
            resubscribe_lock: Mutex::new(()),
        }
    }

    /// Dispatch counters, shared across subscription generations.
    pub fn stats(&self) -> Arc<DispatcherStats> {
        Arc::clone(&self.stats)
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.is_running
    }

    /// Idempotent. Allocates a fresh root scope and relay pool and
    /// launches the resubscribe loop.
    pub async fn start(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if state.is_running {
            return;
        }

        state.generation += 1;
        state.root_token = CancellationToken::new();
        state.tracker = TaskTracker::new();
        state.pool = Some((self.pool_factory)());
        state.is_running = true;
        info!("subscription manager started");

        let manager = Arc::clone(self);
        let root_token = state.root_token.clone();
        state
            .tracker
            .spawn(async move { manager.run_resubscribe_loop(root_token).await });
    }

    /// Idempotent. Cancels the active subscription and the root scope
    /// and disconnects the relay pool. Safe to call concurrently with
    /// [`start`](Self::start).
    pub async fn stop(&self) {
        let pool = {
            let mut state = self.state.lock().await;
            if !state.is_running {
                return;
            }

            if let Some(subscription) = state.subscription.take() {
                subscription.token.cancel();
            }
            state.root_token.cancel();
            // A later start must resubscribe even when the registry is
            // unchanged.
            state.last_app_pubkeys = None;
            state.is_running = false;
            state.tracker.close();
            state.pool.take()
        };

        // Disconnect outside the lock; the pool is already detached from
        // any new state a concurrent start may build.
        if let Some(pool) = pool {
            pool.shutdown().await;
        }
        info!("subscription manager stopped");
    }

    async fn run_resubscribe_loop(self: Arc<Self>, root_token: CancellationToken) {
        loop {
            if let Err(e) = self.resubscribe().await {
                warn!("failed to resubscribe to events: {e}");
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.resubscribe_interval) => {}
                _ = root_token.cancelled() => return,
            }
        }
    }

    /// Refresh the relay subscription, but only when the registered app
    /// pubkey set differs from the last one applied — resubscribing with
    /// an unchanged set invites relay rate limits.
    pub async fn resubscribe(&self) -> Result<()> {
        let _resubscribe_guard = self.resubscribe_lock.lock().await;

        // Snapshot and gate under the state lock; the subscription
        // itself is opened with that lock released so a concurrent stop
        // never blocks on relay I/O.
        let (generation, pool, root_token, app_pubkeys, relays) = {
            let state = self.state.lock().await;
            if !state.is_running {
                return Err(Error::not_running());
            }
            let Some(pool) = state.pool.clone() else {
                return Err(Error::not_running());
            };

            let app_pubkeys = self.store.app_pubkeys().await?;
            if app_pubkeys.is_empty() {
                info!("no active app pubkeys, waiting for registrations");
                return Ok(());
            }
            if state.last_app_pubkeys.as_deref() == Some(app_pubkeys.as_slice()) {
                return Ok(());
            }

            let relays = self.store.relays().await?;
            (
                state.generation,
                pool,
                state.root_token.clone(),
                app_pubkeys,
                relays,
            )
        };

        let sub_token = root_token.child_token();
        let events = pool
            .subscribe(&relays, &app_pubkeys, sub_token.clone())
            .await?;

        let mut state = self.state.lock().await;
        if !state.is_running || state.generation != generation {
            // Stopped (or restarted) while the subscription was opening.
            sub_token.cancel();
            return Err(Error::not_running());
        }

        let dispatcher = EventDispatcher::new(
            Arc::clone(&self.store),
            self.webhooks.clone(),
            Arc::clone(&self.stats),
        );
        let forwarder_token = sub_token.clone();
        let root_token = state.root_token.clone();
        let tracker = state.tracker.clone();
        state
            .tracker
            .spawn(async move { dispatcher.run(events, forwarder_token, root_token, tracker).await });

        // The replacement is live; now drop the previous subscription.
        if let Some(previous) = state.subscription.replace(SubscriptionHandle { token: sub_token }) {
            previous.token.cancel();
        }

        info!(
            "resubscribed to {} relays for {} app pubkeys",
            relays.len(),
            app_pubkeys.len()
        );
        state.last_app_pubkeys = Some(app_pubkeys);
        Ok(())
    }
}
