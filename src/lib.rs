//! A Nostr-to-webhook bridge for NWC push notifications
//!
//! Maintains a single multiplexed subscription across a fleet of Nostr
//! relays on behalf of registered wallet clients whose own processes are
//! not always online, deduplicates incoming events, and forwards a
//! compact notification to each registration's webhook so a push
//! service can wake the client. The bridge provides:
//! - A signed registration API (`POST`/`DELETE /nwc/{walletPubkey}`)
//! - Atomic resubscription when the registered pubkey set changes
//! - A forwarded-event ledger for cross-relay deduplication
//! - Background expiry of registrations and dedup records
// Performance-focused clippy lints
#![warn(
    clippy::perf,
    clippy::redundant_clone,
    clippy::inefficient_to_string,
    clippy::clone_on_copy
)]

pub mod cleanup;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod relay_pool;
pub mod signature;
pub mod store;
pub mod subscription_manager;
pub mod webhook;

pub use cleanup::CleanupService;
pub use config::BridgeConfig;
pub use dispatcher::{DispatcherStats, EventDispatcher};
pub use error::{Error, Result};
pub use handlers::{router, RegisterRequest, UnregisterRequest};
pub use relay_pool::{NostrPool, RelayPool};
pub use store::{memory::MemoryStore, postgres::PgStore, NwcStore, Webhook};
pub use subscription_manager::{RelayPoolFactory, SubscriptionManager};
pub use webhook::{WebhookClient, WebhookMessage};
