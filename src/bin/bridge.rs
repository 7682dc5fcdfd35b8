//! Batteries-included bridge binary
//!
//! All configuration is done via environment variables. Registrations
//! persist to Postgres when `DATABASE_URL` is set and to process memory
//! otherwise.

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use nwc_bridge::{
    BridgeConfig, CleanupService, MemoryStore, NostrPool, NwcStore, PgStore, RelayPool,
    SubscriptionManager,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

async fn health(State(manager): State<Arc<SubscriptionManager>>) -> impl IntoResponse {
    let stats = manager.stats();
    axum::Json(serde_json::json!({
        "status": "ok",
        "subscription_running": manager.is_running().await,
        "events_delivered": stats.delivered(),
        "duplicates_dropped": stats.duplicate_drops(),
        "events_without_target": stats.no_target_drops(),
        "invalid_signatures": stats.invalid_signature_drops(),
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    // Read configuration from environment
    let port: u16 = env_parse("BRIDGE_PORT", 8080);
    let bind = env_or("BRIDGE_BIND", "0.0.0.0");
    let config = BridgeConfig::default()
        .with_max_relays(env_parse("NWC_MAX_RELAYS", 256))
        .with_resubscribe_interval(Duration::from_secs(env_parse(
            "RESUBSCRIBE_INTERVAL_SECS",
            60,
        )))
        .with_cleanup_interval(Duration::from_secs(env_parse("CLEANUP_INTERVAL_SECS", 600)))
        .with_expiry(Duration::from_secs(
            env_parse("EXPIRY_DAYS", 7u64) * 24 * 60 * 60,
        ))
        .with_retention(Duration::from_secs(
            env_parse("RETENTION_DAYS", 7u64) * 24 * 60 * 60,
        ))
        .with_webhook_timeout(Duration::from_secs(env_parse("WEBHOOK_TIMEOUT_SECS", 30)));

    let store: Arc<dyn NwcStore> = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = sqlx::PgPool::connect(&database_url).await?;
            let store = PgStore::new(pool, config.max_relays);
            store.migrate().await?;
            tracing::info!("using Postgres registry store");
            Arc::new(store)
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, registrations are held in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let manager = Arc::new(SubscriptionManager::new(
        Arc::clone(&store),
        config.clone(),
        Box::new(|| Arc::new(NostrPool::new()) as Arc<dyn RelayPool>),
    ));
    manager.start().await;

    let shutdown_token = CancellationToken::new();
    let task_tracker = TaskTracker::new();

    let cleanup = CleanupService::new(Arc::clone(&store), config);
    let cleanup_token = shutdown_token.child_token();
    task_tracker.spawn(async move { cleanup.run(cleanup_token).await });

    let health_routes = Router::new()
        .route("/health", get(health))
        .with_state(Arc::clone(&manager));
    let app = nwc_bridge::router(store).merge(health_routes);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("nwc bridge listening on {addr}");

    // Graceful shutdown
    let shutdown_handle = shutdown_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install signal handler");
        tracing::info!("Shutdown signal received, closing...");
        shutdown_handle.cancel();
    });

    let server_token = shutdown_token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            server_token.cancelled().await;
        })
        .await?;

    manager.stop().await;
    task_tracker.close();
    task_tracker.wait().await;

    tracing::info!("All tasks completed. Goodbye!");
    Ok(())
}
