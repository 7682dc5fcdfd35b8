//! Postgres registry backend
//!
//! Pubkeys are stored as raw bytes; all timestamps live in the database
//! so the sweeper's cutoffs compare against `NOW()`-stamped rows. The
//! relay directory is a bounded ring: new relay URLs take the id
//! `count(relays) % max_relays`, displacing whichever URL held that id.

use async_trait::async_trait;
use nostr_sdk::Timestamp;
use sqlx::{PgPool, Row};
use std::collections::HashMap;

use super::{NwcStore, Webhook};
use crate::error::{Error, Result};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS nwc_webhooks (
        id BIGSERIAL PRIMARY KEY,
        url TEXT NOT NULL,
        user_pubkey BYTEA NOT NULL,
        app_pubkey BYTEA NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        UNIQUE (user_pubkey, app_pubkey)
    )",
    "CREATE TABLE IF NOT EXISTS nwc_relays (
        id INT PRIMARY KEY,
        url TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS nwc_webhooks_relays (
        webhook_id BIGINT NOT NULL REFERENCES nwc_webhooks (id) ON DELETE CASCADE,
        relay_id INT NOT NULL REFERENCES nwc_relays (id),
        PRIMARY KEY (webhook_id, relay_id)
    )",
    "CREATE TABLE IF NOT EXISTS nwc_forwarded_events (
        event_id TEXT PRIMARY KEY,
        user_pubkey BYTEA NOT NULL,
        app_pubkey BYTEA NOT NULL,
        webhook_url TEXT NOT NULL,
        forwarded_at TIMESTAMPTZ NOT NULL
    )",
];

/// Registry store backed by a Postgres pool.
pub struct PgStore {
    pool: PgPool,
    max_relays: usize,
}

impl PgStore {
    pub fn new(pool: PgPool, max_relays: usize) -> Self {
        Self { pool, max_relays }
    }

    /// Create the bridge's tables when missing. Idempotent.
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
        }
        Ok(())
    }
}

#[async_trait]
impl NwcStore for PgStore {
    async fn set(&self, mut webhook: Webhook) -> Result<()> {
        webhook.dedup_relays();
        let user_pubkey = decode_pubkey("wallet service", &webhook.wallet_service_pubkey)?;
        let app_pubkey = decode_pubkey("app", &webhook.app_pubkey)?;

        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let row = sqlx::query(
            "INSERT INTO nwc_webhooks (url, user_pubkey, app_pubkey, updated_at)
             VALUES ($1, $2, $3, NOW())
             ON CONFLICT (user_pubkey, app_pubkey) DO UPDATE SET url = $1, updated_at = NOW()
             RETURNING id",
        )
        .bind(&webhook.url)
        .bind(&user_pubkey)
        .bind(&app_pubkey)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error)?;
        let webhook_id: i64 = row.try_get("id").map_err(db_error)?;

        let mut relays = relays_by_url(&mut tx).await?;
        for relay_url in &webhook.relays {
            let relay_id = match relays.get(relay_url) {
                Some(id) => *id,
                None => {
                    let id = (relays.len() % self.max_relays) as i32;
                    sqlx::query(
                        "INSERT INTO nwc_relays (id, url)
                         VALUES ($1, $2)
                         ON CONFLICT (id) DO UPDATE SET url = EXCLUDED.url",
                    )
                    .bind(id)
                    .bind(relay_url)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error)?;
                    relays.insert(relay_url.clone(), id);
                    id
                }
            };
            sqlx::query(
                "INSERT INTO nwc_webhooks_relays (webhook_id, relay_id)
                 VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(webhook_id)
            .bind(relay_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }

        tx.commit().await.map_err(db_error)
    }

    async fn get(&self, wallet_service_pubkey: &str, app_pubkey: &str) -> Result<Option<Webhook>> {
        let user_pubkey_bytes = decode_pubkey("wallet service", wallet_service_pubkey)?;
        let app_pubkey_bytes = decode_pubkey("app", app_pubkey)?;

        let row = sqlx::query(
            "SELECT id, url FROM nwc_webhooks WHERE user_pubkey = $1 AND app_pubkey = $2",
        )
        .bind(&user_pubkey_bytes)
        .bind(&app_pubkey_bytes)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let webhook_id: i64 = row.try_get("id").map_err(db_error)?;
        let url: String = row.try_get("url").map_err(db_error)?;

        let relay_rows = sqlx::query(
            "SELECT nr.url
             FROM nwc_webhooks_relays nwr
             INNER JOIN nwc_relays nr ON nwr.relay_id = nr.id
             WHERE nwr.webhook_id = $1",
        )
        .bind(webhook_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut relays = Vec::with_capacity(relay_rows.len());
        for relay_row in relay_rows {
            relays.push(relay_row.try_get::<String, _>("url").map_err(db_error)?);
        }

        Ok(Some(Webhook {
            wallet_service_pubkey: wallet_service_pubkey.to_string(),
            app_pubkey: app_pubkey.to_string(),
            url,
            relays,
        }))
    }

    async fn delete(&self, wallet_service_pubkey: &str, app_pubkey: &str) -> Result<()> {
        let user_pubkey = decode_pubkey("wallet service", wallet_service_pubkey)?;
        let app_pubkey = decode_pubkey("app", app_pubkey)?;
        sqlx::query("DELETE FROM nwc_webhooks WHERE user_pubkey = $1 AND app_pubkey = $2")
            .bind(&user_pubkey)
            .bind(&app_pubkey)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn app_pubkeys(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT DISTINCT encode(app_pubkey, 'hex') AS app_pubkey
             FROM nwc_webhooks
             ORDER BY app_pubkey",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.into_iter()
            .map(|row| row.try_get("app_pubkey").map_err(db_error))
            .collect()
    }

    async fn relays(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT url FROM nwc_relays ORDER BY url")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        rows.into_iter()
            .map(|row| row.try_get("url").map_err(db_error))
            .collect()
    }

    async fn delete_expired(&self, cutoff: Timestamp) -> Result<()> {
        sqlx::query("DELETE FROM nwc_webhooks WHERE updated_at < to_timestamp($1)")
            .bind(cutoff.as_u64() as f64)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn is_event_forwarded(&self, event_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM nwc_forwarded_events WHERE event_id = $1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.is_some())
    }

    async fn mark_event_forwarded(
        &self,
        event_id: &str,
        wallet_service_pubkey: &str,
        app_pubkey: &str,
        webhook_url: &str,
    ) -> Result<()> {
        let user_pubkey = decode_pubkey("wallet service", wallet_service_pubkey)?;
        let app_pubkey = decode_pubkey("app", app_pubkey)?;
        sqlx::query(
            "INSERT INTO nwc_forwarded_events
                 (event_id, user_pubkey, app_pubkey, webhook_url, forwarded_at)
             VALUES ($1, $2, $3, $4, NOW())
             ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(event_id)
        .bind(&user_pubkey)
        .bind(&app_pubkey)
        .bind(webhook_url)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn delete_old_forwarded_events(&self, cutoff: Timestamp) -> Result<()> {
        sqlx::query("DELETE FROM nwc_forwarded_events WHERE forwarded_at < to_timestamp($1)")
            .bind(cutoff.as_u64() as f64)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

async fn relays_by_url(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> Result<HashMap<String, i32>> {
    let rows = sqlx::query("SELECT id, url FROM nwc_relays")
        .fetch_all(&mut **tx)
        .await
        .map_err(db_error)?;
    let mut relays = HashMap::with_capacity(rows.len());
    for row in rows {
        let id: i32 = row.try_get("id").map_err(db_error)?;
        let url: String = row.try_get("url").map_err(db_error)?;
        relays.insert(url, id);
    }
    Ok(relays)
}

fn decode_pubkey(label: &str, pubkey_hex: &str) -> Result<Vec<u8>> {
    hex::decode(pubkey_hex).map_err(|_| Error::bad_request(format!("invalid {label} pubkey")))
}

fn db_error(err: sqlx::Error) -> Error {
    Error::database(err.to_string())
}
