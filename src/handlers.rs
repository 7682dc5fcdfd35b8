//! HTTP registration endpoint
//!
//! Two routes, both parameterised by the wallet-service pubkey in the
//! path. Every mutation is authenticated by a recoverable secp256k1
//! signature that must resolve to that pubkey; the storage key, however,
//! always comes from the request body.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::signature;
use crate::store::{NwcStore, Webhook};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn NwcStore>,
}

/// Routes for webhook registration, rooted at `/nwc/{walletPubkey}`.
pub fn router(store: Arc<dyn NwcStore>) -> Router {
    Router::new()
        .route("/nwc/{wallet_pubkey}", post(register).delete(unregister))
        .with_state(AppState { store })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub webhook_url: String,
    pub user_pubkey: String,
    pub app_pubkey: String,
    pub relays: Vec<String>,
    pub signature: String,
}

impl RegisterRequest {
    /// The canonical string clients sign: webhook URL, user pubkey, app
    /// pubkey, and the relay list in its `Debug` rendering, joined by `-`.
    pub fn signed_message(&self) -> String {
        format!(
            "{}-{}-{}-{:?}",
            self.webhook_url, self.user_pubkey, self.app_pubkey, self.relays
        )
    }
}

async fn register(
    State(state): State<AppState>,
    Path(wallet_pubkey): Path<String>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match body {
        Ok(Json(request)) => request,
        Err(e) => {
            warn!("failed to decode registration request: {e}");
            return (StatusCode::BAD_REQUEST, "invalid json".to_string());
        }
    };

    if let Err(e) = signature::verify(&request.signed_message(), &request.signature, &wallet_pubkey)
    {
        warn!("failed to verify registration request: {e}");
        return (StatusCode::UNAUTHORIZED, "invalid signature".to_string());
    }

    let webhook = Webhook {
        wallet_service_pubkey: request.user_pubkey.clone(),
        app_pubkey: request.app_pubkey,
        url: request.webhook_url,
        relays: request.relays,
    };
    if let Err(e) = state.store.set(webhook).await {
        warn!("failed to persist nwc details: {e}");
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }

    info!("registration added: pubkey: {}", request.user_pubkey);
    (StatusCode::OK, "Pubkey registered successfully".to_string())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnregisterRequest {
    pub time: i64,
    pub user_pubkey: String,
    pub app_pubkey: String,
    pub signature: String,
}

impl UnregisterRequest {
    /// The canonical string clients sign: time, user pubkey, and app
    /// pubkey joined by `-`.
    pub fn signed_message(&self) -> String {
        format!("{}-{}-{}", self.time, self.user_pubkey, self.app_pubkey)
    }
}

async fn unregister(
    State(state): State<AppState>,
    Path(wallet_pubkey): Path<String>,
    body: Result<Json<UnregisterRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match body {
        Ok(Json(request)) => request,
        Err(e) => {
            warn!("failed to decode unregistration request: {e}");
            return (StatusCode::BAD_REQUEST, "invalid json".to_string());
        }
    };

    if let Err(e) = signature::verify(&request.signed_message(), &request.signature, &wallet_pubkey)
    {
        warn!("failed to verify unregistration request: {e}");
        return (StatusCode::UNAUTHORIZED, "invalid signature".to_string());
    }

    // The delete is keyed by the body's pubkeys; the URL pubkey only
    // authenticates the request.
    if let Err(e) = state
        .store
        .delete(&request.user_pubkey, &request.app_pubkey)
        .await
    {
        warn!("failed to delete nwc webhook: {e}");
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }

    info!("registration deleted: pubkey: {}", request.user_pubkey);
    (
        StatusCode::OK,
        "Pubkey unregistered successfully".to_string(),
    )
}
