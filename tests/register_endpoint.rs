//! Integration tests for the registration endpoint

use nwc_bridge::{signature, MemoryStore, NwcStore};
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use serde_json::json;
use std::sync::Arc;

fn wallet_identity(seed: u8) -> (SecretKey, String) {
    let secret_key = SecretKey::from_slice(&[seed; 32]).unwrap();
    let pubkey = PublicKey::from_secret_key(&Secp256k1::new(), &secret_key);
    (secret_key, hex::encode(pubkey.serialize()))
}

async fn spawn_bridge(store: Arc<dyn NwcStore>) -> String {
    let app = nwc_bridge::router(store);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn register_body(
    secret_key: &SecretKey,
    wallet_pubkey: &str,
    app_pubkey: &str,
    webhook_url: &str,
    relays: &[&str],
) -> serde_json::Value {
    let relays: Vec<String> = relays.iter().map(|r| r.to_string()).collect();
    let message = format!("{webhook_url}-{wallet_pubkey}-{app_pubkey}-{relays:?}");
    json!({
        "webhookUrl": webhook_url,
        "userPubkey": wallet_pubkey,
        "appPubkey": app_pubkey,
        "relays": relays,
        "signature": signature::sign(secret_key, &message),
    })
}

#[tokio::test]
async fn register_persists_a_signed_registration() {
    let store = Arc::new(MemoryStore::new());
    let base = spawn_bridge(store.clone()).await;
    let (secret_key, wallet_pubkey) = wallet_identity(1);

    let body = register_body(
        &secret_key,
        &wallet_pubkey,
        "beef",
        "https://push.example/hook",
        &["wss://r1.example", "wss://r2.example"],
    );

    let response = reqwest::Client::new()
        .post(format!("{base}/nwc/{wallet_pubkey}"))
        .json(&body)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.text().await.unwrap(),
        "Pubkey registered successfully"
    );

    let webhook = store.get(&wallet_pubkey, "beef").await.unwrap().unwrap();
    assert_eq!(webhook.url, "https://push.example/hook");
    assert_eq!(webhook.relays, vec!["wss://r1.example", "wss://r2.example"]);
}

#[tokio::test]
async fn register_rejects_signature_from_another_key() {
    let store = Arc::new(MemoryStore::new());
    let base = spawn_bridge(store.clone()).await;
    let (_, wallet_pubkey) = wallet_identity(2);
    let (other_secret, _) = wallet_identity(3);

    // Signed by a key that does not match the path pubkey.
    let body = register_body(
        &other_secret,
        &wallet_pubkey,
        "beef",
        "https://push.example/hook",
        &["wss://r1.example"],
    );

    let response = reqwest::Client::new()
        .post(format!("{base}/nwc/{wallet_pubkey}"))
        .json(&body)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
    assert!(store.get(&wallet_pubkey, "beef").await.unwrap().is_none());
}

#[tokio::test]
async fn register_rejects_malformed_json() {
    let store = Arc::new(MemoryStore::new());
    let base = spawn_bridge(store).await;
    let (_, wallet_pubkey) = wallet_identity(4);

    let response = reqwest::Client::new()
        .post(format!("{base}/nwc/{wallet_pubkey}"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn unregister_deletes_by_body_pubkeys() {
    let store = Arc::new(MemoryStore::new());
    let base = spawn_bridge(store.clone()).await;
    let (secret_key, wallet_pubkey) = wallet_identity(5);
    let client = reqwest::Client::new();

    let body = register_body(
        &secret_key,
        &wallet_pubkey,
        "beef",
        "https://push.example/hook",
        &["wss://r1.example"],
    );
    client
        .post(format!("{base}/nwc/{wallet_pubkey}"))
        .json(&body)
        .send()
        .await
        .unwrap();

    let time = 1_700_000_000i64;
    let message = format!("{time}-{wallet_pubkey}-beef");
    let response = client
        .delete(format!("{base}/nwc/{wallet_pubkey}"))
        .json(&json!({
            "time": time,
            "userPubkey": wallet_pubkey,
            "appPubkey": "beef",
            "signature": signature::sign(&secret_key, &message),
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.text().await.unwrap(),
        "Pubkey unregistered successfully"
    );
    assert!(store.get(&wallet_pubkey, "beef").await.unwrap().is_none());
}

#[tokio::test]
async fn unregister_rejects_tampered_message() {
    let store = Arc::new(MemoryStore::new());
    let base = spawn_bridge(store.clone()).await;
    let (secret_key, wallet_pubkey) = wallet_identity(6);
    let client = reqwest::Client::new();

    let body = register_body(
        &secret_key,
        &wallet_pubkey,
        "beef",
        "https://push.example/hook",
        &["wss://r1.example"],
    );
    client
        .post(format!("{base}/nwc/{wallet_pubkey}"))
        .json(&body)
        .send()
        .await
        .unwrap();

    // Signature covers a different app pubkey than the body carries.
    let time = 1_700_000_000i64;
    let message = format!("{time}-{wallet_pubkey}-cafe");
    let response = client
        .delete(format!("{base}/nwc/{wallet_pubkey}"))
        .json(&json!({
            "time": time,
            "userPubkey": wallet_pubkey,
            "appPubkey": "beef",
            "signature": signature::sign(&secret_key, &message),
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
    assert!(store.get(&wallet_pubkey, "beef").await.unwrap().is_some());
}
