use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use httpmock::prelude::*;
use serde_json::json;

use reviewdesk_client::{
    ApiClient, BackoffPolicy, CredentialStore, MemoryCredentialStore, TokenRefreshManager,
};

/// A token with the right shape and claims; the client never checks the
/// signature, so "sig" is enough.
fn shaped_token(sub: &str, exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        json!({
            "sub": sub,
            "email": format!("{sub}@example.com"),
            "role": "reviewer",
            "iat": exp - 3600,
            "exp": exp,
        })
        .to_string(),
    );
    format!("{header}.{payload}.sig")
}

fn user_body(sub: &str) -> serde_json::Value {
    json!({
        "id": sub,
        "email": format!("{sub}@example.com"),
        "full_name": "Alice Example",
        "role": "reviewer",
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_refreshes_share_one_exchange() {
    let server = MockServer::start_async().await;
    let fresh = shaped_token("u1", Utc::now().timestamp() + 3600);
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/auth/refresh");
            then.status(200)
                .json_body(json!({ "token": fresh, "user": user_body("u1") }));
        })
        .await;

    let store = Arc::new(MemoryCredentialStore::new());
    store.save_token(&shaped_token("u1", Utc::now().timestamp() + 60));
    let api = ApiClient::new(server.base_url(), store.clone());
    let (manager, _events) = TokenRefreshManager::new(api, BackoffPolicy::default());

    let (a, b) = tokio::join!(manager.refresh(), manager.refresh());

    mock.assert_hits_async(1).await;
    assert!(a.success && b.success);
    assert_eq!(a.token, b.token);
    assert_eq!(a.token.as_deref(), Some(fresh.as_str()));
    // The winning token landed in the store as well.
    assert_eq!(store.load_token().as_deref(), Some(fresh.as_str()));
}

#[tokio::test(flavor = "multi_thread")]
async fn scheduled_check_on_an_expiring_token_fires_and_reports_its_generation() {
    let server = MockServer::start_async().await;
    let fresh = shaped_token("u1", Utc::now().timestamp() + 3600);
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/auth/refresh");
            then.status(200)
                .json_body(json!({ "token": fresh, "user": user_body("u1") }));
        })
        .await;

    let store = Arc::new(MemoryCredentialStore::new());
    // Inside the lead window, so the check fires immediately.
    let near_expiry = shaped_token("u1", Utc::now().timestamp() + 60);
    store.save_token(&near_expiry);
    let api = ApiClient::new(server.base_url(), store);
    let (manager, mut events) = TokenRefreshManager::new(api, BackoffPolicy::default());

    let generation = manager.schedule_check(&near_expiry);
    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event within deadline")
        .expect("channel open");

    assert_eq!(event.generation, generation);
    assert!(event.outcome.success);
    assert_eq!(event.outcome.token.as_deref(), Some(fresh.as_str()));
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_caller_does_not_strand_the_in_flight_slot() {
    let server = MockServer::start_async().await;
    let fresh = shaped_token("u1", Utc::now().timestamp() + 3600);
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/auth/refresh");
            then.status(200)
                .delay(Duration::from_millis(1500))
                .json_body(json!({ "token": fresh, "user": user_body("u1") }));
        })
        .await;

    let store = Arc::new(MemoryCredentialStore::new());
    store.save_token(&shaped_token("u1", Utc::now().timestamp() + 60));
    let api = ApiClient::new(server.base_url(), store.clone());
    let (manager, _events) = TokenRefreshManager::new(api, BackoffPolicy::default());

    // Abort a caller while its exchange is mid-flight, the way an aborted
    // scheduled check or a dropped future would.
    let waiting = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.refresh().await })
    };
    tokio::time::sleep(Duration::from_millis(300)).await;
    waiting.abort();

    // The exchange keeps running detached; the next caller joins it and
    // still gets the fresh token.
    let outcome = manager.refresh().await;
    assert!(outcome.success);
    assert_eq!(outcome.token.as_deref(), Some(fresh.as_str()));
    mock.assert_hits_async(1).await;
    assert_eq!(store.load_token().as_deref(), Some(fresh.as_str()));
    assert!(!manager.is_refresh_in_progress());
}

#[tokio::test(flavor = "multi_thread")]
async fn server_rejection_is_not_retried() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/auth/refresh");
            then.status(401)
                .json_body(json!({ "error": "session revoked", "code": "SESSION_REVOKED" }));
        })
        .await;

    let store = Arc::new(MemoryCredentialStore::new());
    store.save_token(&shaped_token("u1", Utc::now().timestamp() + 60));
    let api = ApiClient::new(server.base_url(), store);
    let (manager, _events) = TokenRefreshManager::new(
        api,
        BackoffPolicy {
            max_attempts: 3,
            ..BackoffPolicy::default()
        },
    );

    let outcome = manager.refresh().await;
    // One request only: a rejected token stays rejected.
    mock.assert_hits_async(1).await;
    assert!(!outcome.success);
    assert!(!outcome.should_retry);
}
