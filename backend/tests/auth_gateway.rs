use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use uuid::Uuid;

use reviewdesk_backend::{
    error::AppError,
    middleware::auth::{
        bearer_token_from_headers, ensure_not_blocked, unauthorized_for_token_error,
    },
    models::user::{User, UserRole, UserStatus},
    utils::jwt::{create_access_token, verify_access_token, verify_access_token_with_grace, Claims},
};

const SECRET: &str = "test-secret";

fn expired_token(seconds_past_expiry: i64) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: "user-1".into(),
        email: "alice@example.com".into(),
        role: "reviewer".into(),
        exp: now - seconds_past_expiry,
        iat: now - seconds_past_expiry - 3600,
        jti: Uuid::new_v4().to_string(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_ref()),
    )
    .expect("encode token")
}

async fn status_and_code(err: AppError) -> (StatusCode, String) {
    let response = err.into_response();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json: serde_json::Value = serde_json::from_slice(&bytes).expect("json body");
    (status, json["code"].as_str().unwrap_or_default().to_string())
}

#[tokio::test]
async fn missing_authorization_header_is_401_token_missing() {
    let headers = HeaderMap::new();
    let err = bearer_token_from_headers(&headers).expect_err("no header should fail");
    let (status, code) = status_and_code(err).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(code, "TOKEN_MISSING");
}

#[tokio::test]
async fn non_bearer_scheme_is_401_token_missing() {
    let mut headers = HeaderMap::new();
    headers.insert(
        axum::http::header::AUTHORIZATION,
        HeaderValue::from_static("Basic dXNlcjpwYXNz"),
    );
    let err = bearer_token_from_headers(&headers).expect_err("wrong scheme should fail");
    let (status, code) = status_and_code(err).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(code, "TOKEN_MISSING");
}

#[tokio::test]
async fn expired_token_maps_to_401_token_expired() {
    // Past the default 60 s verification leeway.
    let token = expired_token(600);
    let err = verify_access_token(&token, SECRET).expect_err("expired token must fail");
    let (status, code) = status_and_code(unauthorized_for_token_error(&err)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(code, "TOKEN_EXPIRED");
}

#[tokio::test]
async fn malformed_token_maps_to_401_malformed_token() {
    let err = verify_access_token("not-a-jwt", SECRET).expect_err("garbage must fail");
    let (status, code) = status_and_code(unauthorized_for_token_error(&err)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(code, "MALFORMED_TOKEN");
}

#[tokio::test]
async fn bad_signature_maps_to_401_token_invalid() {
    let (token, _) = create_access_token(
        "user-1".into(),
        "alice@example.com".into(),
        "reviewer".into(),
        "a-different-secret",
        1,
    )
    .expect("create token");
    let err = verify_access_token(&token, SECRET).expect_err("wrong signature must fail");
    let (status, code) = status_and_code(unauthorized_for_token_error(&err)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(code, "TOKEN_INVALID");
}

#[tokio::test]
async fn blocked_user_is_403_regardless_of_token_validity() {
    let mut user = User::new(
        "bob@example.com".into(),
        "hash".into(),
        "Bob Example".into(),
        UserRole::Reviewer,
    );
    user.status = UserStatus::Blocked;
    user.blocked_at = Some(Utc::now());
    user.blocked_by = Some("admin-1".into());

    let err = ensure_not_blocked(&user).expect_err("blocked user must be rejected");
    let (status, code) = status_and_code(err).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(code, "ACCOUNT_BLOCKED");
}

#[test]
fn active_user_passes_the_block_check() {
    let user = User::new(
        "carol@example.com".into(),
        "hash".into(),
        "Carol Example".into(),
        UserRole::Admin,
    );
    assert!(ensure_not_blocked(&user).is_ok());
}

#[test]
fn refresh_grace_accepts_recently_expired_tokens_only() {
    let token = expired_token(120);
    // Within a 300 s grace window the exchange may proceed.
    verify_access_token_with_grace(&token, SECRET, 300).expect("inside grace window");
    // Outside it the client must log in again.
    verify_access_token_with_grace(&token, SECRET, 30).expect_err("outside grace window");
}
