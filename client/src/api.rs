//! HTTP surface of the reviewdesk API plus credential persistence.
//!
//! [`ApiClient`] is a thin typed wrapper over `reqwest`; it never decides
//! what a failure means, it only reports one as [`ApiError`] and lets the
//! classification layer map it onto a recovery decision.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AuthErrorKind;

/// Where the bearer token lives between runs. The in-memory store covers
/// tests and short-lived tools; embedders provide their own for keychains
/// or config files.
pub trait CredentialStore: Send + Sync {
    fn load_token(&self) -> Option<String>;
    fn save_token(&self, token: &str);
    fn clear(&self);
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load_token(&self) -> Option<String> {
        self.token.lock().ok().and_then(|guard| guard.clone())
    }

    fn save_token(&self, token: &str) {
        if let Ok(mut guard) = self.token.lock() {
            *guard = Some(token.to_string());
        }
    }

    fn clear(&self) {
        if let Ok(mut guard) = self.token.lock() {
            *guard = None;
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyResponse {
    pub user: UserProfile,
    pub token_identifier: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: String,
    pub last_used_at: Option<String>,
    pub is_current: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogoutAllResponse {
    pub sessions_revoked: u64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
    #[serde(default)]
    code: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The server answered success but the body did not deserialize; the
    /// token passed, the profile did not.
    #[error("response body could not be decoded: {0}")]
    Decode(reqwest::Error),
    #[error("server rejected the request ({status}): {message}")]
    Server {
        status: u16,
        code: String,
        message: String,
    },
}

impl ApiError {
    /// Maps the wire-level failure onto the client error taxonomy.
    pub fn auth_kind(&self) -> AuthErrorKind {
        match self {
            ApiError::Transport(_) => AuthErrorKind::NetworkError,
            ApiError::Decode(_) => AuthErrorKind::ProfileLoadFailed,
            ApiError::Server { status, code, .. } => {
                if *status >= 500 {
                    return AuthErrorKind::NetworkError;
                }
                match AuthErrorKind::from_code(code) {
                    Some(kind) => kind,
                    None if *status == 401 || *status == 403 => AuthErrorKind::TokenInvalid,
                    None => AuthErrorKind::NetworkError,
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn CredentialStore>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn read_error(response: reqwest::Response) -> ApiError {
        let status = response.status().as_u16();
        match response.json::<ApiErrorBody>().await {
            Ok(body) => ApiError::Server {
                status,
                code: body.code,
                message: body.error,
            },
            Err(_) => ApiError::Server {
                status,
                code: String::new(),
                message: "unreadable error body".to_string(),
            },
        }
    }

    async fn expect_ok(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Self::read_error(response).await)
        }
    }

    /// Deserializes a successful response. A connection dropped mid-body
    /// is still a transport failure; an intact body that does not parse
    /// is a profile-load failure.
    async fn read_body<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        response.json::<T>().await.map_err(|err| {
            if err.is_decode() {
                ApiError::Decode(err)
            } else {
                ApiError::Transport(err)
            }
        })
    }

    /// Authenticates and persists the returned token into the store.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let response = self
            .http
            .post(self.url("/api/auth/login"))
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        let body: LoginResponse = Self::read_body(Self::expect_ok(response).await?).await?;
        self.store.save_token(&body.token);
        Ok(body)
    }

    /// Exchanges the given token for a fresh one. The caller passes the
    /// token explicitly so an in-flight refresh is pinned to the token it
    /// started with, not whatever the store holds by the time it lands.
    pub async fn refresh(&self, current_token: &str) -> Result<LoginResponse, ApiError> {
        let response = self
            .http
            .post(self.url("/api/auth/refresh"))
            .json(&serde_json::json!({ "token": current_token }))
            .send()
            .await?;
        let body: LoginResponse = Self::read_body(Self::expect_ok(response).await?).await?;
        self.store.save_token(&body.token);
        Ok(body)
    }

    pub async fn verify(&self, token: &str) -> Result<VerifyResponse, ApiError> {
        let response = self
            .http
            .get(self.url("/api/auth/verify"))
            .bearer_auth(token)
            .send()
            .await?;
        Self::read_body(Self::expect_ok(response).await?).await
    }

    /// Revokes the current session on the server. Local credential
    /// clearing is the caller's job; it happens whether or not this call
    /// lands.
    pub async fn logout(&self, token: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.url("/api/auth/logout"))
            .bearer_auth(token)
            .send()
            .await?;
        Self::expect_ok(response).await?;
        Ok(())
    }

    pub async fn logout_all(&self, token: &str) -> Result<LogoutAllResponse, ApiError> {
        let response = self
            .http
            .post(self.url("/api/auth/logout-all"))
            .bearer_auth(token)
            .send()
            .await?;
        Self::read_body(Self::expect_ok(response).await?).await
    }

    pub async fn sessions(&self, token: &str) -> Result<Vec<SessionInfo>, ApiError> {
        let response = self
            .http
            .get(self.url("/api/sessions"))
            .bearer_auth(token)
            .send()
            .await?;
        Self::read_body(Self::expect_ok(response).await?).await
    }

    pub async fn revoke_session(&self, token: &str, session_id: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .delete(self.url(&format!("/api/sessions/{session_id}")))
            .bearer_auth(token)
            .send()
            .await?;
        Self::expect_ok(response).await?;
        Ok(())
    }
}
