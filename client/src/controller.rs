//! The session state machine. One controller per session context owns
//! the current phase, profile, and token snapshot, and is the only writer
//! of all three; the refresh manager and recovery dispatcher report back
//! through it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::api::{ApiClient, CredentialStore, UserProfile};
use crate::codec;
use crate::error::{classify, classify_refresh_failure, AuthError, AuthErrorKind};
use crate::recovery::{RecoveryDispatcher, RecoveryOutcome};
use crate::refresh::{BackoffPolicy, RefreshEvent, TokenRefreshManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Uninitialized,
    Initializing,
    Authenticated,
    Unauthenticated,
    Recovering,
}

/// Snapshot of the last validation pass over the current token.
#[derive(Debug, Clone)]
pub struct TokenState {
    pub token: String,
    pub is_valid: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_validated_at: DateTime<Utc>,
    pub validation_error: Option<AuthErrorKind>,
}

impl TokenState {
    fn from_validation(token: &str) -> Self {
        let validation = codec::validate(token);
        Self {
            token: token.to_string(),
            is_valid: validation.is_valid,
            expires_at: validation
                .payload
                .as_ref()
                .and_then(codec::expiration_time),
            last_validated_at: Utc::now(),
            validation_error: validation.error_kind,
        }
    }
}

pub struct AuthSessionController {
    api: ApiClient,
    refresh: Arc<TokenRefreshManager>,
    recovery: RecoveryDispatcher,
    events: mpsc::UnboundedReceiver<RefreshEvent>,
    phase: AuthPhase,
    user: Option<UserProfile>,
    token_state: Option<TokenState>,
    last_error: Option<AuthError>,
    /// Generation of the check we armed; events stamped otherwise are
    /// leftovers from a token we no longer hold.
    generation: u64,
}

impl AuthSessionController {
    pub fn new(base_url: impl Into<String>, store: Arc<dyn CredentialStore>) -> Self {
        Self::with_backoff(base_url, store, BackoffPolicy::default())
    }

    pub fn with_backoff(
        base_url: impl Into<String>,
        store: Arc<dyn CredentialStore>,
        policy: BackoffPolicy,
    ) -> Self {
        let api = ApiClient::new(base_url, store);
        let (refresh, events) = TokenRefreshManager::new(api.clone(), policy);
        let recovery = RecoveryDispatcher::new(refresh.clone(), api.clone());
        Self {
            api,
            refresh,
            recovery,
            events,
            phase: AuthPhase::Uninitialized,
            user: None,
            token_state: None,
            last_error: None,
            generation: 0,
        }
    }

    pub fn phase(&self) -> AuthPhase {
        self.phase
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase == AuthPhase::Authenticated
    }

    pub fn current_user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn token_state(&self) -> Option<&TokenState> {
        self.token_state.as_ref()
    }

    pub fn last_error(&self) -> Option<&AuthError> {
        self.last_error.as_ref()
    }

    /// Restores a session from the credential store, if one survives
    /// validation and server verification.
    pub async fn initialize(&mut self) {
        self.phase = AuthPhase::Initializing;

        let Some(token) = self.api.store().load_token() else {
            self.phase = AuthPhase::Unauthenticated;
            return;
        };

        let validation = codec::validate(&token);
        match validation.error_kind {
            None => self.verify_with_server(&token).await,
            Some(AuthErrorKind::TokenExpired) => {
                // Locally expired but possibly inside the server's grace
                // window; try the exchange before giving up.
                let outcome = self.refresh.refresh().await;
                if outcome.success {
                    self.adopt_refresh(outcome.token, outcome.user);
                } else {
                    let error = classify_refresh_failure(
                        "token exchange failed during restore",
                        outcome.should_retry,
                        self.last_error.as_ref(),
                    );
                    if error.should_retry {
                        // Transport failure: the token may still be inside
                        // the server's grace window next time, so keep it.
                        self.last_error = Some(error);
                        self.phase = AuthPhase::Unauthenticated;
                    } else {
                        self.fail_with(error).await;
                    }
                }
            }
            Some(kind) => {
                let error = classify(kind, kind.to_string(), self.last_error.as_ref());
                self.fail_with(error).await;
            }
        }
    }

    async fn verify_with_server(&mut self, token: &str) {
        match self.api.verify(token).await {
            Ok(body) => {
                self.user = Some(body.user);
                self.token_state = Some(TokenState::from_validation(token));
                self.last_error = None;
                self.phase = AuthPhase::Authenticated;
                self.generation = self.refresh.schedule_check(token);
            }
            Err(err) => {
                let kind = err.auth_kind();
                if kind == AuthErrorKind::NetworkError {
                    // The server being unreachable says nothing about the
                    // token; keep it so a later restore can succeed.
                    self.last_error =
                        Some(classify(kind, err.to_string(), self.last_error.as_ref()));
                    self.phase = AuthPhase::Unauthenticated;
                } else {
                    let error = classify(kind, err.to_string(), self.last_error.as_ref());
                    self.fail_with(error).await;
                }
            }
        }
    }

    async fn fail_with(&mut self, error: AuthError) {
        self.phase = AuthPhase::Recovering;
        let outcome = self.recovery.dispatch(&error).await;
        self.last_error = Some(error);
        match outcome {
            RecoveryOutcome::Recovered { token, user } => self.adopt_refresh(Some(token), user),
            _ => {
                self.user = None;
                self.token_state = None;
                self.phase = AuthPhase::Unauthenticated;
            }
        }
    }

    /// Installs a freshly exchanged token and re-arms the expiry check.
    fn adopt_refresh(&mut self, token: Option<String>, user: Option<UserProfile>) {
        let Some(token) = token else {
            self.user = None;
            self.token_state = None;
            self.phase = AuthPhase::Unauthenticated;
            return;
        };
        if let Some(user) = user {
            self.user = Some(user);
        }
        self.token_state = Some(TokenState::from_validation(&token));
        self.last_error = None;
        self.phase = AuthPhase::Authenticated;
        self.generation = self.refresh.schedule_check(&token);
    }

    /// Authenticates with credentials. The returned token is validated
    /// before it is trusted; a server handing back an undecodable token
    /// leaves the controller unauthenticated.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<UserProfile, AuthError> {
        let body = match self.api.login(email, password).await {
            Ok(body) => body,
            Err(err) => {
                let error = classify(err.auth_kind(), err.to_string(), None);
                self.last_error = Some(error.clone());
                self.phase = AuthPhase::Unauthenticated;
                return Err(error);
            }
        };

        let validation = codec::validate(&body.token);
        if let Some(kind) = validation.error_kind {
            self.api.store().clear();
            let error = classify(kind, "login returned an unusable token", None);
            self.last_error = Some(error.clone());
            self.phase = AuthPhase::Unauthenticated;
            return Err(error);
        }

        self.user = Some(body.user.clone());
        self.token_state = Some(TokenState::from_validation(&body.token));
        self.last_error = None;
        self.phase = AuthPhase::Authenticated;
        self.generation = self.refresh.schedule_check(&body.token);
        Ok(body.user)
    }

    /// Ends the session. The server call is best effort; local state is
    /// cleared regardless.
    pub async fn logout(&mut self) {
        self.refresh.clear_scheduled();
        if let Some(token) = self.api.store().load_token() {
            if let Err(err) = self.api.logout(&token).await {
                tracing::debug!(error = %err, "server-side logout failed, clearing anyway");
            }
        }
        self.api.store().clear();
        self.user = None;
        self.token_state = None;
        self.last_error = None;
        self.phase = AuthPhase::Unauthenticated;
    }

    /// Drains pending scheduled-check outcomes.
    pub async fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event).await;
        }
    }

    /// Applies one scheduled-check outcome. Events from a generation we
    /// did not arm are dropped.
    pub async fn handle_event(&mut self, event: RefreshEvent) {
        if event.generation != self.generation
            || event.generation != self.refresh.current_generation()
        {
            tracing::debug!(generation = event.generation, "dropping stale refresh event");
            return;
        }

        if event.outcome.success {
            self.adopt_refresh(event.outcome.token, event.outcome.user);
            return;
        }

        let error = classify_refresh_failure(
            "scheduled token exchange failed",
            event.outcome.should_retry,
            self.last_error.as_ref(),
        );
        if error.should_retry {
            // Transient; keep the session up. Consecutive failures keep
            // counting through `last_error`, so this cannot loop forever.
            self.last_error = Some(error);
            return;
        }
        self.fail_with(error).await;
    }

    /// User-initiated retry of the last failure. Bypasses the circuit
    /// breaker and cooldown.
    pub async fn recover_from_error(&mut self) -> Option<RecoveryOutcome> {
        let error = self.last_error.clone()?;
        self.phase = AuthPhase::Recovering;
        let outcome = self.recovery.dispatch_forced(&error).await;
        match &outcome {
            RecoveryOutcome::Recovered { token, user } => {
                self.adopt_refresh(Some(token.clone()), user.clone());
            }
            RecoveryOutcome::Skipped(_) => {
                // Nothing ran; restore the phase the error left us in.
                self.phase = if self.token_state.as_ref().is_some_and(|t| t.is_valid) {
                    AuthPhase::Authenticated
                } else {
                    AuthPhase::Unauthenticated
                };
            }
            _ => {
                self.user = None;
                self.token_state = None;
                self.phase = AuthPhase::Unauthenticated;
            }
        }
        Some(outcome)
    }
}
