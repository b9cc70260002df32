//! Executes recovery decisions with throttling.
//!
//! The dispatcher is the only place recovery side effects happen, so the
//! guards live here too: one recovery at a time, a cooldown between
//! attempts, and a circuit that opens after repeated failures. A forced
//! dispatch (user-initiated) bypasses the circuit and cooldown but never
//! the one-at-a-time rule.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::api::{ApiClient, UserProfile};
use crate::error::{AuthError, AuthErrorKind, RecoveryAction};
use crate::refresh::TokenRefreshManager;

const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another recovery attempt holds the dispatch slot.
    AlreadyRunning,
    /// Too many consecutive failures; only a forced dispatch may proceed.
    CircuitOpen,
    /// The previous attempt was too recent.
    CoolingDown,
    /// The error's own retry budget is spent.
    RetriesExhausted,
    /// The error's recovery action is `None`.
    NothingToDo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryOutcome {
    /// Refresh succeeded; the new token is already in the store.
    Recovered {
        token: String,
        user: Option<UserProfile>,
    },
    /// Session revoked on the server (best effort) and cleared locally.
    LoggedOut,
    /// Local credentials wiped without touching the server.
    TokenCleared,
    Skipped(SkipReason),
    /// The action ran and failed; credentials were cleared as fallback.
    Failed(AuthErrorKind),
}

struct DispatchState {
    in_progress: bool,
    consecutive_failures: u32,
    last_attempt_at: Option<Instant>,
}

pub struct RecoveryDispatcher {
    refresh: Arc<TokenRefreshManager>,
    api: ApiClient,
    failure_threshold: u32,
    cooldown: Duration,
    state: Mutex<DispatchState>,
}

impl RecoveryDispatcher {
    pub fn new(refresh: Arc<TokenRefreshManager>, api: ApiClient) -> Self {
        Self::with_limits(refresh, api, DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN)
    }

    pub fn with_limits(
        refresh: Arc<TokenRefreshManager>,
        api: ApiClient,
        failure_threshold: u32,
        cooldown: Duration,
    ) -> Self {
        Self {
            refresh,
            api,
            failure_threshold,
            cooldown,
            state: Mutex::new(DispatchState {
                in_progress: false,
                consecutive_failures: 0,
                last_attempt_at: None,
            }),
        }
    }

    /// Probes the guards without taking the dispatch slot: would this
    /// error's action run as-is right now? An exhausted retry budget is a
    /// refusal here; `dispatch` still accepts such an error but degrades
    /// its `Refresh` to `ClearToken` instead of re-running the exchange.
    pub async fn should_attempt_recovery(&self, error: &AuthError) -> Result<(), SkipReason> {
        if error.retry_count > error.max_retries {
            return Err(SkipReason::RetriesExhausted);
        }
        let state = self.state.lock().await;
        Self::check_guards(&state, self.failure_threshold, self.cooldown, false)
    }

    fn check_guards(
        state: &DispatchState,
        threshold: u32,
        cooldown: Duration,
        forced: bool,
    ) -> Result<(), SkipReason> {
        if state.in_progress {
            return Err(SkipReason::AlreadyRunning);
        }
        if forced {
            return Ok(());
        }
        if state.consecutive_failures >= threshold {
            return Err(SkipReason::CircuitOpen);
        }
        if let Some(last) = state.last_attempt_at {
            if last.elapsed() < cooldown {
                return Err(SkipReason::CoolingDown);
            }
        }
        Ok(())
    }

    /// Runs the error's recovery action, subject to every guard.
    pub async fn dispatch(&self, error: &AuthError) -> RecoveryOutcome {
        self.dispatch_inner(error, false).await
    }

    /// User-initiated recovery: ignores the circuit and the cooldown.
    pub async fn dispatch_forced(&self, error: &AuthError) -> RecoveryOutcome {
        self.dispatch_inner(error, true).await
    }

    async fn dispatch_inner(&self, error: &AuthError, forced: bool) -> RecoveryOutcome {
        {
            let mut state = self.state.lock().await;
            if let Err(reason) =
                Self::check_guards(&state, self.failure_threshold, self.cooldown, forced)
            {
                return RecoveryOutcome::Skipped(reason);
            }
            state.in_progress = true;
            state.last_attempt_at = Some(Instant::now());
        }

        let outcome = self.run_action(error).await;

        let mut state = self.state.lock().await;
        state.in_progress = false;
        match outcome {
            RecoveryOutcome::Failed(_) => state.consecutive_failures += 1,
            RecoveryOutcome::Skipped(_) => {}
            _ => state.consecutive_failures = 0,
        }
        outcome
    }

    async fn run_action(&self, error: &AuthError) -> RecoveryOutcome {
        match error.recovery_action {
            RecoveryAction::None => RecoveryOutcome::Skipped(SkipReason::NothingToDo),
            RecoveryAction::Refresh => {
                if !error.should_retry {
                    // The retry budget for this failure is spent; keeping
                    // the stale token around would just repeat the loop.
                    self.clear_local();
                    return RecoveryOutcome::TokenCleared;
                }
                let outcome = self.refresh.refresh().await;
                if outcome.success {
                    match outcome.token {
                        Some(token) => RecoveryOutcome::Recovered {
                            token,
                            user: outcome.user,
                        },
                        None => {
                            self.clear_local();
                            RecoveryOutcome::Failed(AuthErrorKind::RefreshFailed)
                        }
                    }
                } else {
                    let kind = outcome.error_kind.unwrap_or(AuthErrorKind::RefreshFailed);
                    tracing::warn!(?kind, "recovery refresh failed, clearing credentials");
                    self.clear_local();
                    RecoveryOutcome::Failed(kind)
                }
            }
            RecoveryAction::ClearToken => {
                self.clear_local();
                RecoveryOutcome::TokenCleared
            }
            RecoveryAction::Logout => {
                if let Some(token) = self.api.store().load_token() {
                    if let Err(err) = self.api.logout(&token).await {
                        tracing::debug!(error = %err, "server-side logout failed, clearing anyway");
                    }
                }
                self.clear_local();
                RecoveryOutcome::LoggedOut
            }
        }
    }

    fn clear_local(&self) {
        self.refresh.clear_scheduled();
        self.api.store().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{CredentialStore, MemoryCredentialStore};
    use crate::error::classify;
    use crate::refresh::BackoffPolicy;

    fn dispatcher(threshold: u32, cooldown: Duration) -> (RecoveryDispatcher, Arc<MemoryCredentialStore>) {
        let store = Arc::new(MemoryCredentialStore::new());
        // Port 9 (discard) refuses connections, so refresh attempts fail
        // at the transport layer without a server.
        let api = ApiClient::new("http://127.0.0.1:9", store.clone());
        let policy = BackoffPolicy {
            max_attempts: 1,
            ..BackoffPolicy::default()
        };
        let (refresh, _events) = TokenRefreshManager::new(api.clone(), policy);
        (
            RecoveryDispatcher::with_limits(refresh, api, threshold, cooldown),
            store,
        )
    }

    #[tokio::test]
    async fn network_errors_dispatch_to_nothing() {
        let (dispatcher, _store) = dispatcher(3, Duration::ZERO);
        let error = classify(AuthErrorKind::NetworkError, "offline", None);
        assert_eq!(
            dispatcher.dispatch(&error).await,
            RecoveryOutcome::Skipped(SkipReason::NothingToDo)
        );
    }

    #[tokio::test]
    async fn clear_token_wipes_the_store() {
        let (dispatcher, store) = dispatcher(3, Duration::ZERO);
        store.save_token("stale");
        let error = classify(AuthErrorKind::DecodeError, "undecodable", None);
        assert_eq!(dispatcher.dispatch(&error).await, RecoveryOutcome::TokenCleared);
        assert!(store.load_token().is_none());
    }

    #[tokio::test]
    async fn exhausted_refresh_degrades_to_clearing() {
        let (dispatcher, store) = dispatcher(3, Duration::ZERO);
        store.save_token("stale");
        let mut error = classify(AuthErrorKind::TokenExpired, "expired", None);
        error.should_retry = false;
        assert_eq!(dispatcher.dispatch(&error).await, RecoveryOutcome::TokenCleared);
        assert!(store.load_token().is_none());
    }

    #[tokio::test]
    async fn circuit_opens_after_repeated_failures_and_forced_bypasses() {
        let (dispatcher, store) = dispatcher(2, Duration::ZERO);
        let error = classify(AuthErrorKind::TokenExpired, "expired", None);

        for _ in 0..2 {
            store.save_token("stale");
            assert!(matches!(
                dispatcher.dispatch(&error).await,
                RecoveryOutcome::Failed(AuthErrorKind::NetworkError)
            ));
        }

        store.save_token("stale");
        assert_eq!(
            dispatcher.dispatch(&error).await,
            RecoveryOutcome::Skipped(SkipReason::CircuitOpen)
        );
        // Forced dispatch still runs (and still fails against a dead host).
        assert!(matches!(
            dispatcher.dispatch_forced(&error).await,
            RecoveryOutcome::Failed(AuthErrorKind::NetworkError)
        ));
    }

    #[tokio::test]
    async fn cooldown_throttles_back_to_back_attempts() {
        let (dispatcher, store) = dispatcher(10, Duration::from_secs(30));
        let error = classify(AuthErrorKind::TokenExpired, "expired", None);

        store.save_token("stale");
        assert!(matches!(
            dispatcher.dispatch(&error).await,
            RecoveryOutcome::Failed(_)
        ));
        assert_eq!(
            dispatcher.dispatch(&error).await,
            RecoveryOutcome::Skipped(SkipReason::CoolingDown)
        );
        assert_eq!(
            dispatcher.should_attempt_recovery(&error).await,
            Err(SkipReason::CoolingDown)
        );
    }

    #[tokio::test]
    async fn spent_retry_budget_refuses_the_probe() {
        let (dispatcher, _store) = dispatcher(3, Duration::ZERO);
        let first = classify(AuthErrorKind::TokenExpired, "expired", None);
        let second = classify(AuthErrorKind::TokenExpired, "expired", Some(&first));
        let third = classify(AuthErrorKind::TokenExpired, "expired", Some(&second));

        assert!(dispatcher.should_attempt_recovery(&first).await.is_ok());
        assert!(dispatcher.should_attempt_recovery(&second).await.is_ok());
        assert_eq!(
            dispatcher.should_attempt_recovery(&third).await,
            Err(SkipReason::RetriesExhausted)
        );
    }
}
