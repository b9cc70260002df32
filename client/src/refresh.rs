//! Token refresh with dedup, retry, and expiry scheduling.
//!
//! Concurrency contract: at most one refresh exchange is in flight per
//! manager. The exchange itself runs in a detached task; every caller,
//! first or late, follows it on a watch channel. A caller being cancelled
//! (an aborted scheduled check, a dropped future) therefore cannot strand
//! the in-flight slot: the detached task always clears it before
//! publishing. Scheduled checks are generation-stamped so a timer armed
//! for an old token can never clobber state derived from a newer one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::api::{ApiClient, UserProfile};
use crate::codec;
use crate::error::AuthErrorKind;

/// How long before expiry a scheduled check fires.
const LEAD_WINDOW_SECS: i64 = 300;

/// Result of one refresh attempt, shared verbatim with every follower.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub success: bool,
    pub token: Option<String>,
    pub user: Option<UserProfile>,
    pub error_kind: Option<AuthErrorKind>,
    /// Whether the cause of the failure is transient. True for transport
    /// failures, exhaustion of this call's backoff budget included; a
    /// later attempt may still land once the network is back. False for
    /// server rejections, which retrying cannot change.
    pub should_retry: bool,
}

impl RefreshOutcome {
    fn succeeded(token: String, user: UserProfile) -> Self {
        Self {
            success: true,
            token: Some(token),
            user: Some(user),
            error_kind: None,
            should_retry: false,
        }
    }

    fn failed(kind: AuthErrorKind, should_retry: bool) -> Self {
        Self {
            success: false,
            token: None,
            user: None,
            error_kind: Some(kind),
            should_retry,
        }
    }
}

/// Exponential backoff between transport-level retries.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            max_attempts: 3,
        }
    }
}

impl BackoffPolicy {
    /// Delay after the given 1-based attempt: base, 2x, 4x, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Outcome of a scheduled check, stamped with the generation of the
/// timer that produced it.
#[derive(Debug, Clone)]
pub struct RefreshEvent {
    pub generation: u64,
    pub outcome: RefreshOutcome,
}

type InFlightSlot = Arc<Mutex<Option<watch::Receiver<Option<RefreshOutcome>>>>>;

pub struct TokenRefreshManager {
    api: ApiClient,
    policy: BackoffPolicy,
    in_flight: InFlightSlot,
    timer: std::sync::Mutex<Option<JoinHandle<()>>>,
    generation: AtomicU64,
    events: mpsc::UnboundedSender<RefreshEvent>,
}

impl TokenRefreshManager {
    /// Builds a manager and the receiver on which scheduled-check
    /// outcomes arrive.
    pub fn new(
        api: ApiClient,
        policy: BackoffPolicy,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<RefreshEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let manager = Arc::new(Self {
            api,
            policy,
            in_flight: Arc::new(Mutex::new(None)),
            timer: std::sync::Mutex::new(None),
            generation: AtomicU64::new(0),
            events,
        });
        (manager, receiver)
    }

    /// Runs a refresh, or joins the one already in flight.
    pub async fn refresh(&self) -> RefreshOutcome {
        refresh_shared(
            self.api.clone(),
            self.policy,
            Arc::clone(&self.in_flight),
        )
        .await
    }

    /// Arms a one-shot check that refreshes the token shortly before it
    /// expires. Replaces any previously armed check. Returns the
    /// generation stamped onto the resulting event.
    pub fn schedule_check(&self, token: &str) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = match codec::decode(token) {
            Ok(payload) => {
                let remaining = payload.expires_at - Utc::now().timestamp() - LEAD_WINDOW_SECS;
                if remaining > 0 {
                    Duration::from_secs(remaining as u64)
                } else {
                    Duration::ZERO
                }
            }
            // An undecodable token cannot be trusted for a deadline;
            // check it immediately and let classification take over.
            Err(_) => Duration::ZERO,
        };

        let api = self.api.clone();
        let policy = self.policy;
        let slot = Arc::clone(&self.in_flight);
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            let outcome = refresh_shared(api, policy, slot).await;
            let _ = events.send(RefreshEvent { generation, outcome });
        });

        if let Ok(mut guard) = self.timer.lock() {
            if let Some(previous) = guard.replace(handle) {
                previous.abort();
            }
        }
        generation
    }

    /// Disarms the pending check and invalidates its generation, so an
    /// event from a timer that already fired gets ignored.
    pub fn clear_scheduled(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.timer.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }

    /// Current generation; events stamped lower are stale.
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_refresh_in_progress(&self) -> bool {
        match self.in_flight.try_lock() {
            Ok(guard) => guard.is_some(),
            // Lock held means someone is mid-handshake; count it.
            Err(_) => true,
        }
    }
}

impl Drop for TokenRefreshManager {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.timer.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

/// Joins the in-flight exchange, starting one if none exists. The
/// exchange runs detached from the caller, so the slot is cleared even
/// when every caller gets cancelled mid-wait.
async fn refresh_shared(api: ApiClient, policy: BackoffPolicy, slot: InFlightSlot) -> RefreshOutcome {
    let receiver = {
        let mut guard = slot.lock().await;
        match guard.as_ref() {
            Some(receiver) => receiver.clone(),
            None => {
                let (sender, receiver) = watch::channel(None);
                *guard = Some(receiver.clone());
                let task_slot = Arc::clone(&slot);
                tokio::spawn(async move {
                    let outcome = run_exchange(&api, policy).await;
                    *task_slot.lock().await = None;
                    let _ = sender.send(Some(outcome));
                });
                receiver
            }
        }
    };
    follow_exchange(receiver, &slot).await
}

async fn follow_exchange(
    mut receiver: watch::Receiver<Option<RefreshOutcome>>,
    slot: &InFlightSlot,
) -> RefreshOutcome {
    loop {
        if let Some(outcome) = receiver.borrow_and_update().clone() {
            return outcome;
        }
        if receiver.changed().await.is_err() {
            // The exchange task died without publishing. Clear the slot
            // if it still holds a dead receiver, so the next caller can
            // start over instead of following a closed channel.
            let mut guard = slot.lock().await;
            if guard
                .as_ref()
                .map(|r| r.has_changed().is_err())
                .unwrap_or(false)
            {
                *guard = None;
            }
            return RefreshOutcome::failed(AuthErrorKind::RefreshFailed, false);
        }
    }
}

/// The actual exchange, with backoff across transport failures only.
/// A server rejection is final: retrying a token the server refused
/// cannot change the answer.
async fn run_exchange(api: &ApiClient, policy: BackoffPolicy) -> RefreshOutcome {
    let Some(current) = api.store().load_token() else {
        return RefreshOutcome::failed(AuthErrorKind::TokenInvalid, false);
    };

    let mut attempt = 1u32;
    loop {
        match api.refresh(&current).await {
            Ok(body) => return RefreshOutcome::succeeded(body.token, body.user),
            Err(err) => {
                let kind = err.auth_kind();
                if kind != AuthErrorKind::NetworkError {
                    tracing::warn!(?kind, "token refresh rejected");
                    return RefreshOutcome::failed(kind, false);
                }
                if attempt >= policy.max_attempts {
                    tracing::warn!(attempts = attempt, "token refresh attempts exhausted");
                    // The cause is transient even though this call's
                    // budget is spent.
                    return RefreshOutcome::failed(AuthErrorKind::NetworkError, true);
                }
                sleep(policy.delay_for(attempt)).await;
                attempt += 1;
            }
        }
    }
}
