//! Failure classification. Every raw validation/refresh failure is mapped
//! to an [`AuthError`] carrying a recovery decision; the dispatch site
//! matches exhaustively on [`RecoveryAction`], so a new error kind forces
//! a compile-time decision about how it recovers.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Retry budget for consecutive failures of the same kind.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthErrorKind {
    /// Signature rejected, unknown user, or a missing required claim.
    #[error("token is invalid")]
    TokenInvalid,
    #[error("token has expired")]
    TokenExpired,
    #[error("token refresh failed")]
    RefreshFailed,
    #[error("network error")]
    NetworkError,
    /// Payload segment present but undecodable.
    #[error("token payload could not be decoded")]
    DecodeError,
    /// Not even the right shape for a signed token.
    #[error("token is malformed")]
    MalformedToken,
    #[error("profile load failed")]
    ProfileLoadFailed,
}

impl AuthErrorKind {
    /// Maps a server error code (the `code` field of an error body) back
    /// onto a kind. Unknown codes fall through to `None`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "TOKEN_EXPIRED" => Some(Self::TokenExpired),
            "MALFORMED_TOKEN" => Some(Self::MalformedToken),
            "TOKEN_MISSING" | "TOKEN_INVALID" | "SESSION_REVOKED" | "ACCOUNT_BLOCKED" => {
                Some(Self::TokenInvalid)
            }
            _ => None,
        }
    }
}

/// What the dispatcher should do about an error. Closed set on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Full logout: server notified, local state wiped.
    Logout,
    /// Exchange the token for a fresh one.
    Refresh,
    /// Wipe local credentials; the token was never trustworthy.
    ClearToken,
    /// Leave state alone; surface the error and wait.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthError {
    pub kind: AuthErrorKind,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
    /// How many times this kind has occurred consecutively.
    pub retry_count: u32,
    pub max_retries: u32,
    pub should_retry: bool,
    pub recovery_action: RecoveryAction,
}

/// The recovery table. `RefreshFailed` retryability depends on the
/// underlying cause and is handled by [`classify_refresh_failure`].
fn recovery_for(kind: AuthErrorKind) -> (RecoveryAction, bool) {
    match kind {
        AuthErrorKind::TokenExpired => (RecoveryAction::Refresh, true),
        AuthErrorKind::DecodeError => (RecoveryAction::ClearToken, false),
        AuthErrorKind::MalformedToken => (RecoveryAction::ClearToken, false),
        AuthErrorKind::TokenInvalid => (RecoveryAction::Logout, false),
        AuthErrorKind::RefreshFailed => (RecoveryAction::ClearToken, false),
        AuthErrorKind::NetworkError => (RecoveryAction::None, true),
        AuthErrorKind::ProfileLoadFailed => (RecoveryAction::ClearToken, false),
    }
}

/// Classifies a failure, counting consecutive recurrences of the same
/// kind: the counter increments only when `previous` holds the same kind,
/// and `should_retry` turns false once the budget is exceeded.
pub fn classify(
    kind: AuthErrorKind,
    message: impl Into<String>,
    previous: Option<&AuthError>,
) -> AuthError {
    let (recovery_action, retryable) = recovery_for(kind);
    classify_inner(kind, message.into(), recovery_action, retryable, previous)
}

/// `RefreshFailed` with the underlying cause's retryability threaded
/// through (network exhaustion is terminal, a pre-exhaustion transport
/// error is not).
pub fn classify_refresh_failure(
    message: impl Into<String>,
    cause_retryable: bool,
    previous: Option<&AuthError>,
) -> AuthError {
    classify_inner(
        AuthErrorKind::RefreshFailed,
        message.into(),
        RecoveryAction::ClearToken,
        cause_retryable,
        previous,
    )
}

fn classify_inner(
    kind: AuthErrorKind,
    message: String,
    recovery_action: RecoveryAction,
    retryable: bool,
    previous: Option<&AuthError>,
) -> AuthError {
    let retry_count = match previous {
        Some(prev) if prev.kind == kind => prev.retry_count + 1,
        _ => 1,
    };
    let max_retries = DEFAULT_MAX_RETRIES;

    AuthError {
        kind,
        message,
        occurred_at: Utc::now(),
        retry_count,
        max_retries,
        should_retry: retryable && retry_count <= max_retries,
        recovery_action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_the_recovery_contract() {
        let cases = [
            (AuthErrorKind::TokenExpired, RecoveryAction::Refresh, true),
            (AuthErrorKind::DecodeError, RecoveryAction::ClearToken, false),
            (
                AuthErrorKind::MalformedToken,
                RecoveryAction::ClearToken,
                false,
            ),
            (AuthErrorKind::TokenInvalid, RecoveryAction::Logout, false),
            (AuthErrorKind::NetworkError, RecoveryAction::None, true),
            (
                AuthErrorKind::ProfileLoadFailed,
                RecoveryAction::ClearToken,
                false,
            ),
        ];
        for (kind, action, retryable) in cases {
            let error = classify(kind, kind.to_string(), None);
            assert_eq!(error.recovery_action, action, "{kind:?}");
            assert_eq!(error.should_retry, retryable, "{kind:?}");
            assert_eq!(error.retry_count, 1);
        }
    }

    #[test]
    fn consecutive_same_kind_counts_up_and_exhausts() {
        let first = classify(AuthErrorKind::TokenExpired, "expired", None);
        let second = classify(AuthErrorKind::TokenExpired, "expired", Some(&first));
        let third = classify(AuthErrorKind::TokenExpired, "expired", Some(&second));

        assert_eq!(
            (first.retry_count, second.retry_count, third.retry_count),
            (1, 2, 3)
        );
        assert!(first.should_retry);
        assert!(second.should_retry);
        assert!(!third.should_retry);
    }

    #[test]
    fn a_different_kind_resets_the_counter() {
        let first = classify(AuthErrorKind::TokenExpired, "expired", None);
        let second = classify(AuthErrorKind::TokenExpired, "expired", Some(&first));
        let other = classify(AuthErrorKind::NetworkError, "offline", Some(&second));
        assert_eq!(other.retry_count, 1);
        assert!(other.should_retry);
    }

    #[test]
    fn refresh_failure_retryability_follows_the_cause() {
        let transient = classify_refresh_failure("connection reset", true, None);
        assert!(transient.should_retry);
        assert_eq!(transient.recovery_action, RecoveryAction::ClearToken);

        let exhausted = classify_refresh_failure("attempts exhausted", false, None);
        assert!(!exhausted.should_retry);
    }

    #[test]
    fn server_codes_map_onto_kinds() {
        assert_eq!(
            AuthErrorKind::from_code("TOKEN_EXPIRED"),
            Some(AuthErrorKind::TokenExpired)
        );
        assert_eq!(
            AuthErrorKind::from_code("ACCOUNT_BLOCKED"),
            Some(AuthErrorKind::TokenInvalid)
        );
        assert_eq!(AuthErrorKind::from_code("SOMETHING_ELSE"), None);
    }
}
