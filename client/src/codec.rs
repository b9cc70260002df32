//! Structural and temporal token validation. Pure functions, no I/O: the
//! signature is the server's business, the client only needs the claims
//! and the expiry.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::error::AuthErrorKind;

/// Claims the client cares about, decoded from the payload segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPayload {
    pub user_id: String,
    pub email: String,
    pub role: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// Result of one validation pass.
#[derive(Debug, Clone)]
pub struct TokenValidation {
    pub is_valid: bool,
    pub payload: Option<TokenPayload>,
    pub error_kind: Option<AuthErrorKind>,
}

impl TokenValidation {
    fn ok(payload: TokenPayload) -> Self {
        Self {
            is_valid: true,
            payload: Some(payload),
            error_kind: None,
        }
    }

    fn err(kind: AuthErrorKind, payload: Option<TokenPayload>) -> Self {
        Self {
            is_valid: false,
            payload,
            error_kind: Some(kind),
        }
    }
}

/// Decodes the payload segment of a three-segment signed token.
///
/// Failure ladder: wrong segment shape is `MalformedToken`, an unparseable
/// payload is `DecodeError`, a parseable payload missing a required claim
/// is `TokenInvalid`.
pub fn decode(token: &str) -> Result<TokenPayload, AuthErrorKind> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        return Err(AuthErrorKind::MalformedToken);
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(segments[1])
        .map_err(|_| AuthErrorKind::DecodeError)?;
    let value: Value = serde_json::from_slice(&bytes).map_err(|_| AuthErrorKind::DecodeError)?;

    let claim_str = |name: &str| -> Result<String, AuthErrorKind> {
        value
            .get(name)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or(AuthErrorKind::TokenInvalid)
    };
    let claim_i64 = |name: &str| -> Result<i64, AuthErrorKind> {
        value
            .get(name)
            .and_then(|v| v.as_i64())
            .ok_or(AuthErrorKind::TokenInvalid)
    };

    Ok(TokenPayload {
        user_id: claim_str("sub")?,
        email: claim_str("email")?,
        role: claim_str("role")?,
        issued_at: claim_i64("iat")?,
        expires_at: claim_i64("exp")?,
    })
}

/// Full validation pass against the current clock.
pub fn validate(token: &str) -> TokenValidation {
    validate_at(token, Utc::now())
}

/// Validation against an explicit clock; the timer logic and the tests
/// both need a clock they control.
pub fn validate_at(token: &str, now: DateTime<Utc>) -> TokenValidation {
    let payload = match decode(token) {
        Ok(payload) => payload,
        Err(kind) => return TokenValidation::err(kind, None),
    };

    if payload.expires_at <= now.timestamp() {
        return TokenValidation::err(AuthErrorKind::TokenExpired, Some(payload));
    }

    TokenValidation::ok(payload)
}

/// Expiry instant of a decoded payload, used for scheduling re-checks.
pub fn expiration_time(payload: &TokenPayload) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(payload.expires_at, 0).single()
}

/// Builds an unsigned-but-shaped token the way the backend would; test
/// support for this crate's modules.
#[cfg(test)]
pub(crate) fn fake_token(sub: &str, exp: i64, iat: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::json!({
            "sub": sub,
            "email": format!("{sub}@example.com"),
            "role": "reviewer",
            "iat": iat,
            "exp": exp,
        })
        .to_string(),
    );
    format!("{header}.{payload}.sig")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_token_validates_with_payload() {
        let now = Utc::now();
        let token = fake_token("u1", now.timestamp() + 3600, now.timestamp());
        let validation = validate_at(&token, now);
        assert!(validation.is_valid);
        let payload = validation.payload.expect("payload");
        assert_eq!(payload.user_id, "u1");
        assert_eq!(payload.email, "u1@example.com");
        assert!(validation.error_kind.is_none());
    }

    #[test]
    fn expired_token_is_never_valid() {
        let now = Utc::now();
        for age in [0, 1, 60, 86_400] {
            let token = fake_token("u1", now.timestamp() - age, now.timestamp() - age - 3600);
            let validation = validate_at(&token, now);
            assert!(!validation.is_valid);
            assert_eq!(validation.error_kind, Some(AuthErrorKind::TokenExpired));
            // The payload is still surfaced so the caller can refresh.
            assert!(validation.payload.is_some());
        }
    }

    #[test]
    fn wrong_segment_count_is_malformed() {
        for token in ["", "abc", "a.b", "a.b.c.d", "..", "a..c"] {
            let validation = validate(token);
            assert_eq!(validation.error_kind, Some(AuthErrorKind::MalformedToken));
            assert!(validation.payload.is_none());
        }
    }

    #[test]
    fn unparseable_payload_is_decode_error() {
        let garbage = format!("{}.{}.{}", "aGVhZA", "!!!not-base64!!!", "sig");
        assert_eq!(decode(&garbage), Err(AuthErrorKind::DecodeError));

        let not_json = format!("{}.{}.{}", "aGVhZA", URL_SAFE_NO_PAD.encode("plain text"), "sig");
        assert_eq!(decode(&not_json), Err(AuthErrorKind::DecodeError));
    }

    #[test]
    fn missing_required_claim_is_token_invalid() {
        let payload = URL_SAFE_NO_PAD.encode(r#"{"sub":"u1","email":"e","role":"r","iat":1}"#);
        let token = format!("aGVhZA.{payload}.sig");
        assert_eq!(decode(&token), Err(AuthErrorKind::TokenInvalid));
    }

    #[test]
    fn expiration_time_round_trips_the_exp_claim() {
        let now = Utc::now();
        let exp = now.timestamp() + 1800;
        let token = fake_token("u1", exp, now.timestamp());
        let payload = decode(&token).expect("decode");
        assert_eq!(expiration_time(&payload).map(|t| t.timestamp()), Some(exp));
    }
}
