use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
/// One row per issued token per user. Rows are deactivated on logout or
/// administrative block and kept for audit, never deleted.
pub struct Session {
    pub id: String,
    pub user_id: String,
    /// The `jti` claim of the access token this session was issued for.
    pub token_identifier: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub active: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
/// Session listing entry. The token identifier is deliberately excluded
/// from the payload.
pub struct SessionResponse {
    pub id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub is_current: bool,
}

impl SessionResponse {
    pub fn from_session(session: Session, current_token_identifier: &str) -> Self {
        let is_current = session.token_identifier == current_token_identifier;
        Self {
            id: session.id,
            ip_address: session.ip_address,
            user_agent: session.user_agent,
            created_at: session.created_at,
            last_used_at: session.last_used_at,
            is_current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(jti: &str) -> Session {
        Session {
            id: "s1".into(),
            user_id: "u1".into(),
            token_identifier: jti.into(),
            ip_address: Some("10.0.0.1".into()),
            user_agent: Some("client/0.1".into()),
            created_at: Utc::now(),
            last_used_at: None,
            active: true,
        }
    }

    #[test]
    fn response_never_carries_the_token_identifier() {
        let json =
            serde_json::to_value(SessionResponse::from_session(session("jti-1"), "jti-1")).unwrap();
        assert!(json.get("token_identifier").is_none());
        assert_eq!(json["is_current"], true);
    }

    #[test]
    fn is_current_matches_on_token_identifier() {
        let response = SessionResponse::from_session(session("jti-1"), "jti-2");
        assert!(!response.is_current);
    }
}
