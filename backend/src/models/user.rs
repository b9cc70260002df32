//! User accounts and the authentication payloads exchanged with clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
/// Database representation of a reviewer or administrator account.
pub struct User {
    pub id: String,
    /// Login identifier; unique.
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: UserRole,
    pub status: UserStatus,
    /// When the account was blocked, if it is.
    pub blocked_at: Option<DateTime<Utc>>,
    /// Administrator who applied the block.
    pub blocked_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::Type, ToSchema, Default)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    Reviewer,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Reviewer => "reviewer",
            UserRole::Admin => "admin",
        }
    }
}

impl Serialize for UserRole {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for UserRole {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "reviewer" => Ok(UserRole::Reviewer),
            "admin" => Ok(UserRole::Admin),
            other => Err(serde::de::Error::unknown_variant(
                other,
                &["reviewer", "admin"],
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::Type, ToSchema, Default)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
/// Administrative account state. Blocking is the sole trigger for mass
/// session deactivation.
pub enum UserStatus {
    #[default]
    Active,
    Blocked,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Blocked => "blocked",
        }
    }
}

impl Serialize for UserStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for UserStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "active" => Ok(UserStatus::Active),
            "blocked" => Ok(UserStatus::Blocked),
            other => Err(serde::de::Error::unknown_variant(
                other,
                &["active", "blocked"],
            )),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
/// Credentials submitted by a user attempting to authenticate.
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
/// Token and profile returned after a successful login or refresh.
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
/// Payload for the token refresh exchange.
pub struct RefreshRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
/// Public-facing representation of a user.
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub status: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            role: user.role.as_str().to_string(),
            status: user.status.as_str().to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
/// Response of `GET /api/auth/verify`: reaching it proves the token,
/// session and account status all checked out.
pub struct VerifyResponse {
    pub user: UserResponse,
    pub token_identifier: String,
}

impl User {
    pub fn new(
        email: String,
        password_hash: String,
        full_name: String,
        role: UserRole,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            email,
            password_hash,
            full_name,
            role,
            status: UserStatus::Active,
            blocked_at: None,
            blocked_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role, UserRole::Admin)
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self.status, UserStatus::Blocked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn role_and_status_serialize_as_snake_case() {
        assert_eq!(
            serde_json::to_value(UserRole::Reviewer).unwrap(),
            Value::String("reviewer".into())
        );
        assert_eq!(
            serde_json::to_value(UserStatus::Blocked).unwrap(),
            Value::String("blocked".into())
        );
        let status: UserStatus = serde_json::from_str("\"active\"").unwrap();
        assert_eq!(status, UserStatus::Active);
    }

    #[test]
    fn new_user_starts_active_and_unblocked() {
        let user = User::new(
            "alice@example.com".into(),
            "hash".into(),
            "Alice Example".into(),
            UserRole::Admin,
        );
        assert!(user.is_admin());
        assert!(!user.is_blocked());
        assert!(user.blocked_at.is_none());
        assert!(user.blocked_by.is_none());
    }

    #[test]
    fn user_response_excludes_password_hash() {
        let user = User::new(
            "bob@example.com".into(),
            "hash".into(),
            "Bob Example".into(),
            UserRole::Reviewer,
        );
        let json = serde_json::to_value(UserResponse::from(user)).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "reviewer");
        assert_eq!(json["status"], "active");
    }
}
