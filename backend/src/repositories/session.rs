//! Session store: one row per issued token per user. Rows flip to
//! `active = false` on logout or block and are kept for audit.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::session::Session;

pub async fn create_session(
    pool: &PgPool,
    user_id: &str,
    token_identifier: &str,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
) -> Result<Session, sqlx::Error> {
    let session_id = Uuid::new_v4().to_string();

    sqlx::query_as::<_, Session>(
        r#"
        INSERT INTO sessions
            (id, user_id, token_identifier, ip_address, user_agent, created_at, last_used_at, active)
        VALUES ($1, $2, $3, $4, $5, NOW(), NULL, TRUE)
        RETURNING id, user_id, token_identifier, ip_address, user_agent, created_at, last_used_at, active
        "#,
    )
    .bind(&session_id)
    .bind(user_id)
    .bind(token_identifier)
    .bind(ip_address)
    .bind(user_agent)
    .fetch_one(pool)
    .await
}

/// Active sessions only, most recent first.
pub async fn find_active_sessions_for_user(
    pool: &PgPool,
    user_id: &str,
) -> Result<Vec<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(
        r#"
        SELECT id, user_id, token_identifier, ip_address, user_agent, created_at, last_used_at, active
        FROM sessions
        WHERE user_id = $1 AND active = TRUE
        ORDER BY last_used_at DESC NULLS LAST, created_at DESC, id DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn find_session_by_token_identifier(
    pool: &PgPool,
    token_identifier: &str,
) -> Result<Option<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(
        r#"
        SELECT id, user_id, token_identifier, ip_address, user_agent, created_at, last_used_at, active
        FROM sessions
        WHERE token_identifier = $1
        "#,
    )
    .bind(token_identifier)
    .fetch_optional(pool)
    .await
}

/// Liveness check used by the auth gateway. A store error must propagate;
/// it is not the same thing as "no active session".
pub async fn session_is_active(
    pool: &PgPool,
    token_identifier: &str,
) -> Result<bool, sqlx::Error> {
    let row: Option<(bool,)> =
        sqlx::query_as("SELECT active FROM sessions WHERE token_identifier = $1")
            .bind(token_identifier)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(active,)| active).unwrap_or(false))
}

/// Targeted logout of one session. Returns `false` when no row matched.
pub async fn deactivate_session(pool: &PgPool, session_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE sessions SET active = FALSE WHERE id = $1")
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn deactivate_session_by_token_identifier(
    pool: &PgPool,
    token_identifier: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE sessions SET active = FALSE WHERE token_identifier = $1")
        .bind(token_identifier)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Mass deactivation (logout-all, administrative block). Idempotent.
pub async fn deactivate_sessions_for_user(
    pool: &PgPool,
    user_id: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE sessions SET active = FALSE WHERE user_id = $1 AND active = TRUE")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn touch_session(
    pool: &PgPool,
    token_identifier: &str,
    last_used_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE sessions SET last_used_at = $1 WHERE token_identifier = $2")
        .bind(last_used_at)
        .bind(token_identifier)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Refresh rotation: points an existing active session at the newly issued
/// token. Returns `false` when the session is gone or already inactive,
/// in which case the rotation must be rejected.
pub async fn rotate_session_token(
    pool: &PgPool,
    current_token_identifier: &str,
    new_token_identifier: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE sessions
        SET token_identifier = $1, last_used_at = NOW()
        WHERE token_identifier = $2 AND active = TRUE
        "#,
    )
    .bind(new_token_identifier)
    .bind(current_token_identifier)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}
