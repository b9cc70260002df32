use sqlx::PgPool;

use crate::models::user::User;

const USER_COLUMNS: &str =
    "id, email, password_hash, full_name, role, status, blocked_at, blocked_by, created_at, updated_at";

pub async fn find_user_by_id(pool: &PgPool, user_id: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

pub async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await
}

pub async fn insert_user(pool: &PgPool, user: &User) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO users
            (id, email, password_hash, full_name, role, status, blocked_at, blocked_by, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(&user.id)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.full_name)
    .bind(user.role.as_str())
    .bind(user.status.as_str())
    .bind(user.blocked_at)
    .bind(&user.blocked_by)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(pool)
    .await
    .map(|_| ())
}

/// Blocks a user and deactivates every one of their sessions in a single
/// transaction: no concurrently arriving request can observe
/// `status = blocked` alongside a still-active session.
///
/// Returns the blocked user and the number of sessions deactivated, or
/// `None` when the user does not exist.
pub async fn block_user(
    pool: &PgPool,
    user_id: &str,
    blocked_by: &str,
) -> Result<Option<(User, u64)>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        UPDATE users
        SET status = 'blocked', blocked_at = NOW(), blocked_by = $2, updated_at = NOW()
        WHERE id = $1
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(blocked_by)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(user) = user else {
        tx.rollback().await?;
        return Ok(None);
    };

    let deactivated =
        sqlx::query("UPDATE sessions SET active = FALSE WHERE user_id = $1 AND active = TRUE")
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

    tx.commit().await?;
    Ok(Some((user, deactivated)))
}

/// Clears a block. Sessions deactivated by the block stay dead; the user
/// logs in again to get a new one.
pub async fn unblock_user(pool: &PgPool, user_id: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        r#"
        UPDATE users
        SET status = 'active', blocked_at = NULL, blocked_by = NULL, updated_at = NOW()
        WHERE id = $1
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await
}
