use axum::{
    extract::{Extension, Path, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::AppError,
    handlers::{extract_ip, extract_user_agent},
    middleware::auth::CurrentUser,
    models::activity_log::ActivityEvent,
    repositories::user as user_repo,
    services::activity_log,
    state::AppState,
};

/// `PUT /api/admin/users/{id}/block`. Flips the account to blocked and
/// deactivates every session in the same transaction, so the block takes
/// effect before this handler returns.
pub async fn block_user(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentUser>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let (user, sessions_revoked) = user_repo::block_user(&state.pool, &user_id, &admin.id)
        .await
        .map_err(|e| AppError::InternalServerError(e.into()))?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    tracing::info!(
        user_id = %user.id,
        blocked_by = %admin.id,
        sessions_revoked,
        "User blocked"
    );

    activity_log::record(
        &state.activity_log,
        ActivityEvent::new("user_block")
            .actor(admin.id)
            .target(user.id.clone())
            .metadata(json!({ "sessions_revoked": sessions_revoked }))
            .client(extract_ip(&headers), extract_user_agent(&headers)),
    );

    Ok(Json(json!({
        "message": "User blocked",
        "user_id": user.id,
        "sessions_revoked": sessions_revoked
    })))
}

/// `PUT /api/admin/users/{id}/unblock`. Clears the block; previously
/// deactivated sessions stay dead and the user must log in again.
pub async fn unblock_user(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentUser>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let user = user_repo::unblock_user(&state.pool, &user_id)
        .await
        .map_err(|e| AppError::InternalServerError(e.into()))?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    activity_log::record(
        &state.activity_log,
        ActivityEvent::new("user_unblock")
            .actor(admin.id)
            .target(user.id.clone())
            .client(extract_ip(&headers), extract_user_agent(&headers)),
    );

    Ok(Json(json!({
        "message": "User unblocked",
        "user_id": user.id
    })))
}
