use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::AppError,
    middleware::auth::CurrentUser,
    models::session::SessionResponse,
    repositories::session as session_repo,
    state::AppState,
    utils::jwt::Claims,
};

/// `GET /api/sessions`. Active sessions for the caller, most recent first.
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<SessionResponse>>, AppError> {
    let sessions = session_repo::find_active_sessions_for_user(&state.pool, &current.id)
        .await
        .map_err(|e| AppError::InternalServerError(e.into()))?;
    let responses = sessions
        .into_iter()
        .map(|session| SessionResponse::from_session(session, &claims.jti))
        .collect();
    Ok(Json(responses))
}

/// `DELETE /api/sessions/{id}`. Targeted logout of one of the caller's own
/// sessions.
pub async fn revoke_session(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    if session_id.trim().is_empty() {
        return Err(AppError::BadRequest("Session ID is required".into()));
    }

    let sessions = session_repo::find_active_sessions_for_user(&state.pool, &current.id)
        .await
        .map_err(|e| AppError::InternalServerError(e.into()))?;
    if !sessions.iter().any(|s| s.id == session_id) {
        return Err(AppError::NotFound("Session not found".into()));
    }

    session_repo::deactivate_session(&state.pool, &session_id)
        .await
        .map_err(|e| AppError::InternalServerError(e.into()))?;

    Ok(Json(json!({
        "message": "Session revoked",
        "session_id": session_id
    })))
}
