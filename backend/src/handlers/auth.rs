use axum::{
    extract::{Extension, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    error::{codes, AppError},
    handlers::{extract_ip, extract_user_agent},
    middleware::auth::{ensure_not_blocked, unauthorized_for_token_error, CurrentUser},
    models::{
        activity_log::ActivityEvent,
        user::{LoginRequest, LoginResponse, RefreshRequest, UserResponse, VerifyResponse},
    },
    repositories::{session as session_repo, user as user_repo},
    services::activity_log,
    state::AppState,
    utils::jwt::{create_access_token, verify_access_token_with_grace, Claims},
};

/// `POST /api/auth/login`. Issues a token and creates one session row per
/// call; concurrent logins from several devices produce independent rows.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    payload.validate()?;

    let user = user_repo::find_user_by_email(&state.pool, &payload.email)
        .await
        .map_err(|e| AppError::InternalServerError(e.into()))?
        .ok_or_else(|| {
            AppError::unauthorized(codes::TOKEN_INVALID, "Invalid email or password")
        })?;

    let matches = crate::utils::password::verify_password(&payload.password, &user.password_hash)
        .map_err(AppError::InternalServerError)?;
    if !matches {
        return Err(AppError::unauthorized(
            codes::TOKEN_INVALID,
            "Invalid email or password",
        ));
    }

    // Correct credentials do not override an administrative block.
    ensure_not_blocked(&user)?;

    let (token, claims) = create_access_token(
        user.id.clone(),
        user.email.clone(),
        user.role.as_str().to_string(),
        &state.config.jwt_secret,
        state.config.jwt_expiration_hours,
    )
    .map_err(AppError::InternalServerError)?;

    let ip = extract_ip(&headers);
    let user_agent = extract_user_agent(&headers);
    session_repo::create_session(
        &state.pool,
        &user.id,
        &claims.jti,
        ip.as_deref(),
        user_agent.as_deref(),
    )
    .await
    .map_err(|e| AppError::InternalServerError(e.into()))?;

    activity_log::record(
        &state.activity_log,
        ActivityEvent::new("login")
            .actor(user.id.clone())
            .client(ip, user_agent),
    );

    Ok(Json(LoginResponse {
        token,
        user: UserResponse::from(user),
    }))
}

/// `POST /api/auth/refresh`. Exchanges a current (or recently expired,
/// within the grace window) token for a fresh one and rotates the session's
/// token identifier. The session row itself survives the exchange.
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let claims = verify_access_token_with_grace(
        &payload.token,
        &state.config.jwt_secret,
        state.config.refresh_grace_seconds,
    )
    .map_err(|err| unauthorized_for_token_error(&err))?;

    let user = user_repo::find_user_by_id(&state.pool, &claims.sub)
        .await
        .map_err(|e| AppError::InternalServerError(e.into()))?
        .ok_or_else(|| AppError::unauthorized(codes::TOKEN_INVALID, "Unknown user for token"))?;

    ensure_not_blocked(&user)?;

    let (token, new_claims) = create_access_token(
        user.id.clone(),
        user.email.clone(),
        user.role.as_str().to_string(),
        &state.config.jwt_secret,
        state.config.jwt_expiration_hours,
    )
    .map_err(AppError::InternalServerError)?;

    let rotated = session_repo::rotate_session_token(&state.pool, &claims.jti, &new_claims.jti)
        .await
        .map_err(|e| AppError::InternalServerError(e.into()))?;
    if !rotated {
        return Err(AppError::unauthorized(
            codes::SESSION_REVOKED,
            "Session has been revoked",
        ));
    }

    activity_log::record(
        &state.activity_log,
        ActivityEvent::new("token_refresh").actor(user.id.clone()),
    );

    Ok(Json(LoginResponse {
        token,
        user: UserResponse::from(user),
    }))
}

/// `POST /api/auth/logout`. Deactivates the session behind the presented
/// token. 404 when the session row is already gone.
pub async fn logout(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Value>, AppError> {
    let found =
        session_repo::deactivate_session_by_token_identifier(&state.pool, &claims.jti)
            .await
            .map_err(|e| AppError::InternalServerError(e.into()))?;
    if !found {
        return Err(AppError::NotFound("Session not found".into()));
    }

    activity_log::record(
        &state.activity_log,
        ActivityEvent::new("logout").actor(current.id),
    );

    Ok(Json(json!({ "message": "Logged out" })))
}

/// `POST /api/auth/logout-all`. Deactivates every session the caller
/// holds, current one included. Idempotent.
pub async fn logout_all(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Value>, AppError> {
    let revoked = session_repo::deactivate_sessions_for_user(&state.pool, &current.id)
        .await
        .map_err(|e| AppError::InternalServerError(e.into()))?;

    activity_log::record(
        &state.activity_log,
        ActivityEvent::new("logout_all")
            .actor(current.id)
            .metadata(json!({ "sessions_revoked": revoked })),
    );

    Ok(Json(json!({ "message": "Logged out", "sessions_revoked": revoked })))
}

/// `GET /api/auth/verify`. Reaching this handler means the gateway already
/// verified token, account status and session liveness.
pub async fn verify(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<VerifyResponse>, AppError> {
    let user = user_repo::find_user_by_id(&state.pool, &claims.sub)
        .await
        .map_err(|e| AppError::InternalServerError(e.into()))?
        .ok_or_else(|| AppError::unauthorized(codes::TOKEN_INVALID, "Unknown user for token"))?;

    Ok(Json(VerifyResponse {
        user: UserResponse::from(user),
        token_identifier: claims.jti,
    }))
}
