//! Auth gateway. Every protected request passes through here; the checks
//! run in a fixed order and the blocked-account check is independent of
//! token validity, so a structurally valid, unexpired token cannot bypass
//! an administrative block.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use serde::{Deserialize, Serialize};

use crate::{
    error::{codes, AppError},
    models::user::User,
    repositories::{session as session_repo, user as user_repo},
    state::AppState,
    utils::jwt::{verify_access_token, Claims},
};

/// Identity attached to the request context once the gateway passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            role: user.role.as_str().to_string(),
        }
    }
}

pub async fn auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token_from_headers(request.headers())?;
    let (claims, user) = authenticate_request(&token, &state).await?;

    let current = CurrentUser::from(&user);
    request.extensions_mut().insert(claims.clone());
    request.extensions_mut().insert(current);

    // Liveness bookkeeping; not worth failing the request over.
    let pool = state.pool.clone();
    let jti = claims.jti.clone();
    tokio::spawn(async move {
        if let Err(err) = session_repo::touch_session(&pool, &jti, Utc::now()).await {
            tracing::warn!(error = ?err, "Failed to update session last_used_at");
        }
    });

    Ok(next.run(request).await)
}

/// Gateway plus admin-role requirement for administrative routes.
pub async fn auth_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token_from_headers(request.headers())?;
    let (claims, user) = authenticate_request(&token, &state).await?;

    if !user.is_admin() {
        return Err(AppError::forbidden(
            codes::FORBIDDEN,
            "Administrator privileges required",
        ));
    }

    request.extensions_mut().insert(claims);
    request.extensions_mut().insert(CurrentUser::from(&user));
    Ok(next.run(request).await)
}

async fn authenticate_request(
    token: &str,
    state: &AppState,
) -> Result<(Claims, User), AppError> {
    let claims = verify_access_token(token, &state.config.jwt_secret)
        .map_err(|err| unauthorized_for_token_error(&err))?;

    let user = user_repo::find_user_by_id(&state.pool, &claims.sub)
        .await
        .map_err(|e| AppError::InternalServerError(e.into()))?
        .ok_or_else(|| {
            AppError::unauthorized(codes::TOKEN_INVALID, "Unknown user for token")
        })?;

    // Checked before session liveness so a blocked user always sees 403,
    // whatever else is true of their token.
    ensure_not_blocked(&user)?;

    let active = session_repo::session_is_active(&state.pool, &claims.jti)
        .await
        .map_err(|e| AppError::InternalServerError(e.into()))?;
    if !active {
        return Err(AppError::unauthorized(
            codes::SESSION_REVOKED,
            "Session has been revoked",
        ));
    }

    Ok((claims, user))
}

pub fn ensure_not_blocked(user: &User) -> Result<(), AppError> {
    if user.is_blocked() {
        return Err(AppError::forbidden(
            codes::ACCOUNT_BLOCKED,
            "Account has been blocked by an administrator",
        ));
    }
    Ok(())
}

/// Maps a token verification failure onto the machine code the client
/// classifier expects: expiry, malformed input and bad signatures are
/// different recovery paths over there.
pub fn unauthorized_for_token_error(err: &jsonwebtoken::errors::Error) -> AppError {
    let (code, message) = match err.kind() {
        ErrorKind::ExpiredSignature => (codes::TOKEN_EXPIRED, "Token has expired"),
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => (codes::MALFORMED_TOKEN, "Token is malformed"),
        _ => (codes::TOKEN_INVALID, "Token is invalid"),
    };
    AppError::unauthorized(code, message)
}

pub fn bearer_token_from_headers(headers: &axum::http::HeaderMap) -> Result<String, AppError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_bearer_token)
        .map(|token| token.to_string())
        .ok_or_else(|| AppError::unauthorized(codes::TOKEN_MISSING, "Missing bearer token"))
}

pub fn parse_bearer_token(header: &str) -> Option<&str> {
    if let Some(rest) = header.strip_prefix("Bearer ") {
        return Some(rest);
    }
    if let Some(space_idx) = header.find(' ') {
        let (scheme, rest) = header.split_at(space_idx);
        if scheme.eq_ignore_ascii_case("bearer") {
            return Some(rest.trim_start());
        }
    }
    None
}
