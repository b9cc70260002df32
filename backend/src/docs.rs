#![allow(dead_code)] // OpenAPI doc stubs are only referenced by utoipa macros.

use axum::Json;

use crate::{
    error::ErrorResponse,
    models::{
        session::SessionResponse,
        user::{LoginRequest, LoginResponse, RefreshRequest, UserResponse, VerifyResponse},
    },
};
use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        login_doc,
        refresh_doc,
        logout_doc,
        logout_all_doc,
        verify_doc,
        sessions_doc,
        block_user_doc,
        unblock_user_doc,
    ),
    components(schemas(
        LoginRequest,
        LoginResponse,
        RefreshRequest,
        UserResponse,
        VerifyResponse,
        SessionResponse,
        ErrorResponse,
    )),
    modifiers(&BearerAuth),
    info(
        title = "reviewdesk auth API",
        description = "Session and token lifecycle endpoints for the manuscript-review workflow tool."
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

/// `GET /api/docs/openapi.json`
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, body = LoginResponse),
        (status = 401, body = ErrorResponse, description = "Invalid credentials"),
        (status = 403, body = ErrorResponse, description = "Account blocked"),
    )
)]
fn login_doc() {}

#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, body = LoginResponse),
        (status = 401, body = ErrorResponse, description = "Token outside grace window or session revoked"),
        (status = 403, body = ErrorResponse, description = "Account blocked"),
    )
)]
fn refresh_doc() {}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    security(("bearer" = [])),
    responses((status = 200), (status = 404, body = ErrorResponse))
)]
fn logout_doc() {}

#[utoipa::path(
    post,
    path = "/api/auth/logout-all",
    security(("bearer" = [])),
    responses((status = 200))
)]
fn logout_all_doc() {}

#[utoipa::path(
    get,
    path = "/api/auth/verify",
    security(("bearer" = [])),
    responses(
        (status = 200, body = VerifyResponse),
        (status = 401, body = ErrorResponse),
        (status = 403, body = ErrorResponse, description = "Account blocked"),
    )
)]
fn verify_doc() {}

#[utoipa::path(
    get,
    path = "/api/sessions",
    security(("bearer" = [])),
    responses((status = 200, body = [SessionResponse]))
)]
fn sessions_doc() {}

#[utoipa::path(
    put,
    path = "/api/admin/users/{id}/block",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "User to block")),
    responses((status = 200), (status = 404, body = ErrorResponse))
)]
fn block_user_doc() {}

#[utoipa::path(
    put,
    path = "/api/admin/users/{id}/unblock",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "User to unblock")),
    responses((status = 200), (status = 404, body = ErrorResponse))
)]
fn unblock_user_doc() {}
