//! API authentication middleware.
//!
//! Checks for `Authorization: Bearer <token>` on every request except the
//! health probe, and attaches the authenticated [`Caller`] to the request
//! extensions for handlers to read.

use axum::{
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use super::auth;
use super::server::AppState;

/// Path of the administrative paid-flag route.
pub const ADMIN_PATH: &str = "/api/quota/admin/update-paid-status";

/// Identity of an end user, taken from a validated JWT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub external_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Who made the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// Presented the configured admin token.
    Admin,
    User(AuthenticatedUser),
}

fn reject(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

/// Middleware that checks for `Authorization: Bearer <token>` header.
///
/// Skips auth for `GET /api/health`. The admin route accepts only the static
/// admin token and answers 403 to anything else, including valid user JWTs.
/// Every other route requires a valid user JWT and answers 401 otherwise.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if path == "/api/health" {
        return next.run(request).await;
    }

    let token = match request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(auth::bearer_token)
    {
        Some(Ok(token)) => token.to_string(),
        _ => {
            debug!(%path, "missing bearer token");
            return reject(StatusCode::UNAUTHORIZED, "Unauthorized: missing token");
        }
    };

    if path == ADMIN_PATH {
        if auth::is_admin_token(&token, state.admin_token.as_deref()) {
            request.extensions_mut().insert(Caller::Admin);
            return next.run(request).await;
        }
        debug!(%path, "admin route rejected non-admin credential");
        return reject(StatusCode::FORBIDDEN, "Forbidden: admin access required");
    }

    match auth::validate_jwt(&token, &state.jwt_secret) {
        Ok(claims) => {
            request
                .extensions_mut()
                .insert(Caller::User(AuthenticatedUser {
                    external_id: claims.sub,
                    email: claims.email,
                    name: claims.name,
                }));
            next.run(request).await
        }
        Err(e) => {
            debug!(%path, error = %e, "token rejected");
            reject(StatusCode::UNAUTHORIZED, "Unauthorized: invalid token")
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
