//! Quota routes.
//!
//! Every handler acts on the caller's own identity except the admin paid-flag
//! update. Failures keep the response shape of the success body: `check`
//! answers `allowed: false`, mutating routes answer `success: false`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::error;

use crate::api::middleware::{AuthenticatedUser, Caller};
use crate::api::server::AppState;
use crate::error::QuotaError;
use crate::quota::PaidStatusUpdate;

/// Success envelope for mutating routes.
#[derive(Serialize)]
struct Success<T: Serialize> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

fn succeeded<T: Serialize>(body: T) -> Response {
    (StatusCode::OK, Json(Success { success: true, body })).into_response()
}

/// Map a service error to a response. `base` carries the shape fields
/// (`allowed`/`success`); `internal` is the message used for 5xx.
pub(crate) fn failure(err: &QuotaError, base: Value, internal: &str) -> Response {
    let (status, message) = match err {
        QuotaError::NotFound(_) => (StatusCode::NOT_FOUND, "User not found".to_string()),
        QuotaError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        QuotaError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
        QuotaError::Forbidden(_) => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
        other => {
            error!(error = %other, "{internal}");
            (StatusCode::INTERNAL_SERVER_ERROR, internal.to_string())
        }
    };
    let mut body = match base {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    body.insert("message".into(), Value::String(message));
    (status, Json(Value::Object(body))).into_response()
}

/// Quota routes act on end users only.
pub(crate) fn require_user(caller: &Caller, base: Value) -> Result<&AuthenticatedUser, Response> {
    match caller {
        Caller::User(user) => Ok(user),
        Caller::Admin => Err(failure(
            &QuotaError::Forbidden("admin token on user route".into()),
            base,
            "",
        )),
    }
}

/// POST /api/quota/check: may the caller perform one more analysis today?
pub async fn check_quota(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Response {
    let base = json!({ "allowed": false });
    let user = match require_user(&caller, base.clone()) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    match state.service.check(&user.external_id).await {
        Ok(check) => (StatusCode::OK, Json(check)).into_response(),
        Err(e) => failure(&e, base, "Quota check failed"),
    }
}

/// POST /api/quota/increment: record one completed analysis.
pub async fn increment_quota(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Response {
    let base = json!({ "success": false });
    let user = match require_user(&caller, base.clone()) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    match state.service.increment(&user.external_id).await {
        Ok(inc) => succeeded(inc),
        Err(e) => failure(&e, base, "Failed to increment quota"),
    }
}

/// GET /api/quota/status: read-only usage summary.
pub async fn quota_status(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Response {
    let user = match require_user(&caller, json!({})) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    match state.service.status(&user.external_id).await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) => failure(&e, json!({}), "Failed to fetch quota"),
    }
}

/// POST /api/quota/admin/update-paid-status
///
/// Body: `{"targetExternalId": "...", "isPaid": true}`.
pub async fn update_paid_status(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let base = json!({ "success": false });
    if caller != Caller::Admin {
        return failure(&QuotaError::Forbidden("admin only".into()), base, "");
    }

    let update = match body
        .map_err(|e| QuotaError::Validation(format!("invalid JSON body: {}", e.body_text())))
        .and_then(|Json(value)| PaidStatusUpdate::from_json(&value))
    {
        Ok(update) => update,
        Err(e) => return failure(&e, base, ""),
    };

    match state
        .service
        .set_paid_status(&update.target_external_id, update.is_paid)
        .await
    {
        Ok(user) => succeeded(json!({ "user": user })),
        Err(e) => failure(&e, base, "Failed to update paid status"),
    }
}
