//! Account provisioning for the authenticated caller.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use super::quota::{failure, require_user};
use crate::api::middleware::Caller;
use crate::api::server::AppState;
use crate::quota::NewAccount;

fn optional_str(body: &Value, key: &str) -> Option<String> {
    body.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// POST /api/users: create the caller's account if absent.
///
/// Profile fields come from the body (`email`, `fullName`) and fall back to
/// the token's `email`/`name` claims. The body may be omitted. An existing
/// account is returned unchanged; the paid flag always starts false.
pub async fn provision_self(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let base = json!({ "success": false });
    let user = match require_user(&caller, base.clone()) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let body = body.map(|Json(v)| v).unwrap_or(Value::Null);

    let account = NewAccount {
        external_id: user.external_id.clone(),
        email: optional_str(&body, "email").or_else(|| user.email.clone()),
        full_name: optional_str(&body, "fullName").or_else(|| user.name.clone()),
    };

    match state.service.directory().provision(account).await {
        Ok(account) => (
            StatusCode::OK,
            Json(json!({ "success": true, "user": account })),
        )
            .into_response(),
        Err(e) => failure(&e, base, "Failed to provision user"),
    }
}
