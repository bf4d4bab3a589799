//! Bearer credential handling.
//!
//! Users authenticate with HS256 JWTs issued by the identity provider; the
//! `sub` claim is their external identity. The admin route instead accepts a
//! static token from configuration.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{QuotaError, Result};
use crate::quota::directory::validate_external_id;

// ============================================================================
// Bearer header parsing
// ============================================================================

/// Extract the token from an `Authorization: Bearer <token>` header value.
///
/// The prefix is case-sensitive and must be followed by a non-empty token.
///
/// # Errors
///
/// Returns [`QuotaError::Unauthorized`] when the prefix or token is missing.
pub fn bearer_token(header: &str) -> Result<&str> {
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| QuotaError::Unauthorized("missing Bearer prefix".to_string()))?
        .trim();
    if token.is_empty() {
        return Err(QuotaError::Unauthorized("empty bearer token".to_string()));
    }
    Ok(token)
}

/// Whether `token` is the configured admin token. Always false when no admin
/// token is configured.
pub fn is_admin_token(token: &str, admin_token: Option<&str>) -> bool {
    matches!(admin_token, Some(expected) if !expected.is_empty() && token == expected)
}

// ============================================================================
// JWT (HS256)
// ============================================================================

/// Claims read from a user token.
///
/// Unknown claims (`iat`, `aud`, provider extras) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the external identity.
    pub sub: String,
    /// Expiry, Unix seconds.
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Issue an HS256 JWT for `subject`, valid for `expires_in_secs`.
///
/// Production tokens come from the identity provider; this exists for local
/// testing and operator tooling.
///
/// # Errors
///
/// Returns [`QuotaError::Unauthorized`] if encoding fails.
pub fn generate_jwt(subject: &str, secret: &str, expires_in_secs: u64) -> Result<String> {
    let exp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
        .saturating_add(expires_in_secs) as usize;

    let claims = Claims {
        sub: subject.to_string(),
        exp,
        email: None,
        name: None,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| QuotaError::Unauthorized(format!("JWT encode: {e}")))
}

/// Validate an HS256 JWT and return its claims.
///
/// Checks signature and `exp`, and rejects a subject that is not a valid
/// directory key (empty or padded with whitespace). The subject is never
/// rewritten, so the identity a handler sees is exactly the one stored.
///
/// # Errors
///
/// Returns [`QuotaError::Unauthorized`] for any validation failure.
pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| QuotaError::Unauthorized(format!("JWT validation: {e}")))?;

    validate_external_id(&data.claims.sub)
        .map_err(|e| QuotaError::Unauthorized(format!("JWT subject: {e}")))?;
    Ok(data.claims)
}
