//! Bearer-token authentication for the control API.
//!
//! Tokens are HS256 JWTs whose `sub` claim is the caller's user id. The
//! caller's dealership is always derived from their stored profile, never
//! from request input — every downstream query scopes to it.

use axum::http::HeaderMap;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::store::profiles;
use crate::types::UserProfile;

/// JWT claims the gateway cares about.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// The authenticated user id.
    pub sub: String,
    /// Expiry, seconds since epoch.
    pub exp: u64,
}

/// The authenticated caller with their dealership membership.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub profile: UserProfile,
}

impl AuthContext {
    /// The caller's dealership.
    pub fn dealership_id(&self) -> Uuid {
        self.profile.dealership_id
    }
}

/// Extract the bearer token from the Authorization header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Decode and validate a token into the user id it names.
///
/// # Errors
///
/// `Auth` for missing/invalid tokens or a malformed `sub`.
pub fn decode_user_id(headers: &HeaderMap, jwt_secret: &str) -> Result<Uuid, GatewayError> {
    let token = bearer_token(headers)
        .ok_or_else(|| GatewayError::Auth("missing bearer token".to_owned()))?;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| GatewayError::Auth(format!("invalid token: {e}")))?;

    data.claims
        .sub
        .parse::<Uuid>()
        .map_err(|_| GatewayError::Auth("token subject is not a user id".to_owned()))
}

/// Authenticate a request: validate the token, then load the caller's
/// profile to pin their dealership.
///
/// # Errors
///
/// `Auth` when the token is invalid or the user has no dealership
/// membership; database failures propagate.
pub async fn authenticate(
    pool: &PgPool,
    headers: &HeaderMap,
    jwt_secret: Option<&str>,
) -> Result<AuthContext, GatewayError> {
    let secret =
        jwt_secret.ok_or_else(|| GatewayError::Auth("authentication not configured".to_owned()))?;
    let user_id = decode_user_id(headers, secret)?;

    let profile = profiles::by_user_id(pool, user_id)
        .await?
        .ok_or_else(|| GatewayError::Auth("no dealership membership".to_owned()))?;

    Ok(AuthContext { user_id, profile })
}
