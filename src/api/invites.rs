//! Staff invite endpoints. Creation and cancellation are manager-gated; the
//! plain token appears only in the creation response.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::roles;
use crate::store::{invites, profiles};
use crate::types::{Invite, Role, UserProfile};

use super::auth::authenticate;
use super::AppState;

/// Request body for invite creation.
#[derive(Debug, Deserialize)]
pub struct CreateInvite {
    pub email: String,
    pub role: Role,
}

/// POST /api/invites (manager+)
pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateInvite>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let ctx = authenticate(&state.pool, &headers, state.jwt_secret.as_deref()).await?;
    if !roles::can_manage_invites(ctx.profile.role) {
        return Err(GatewayError::Auth(
            "invite creation requires manager or owner".to_owned(),
        ));
    }
    if !body.email.contains('@') {
        return Err(GatewayError::Input("invalid email".to_owned()));
    }

    let (invite, plain_token) = invites::create(
        &state.pool,
        ctx.dealership_id(),
        &body.email,
        body.role,
        ctx.user_id,
    )
    .await?;

    Ok(Json(serde_json::json!({
        "invite": invite,
        "token": plain_token,
    })))
}

/// GET /api/invites/verify/:token — unauthenticated by design: the invitee
/// has no account yet. Reveals only what the invite screen needs.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let invite: Invite = invites::verify(&state.pool, &token).await?;
    Ok(Json(serde_json::json!({
        "email": invite.email,
        "role": invite.role,
        "expires_at": invite.expires_at,
    })))
}

/// Request body for invite completion.
#[derive(Debug, Deserialize)]
pub struct CompleteInvite {
    pub token: String,
}

/// POST /api/invites/complete — attach the authenticated user to the
/// invite's dealership with the invited role.
pub async fn complete(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CompleteInvite>,
) -> Result<Json<UserProfile>, GatewayError> {
    // Token-only authentication of identity; the user may not yet have a
    // profile, so this endpoint validates the JWT directly.
    let secret = state
        .jwt_secret
        .as_deref()
        .ok_or_else(|| GatewayError::Auth("authentication not configured".to_owned()))?;
    let user_id = super::auth::decode_user_id(&headers, secret)?;

    let invite = invites::verify(&state.pool, &body.token).await?;
    let profile =
        profiles::attach(&state.pool, user_id, invite.dealership_id, invite.role).await?;
    invites::mark_accepted(&state.pool, invite.id).await?;
    Ok(Json(profile))
}

/// DELETE /api/invites/:id (manager+)
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let ctx = authenticate(&state.pool, &headers, state.jwt_secret.as_deref()).await?;
    if !roles::can_manage_invites(ctx.profile.role) {
        return Err(GatewayError::Auth(
            "invite cancellation requires manager or owner".to_owned(),
        ));
    }
    invites::cancel(&state.pool, ctx.dealership_id(), id).await?;
    Ok(Json(serde_json::json!({ "cancelled": true })))
}
