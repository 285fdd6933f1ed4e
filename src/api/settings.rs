//! Settings endpoints: definitions, user-level, and dealership-level values.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::error::GatewayError;
use crate::settings;

use super::auth::authenticate;
use super::AppState;

/// GET /api/settings/definitions
pub async fn definitions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, GatewayError> {
    authenticate(&state.pool, &headers, state.jwt_secret.as_deref()).await?;
    let defs: Vec<serde_json::Value> = settings::definitions()
        .into_iter()
        .map(|d| {
            serde_json::json!({
                "key": d.key,
                "description": d.description,
                "default_value": d.default_value,
                "allowed_values": d.allowed_values,
                "dealership_level": d.dealership_level,
                "user_level": d.user_level,
            })
        })
        .collect();
    Ok(Json(serde_json::json!({ "definitions": defs })))
}

/// GET /api/settings/user/:key — the effective value after user →
/// dealership → default resolution.
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let ctx = authenticate(&state.pool, &headers, state.jwt_secret.as_deref()).await?;
    let value = settings::get_user_effective(&state.pool, ctx.user_id, &key).await?;
    Ok(Json(serde_json::json!({ "key": key, "value": value })))
}

/// Request body for setting writes.
#[derive(Debug, Deserialize)]
pub struct SetValue {
    pub value: serde_json::Value,
}

/// PUT /api/settings/user/:key
pub async fn set_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
    Json(body): Json<SetValue>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let ctx = authenticate(&state.pool, &headers, state.jwt_secret.as_deref()).await?;
    settings::set_user(&state.pool, ctx.user_id, &key, body.value).await?;
    Ok(Json(serde_json::json!({ "updated": true })))
}

/// DELETE /api/settings/user/:key
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let ctx = authenticate(&state.pool, &headers, state.jwt_secret.as_deref()).await?;
    settings::delete_user(&state.pool, ctx.user_id, &key).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// GET /api/settings/dealership/:key
pub async fn get_dealership(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let ctx = authenticate(&state.pool, &headers, state.jwt_secret.as_deref()).await?;
    let value = settings::get_dealership(&state.pool, ctx.dealership_id(), &key).await?;
    Ok(Json(serde_json::json!({ "key": key, "value": value })))
}

/// PUT /api/settings/dealership/:key (manager+, enforced in the resolver)
pub async fn set_dealership(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
    Json(body): Json<SetValue>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let ctx = authenticate(&state.pool, &headers, state.jwt_secret.as_deref()).await?;
    settings::set_dealership(
        &state.pool,
        ctx.dealership_id(),
        &key,
        body.value,
        ctx.profile.role,
        ctx.user_id,
    )
    .await?;
    Ok(Json(serde_json::json!({ "updated": true })))
}
