//! Dealership integration endpoints: provider phone-number mappings.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::error::GatewayError;
use crate::phone;
use crate::roles;
use crate::store::dealerships;

use super::auth::authenticate;
use super::AppState;

/// GET /api/integrations — the caller's dealership config.
pub async fn fetch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let ctx = authenticate(&state.pool, &headers, state.jwt_secret.as_deref()).await?;
    let dealership = dealerships::get(&state.pool, ctx.dealership_id()).await?;
    Ok(Json(serde_json::json!({
        "integration_config": dealership.integration_config,
    })))
}

/// Request body for phone-mapping updates.
#[derive(Debug, Deserialize)]
pub struct SetPhones {
    pub phone_numbers: Vec<String>,
}

/// PUT /api/integrations/:provider (manager+)
pub async fn set_phones(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(provider): Path<String>,
    Json(body): Json<SetPhones>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let ctx = authenticate(&state.pool, &headers, state.jwt_secret.as_deref()).await?;
    if !roles::can_manage_settings(ctx.profile.role) {
        return Err(GatewayError::Auth(
            "integration changes require manager or owner".to_owned(),
        ));
    }
    if !state.providers.contains_key(&provider) {
        return Err(GatewayError::Input(format!("unknown provider: {provider}")));
    }

    let normalized: Vec<String> = body
        .phone_numbers
        .iter()
        .map(|raw| {
            phone::normalize(raw)
                .ok_or_else(|| GatewayError::Input(format!("invalid phone number: {raw}")))
        })
        .collect::<Result<_, _>>()?;

    dealerships::set_provider_phones(&state.pool, ctx.dealership_id(), &provider, &normalized)
        .await?;
    Ok(Json(serde_json::json!({
        "provider": provider,
        "phone_numbers": normalized,
    })))
}
