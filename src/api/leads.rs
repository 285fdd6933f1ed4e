//! Lead endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::phone;
use crate::store::{conversations, leads};
use crate::types::{ConversationTurn, Lead, LeadStatus};

use super::auth::authenticate;
use super::AppState;

/// Request body for lead creation.
#[derive(Debug, Deserialize)]
pub struct CreateLead {
    pub name: String,
    pub car_interest: Option<String>,
    pub source: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub max_price: Option<String>,
}

/// POST /api/leads
pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateLead>,
) -> Result<Json<Lead>, GatewayError> {
    let ctx = authenticate(&state.pool, &headers, state.jwt_secret.as_deref()).await?;
    if body.name.trim().is_empty() {
        return Err(GatewayError::Input("name must not be empty".to_owned()));
    }
    let lead = leads::create(
        &state.pool,
        leads::NewLead {
            dealership_id: ctx.dealership_id(),
            name: body.name,
            car_interest: body.car_interest.unwrap_or_else(|| "Unknown".to_owned()),
            source: body.source.unwrap_or_else(|| "manual".to_owned()),
            phone: body.phone.as_deref().and_then(phone::normalize),
            email: body.email,
            max_price: body.max_price,
            assigned_user_id: Some(ctx.user_id),
        },
    )
    .await?;
    Ok(Json(lead))
}

/// GET /api/leads
pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Lead>>, GatewayError> {
    let ctx = authenticate(&state.pool, &headers, state.jwt_secret.as_deref()).await?;
    let all = leads::list_by_dealership(&state.pool, ctx.dealership_id()).await?;
    Ok(Json(all))
}

/// GET /api/leads/:id
pub async fn fetch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Lead>, GatewayError> {
    let ctx = authenticate(&state.pool, &headers, state.jwt_secret.as_deref()).await?;
    let lead = leads::get(&state.pool, ctx.dealership_id(), id).await?;
    Ok(Json(lead))
}

/// Request body for status updates.
#[derive(Debug, Deserialize)]
pub struct UpdateStatus {
    pub status: LeadStatus,
}

/// PUT /api/leads/:id/status
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateStatus>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let ctx = authenticate(&state.pool, &headers, state.jwt_secret.as_deref()).await?;
    leads::update_status(&state.pool, ctx.dealership_id(), id, body.status).await?;
    Ok(Json(serde_json::json!({ "updated": true })))
}

/// GET /api/leads/:id/conversations
pub async fn conversations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ConversationTurn>>, GatewayError> {
    let ctx = authenticate(&state.pool, &headers, state.jwt_secret.as_deref()).await?;
    // Scope check: the lead must belong to the caller's dealership.
    leads::get(&state.pool, ctx.dealership_id(), id).await?;
    let history = conversations::history(&state.pool, id).await?;
    Ok(Json(history))
}
