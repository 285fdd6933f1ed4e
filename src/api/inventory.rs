//! Inventory endpoints. Creates and updates schedule an embedding rebuild;
//! deletes schedule the embedding removal.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::store::inventory;
use crate::tasks::TaskKind;
use crate::types::{Vehicle, VehicleStatus};

use super::auth::authenticate;
use super::AppState;

/// Request body for vehicle create/update.
#[derive(Debug, Deserialize)]
pub struct VehicleBody {
    pub make: String,
    pub model: String,
    pub year: i32,
    pub price: Option<f64>,
    pub mileage: Option<i32>,
    pub condition: Option<String>,
    pub description: Option<String>,
    pub features: Option<String>,
    pub stock_number: Option<String>,
    pub status: Option<VehicleStatus>,
}

impl VehicleBody {
    fn validate(&self) -> Result<(), GatewayError> {
        if self.make.trim().is_empty() || self.model.trim().is_empty() {
            return Err(GatewayError::Input(
                "make and model must not be empty".to_owned(),
            ));
        }
        if !(1900..=2035).contains(&self.year) {
            return Err(GatewayError::Input("year out of range".to_owned()));
        }
        Ok(())
    }
}

/// POST /api/inventory
pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<VehicleBody>,
) -> Result<Json<Vehicle>, GatewayError> {
    let ctx = authenticate(&state.pool, &headers, state.jwt_secret.as_deref()).await?;
    body.validate()?;
    let vehicle = inventory::create(
        &state.pool,
        inventory::NewVehicle {
            dealership_id: ctx.dealership_id(),
            make: body.make,
            model: body.model,
            year: body.year,
            price: body.price,
            mileage: body.mileage,
            condition: body.condition,
            description: body.description,
            features: body.features,
            stock_number: body.stock_number,
        },
    )
    .await?;

    state
        .tasks
        .enqueue(TaskKind::EmbeddingBuild {
            dealership_id: vehicle.dealership_id,
            vehicle_id: vehicle.id,
        })
        .await;
    Ok(Json(vehicle))
}

/// GET /api/inventory
pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Vehicle>>, GatewayError> {
    let ctx = authenticate(&state.pool, &headers, state.jwt_secret.as_deref()).await?;
    let vehicles = inventory::list_by_dealership(&state.pool, ctx.dealership_id()).await?;
    Ok(Json(vehicles))
}

/// GET /api/inventory/:id
pub async fn fetch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Vehicle>, GatewayError> {
    let ctx = authenticate(&state.pool, &headers, state.jwt_secret.as_deref()).await?;
    let vehicle = inventory::get(&state.pool, ctx.dealership_id(), id).await?;
    Ok(Json(vehicle))
}

/// PUT /api/inventory/:id
pub async fn update(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<VehicleBody>,
) -> Result<Json<Vehicle>, GatewayError> {
    let ctx = authenticate(&state.pool, &headers, state.jwt_secret.as_deref()).await?;
    body.validate()?;
    let before = inventory::get(&state.pool, ctx.dealership_id(), id).await?;
    let status = body.status.unwrap_or(before.status);
    let vehicle = inventory::update(
        &state.pool,
        ctx.dealership_id(),
        id,
        inventory::NewVehicle {
            dealership_id: ctx.dealership_id(),
            make: body.make,
            model: body.model,
            year: body.year,
            price: body.price,
            mileage: body.mileage,
            condition: body.condition,
            description: body.description,
            features: body.features,
            stock_number: body.stock_number,
        },
        status,
    )
    .await?;

    // Rebuild only when the embedding input actually changed.
    if vehicle.embedding_input() != before.embedding_input() {
        state
            .tasks
            .enqueue(TaskKind::EmbeddingBuild {
                dealership_id: vehicle.dealership_id,
                vehicle_id: vehicle.id,
            })
            .await;
    }
    Ok(Json(vehicle))
}

/// DELETE /api/inventory/:id
pub async fn remove(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let ctx = authenticate(&state.pool, &headers, state.jwt_secret.as_deref()).await?;
    inventory::delete(&state.pool, ctx.dealership_id(), id).await?;
    state
        .tasks
        .enqueue(TaskKind::EmbeddingDelete {
            dealership_id: ctx.dealership_id(),
            vehicle_id: id,
        })
        .await;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
