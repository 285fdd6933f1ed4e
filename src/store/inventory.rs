//! Inventory vehicle persistence.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::types::{Vehicle, VehicleStatus};

const VEHICLE_COLUMNS: &str = "id, dealership_id, make, model, year, price, mileage, \
                               condition, description, features, stock_number, status";

/// Fields for a new vehicle.
#[derive(Debug, Clone)]
pub struct NewVehicle {
    pub dealership_id: Uuid,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub price: Option<f64>,
    pub mileage: Option<i32>,
    pub condition: Option<String>,
    pub description: Option<String>,
    pub features: Option<String>,
    pub stock_number: Option<String>,
}

/// Insert a new vehicle with status `active`.
///
/// # Errors
///
/// Database failures propagate.
pub async fn create(pool: &PgPool, new: NewVehicle) -> Result<Vehicle, GatewayError> {
    let vehicle = sqlx::query_as::<_, Vehicle>(&format!(
        "INSERT INTO inventory \
         (id, dealership_id, make, model, year, price, mileage, condition, \
          description, features, stock_number, status, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'active', now(), now()) \
         RETURNING {VEHICLE_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(new.dealership_id)
    .bind(&new.make)
    .bind(&new.model)
    .bind(new.year)
    .bind(new.price)
    .bind(new.mileage)
    .bind(&new.condition)
    .bind(&new.description)
    .bind(&new.features)
    .bind(&new.stock_number)
    .fetch_one(pool)
    .await?;
    Ok(vehicle)
}

/// Fetch a vehicle by id within a dealership.
///
/// # Errors
///
/// `NotFound` when absent; database failures propagate.
pub async fn get(pool: &PgPool, dealership_id: Uuid, id: Uuid) -> Result<Vehicle, GatewayError> {
    sqlx::query_as::<_, Vehicle>(&format!(
        "SELECT {VEHICLE_COLUMNS} FROM inventory WHERE dealership_id = $1 AND id = $2"
    ))
    .bind(dealership_id)
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| GatewayError::NotFound(format!("vehicle {id}")))
}

/// List a dealership's vehicles, newest first.
///
/// # Errors
///
/// Database failures propagate.
pub async fn list_by_dealership(
    pool: &PgPool,
    dealership_id: Uuid,
) -> Result<Vec<Vehicle>, GatewayError> {
    let vehicles = sqlx::query_as::<_, Vehicle>(&format!(
        "SELECT {VEHICLE_COLUMNS} FROM inventory WHERE dealership_id = $1 \
         ORDER BY created_at DESC"
    ))
    .bind(dealership_id)
    .fetch_all(pool)
    .await?;
    Ok(vehicles)
}

/// Update the embedding-relevant and descriptive fields of a vehicle.
///
/// Returns the updated row; the caller decides whether the embedding input
/// changed and schedules a rebuild.
///
/// # Errors
///
/// `NotFound` when absent; database failures propagate.
pub async fn update(
    pool: &PgPool,
    dealership_id: Uuid,
    id: Uuid,
    new: NewVehicle,
    status: VehicleStatus,
) -> Result<Vehicle, GatewayError> {
    sqlx::query_as::<_, Vehicle>(&format!(
        "UPDATE inventory SET make = $3, model = $4, year = $5, price = $6, \
         mileage = $7, condition = $8, description = $9, features = $10, \
         stock_number = $11, status = $12, updated_at = now() \
         WHERE dealership_id = $1 AND id = $2 \
         RETURNING {VEHICLE_COLUMNS}"
    ))
    .bind(dealership_id)
    .bind(id)
    .bind(&new.make)
    .bind(&new.model)
    .bind(new.year)
    .bind(new.price)
    .bind(new.mileage)
    .bind(&new.condition)
    .bind(&new.description)
    .bind(&new.features)
    .bind(&new.stock_number)
    .bind(status)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| GatewayError::NotFound(format!("vehicle {id}")))
}

/// Delete a vehicle. The caller schedules the embedding delete.
///
/// # Errors
///
/// `NotFound` when absent; database failures propagate.
pub async fn delete(pool: &PgPool, dealership_id: Uuid, id: Uuid) -> Result<(), GatewayError> {
    let result = sqlx::query("DELETE FROM inventory WHERE dealership_id = $1 AND id = $2")
        .bind(dealership_id)
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(GatewayError::NotFound(format!("vehicle {id}")));
    }
    Ok(())
}
