//! Lead persistence.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::types::{Lead, LeadStatus};

const LEAD_COLUMNS: &str = "id, dealership_id, name, car_interest, source, status, phone, \
                            email, last_contact_at, assigned_user_id, appointment_datetime, \
                            max_price, created_at";

/// Fields for a new lead.
#[derive(Debug, Clone)]
pub struct NewLead {
    pub dealership_id: Uuid,
    pub name: String,
    pub car_interest: String,
    pub source: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub max_price: Option<String>,
    pub assigned_user_id: Option<Uuid>,
}

/// Find a lead by exact phone match within a dealership.
///
/// # Errors
///
/// Database failures propagate.
pub async fn find_by_phone(
    pool: &PgPool,
    dealership_id: Uuid,
    phone: &str,
) -> Result<Option<Lead>, GatewayError> {
    let lead = sqlx::query_as::<_, Lead>(&format!(
        "SELECT {LEAD_COLUMNS} FROM leads WHERE dealership_id = $1 AND phone = $2 LIMIT 1"
    ))
    .bind(dealership_id)
    .bind(phone)
    .fetch_optional(pool)
    .await?;
    Ok(lead)
}

/// Find any lead with this phone, across dealerships (used only by the
/// phone resolver).
///
/// # Errors
///
/// Database failures propagate.
pub async fn find_dealership_by_phone(
    pool: &PgPool,
    phone: &str,
) -> Result<Option<Uuid>, GatewayError> {
    let row: Option<(Uuid,)> =
        sqlx::query_as("SELECT dealership_id FROM leads WHERE phone = $1 LIMIT 1")
            .bind(phone)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(id,)| id))
}

/// Insert a new lead with status `new`.
///
/// # Errors
///
/// Database failures propagate.
pub async fn create(pool: &PgPool, new: NewLead) -> Result<Lead, GatewayError> {
    let lead = sqlx::query_as::<_, Lead>(&format!(
        "INSERT INTO leads \
         (id, dealership_id, name, car_interest, source, status, phone, email, \
          max_price, assigned_user_id, last_contact_at, created_at) \
         VALUES ($1, $2, $3, $4, $5, 'new', $6, $7, $8, $9, now(), now()) \
         RETURNING {LEAD_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(new.dealership_id)
    .bind(&new.name)
    .bind(&new.car_interest)
    .bind(&new.source)
    .bind(&new.phone)
    .bind(&new.email)
    .bind(&new.max_price)
    .bind(new.assigned_user_id)
    .fetch_one(pool)
    .await?;
    Ok(lead)
}

/// Fetch a lead by id within a dealership.
///
/// # Errors
///
/// `NotFound` when absent; database failures propagate.
pub async fn get(pool: &PgPool, dealership_id: Uuid, id: Uuid) -> Result<Lead, GatewayError> {
    sqlx::query_as::<_, Lead>(&format!(
        "SELECT {LEAD_COLUMNS} FROM leads WHERE dealership_id = $1 AND id = $2"
    ))
    .bind(dealership_id)
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| GatewayError::NotFound(format!("lead {id}")))
}

/// List a dealership's leads, most recently contacted first.
///
/// # Errors
///
/// Database failures propagate.
pub async fn list_by_dealership(
    pool: &PgPool,
    dealership_id: Uuid,
) -> Result<Vec<Lead>, GatewayError> {
    let leads = sqlx::query_as::<_, Lead>(&format!(
        "SELECT {LEAD_COLUMNS} FROM leads WHERE dealership_id = $1 \
         ORDER BY last_contact_at DESC"
    ))
    .bind(dealership_id)
    .fetch_all(pool)
    .await?;
    Ok(leads)
}

/// Update a lead's status.
///
/// # Errors
///
/// `NotFound` when absent; database failures propagate.
pub async fn update_status(
    pool: &PgPool,
    dealership_id: Uuid,
    id: Uuid,
    status: LeadStatus,
) -> Result<(), GatewayError> {
    let result = sqlx::query(
        "UPDATE leads SET status = $3 WHERE dealership_id = $1 AND id = $2",
    )
    .bind(dealership_id)
    .bind(id)
    .bind(status)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(GatewayError::NotFound(format!("lead {id}")));
    }
    Ok(())
}

/// Stamp the last-contact time.
///
/// # Errors
///
/// Database failures propagate.
pub async fn touch_last_contact(pool: &PgPool, id: Uuid) -> Result<(), GatewayError> {
    sqlx::query("UPDATE leads SET last_contact_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Record a booked appointment: datetime plus status `appointment_booked`.
///
/// # Errors
///
/// Database failures propagate.
pub async fn record_appointment(
    pool: &PgPool,
    id: Uuid,
    appointment: DateTime<Utc>,
) -> Result<(), GatewayError> {
    sqlx::query(
        "UPDATE leads SET appointment_datetime = $2, status = 'appointment_booked' \
         WHERE id = $1",
    )
    .bind(id)
    .bind(appointment)
    .execute(pool)
    .await?;
    Ok(())
}
