//! User profile persistence. One row per staff membership; phone numbers
//! identify salespeople on inbound messages.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::types::{Role, UserProfile};

const PROFILE_COLUMNS: &str = "id, user_id, dealership_id, full_name, phone, role, timezone";

/// Look up the profile for an external auth identity.
///
/// # Errors
///
/// Database failures propagate.
pub async fn by_user_id(pool: &PgPool, user_id: Uuid) -> Result<Option<UserProfile>, GatewayError> {
    let profile = sqlx::query_as::<_, UserProfile>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE user_id = $1 LIMIT 1"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(profile)
}

/// Find a staff member by phone within a dealership — the salesperson
/// classification check on inbound messages.
///
/// # Errors
///
/// Database failures propagate.
pub async fn by_phone(
    pool: &PgPool,
    dealership_id: Uuid,
    phone: &str,
) -> Result<Option<UserProfile>, GatewayError> {
    let profile = sqlx::query_as::<_, UserProfile>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM user_profiles \
         WHERE dealership_id = $1 AND phone = $2 LIMIT 1"
    ))
    .bind(dealership_id)
    .bind(phone)
    .fetch_optional(pool)
    .await?;
    Ok(profile)
}

/// List a dealership's staff.
///
/// # Errors
///
/// Database failures propagate.
pub async fn list_by_dealership(
    pool: &PgPool,
    dealership_id: Uuid,
) -> Result<Vec<UserProfile>, GatewayError> {
    let profiles = sqlx::query_as::<_, UserProfile>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE dealership_id = $1"
    ))
    .bind(dealership_id)
    .fetch_all(pool)
    .await?;
    Ok(profiles)
}

/// Attach a user to a dealership with the given role (invite completion).
/// Idempotent on (user, dealership): an existing membership keeps its row
/// and gets the invited role.
///
/// # Errors
///
/// Database failures propagate.
pub async fn attach(
    pool: &PgPool,
    user_id: Uuid,
    dealership_id: Uuid,
    role: Role,
) -> Result<UserProfile, GatewayError> {
    let profile = sqlx::query_as::<_, UserProfile>(&format!(
        "INSERT INTO user_profiles \
         (id, user_id, dealership_id, role, timezone, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, 'America/New_York', now(), now()) \
         ON CONFLICT (user_id) DO UPDATE SET dealership_id = $3, role = $4, updated_at = now() \
         RETURNING {PROFILE_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(dealership_id)
    .bind(role)
    .fetch_one(pool)
    .await?;
    Ok(profile)
}
