//! Pending-approval persistence.
//!
//! Invariants enforced here:
//! - at most one `pending` row per (user, dealership): `create` first
//!   expires any existing pending row for the pair
//! - status transitions are one-way out of `pending`
//! - `get_pending` only returns rows that have not passed `expires_at`

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::types::{ApprovalStatus, PendingApproval};

const APPROVAL_COLUMNS: &str = "id, lead_id, user_id, dealership_id, customer_message, \
                                generated_response, customer_phone, status, created_at, \
                                expires_at";

/// Default approval lifetime.
const EXPIRY_HOURS: i64 = 1;

/// Fields for a new approval draft.
#[derive(Debug, Clone)]
pub struct NewApproval {
    pub lead_id: Uuid,
    pub user_id: Uuid,
    pub dealership_id: Uuid,
    pub customer_message: String,
    pub generated_response: String,
    pub customer_phone: String,
}

/// Create a pending approval, expiring any existing pending row for the
/// same (user, dealership) pair first.
///
/// # Errors
///
/// Database failures propagate.
pub async fn create(pool: &PgPool, new: NewApproval) -> Result<PendingApproval, GatewayError> {
    let mut tx = pool.begin().await.map_err(GatewayError::from)?;

    let expired = sqlx::query(
        "UPDATE pending_approvals SET status = 'expired' \
         WHERE user_id = $1 AND dealership_id = $2 AND status = 'pending'",
    )
    .bind(new.user_id)
    .bind(new.dealership_id)
    .execute(&mut *tx)
    .await
    .map_err(GatewayError::from)?;
    if expired.rows_affected() > 0 {
        info!(
            user_id = %new.user_id,
            count = expired.rows_affected(),
            "expired prior pending approvals before creating a new one"
        );
    }

    let approval = sqlx::query_as::<_, PendingApproval>(&format!(
        "INSERT INTO pending_approvals \
         (id, lead_id, user_id, dealership_id, customer_message, generated_response, \
          customer_phone, status, created_at, expires_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', now(), \
                 now() + make_interval(hours => {EXPIRY_HOURS})) \
         RETURNING {APPROVAL_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(new.lead_id)
    .bind(new.user_id)
    .bind(new.dealership_id)
    .bind(&new.customer_message)
    .bind(&new.generated_response)
    .bind(&new.customer_phone)
    .fetch_one(&mut *tx)
    .await
    .map_err(GatewayError::from)?;

    tx.commit().await.map_err(GatewayError::from)?;
    Ok(approval)
}

/// The user's unique pending approval: status `pending` and not yet expired.
///
/// # Errors
///
/// Database failures propagate.
pub async fn get_pending(
    pool: &PgPool,
    user_id: Uuid,
    dealership_id: Uuid,
) -> Result<Option<PendingApproval>, GatewayError> {
    let approval = sqlx::query_as::<_, PendingApproval>(&format!(
        "SELECT {APPROVAL_COLUMNS} FROM pending_approvals \
         WHERE user_id = $1 AND dealership_id = $2 \
           AND status = 'pending' AND expires_at > now() \
         ORDER BY created_at DESC LIMIT 1"
    ))
    .bind(user_id)
    .bind(dealership_id)
    .fetch_optional(pool)
    .await?;
    Ok(approval)
}

/// Move an approval out of `pending`. One-way: a row that already left
/// `pending` is not changed, and the call reports `Conflict`.
///
/// # Errors
///
/// `Conflict` when the row is not pending (the second approval of the same
/// draft is a no-op upstream); `Input` when the target status is `pending`;
/// database failures propagate.
pub async fn update_status(
    pool: &PgPool,
    id: Uuid,
    status: ApprovalStatus,
) -> Result<(), GatewayError> {
    if status == ApprovalStatus::Pending {
        return Err(GatewayError::Input(
            "cannot transition back to pending".to_owned(),
        ));
    }
    let result = sqlx::query(
        "UPDATE pending_approvals SET status = $2 WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .bind(status)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(GatewayError::Conflict(format!(
            "approval {id} is not pending"
        )));
    }
    Ok(())
}

/// Expire every pending approval past its deadline. Callers run this
/// periodically; expiry is not automatic.
///
/// Returns the number of rows expired.
///
/// # Errors
///
/// Database failures propagate.
pub async fn expire_stale(pool: &PgPool, now: DateTime<Utc>) -> Result<u64, GatewayError> {
    let result = sqlx::query(
        "UPDATE pending_approvals SET status = 'expired' \
         WHERE status = 'pending' AND expires_at <= $1",
    )
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
