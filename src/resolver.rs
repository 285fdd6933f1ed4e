//! Inbound phone → dealership resolution.
//!
//! Resolution order, first match wins:
//! 1. exact lead phone match on the sender's number (the customer already
//!    belongs somewhere)
//! 2. any dealership's integration-config mapping of the receiving line
//! 3. the configured default dealership, when one is set
//!
//! There is deliberately no compiled-in default: an unmatched number with no
//! configured fallback is a routing miss, surfaced as `NotFound`.

use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::GatewayError;
use crate::phone;
use crate::store::{dealerships, leads};

/// Resolve which dealership an inbound message belongs to.
///
/// `from_phone` is the sender, `to_phone` the receiving dealership line;
/// both are normalized before matching.
///
/// # Errors
///
/// `Input` for numbers that cannot be normalized, `NotFound` when nothing
/// matches and no default is configured; database failures propagate.
pub async fn resolve_dealership(
    pool: &PgPool,
    from_phone: &str,
    to_phone: &str,
    default_dealership_id: Option<Uuid>,
) -> Result<Uuid, GatewayError> {
    let from = phone::normalize(from_phone)
        .ok_or_else(|| GatewayError::Input(format!("invalid phone number: {from_phone}")))?;

    if let Some(dealership_id) = leads::find_dealership_by_phone(pool, &from).await? {
        info!(%dealership_id, phone = %from, "resolved dealership from existing lead");
        return Ok(dealership_id);
    }

    if let Some(to) = phone::normalize(to_phone) {
        if let Some(dealership_id) = dealerships::find_by_configured_phone(pool, &to).await? {
            info!(%dealership_id, phone = %to, "resolved dealership from integration config");
            return Ok(dealership_id);
        }
    }

    match default_dealership_id {
        Some(dealership_id) => {
            warn!(
                %dealership_id,
                phone = %from,
                "no dealership mapping found, using configured default"
            );
            Ok(dealership_id)
        }
        None => Err(GatewayError::NotFound(format!(
            "no dealership for phone {from}"
        ))),
    }
}
