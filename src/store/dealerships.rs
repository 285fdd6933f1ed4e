//! Dealership persistence and integration-config phone mappings.

use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::phone;
use crate::types::Dealership;

const DEALERSHIP_COLUMNS: &str = "id, name, location, integration_config";

/// Fetch a dealership by id.
///
/// # Errors
///
/// `NotFound` when absent; database failures propagate.
pub async fn get(pool: &PgPool, id: Uuid) -> Result<Dealership, GatewayError> {
    sqlx::query_as::<_, Dealership>(&format!(
        "SELECT {DEALERSHIP_COLUMNS} FROM dealerships WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| GatewayError::NotFound(format!("dealership {id}")))
}

/// Scan every dealership's integration config for a configured number
/// matching `normalized_phone`. First match wins.
///
/// # Errors
///
/// Database failures propagate.
pub async fn find_by_configured_phone(
    pool: &PgPool,
    normalized_phone: &str,
) -> Result<Option<Uuid>, GatewayError> {
    let rows: Vec<(Uuid, Value)> =
        sqlx::query_as("SELECT id, integration_config FROM dealerships")
            .fetch_all(pool)
            .await?;

    for (id, config) in rows {
        if config_contains_phone(&config, normalized_phone) {
            return Ok(Some(id));
        }
    }
    Ok(None)
}

/// Whether any provider block in `config` lists a number matching the
/// normalized input.
pub fn config_contains_phone(config: &Value, normalized_phone: &str) -> bool {
    let Some(providers) = config.as_object() else {
        return false;
    };
    providers.values().any(|block| {
        block
            .get("phone_numbers")
            .and_then(Value::as_array)
            .is_some_and(|numbers| {
                numbers
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|configured| phone::matches(configured, normalized_phone))
            })
    })
}

/// Replace one provider's phone-number mapping in the integration config.
///
/// # Errors
///
/// `NotFound` when the dealership is absent; database failures propagate.
pub async fn set_provider_phones(
    pool: &PgPool,
    dealership_id: Uuid,
    provider: &str,
    phone_numbers: &[String],
) -> Result<(), GatewayError> {
    let block = serde_json::json!({ "phone_numbers": phone_numbers });
    let result = sqlx::query(
        "UPDATE dealerships \
         SET integration_config = jsonb_set( \
             COALESCE(integration_config, '{}'::jsonb), ARRAY[$2], $3, true), \
             updated_at = now() \
         WHERE id = $1",
    )
    .bind(dealership_id)
    .bind(provider)
    .bind(block)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(GatewayError::NotFound(format!(
            "dealership {dealership_id}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finds_phone_in_any_provider_block() {
        let config = json!({
            "telnyx": {"phone_numbers": ["+15559990000"]},
            "vonage": {"phone_numbers": ["(555) 111-2222"]}
        });
        assert!(config_contains_phone(&config, "+15559990000"));
        // Matching is by normalized form, not raw string equality.
        assert!(config_contains_phone(&config, "+15551112222"));
        assert!(!config_contains_phone(&config, "+15550000000"));
    }

    #[test]
    fn empty_or_malformed_config_matches_nothing() {
        assert!(!config_contains_phone(&json!({}), "+15559990000"));
        assert!(!config_contains_phone(&json!(null), "+15559990000"));
        assert!(!config_contains_phone(&json!({"telnyx": {}}), "+15559990000"));
    }
}
