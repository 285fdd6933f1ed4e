//! Hierarchical settings: user → dealership → definition default.
//!
//! Definitions are a static registry; values live in two tables keyed by
//! `(user_id, key)` and `(dealership_id, key)`. Every write is validated
//! against the definition before it lands: data type, allowed values, the
//! 0–300 s delay range, and HH:MM time fields.

use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::roles;
use crate::scheduler::{parse_hhmm, ReplyTimingMode, ReplyTimingSettings};
use crate::types::Role;

/// Value type a setting accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    String,
    Number,
    Boolean,
}

/// Static metadata for one setting key.
#[derive(Debug, Clone)]
pub struct SettingDefinition {
    pub key: &'static str,
    pub data_type: DataType,
    pub description: &'static str,
    pub default_value: Value,
    pub allowed_values: Option<&'static [&'static str]>,
    pub dealership_level: bool,
    pub user_level: bool,
}

/// Delay settings accept 0..=300 seconds.
const MAX_DELAY_SECONDS: f64 = 300.0;

/// All known setting definitions.
pub fn definitions() -> Vec<SettingDefinition> {
    vec![
        SettingDefinition {
            key: "reply_timing_mode",
            data_type: DataType::String,
            description: "When AI replies are sent: instant, custom_delay, or business_hours",
            default_value: Value::String("instant".to_owned()),
            allowed_values: Some(&["instant", "custom_delay", "business_hours"]),
            dealership_level: true,
            user_level: false,
        },
        SettingDefinition {
            key: "reply_delay_seconds",
            data_type: DataType::Number,
            description: "Delay for custom_delay mode, in seconds (0-300)",
            default_value: Value::from(30.0),
            allowed_values: None,
            dealership_level: true,
            user_level: false,
        },
        SettingDefinition {
            key: "business_hours_start",
            data_type: DataType::String,
            description: "Business hours window start, HH:MM",
            default_value: Value::String("09:00".to_owned()),
            allowed_values: None,
            dealership_level: true,
            user_level: false,
        },
        SettingDefinition {
            key: "business_hours_end",
            data_type: DataType::String,
            description: "Business hours window end, HH:MM",
            default_value: Value::String("17:00".to_owned()),
            allowed_values: None,
            dealership_level: true,
            user_level: false,
        },
        SettingDefinition {
            key: "business_hours_delay_seconds",
            data_type: DataType::Number,
            description: "Delay during business hours, in seconds (0-300)",
            default_value: Value::from(60.0),
            allowed_values: None,
            dealership_level: true,
            user_level: false,
        },
        SettingDefinition {
            key: "auto_response_enabled",
            data_type: DataType::Boolean,
            description: "Whether the agent replies to customers automatically",
            default_value: Value::Bool(true),
            dealership_level: true,
            user_level: true,
            allowed_values: None,
        },
        SettingDefinition {
            key: "notification_preference",
            data_type: DataType::String,
            description: "How salespeople are notified about drafts and handoffs",
            default_value: Value::String("sms".to_owned()),
            allowed_values: Some(&["sms", "none"]),
            dealership_level: true,
            user_level: true,
        },
    ]
}

/// Look up a setting definition by key.
pub fn definition(key: &str) -> Option<SettingDefinition> {
    definitions().into_iter().find(|d| d.key == key)
}

/// Validate a value against its definition.
///
/// # Errors
///
/// Returns [`GatewayError::Input`] describing the first violated rule.
pub fn validate(def: &SettingDefinition, value: &Value) -> Result<(), GatewayError> {
    match def.data_type {
        DataType::String => {
            if !value.is_string() {
                return Err(GatewayError::Input(format!(
                    "{} must be a string",
                    def.key
                )));
            }
        }
        DataType::Number => {
            if !value.is_number() {
                return Err(GatewayError::Input(format!(
                    "{} must be a number",
                    def.key
                )));
            }
        }
        DataType::Boolean => {
            if !value.is_boolean() {
                return Err(GatewayError::Input(format!(
                    "{} must be a boolean",
                    def.key
                )));
            }
        }
    }

    if let Some(allowed) = def.allowed_values {
        let s = value.as_str().unwrap_or_default();
        if !allowed.contains(&s) {
            return Err(GatewayError::Input(format!(
                "{} must be one of: {}",
                def.key,
                allowed.join(", ")
            )));
        }
    }

    if def.key.ends_with("_delay_seconds") {
        let n = value.as_f64().unwrap_or(-1.0);
        if !(0.0..=MAX_DELAY_SECONDS).contains(&n) {
            return Err(GatewayError::Input(format!(
                "{} must be between 0 and {MAX_DELAY_SECONDS}",
                def.key
            )));
        }
    }

    if def.key.starts_with("business_hours_") && def.data_type == DataType::String {
        let s = value.as_str().unwrap_or_default();
        if parse_hhmm(s).is_none() {
            return Err(GatewayError::Input(format!(
                "{} must be in HH:MM format",
                def.key
            )));
        }
    }

    Ok(())
}

/// Effective value for `(user, key)`: user table → dealership table for the
/// user's dealership → definition default.
///
/// # Errors
///
/// `NotFound` for unknown keys; database failures propagate.
pub async fn get_user_effective(
    pool: &PgPool,
    user_id: Uuid,
    key: &str,
) -> Result<Value, GatewayError> {
    let def = definition(key)
        .ok_or_else(|| GatewayError::NotFound(format!("unknown setting key: {key}")))?;

    let user_value: Option<(Value,)> = sqlx::query_as(
        "SELECT setting_value FROM user_settings WHERE user_id = $1 AND setting_key = $2",
    )
    .bind(user_id)
    .bind(key)
    .fetch_optional(pool)
    .await?;
    if let Some((value,)) = user_value {
        return Ok(value);
    }

    let dealership_value: Option<(Value,)> = sqlx::query_as(
        "SELECT ds.setting_value FROM dealership_settings ds \
         JOIN user_profiles up ON up.dealership_id = ds.dealership_id \
         WHERE up.user_id = $1 AND ds.setting_key = $2",
    )
    .bind(user_id)
    .bind(key)
    .fetch_optional(pool)
    .await?;
    if let Some((value,)) = dealership_value {
        return Ok(value);
    }

    Ok(def.default_value)
}

/// Dealership-level value, falling back to the definition default.
///
/// # Errors
///
/// `NotFound` for unknown keys; database failures propagate.
pub async fn get_dealership(
    pool: &PgPool,
    dealership_id: Uuid,
    key: &str,
) -> Result<Value, GatewayError> {
    let def = definition(key)
        .ok_or_else(|| GatewayError::NotFound(format!("unknown setting key: {key}")))?;

    let row: Option<(Value,)> = sqlx::query_as(
        "SELECT setting_value FROM dealership_settings \
         WHERE dealership_id = $1 AND setting_key = $2",
    )
    .bind(dealership_id)
    .bind(key)
    .fetch_optional(pool)
    .await?;

    Ok(row.map_or(def.default_value, |(value,)| value))
}

/// Upsert a user-level setting.
///
/// # Errors
///
/// `NotFound` for unknown keys, `Input` for non-user-level keys or invalid
/// values; database failures propagate.
pub async fn set_user(
    pool: &PgPool,
    user_id: Uuid,
    key: &str,
    value: Value,
) -> Result<(), GatewayError> {
    let def = definition(key)
        .ok_or_else(|| GatewayError::NotFound(format!("unknown setting key: {key}")))?;
    if !def.user_level {
        return Err(GatewayError::Input(format!(
            "{key} is not user-configurable"
        )));
    }
    validate(&def, &value)?;

    sqlx::query(
        "INSERT INTO user_settings (user_id, setting_key, setting_value, updated_at) \
         VALUES ($1, $2, $3, now()) \
         ON CONFLICT (user_id, setting_key) \
         DO UPDATE SET setting_value = $3, updated_at = now()",
    )
    .bind(user_id)
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

/// Upsert a dealership-level setting. Requires manager or above.
///
/// # Errors
///
/// `Auth` when the actor is below manager, `NotFound`/`Input` as for
/// [`set_user`]; database failures propagate.
pub async fn set_dealership(
    pool: &PgPool,
    dealership_id: Uuid,
    key: &str,
    value: Value,
    actor_role: Role,
    actor_user_id: Uuid,
) -> Result<(), GatewayError> {
    if !roles::can_manage_settings(actor_role) {
        return Err(GatewayError::Auth(
            "dealership settings require manager or owner".to_owned(),
        ));
    }
    let def = definition(key)
        .ok_or_else(|| GatewayError::NotFound(format!("unknown setting key: {key}")))?;
    if !def.dealership_level {
        return Err(GatewayError::Input(format!(
            "{key} is not dealership-configurable"
        )));
    }
    validate(&def, &value)?;

    sqlx::query(
        "INSERT INTO dealership_settings \
         (dealership_id, setting_key, setting_value, updated_by, updated_at) \
         VALUES ($1, $2, $3, $4, now()) \
         ON CONFLICT (dealership_id, setting_key) \
         DO UPDATE SET setting_value = $3, updated_by = $4, updated_at = now()",
    )
    .bind(dealership_id)
    .bind(key)
    .bind(value)
    .bind(actor_user_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Remove a user-level override, falling resolution back to the dealership
/// value or default.
///
/// # Errors
///
/// Database failures propagate.
pub async fn delete_user(pool: &PgPool, user_id: Uuid, key: &str) -> Result<(), GatewayError> {
    sqlx::query("DELETE FROM user_settings WHERE user_id = $1 AND setting_key = $2")
        .bind(user_id)
        .bind(key)
        .execute(pool)
        .await?;
    Ok(())
}

/// Assemble the reply-timing settings for a dealership from its effective
/// setting values plus its timezone.
///
/// # Errors
///
/// Database failures propagate.
pub async fn reply_timing_for_dealership(
    pool: &PgPool,
    dealership_id: Uuid,
    timezone: &str,
) -> Result<ReplyTimingSettings, GatewayError> {
    let mode_value = get_dealership(pool, dealership_id, "reply_timing_mode").await?;
    let delay = get_dealership(pool, dealership_id, "reply_delay_seconds").await?;
    let start = get_dealership(pool, dealership_id, "business_hours_start").await?;
    let end = get_dealership(pool, dealership_id, "business_hours_end").await?;
    let bh_delay = get_dealership(pool, dealership_id, "business_hours_delay_seconds").await?;

    let defaults = ReplyTimingSettings::default();
    Ok(ReplyTimingSettings {
        mode: ReplyTimingMode::parse(mode_value.as_str().unwrap_or("instant")),
        reply_delay_seconds: delay.as_f64().unwrap_or(defaults.reply_delay_seconds),
        business_hours_start: start
            .as_str()
            .map_or(defaults.business_hours_start.clone(), str::to_owned),
        business_hours_end: end
            .as_str()
            .map_or(defaults.business_hours_end.clone(), str::to_owned),
        business_hours_delay_seconds: bh_delay
            .as_f64()
            .unwrap_or(defaults.business_hours_delay_seconds),
        timezone: timezone.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_definition_default_validates() {
        for def in definitions() {
            validate(&def, &def.default_value).expect("default must be valid");
        }
    }

    #[test]
    fn reply_timing_mode_rejects_unknown_values() {
        let def = definition("reply_timing_mode").expect("defined");
        assert!(validate(&def, &Value::String("instant".to_owned())).is_ok());
        assert!(validate(&def, &Value::String("warp".to_owned())).is_err());
        assert!(validate(&def, &Value::from(3)).is_err());
    }

    #[test]
    fn delay_range_enforced() {
        let def = definition("reply_delay_seconds").expect("defined");
        assert!(validate(&def, &Value::from(0)).is_ok());
        assert!(validate(&def, &Value::from(300)).is_ok());
        assert!(validate(&def, &Value::from(301)).is_err());
        assert!(validate(&def, &Value::from(-1)).is_err());
    }

    #[test]
    fn business_hours_must_be_hhmm() {
        let def = definition("business_hours_start").expect("defined");
        assert!(validate(&def, &Value::String("09:00".to_owned())).is_ok());
        assert!(validate(&def, &Value::String("9am".to_owned())).is_err());
    }

    #[test]
    fn boolean_type_enforced() {
        let def = definition("auto_response_enabled").expect("defined");
        assert!(validate(&def, &Value::Bool(false)).is_ok());
        assert!(validate(&def, &Value::String("false".to_owned())).is_err());
    }

    #[test]
    fn unknown_key_has_no_definition() {
        assert!(definition("nonexistent_key").is_none());
    }
}
