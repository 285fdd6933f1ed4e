//! Configuration loading and management.
//!
//! Loads gateway configuration from `./lotline.toml` (or `$LOTLINE_CONFIG_PATH`).
//! Environment variables override file values; file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use uuid::Uuid;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Database connection.
    pub database: DatabaseConfig,
    /// Messaging provider credentials.
    pub providers: ProvidersConfig,
    /// LLM and embedding provider credentials.
    pub llm: LlmConfig,
    /// Conversation memory cache.
    pub memory: MemoryConfig,
    /// Authentication.
    pub auth: AuthConfig,
    /// Message routing.
    pub routing: RoutingConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the webhook + control API listener.
    pub bind_addr: String,
    /// CORS allow-list origins.
    pub cors_origins: Vec<String>,
    /// Log directory for daily-rotated JSON logs.
    pub logs_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_owned(),
            cors_origins: Vec::new(),
            logs_dir: "logs".to_owned(),
        }
    }
}

/// Database connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres connection URL.
    pub url: String,
    /// Maximum pool connections.
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/lotline".to_owned(),
            max_connections: 10,
        }
    }
}

/// Credentials for one messaging provider.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProviderCredentials {
    /// API key sent as a bearer token on outbound sends.
    pub api_key: Option<String>,
    /// Shared secret for inbound webhook HMAC verification.
    ///
    /// When absent, signature verification is skipped — development mode
    /// only, and loudly logged.
    pub webhook_secret: Option<String>,
    /// Optional messaging profile attached to outbound sends.
    pub profile_id: Option<String>,
    /// Default sending number for outbound messages.
    pub from_number: Option<String>,
}

/// Messaging provider credentials, one block per integration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Telnyx SMS.
    pub telnyx: ProviderCredentials,
    /// Vonage SMS/chat.
    pub vonage: ProviderCredentials,
}

/// LLM and embedding provider settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Chat completions API key.
    pub api_key: Option<String>,
    /// Chat model identifier.
    pub model: String,
    /// Embeddings API key (falls back to `api_key` when unset).
    pub embedding_api_key: Option<String>,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Base URL for both endpoints.
    pub base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4o-mini".to_owned(),
            embedding_api_key: None,
            embedding_model: "text-embedding-3-small".to_owned(),
            base_url: "https://api.openai.com".to_owned(),
        }
    }
}

/// Conversation memory cache settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Redis URL. When unset, the process-local fallback map is used.
    pub redis_url: Option<String>,
}

/// Authentication settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 secret for control-API bearer tokens.
    pub jwt_secret: Option<String>,
}

/// Message routing settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Last-resort dealership for inbound numbers that match nothing.
    ///
    /// Unset means unmatched numbers are acknowledged and dropped.
    pub default_dealership_id: Option<Uuid>,
}

impl GatewayConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// Config file path: `$LOTLINE_CONFIG_PATH` or `./lotline.toml`.
    /// A missing file is not an error; defaults apply.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from the TOML file only, no env overrides.
    fn load_from_file() -> Result<Self> {
        let path = Self::config_path(|key| std::env::var(key).ok());
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                let config: GatewayConfig =
                    toml::from_str(&contents).context("failed to parse config TOML")?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Ok(GatewayConfig::default())
            }
            Err(e) => Err(anyhow::anyhow!("failed to read config file: {e}")),
        }
    }

    /// Resolve the config file path using a custom env resolver (for testing).
    fn config_path(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        env("LOTLINE_CONFIG_PATH")
            .map_or_else(|| PathBuf::from("lotline.toml"), PathBuf::from)
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver function for testability.
    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("LOTLINE_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = env("DATABASE_URL") {
            self.database.url = v;
        }

        // Providers.
        if let Some(v) = env("LOTLINE_TELNYX_API_KEY") {
            self.providers.telnyx.api_key = Some(v);
        }
        if let Some(v) = env("LOTLINE_TELNYX_WEBHOOK_SECRET") {
            self.providers.telnyx.webhook_secret = Some(v);
        }
        if let Some(v) = env("LOTLINE_VONAGE_API_KEY") {
            self.providers.vonage.api_key = Some(v);
        }
        if let Some(v) = env("LOTLINE_VONAGE_WEBHOOK_SECRET") {
            self.providers.vonage.webhook_secret = Some(v);
        }

        // LLM + embeddings.
        if let Some(v) = env("LOTLINE_OPENAI_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = env("LOTLINE_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = env("LOTLINE_EMBEDDING_API_KEY") {
            self.llm.embedding_api_key = Some(v);
        }

        // Memory cache.
        if let Some(v) = env("LOTLINE_REDIS_URL") {
            self.memory.redis_url = Some(v);
        }

        // Auth.
        if let Some(v) = env("LOTLINE_JWT_SECRET") {
            self.auth.jwt_secret = Some(v);
        }

        // Routing.
        if let Some(v) = env("LOTLINE_DEFAULT_DEALERSHIP_ID") {
            match v.parse::<Uuid>() {
                Ok(id) => self.routing.default_dealership_id = Some(id),
                Err(_) => tracing::warn!(
                    var = "LOTLINE_DEFAULT_DEALERSHIP_ID",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
    }

    /// Parse a TOML string into config (for testing).
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: GatewayConfig =
            toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = GatewayConfig::default();
        assert_eq!(config.server.bind_addr, "0.0.0.0:8000");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert!(config.routing.default_dealership_id.is_none());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = GatewayConfig::from_toml(
            r#"
            [database]
            url = "postgres://file/db"
            "#,
        )
        .expect("valid toml");
        config.apply_overrides(|key| {
            (key == "DATABASE_URL").then(|| "postgres://env/db".to_owned())
        });
        assert_eq!(config.database.url, "postgres://env/db");
    }

    #[test]
    fn bad_default_dealership_override_is_ignored() {
        let mut config = GatewayConfig::default();
        config.apply_overrides(|key| {
            (key == "LOTLINE_DEFAULT_DEALERSHIP_ID").then(|| "not-a-uuid".to_owned())
        });
        assert!(config.routing.default_dealership_id.is_none());
    }

    #[test]
    fn provider_secrets_load_from_toml() {
        let config = GatewayConfig::from_toml(
            r#"
            [providers.telnyx]
            api_key = "key-1"
            webhook_secret = "secret-1"
            "#,
        )
        .expect("valid toml");
        assert_eq!(config.providers.telnyx.api_key.as_deref(), Some("key-1"));
        assert_eq!(
            config.providers.telnyx.webhook_secret.as_deref(),
            Some("secret-1")
        );
        assert!(config.providers.vonage.api_key.is_none());
    }
}
