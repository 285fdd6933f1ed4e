//! Messaging provider integrations.
//!
//! Each provider implements [`MessagingProvider`]: verify an inbound
//! webhook's HMAC signature over the exact raw body, normalize its payload
//! into a [`NormalizedInbound`], and send outbound texts. Non-text events
//! normalize to `None` and are acknowledged upstream without processing.

pub mod telnyx;
pub mod vonage;

use async_trait::async_trait;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

use crate::types::NormalizedInbound;

type HmacSha256 = Hmac<Sha256>;

/// Errors from provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP transport failure.
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx from the provider's send endpoint.
    #[error("provider returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for the logs.
        body: String,
    },

    /// Response did not match expected format.
    #[error("provider response parse error: {0}")]
    Parse(String),

    /// No API key configured for outbound sends.
    #[error("provider not configured")]
    NotConfigured,
}

/// Receipt for a successful outbound send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    /// Provider-side message identifier.
    pub provider_message_id: String,
}

/// A messaging provider integration.
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    /// Provider name used in logs, lead sources, and integration config.
    fn name(&self) -> &'static str;

    /// Send an outbound text. `to` must already be E.164-normalized.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on transport failure or non-2xx.
    async fn send(&self, to: &str, text: &str) -> Result<SendReceipt, ProviderError>;

    /// Verify the webhook signature over the exact raw request body.
    fn verify(&self, headers: &HeaderMap, raw_body: &[u8]) -> bool;

    /// Normalize an inbound webhook payload. `None` means the event is not
    /// an inbound text (delivery receipt, media, status callback) and should
    /// be acknowledged and dropped.
    fn parse(&self, payload: &str, content_type: &str) -> Option<NormalizedInbound>;
}

/// Verify a hex-encoded HMAC-SHA256 signature over `raw_body`.
pub fn verify_hmac_sha256(secret: &str, raw_body: &[u8], signature_hex: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    mac.verify_slice(&expected).is_ok()
}

/// Shared signature-check logic for adapters: a missing secret skips with a
/// warning (development mode), a missing header fails closed.
fn check_signature(
    provider: &str,
    secret: Option<&str>,
    headers: &HeaderMap,
    header_name: &str,
    raw_body: &[u8],
) -> bool {
    let Some(secret) = secret else {
        warn!(
            provider,
            "no webhook secret configured, SKIPPING signature verification (dev mode)"
        );
        return true;
    };
    let Some(signature) = headers.get(header_name).and_then(|v| v.to_str().ok()) else {
        warn!(provider, header = header_name, "missing signature header");
        return false;
    };
    verify_hmac_sha256(secret, raw_body, signature)
}
