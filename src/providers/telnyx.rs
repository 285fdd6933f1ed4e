//! Telnyx SMS integration.
//!
//! Inbound: JSON webhooks with the event envelope under `data`; only
//! `message.received` events with text bodies are processed. Outbound:
//! `POST /v2/messages` with a bearer token.

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ProviderCredentials;
use crate::phone;
use crate::types::NormalizedInbound;

use super::{check_signature, MessagingProvider, ProviderError, SendReceipt};

const SEND_URL: &str = "https://api.telnyx.com/v2/messages";
const SIGNATURE_HEADER: &str = "telnyx-signature";

/// Telnyx adapter.
pub struct TelnyxProvider {
    credentials: ProviderCredentials,
    from_number: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for TelnyxProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelnyxProvider")
            .field("configured", &self.credentials.api_key.is_some())
            .finish_non_exhaustive()
    }
}

impl TelnyxProvider {
    /// Create the adapter from configured credentials.
    pub fn new(credentials: ProviderCredentials, from_number: Option<String>) -> Self {
        Self {
            credentials,
            from_number,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl MessagingProvider for TelnyxProvider {
    fn name(&self) -> &'static str {
        "telnyx"
    }

    async fn send(&self, to: &str, text: &str) -> Result<SendReceipt, ProviderError> {
        let api_key = self
            .credentials
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured)?;

        let body = OutboundMessage {
            from: self.from_number.clone(),
            to: to.to_owned(),
            text: text.to_owned(),
            messaging_profile_id: self.credentials.profile_id.clone(),
        };

        let response = self
            .client
            .post(SEND_URL)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let parsed: OutboundResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(SendReceipt {
            provider_message_id: parsed.data.id,
        })
    }

    fn verify(&self, headers: &HeaderMap, raw_body: &[u8]) -> bool {
        check_signature(
            self.name(),
            self.credentials.webhook_secret.as_deref(),
            headers,
            SIGNATURE_HEADER,
            raw_body,
        )
    }

    fn parse(&self, payload: &str, _content_type: &str) -> Option<NormalizedInbound> {
        let envelope: InboundEnvelope = serde_json::from_str(payload).ok()?;
        let data = envelope.data?;
        if data.event_type != "message.received" {
            return None;
        }
        let inner = data.payload?;
        let text = inner.text?;
        if text.trim().is_empty() {
            return None;
        }

        let from_phone = phone::normalize(&inner.from?.phone_number)?;
        let to_phone = phone::normalize(&inner.to.first()?.phone_number)?;

        Some(NormalizedInbound {
            provider_name: self.name().to_owned(),
            provider_message_id: inner.id.unwrap_or_default(),
            from_phone,
            to_phone,
            text,
            received_at: inner
                .received_at
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map_or_else(Utc::now, |dt| dt.with_timezone(&Utc)),
        })
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Outbound send request body.
#[derive(Debug, Serialize)]
struct OutboundMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<String>,
    to: String,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    messaging_profile_id: Option<String>,
}

/// Outbound send response body.
#[derive(Debug, Deserialize)]
struct OutboundResponse {
    data: OutboundData,
}

/// Outbound response data envelope.
#[derive(Debug, Deserialize)]
struct OutboundData {
    id: String,
}

/// Inbound webhook envelope.
#[derive(Debug, Deserialize)]
struct InboundEnvelope {
    data: Option<InboundData>,
}

/// Inbound event data.
#[derive(Debug, Deserialize)]
struct InboundData {
    #[serde(default)]
    event_type: String,
    payload: Option<InboundPayload>,
}

/// Inbound message payload.
#[derive(Debug, Deserialize)]
struct InboundPayload {
    id: Option<String>,
    from: Option<PhoneRef>,
    #[serde(default)]
    to: Vec<PhoneRef>,
    text: Option<String>,
    received_at: Option<String>,
}

/// Phone number reference.
#[derive(Debug, Deserialize)]
struct PhoneRef {
    phone_number: String,
}
