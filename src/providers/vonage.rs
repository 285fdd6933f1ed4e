//! Vonage SMS/chat integration.
//!
//! Inbound: flat webhooks, arriving either as JSON or form-encoded
//! (`msisdn`/`to`/`text` fields). Outbound: JSON POST with a bearer token.

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::ProviderCredentials;
use crate::phone;
use crate::types::NormalizedInbound;

use super::{check_signature, MessagingProvider, ProviderError, SendReceipt};

const SEND_URL: &str = "https://rest.nexmo.com/sms/json";
const SIGNATURE_HEADER: &str = "x-vonage-signature";

/// Vonage adapter.
pub struct VonageProvider {
    credentials: ProviderCredentials,
    from_number: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for VonageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VonageProvider")
            .field("configured", &self.credentials.api_key.is_some())
            .finish_non_exhaustive()
    }
}

impl VonageProvider {
    /// Create the adapter from configured credentials.
    pub fn new(credentials: ProviderCredentials, from_number: Option<String>) -> Self {
        Self {
            credentials,
            from_number,
            client: reqwest::Client::new(),
        }
    }

    fn parse_form(payload: &str) -> InboundMessage {
        let mut message = InboundMessage::default();
        for (key, value) in url::form_urlencoded::parse(payload.as_bytes()) {
            match key.as_ref() {
                "msisdn" => message.msisdn = Some(value.into_owned()),
                "to" => message.to = Some(value.into_owned()),
                "text" => message.text = Some(value.into_owned()),
                "messageId" => message.message_id = Some(value.into_owned()),
                "type" => message.kind = Some(value.into_owned()),
                _ => {}
            }
        }
        message
    }
}

#[async_trait]
impl MessagingProvider for VonageProvider {
    fn name(&self) -> &'static str {
        "vonage"
    }

    async fn send(&self, to: &str, text: &str) -> Result<SendReceipt, ProviderError> {
        let api_key = self
            .credentials
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured)?;

        let body = OutboundMessage {
            from: self.from_number.clone().unwrap_or_default(),
            to: to.to_owned(),
            text: text.to_owned(),
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

        let message_id = parsed
            .messages
            .into_iter()
            .next()
            .and_then(|m| m.message_id)
            .unwrap_or_default();

        Ok(SendReceipt {
            provider_message_id: message_id,
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

    fn parse(&self, payload: &str, content_type: &str) -> Option<NormalizedInbound> {
        let message = if content_type.contains("json") {
            serde_json::from_str::<InboundMessage>(payload).ok()?
        } else {
            Self::parse_form(payload)
        };

        // Non-text message types (binary, unicode pushes) are dropped.
        if message.kind.as_deref().is_some_and(|k| k != "text") {
            return None;
        }
        let text = message.text?;
        if text.trim().is_empty() {
            return None;
        }

        let from_phone = phone::normalize(&message.msisdn?)?;
        let to_phone = phone::normalize(&message.to?)?;

        Some(NormalizedInbound {
            provider_name: self.name().to_owned(),
            provider_message_id: message.message_id.unwrap_or_default(),
            from_phone,
            to_phone,
            text,
            received_at: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Outbound send request body.
#[derive(Debug, Serialize)]
struct OutboundMessage {
    from: String,
    to: String,
    text: String,
}

/// Outbound send response body.
#[derive(Debug, Deserialize)]
struct OutboundResponse {
    #[serde(default)]
    messages: Vec<OutboundReceipt>,
}

/// One per-recipient receipt in the response.
#[derive(Debug, Deserialize)]
struct OutboundReceipt {
    #[serde(rename = "message-id")]
    message_id: Option<String>,
}

/// Inbound webhook fields (flat; JSON and form share names).
#[derive(Debug, Default, Deserialize)]
struct InboundMessage {
    msisdn: Option<String>,
    to: Option<String>,
    text: Option<String>,
    #[serde(rename = "messageId")]
    message_id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> VonageProvider {
        VonageProvider::new(ProviderCredentials::default(), None)
    }

    #[test]
    fn parses_json_inbound() {
        let payload = r#"{"msisdn": "15551230001", "to": "15559990000", "text": "hello", "messageId": "abc", "type": "text"}"#;
        let inbound = provider()
            .parse(payload, "application/json")
            .expect("parses");
        assert_eq!(inbound.from_phone, "+15551230001");
        assert_eq!(inbound.to_phone, "+15559990000");
        assert_eq!(inbound.text, "hello");
        assert_eq!(inbound.provider_message_id, "abc");
    }

    #[test]
    fn parses_form_inbound() {
        let payload = "msisdn=15551230001&to=15559990000&text=hello+there&messageId=abc";
        let inbound = provider()
            .parse(payload, "application/x-www-form-urlencoded")
            .expect("parses");
        assert_eq!(inbound.text, "hello there");
        assert_eq!(inbound.from_phone, "+15551230001");
    }

    #[test]
    fn drops_non_text_types() {
        let payload = r#"{"msisdn": "15551230001", "to": "15559990000", "text": "x", "type": "binary"}"#;
        assert!(provider().parse(payload, "application/json").is_none());
    }

    #[test]
    fn drops_missing_fields() {
        assert!(provider().parse("{}", "application/json").is_none());
        assert!(provider().parse("text=orphan", "application/x-www-form-urlencoded").is_none());
    }

    #[tokio::test]
    async fn send_without_key_is_not_configured() {
        let err = provider().send("+15551230001", "hi").await.expect_err("fails");
        assert!(matches!(err, ProviderError::NotConfigured));
    }
}
