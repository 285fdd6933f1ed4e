//! LLM client and structured reply parsing.
//!
//! The model is required to emit a strict JSON object ([`AgentReply`]), but
//! models drift: [`parse_agent_reply`] accepts the whole body as JSON, a
//! trailing JSON line after prose, or an embedded control object, in that
//! order. Callers fall back to the template responses in [`prompt`] when
//! nothing parses.

pub mod prompt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Sampling temperature. Low for deterministic, on-script replies.
const TEMPERATURE: f32 = 0.2;

/// Output token bound per reply.
const MAX_TOKENS: u32 = 500;

/// Errors from LLM completion.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// HTTP transport failure.
    #[error("llm request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx from the provider.
    #[error("llm unavailable: {0}")]
    Unavailable(String),

    /// Response did not match expected format.
    #[error("llm response parse error: {0}")]
    Parse(String),

    /// No API key configured.
    #[error("llm not configured")]
    NotConfigured,
}

/// Chat completion interface.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one system+user completion and return the raw text.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unreachable, returns non-2xx, or
    /// produces an unreadable body.
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;
}

/// The structured reply contract the model must emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReply {
    /// Exact SMS to send.
    pub message: String,
    /// Whether the reply may be sent without human review.
    #[serde(default = "default_true")]
    pub auto_send: bool,
    /// Whether the model recommends a handoff.
    #[serde(default)]
    pub handoff: bool,
    /// Reason when `handoff` is true.
    #[serde(default)]
    pub handoff_reason: Option<String>,
    /// Inventory search query, empty if no search is needed.
    #[serde(default)]
    pub retrieval_query: String,
    /// Suggested next step.
    #[serde(default)]
    pub next_action: String,
}

fn default_true() -> bool {
    true
}

/// Parse the model output into an [`AgentReply`].
///
/// Tried in order: the whole body as JSON; the last line as JSON (prose
/// followed by a control object); an embedded `{...next_action...}` object.
/// Returns `None` when nothing yields a non-empty message.
pub fn parse_agent_reply(raw: &str) -> Option<AgentReply> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Strip markdown fences the model sometimes adds.
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end_matches("```").trim())
        .unwrap_or(trimmed);

    if let Ok(reply) = serde_json::from_str::<AgentReply>(body) {
        if !reply.message.trim().is_empty() {
            return Some(reply);
        }
    }

    // Prose followed by a JSON control object on the last line.
    if let Some(last_line) = body.lines().last() {
        let candidate = last_line.trim();
        if candidate.starts_with('{') && candidate.ends_with('}') {
            if let Ok(mut reply) = serde_json::from_str::<AgentReply>(candidate) {
                let prose: String = body
                    .lines()
                    .take(body.lines().count().saturating_sub(1))
                    .collect::<Vec<_>>()
                    .join("\n")
                    .trim()
                    .to_owned();
                if reply.message.trim().is_empty() {
                    reply.message = prose;
                }
                if !reply.message.trim().is_empty() {
                    debug!("extracted agent reply from trailing JSON line");
                    return Some(reply);
                }
            }
        }
    }

    // Embedded control object at the end of a prose body.
    if let Some(start) = body.rfind('{') {
        let (prose, object) = body.split_at(start);
        if object.contains("next_action") || object.contains("auto_send") {
            if let Ok(mut reply) = serde_json::from_str::<AgentReply>(object.trim()) {
                if reply.message.trim().is_empty() {
                    reply.message = prose.trim().to_owned();
                }
                if !reply.message.trim().is_empty() {
                    debug!("extracted agent reply from embedded JSON object");
                    return Some(reply);
                }
            }
        }
    }

    None
}

// ---------------------------------------------------------------------------
// OpenAI chat completions provider
// ---------------------------------------------------------------------------

/// Chat completions API client.
pub struct OpenAiChat {
    model: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChat")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl OpenAiChat {
    /// Create a chat client for the given model.
    pub fn new(model: &str, api_key: &str, base_url: &str) -> Self {
        Self {
            model: model.to_owned(),
            api_key: api_key.to_owned(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiChat {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_owned(),
                    content: system.to_owned(),
                },
                ChatMessage {
                    role: "user".to_owned(),
                    content: user.to_owned(),
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Unavailable(format!(
                "chat endpoint returned {status}: {body_text}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|content| content.trim().to_owned())
            .ok_or_else(|| LlmError::Parse("empty choices array".to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Chat completions request body.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

/// A message in chat format.
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Chat completions response body.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// A response choice.
#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

/// Assistant message in a response choice.
#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_body_json_parses() {
        let raw = r#"{"message": "Hi there!", "auto_send": true, "handoff": false, "handoff_reason": null, "retrieval_query": "", "next_action": "wait"}"#;
        let reply = parse_agent_reply(raw).expect("parses");
        assert_eq!(reply.message, "Hi there!");
        assert!(reply.auto_send);
        assert!(!reply.handoff);
    }

    #[test]
    fn markdown_fenced_json_parses() {
        let raw = "```json\n{\"message\": \"Hello\"}\n```";
        let reply = parse_agent_reply(raw).expect("parses");
        assert_eq!(reply.message, "Hello");
    }

    #[test]
    fn trailing_json_line_after_prose() {
        let raw = "Sounds good, see you then!\n{\"message\": \"\", \"next_action\": \"handoff\"}";
        let reply = parse_agent_reply(raw).expect("parses");
        assert_eq!(reply.message, "Sounds good, see you then!");
        assert_eq!(reply.next_action, "handoff");
    }

    #[test]
    fn plain_prose_does_not_parse() {
        assert!(parse_agent_reply("Just some text without JSON").is_none());
        assert!(parse_agent_reply("").is_none());
    }

    #[test]
    fn missing_optional_fields_default() {
        let reply = parse_agent_reply(r#"{"message": "Hi"}"#).expect("parses");
        assert!(reply.auto_send);
        assert!(!reply.handoff);
        assert!(reply.handoff_reason.is_none());
        assert!(reply.retrieval_query.is_empty());
    }

    #[test]
    fn empty_message_json_is_rejected() {
        assert!(parse_agent_reply(r#"{"message": "  "}"#).is_none());
    }

    #[test]
    fn handoff_reply_round_trips() {
        let raw = r#"{"message": "Let me connect you.", "handoff": true, "handoff_reason": "financing"}"#;
        let reply = parse_agent_reply(raw).expect("parses");
        assert!(reply.handoff);
        assert_eq!(reply.handoff_reason.as_deref(), Some("financing"));
    }
}
