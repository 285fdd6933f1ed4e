//! Salesperson business-command parsing.
//!
//! A salesperson text with no pending approval is a business command: create
//! a lead, add inventory, ask about a lead or stock, or log a status update.
//! The LLM extracts a typed JSON object; when it is unavailable or emits
//! garbage, keyword fallback extraction keeps the channel usable. Every
//! parse lands in the [`BusinessCommand`] tagged enum and is dispatched by
//! exhaustive matching.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::llm::LlmClient;

/// Parsed command with extraction quality.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCommand {
    pub command: BusinessCommand,
    pub confidence: Confidence,
    pub used_fallback: bool,
}

/// How complete the extracted fields are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// One salesperson business command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusinessCommand {
    /// "I just met John, his number is 555-1234, wants a Camry."
    LeadCreation {
        name: Option<String>,
        phone: Option<String>,
        email: Option<String>,
        car_interest: Option<String>,
        price_range: Option<String>,
    },
    /// "Picked up a 2020 Camry off auction, 45k miles, excellent condition."
    InventoryUpdate {
        year: Option<i32>,
        make: Option<String>,
        model: Option<String>,
        mileage: Option<i32>,
        condition: Option<String>,
        price: Option<f64>,
        description: Option<String>,
        features: Option<String>,
    },
    /// "What's the status of lead John Smith?"
    LeadInquiry {
        lead_identifier: Option<String>,
        inquiry_type: Option<String>,
    },
    /// "Do we have any Civics in stock?"
    InventoryInquiry {
        make: Option<String>,
        model: Option<String>,
        inquiry_type: Option<String>,
    },
    /// "What's my schedule today?"
    GeneralQuestion {
        question_topic: Option<String>,
        details: Option<String>,
    },
    /// "Lead John Smith is coming in for a test drive tomorrow."
    StatusUpdate {
        lead_identifier: Option<String>,
        update_type: Option<String>,
        details: Option<String>,
    },
    /// "Sarah wants to test drive the Camry tomorrow at 2pm, 555-1234."
    TestDriveScheduling {
        customer_name: Option<String>,
        customer_phone: Option<String>,
        vehicle_interest: Option<String>,
        preferred_date: Option<String>,
        preferred_time: Option<String>,
    },
    /// Nothing recognisable.
    Unknown,
}

const PARSER_SYSTEM_PROMPT: &str = r#"You are an SMS parser for a car dealership. Extract structured data from salesperson messages and classify the message type.

Message types and their fields:
1. lead_creation - salesperson met a potential customer: name, phone, email, car_interest, price_range
2. inventory_update - salesperson adds a vehicle: year, make, model, mileage, condition, price, description, features
3. lead_inquiry - question about an existing lead: lead_identifier, inquiry_type (status|details|follow_up)
4. inventory_inquiry - question about stock: make, model, inquiry_type (availability|details|search)
5. general_question - anything else: question_topic, details
6. status_update - progress on an existing lead: lead_identifier, update_type, details
7. test_drive_scheduling - a customer test drive to set up: customer_name, customer_phone, vehicle_interest, preferred_date, preferred_time

Return ONLY a valid JSON object. Use null for fields you cannot extract. Always include a "type" field with one of the seven type names above."#;

/// Parse a salesperson message, preferring the LLM and falling back to
/// keyword extraction.
pub async fn parse(client: Option<&dyn LlmClient>, message: &str) -> ParsedCommand {
    let message = message.trim();

    if let Some(client) = client {
        match client
            .complete(PARSER_SYSTEM_PROMPT, &format!("Parse this SMS message: {message}"))
            .await
        {
            Ok(raw) => {
                if let Some(command) = decode_llm_json(&raw) {
                    info!(kind = kind_name(&command), "parsed business command via LLM");
                    let confidence = assess_confidence(&command);
                    return ParsedCommand {
                        command,
                        confidence,
                        used_fallback: false,
                    };
                }
                warn!("LLM parse produced no usable JSON, using fallback");
            }
            Err(e) => warn!(error = %e, "LLM parse failed, using fallback"),
        }
    }

    let command = fallback_parse(message);
    let confidence = assess_confidence(&command);
    ParsedCommand {
        command,
        confidence,
        used_fallback: true,
    }
}

fn kind_name(command: &BusinessCommand) -> &'static str {
    match command {
        BusinessCommand::LeadCreation { .. } => "lead_creation",
        BusinessCommand::InventoryUpdate { .. } => "inventory_update",
        BusinessCommand::LeadInquiry { .. } => "lead_inquiry",
        BusinessCommand::InventoryInquiry { .. } => "inventory_inquiry",
        BusinessCommand::GeneralQuestion { .. } => "general_question",
        BusinessCommand::StatusUpdate { .. } => "status_update",
        BusinessCommand::TestDriveScheduling { .. } => "test_drive_scheduling",
        BusinessCommand::Unknown => "unknown",
    }
}

/// Decode the LLM's JSON output, stripping markdown fences when present.
fn decode_llm_json(raw: &str) -> Option<BusinessCommand> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end_matches("```").trim())
        .unwrap_or(trimmed);
    serde_json::from_str(body).ok()
}

/// Completeness-based confidence: all key fields high, most medium, else low.
fn assess_confidence(command: &BusinessCommand) -> Confidence {
    let (present, required) = match command {
        BusinessCommand::LeadCreation {
            name,
            phone,
            car_interest,
            ..
        } => (
            [name.is_some(), phone.is_some(), car_interest.is_some()]
                .iter()
                .filter(|b| **b)
                .count(),
            3,
        ),
        BusinessCommand::InventoryUpdate {
            year, make, model, ..
        } => (
            [year.is_some(), make.is_some(), model.is_some()]
                .iter()
                .filter(|b| **b)
                .count(),
            3,
        ),
        BusinessCommand::LeadInquiry {
            lead_identifier,
            inquiry_type,
        }
        | BusinessCommand::StatusUpdate {
            lead_identifier,
            update_type: inquiry_type,
            ..
        } => (
            [lead_identifier.is_some(), inquiry_type.is_some()]
                .iter()
                .filter(|b| **b)
                .count(),
            2,
        ),
        BusinessCommand::InventoryInquiry { inquiry_type, .. } => {
            (usize::from(inquiry_type.is_some()), 1)
        }
        BusinessCommand::GeneralQuestion { question_topic, .. } => {
            (usize::from(question_topic.is_some()), 1)
        }
        BusinessCommand::TestDriveScheduling {
            customer_name,
            preferred_time,
            ..
        } => (
            [customer_name.is_some(), preferred_time.is_some()]
                .iter()
                .filter(|b| **b)
                .count(),
            2,
        ),
        BusinessCommand::Unknown => return Confidence::Low,
    };

    if present == required {
        Confidence::High
    } else if present.saturating_mul(2) >= required {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

// ---------------------------------------------------------------------------
// Keyword fallback extraction
// ---------------------------------------------------------------------------

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\+?1?[-.\s(]*\d{3}[-.\s)]*\d{3}[-.\s]*\d{4}").expect("phone regex compiles")
    })
}

fn year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(19[89]\d|20[0-2]\d)\b").expect("year regex compiles"))
}

fn mileage_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([0-9][0-9,]*)\s*(?:miles|mi\b|k\s+miles)").expect("mileage regex compiles")
    })
}

const MAKES: &[&str] = &[
    "toyota", "honda", "ford", "chevrolet", "bmw", "mercedes", "audi", "lexus", "nissan",
    "mazda", "hyundai", "kia", "subaru", "volkswagen", "jeep",
];

const CONDITIONS: &[&str] = &["excellent", "good", "fair", "poor", "like new"];

/// Keyword-based classification when the LLM is unavailable.
fn fallback_parse(message: &str) -> BusinessCommand {
    let lower = message.to_lowercase();
    let is_question = lower.contains('?') || lower.contains("what") || lower.contains("how");

    if is_question && ["status", "check", "details"].iter().any(|w| lower.contains(w)) {
        return BusinessCommand::LeadInquiry {
            lead_identifier: extract_capitalized_name(message),
            inquiry_type: Some("status".to_owned()),
        };
    }
    if is_question && ["stock", "available", "have", "price"].iter().any(|w| lower.contains(w)) {
        return BusinessCommand::InventoryInquiry {
            make: extract_make(&lower),
            model: None,
            inquiry_type: Some("availability".to_owned()),
        };
    }
    if lower.contains("test drive") {
        return BusinessCommand::TestDriveScheduling {
            customer_name: extract_capitalized_name(message),
            customer_phone: extract_phone(message),
            vehicle_interest: extract_make(&lower),
            preferred_date: extract_date_word(&lower),
            preferred_time: None,
        };
    }
    if ["met", "lead", "customer", "prospect"].iter().any(|w| lower.contains(w)) {
        return BusinessCommand::LeadCreation {
            name: extract_capitalized_name(message),
            phone: extract_phone(message),
            email: extract_email(message),
            car_interest: extract_make(&lower),
            price_range: None,
        };
    }
    if ["picked up", "inventory", "add"].iter().any(|w| lower.contains(w)) {
        let make = extract_make(&lower);
        let year = extract_year(&lower);
        return BusinessCommand::InventoryUpdate {
            year,
            make: make.clone(),
            model: extract_model_after_make(message, make.as_deref()),
            mileage: extract_mileage(&lower),
            condition: CONDITIONS
                .iter()
                .find(|c| lower.contains(*c))
                .map(|c| (*c).to_owned()),
            price: None,
            description: Some(message.to_owned()),
            features: None,
        };
    }
    if is_question {
        return BusinessCommand::GeneralQuestion {
            question_topic: Some("general".to_owned()),
            details: Some(message.to_owned()),
        };
    }
    BusinessCommand::Unknown
}

fn extract_phone(message: &str) -> Option<String> {
    phone_re().find(message).map(|m| m.as_str().to_owned())
}

fn extract_email(message: &str) -> Option<String> {
    message
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '@' && c != '.'))
        .find(|w| w.contains('@') && w.contains('.'))
        .map(str::to_owned)
}

fn extract_year(lower: &str) -> Option<i32> {
    year_re()
        .captures(lower)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn extract_mileage(lower: &str) -> Option<i32> {
    mileage_re()
        .captures(lower)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
}

fn extract_make(lower: &str) -> Option<String> {
    MAKES
        .iter()
        .find(|m| lower.contains(*m))
        .map(|m| (*m).to_owned())
}

/// The word following the make, e.g. "Toyota Camry" → "Camry".
fn extract_model_after_make(message: &str, make: Option<&str>) -> Option<String> {
    let make = make?;
    let lower = message.to_lowercase();
    let pos = lower.find(make)?;
    let after = message.get(pos.saturating_add(make.len())..)?;
    after
        .split_whitespace()
        .next()
        .filter(|w| w.chars().all(char::is_alphanumeric))
        .map(str::to_owned)
}

/// First capitalized word after "met" or "lead", skipping sentence starts.
fn extract_capitalized_name(message: &str) -> Option<String> {
    let lower = message.to_lowercase();
    for trigger in ["met ", "lead ", "customer "] {
        if let Some(pos) = lower.find(trigger) {
            let after = message.get(pos.saturating_add(trigger.len())..)?;
            let word: String = after
                .trim_start()
                .chars()
                .take_while(|c| c.is_alphabetic())
                .collect();
            if word.chars().next().is_some_and(char::is_uppercase) {
                return Some(word);
            }
        }
    }
    None
}

fn extract_date_word(lower: &str) -> Option<String> {
    ["today", "tomorrow", "next week"]
        .iter()
        .find(|w| lower.contains(*w))
        .map(|w| (*w).to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_client_uses_fallback() {
        let parsed = parse(None, "I just met John. His number is 555-123-4567.").await;
        assert!(parsed.used_fallback);
        let BusinessCommand::LeadCreation { name, phone, .. } = parsed.command else {
            panic!("expected lead creation, got {:?}", parsed.command);
        };
        assert_eq!(name.as_deref(), Some("John"));
        assert_eq!(phone.as_deref(), Some("555-123-4567"));
    }

    #[test]
    fn llm_json_decodes_tagged_enum() {
        let raw = r#"{"type": "inventory_update", "year": 2020, "make": "Toyota", "model": "Camry", "mileage": 45000, "condition": "excellent", "price": null, "description": null, "features": null}"#;
        let command = decode_llm_json(raw).expect("decodes");
        let BusinessCommand::InventoryUpdate { year, make, model, .. } = command else {
            panic!("expected inventory update");
        };
        assert_eq!(year, Some(2020));
        assert_eq!(make.as_deref(), Some("Toyota"));
        assert_eq!(model.as_deref(), Some("Camry"));
    }

    #[test]
    fn fenced_json_decodes() {
        let raw = "```json\n{\"type\": \"general_question\", \"question_topic\": \"schedule\", \"details\": null}\n```";
        assert!(matches!(
            decode_llm_json(raw),
            Some(BusinessCommand::GeneralQuestion { .. })
        ));
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(decode_llm_json("sorry, I can't").is_none());
        assert!(decode_llm_json(r#"{"type": "martian"}"#).is_none());
    }

    #[test]
    fn fallback_inventory_pickup() {
        let command = fallback_parse("Just picked up a 2020 Toyota Camry, 45,000 miles, excellent condition. Add it.");
        let BusinessCommand::InventoryUpdate {
            year,
            make,
            model,
            mileage,
            condition,
            ..
        } = command
        else {
            panic!("expected inventory update");
        };
        assert_eq!(year, Some(2020));
        assert_eq!(make.as_deref(), Some("toyota"));
        assert_eq!(model.as_deref(), Some("Camry"));
        assert_eq!(mileage, Some(45_000));
        assert_eq!(condition.as_deref(), Some("excellent"));
    }

    #[test]
    fn fallback_lead_inquiry() {
        let command = fallback_parse("What's the status of lead John?");
        assert!(matches!(command, BusinessCommand::LeadInquiry { .. }));
    }

    #[test]
    fn fallback_inventory_inquiry() {
        let command = fallback_parse("Do we have any Hondas in stock?");
        let BusinessCommand::InventoryInquiry { make, .. } = command else {
            panic!("expected inventory inquiry");
        };
        assert_eq!(make.as_deref(), Some("honda"));
    }

    #[test]
    fn fallback_unrecognised_is_unknown() {
        assert_eq!(fallback_parse("zzzzz"), BusinessCommand::Unknown);
    }

    #[test]
    fn confidence_reflects_completeness() {
        let full = BusinessCommand::LeadCreation {
            name: Some("John".to_owned()),
            phone: Some("+1555".to_owned()),
            email: None,
            car_interest: Some("camry".to_owned()),
            price_range: None,
        };
        assert_eq!(assess_confidence(&full), Confidence::High);

        let partial = BusinessCommand::LeadCreation {
            name: Some("John".to_owned()),
            phone: None,
            email: None,
            car_interest: None,
            price_range: None,
        };
        assert_eq!(assess_confidence(&partial), Confidence::Low);

        assert_eq!(assess_confidence(&BusinessCommand::Unknown), Confidence::Low);
    }
}
