//! Trigger-keyword handoff routing.
//!
//! Decides when a conversation moves from the automated agent to a human
//! salesperson. Keyword triggers rather than confidence scoring: the sets
//! below are auditable and the decision is reproducible from the inputs.
//!
//! Bare time tokens ("2pm") only count as a test-drive confirmation when the
//! surrounding conversation actually shows scheduling context; otherwise a
//! message like "we close at 6pm" would book phantom appointments.

use serde::{Deserialize, Serialize};

/// Why a conversation is being handed to a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffReason {
    Financing,
    TradeIn,
    Pricing,
    AppointmentScheduled,
    TestDriveScheduling,
    TestDriveTimeConfirmed,
    LegalCompliance,
    MediaRequests,
    Uncertainty,
    OutOfScope,
}

impl HandoffReason {
    /// Canonical string form for logs and notifications.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Financing => "financing",
            Self::TradeIn => "trade_in",
            Self::Pricing => "pricing",
            Self::AppointmentScheduled => "appointment_scheduled",
            Self::TestDriveScheduling => "test_drive_scheduling",
            Self::TestDriveTimeConfirmed => "test_drive_time_confirmed",
            Self::LegalCompliance => "legal_compliance",
            Self::MediaRequests => "media_requests",
            Self::Uncertainty => "uncertainty",
            Self::OutOfScope => "out_of_scope",
        }
    }
}

/// Routing outcome with the matched reason and a log-friendly explanation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffDecision {
    pub should_handoff: bool,
    pub reason: Option<HandoffReason>,
    pub reasoning: String,
}

impl HandoffDecision {
    fn no(reasoning: &str) -> Self {
        Self {
            should_handoff: false,
            reason: None,
            reasoning: reasoning.to_owned(),
        }
    }

    fn yes(reason: HandoffReason, reasoning: String) -> Self {
        Self {
            should_handoff: true,
            reason: Some(reason),
            reasoning,
        }
    }
}

const FINANCING_TRIGGERS: &[&str] = &[
    "financing",
    "finance",
    "loan",
    "credit",
    "apr",
    "interest rate",
    "monthly payment",
    "payment plan",
    "lease",
    "credit score",
    "bad credit",
    "no credit",
    "down payment",
    "qualify",
    "pre-approval",
    "approval",
];

const TRADE_IN_TRIGGERS: &[&str] = &[
    "trade",
    "trade-in",
    "trade in",
    "appraisal",
    "my car",
    "current car",
    "trade value",
    "trade allowance",
    "value my car",
    "car worth",
];

const PRICING_TRIGGERS: &[&str] = &[
    "out the door",
    "total cost",
    "final price",
    "best price",
    "lowest price",
    "negotiate",
    "discount",
    "what can you do",
    "flexible on price",
    "make an offer",
    "counter offer",
    "haggle",
    "bargain",
];

const SCHEDULED_PHRASE_TRIGGERS: &[&str] = &[
    "test drive scheduled",
    "appointment booked",
    "coming in",
    "see you at",
    "meeting with",
    "scheduled for",
    "booked for",
    "appointment set",
    "test drive booked",
];

const TIME_CONFIRMATION_TRIGGERS: &[&str] = &[
    "8am", "9am", "10am", "11am", "12pm", "noon", "1pm", "2pm", "3pm", "4pm", "5pm", "6pm",
    "7pm", "morning", "afternoon", "evening",
];

const LEGAL_TRIGGERS: &[&str] = &[
    "warranty",
    "insurance",
    "legal",
    "contract",
    "terms",
    "disclaimer",
    "liability",
    "guarantee",
    "return policy",
];

const MEDIA_TRIGGERS: &[&str] = &[
    "photos",
    "pictures",
    "images",
    "video",
    "videos",
    "send me photos",
    "do you have photos",
    "show me pictures",
];

const UNCERTAINTY_TRIGGERS: &[&str] = &[
    "not sure",
    "unsure",
    "maybe",
    "possibly",
    "might",
    "could be",
    "i think",
    "i believe",
    "probably",
    "likely",
];

const OUT_OF_SCOPE_TRIGGERS: &[&str] = &[
    "motorcycle",
    "motorcycles",
    "bike",
    "bikes",
    "service",
    "maintenance",
    "repair",
    "parts",
    "accessories",
];

/// Reason categories checked in declaration order after the time check.
const ORDERED_CATEGORIES: &[(HandoffReason, &[&str])] = &[
    (HandoffReason::Financing, FINANCING_TRIGGERS),
    (HandoffReason::TradeIn, TRADE_IN_TRIGGERS),
    (HandoffReason::Pricing, PRICING_TRIGGERS),
    (HandoffReason::AppointmentScheduled, SCHEDULED_PHRASE_TRIGGERS),
    (HandoffReason::TestDriveScheduling, SCHEDULED_PHRASE_TRIGGERS),
    (HandoffReason::LegalCompliance, LEGAL_TRIGGERS),
    (HandoffReason::MediaRequests, MEDIA_TRIGGERS),
    (HandoffReason::Uncertainty, UNCERTAINTY_TRIGGERS),
    (HandoffReason::OutOfScope, OUT_OF_SCOPE_TRIGGERS),
];

/// Decide whether to hand off, evaluated in order; first match wins.
///
/// `scheduling_context` is true when the conversation is in its scheduling
/// phase (SCHEDULE state, or schedule-intent keywords in the recent window);
/// bare time tokens only confirm a test drive inside that context.
pub fn should_handoff(
    query: &str,
    response_text: &str,
    has_appointment: bool,
    scheduling_context: bool,
) -> HandoffDecision {
    let query_lower = query.to_lowercase();
    let response_lower = response_text.to_lowercase();

    // With an existing appointment: only new test-drive requests hand off;
    // questions about the booked time are answered in-line.
    if has_appointment {
        if ["book another", "schedule another", "new test drive"]
            .iter()
            .any(|p| query_lower.contains(p))
        {
            return HandoffDecision::yes(
                HandoffReason::TestDriveScheduling,
                "new test drive request after existing appointment".to_owned(),
            );
        }
        if ["what time", "when is", "my appointment", "test drive time"]
            .iter()
            .any(|p| query_lower.contains(p))
        {
            return HandoffDecision::no("question about existing appointment");
        }
    }

    // Time confirmation has the highest trigger priority.
    if scheduling_context {
        if let Some(trigger) = TIME_CONFIRMATION_TRIGGERS
            .iter()
            .find(|t| query_lower.contains(*t))
        {
            return HandoffDecision::yes(
                HandoffReason::TestDriveTimeConfirmed,
                format!("customer provided time: '{trigger}'"),
            );
        }
    }

    for (reason, triggers) in ORDERED_CATEGORIES {
        if let Some(trigger) = triggers.iter().find(|t| query_lower.contains(*t)) {
            return HandoffDecision::yes(
                *reason,
                format!("customer asked about {}: '{trigger}'", reason.as_str()),
            );
        }
    }

    // The generated reply itself may have just scheduled an appointment.
    if ["test drive scheduled", "appointment booked", "see you at"]
        .iter()
        .any(|p| response_lower.contains(p))
    {
        return HandoffDecision::yes(
            HandoffReason::AppointmentScheduled,
            "appointment was scheduled in the reply".to_owned(),
        );
    }

    HandoffDecision::no("no handoff triggers detected")
}

/// Canned customer-facing message for a handoff reason.
pub fn handoff_message(reason: HandoffReason) -> &'static str {
    match reason {
        HandoffReason::Financing => {
            "That's something someone on my team can walk you through. \
             I'll have them follow up with you directly right away."
        }
        HandoffReason::AppointmentScheduled => {
            "Perfect! I'll connect you with a salesperson who can help with the details."
        }
        HandoffReason::TestDriveScheduling | HandoffReason::TestDriveTimeConfirmed => {
            "Perfect! I'll see you then! Looking forward to your test drive."
        }
        HandoffReason::MediaRequests => {
            "I'll have someone send photos shortly. Would you like me to text them to this number?"
        }
        HandoffReason::TradeIn
        | HandoffReason::Pricing
        | HandoffReason::LegalCompliance
        | HandoffReason::Uncertainty
        | HandoffReason::OutOfScope => {
            "That's something my teammate can help with, let me connect you."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn financing_question_hands_off() {
        let decision = should_handoff("what's your apr?", "", false, false);
        assert!(decision.should_handoff);
        assert_eq!(decision.reason, Some(HandoffReason::Financing));
    }

    #[test]
    fn trade_in_hands_off() {
        let decision = should_handoff("do you take trade-ins?", "", false, false);
        assert!(decision.should_handoff);
        assert_eq!(decision.reason, Some(HandoffReason::TradeIn));
    }

    #[test]
    fn appointment_question_with_existing_appointment_stays() {
        let decision = should_handoff("what time is my appointment?", "", true, false);
        assert!(!decision.should_handoff);
    }

    #[test]
    fn new_test_drive_after_appointment_hands_off() {
        let decision = should_handoff("can I book another test drive?", "", true, false);
        assert!(decision.should_handoff);
        assert_eq!(decision.reason, Some(HandoffReason::TestDriveScheduling));
    }

    #[test]
    fn bare_time_needs_scheduling_context() {
        let no_context = should_handoff("you close at 6pm right?", "", false, false);
        assert!(!no_context.should_handoff);

        let in_context = should_handoff("tomorrow at 2pm works", "", false, true);
        assert!(in_context.should_handoff);
        assert_eq!(in_context.reason, Some(HandoffReason::TestDriveTimeConfirmed));
    }

    #[test]
    fn time_confirmation_beats_other_categories() {
        // "morning" time token plus an uncertainty word: time wins.
        let decision = should_handoff("maybe 10am works", "", false, true);
        assert_eq!(decision.reason, Some(HandoffReason::TestDriveTimeConfirmed));
    }

    #[test]
    fn scheduled_phrase_in_reply_hands_off() {
        let decision = should_handoff(
            "sounds great",
            "Perfect, your test drive scheduled for Saturday!",
            false,
            false,
        );
        assert!(decision.should_handoff);
        assert_eq!(decision.reason, Some(HandoffReason::AppointmentScheduled));
    }

    #[test]
    fn plain_message_does_not_hand_off() {
        let decision = should_handoff("do you have any sedans?", "We do!", false, false);
        assert!(!decision.should_handoff);
        assert!(decision.reason.is_none());
    }

    #[test]
    fn every_reason_has_a_message() {
        for reason in [
            HandoffReason::Financing,
            HandoffReason::TradeIn,
            HandoffReason::Pricing,
            HandoffReason::AppointmentScheduled,
            HandoffReason::TestDriveScheduling,
            HandoffReason::TestDriveTimeConfirmed,
            HandoffReason::LegalCompliance,
            HandoffReason::MediaRequests,
            HandoffReason::Uncertainty,
            HandoffReason::OutOfScope,
        ] {
            assert!(!handoff_message(reason).is_empty());
        }
    }
}
