//! Conversation state machine.
//!
//! GREETING → DISCOVERY → NARROWING → RECOMMENDATION → SCHEDULE → HANDOFF.
//! Each state constrains what the agent is allowed to do; transitions are
//! driven by [`Signals`] extracted from the slot map and the last five turns.
//! The machine never regresses — the only jump is the global HANDOFF trigger
//! on legal/financing/trade-in topics.

use serde::{Deserialize, Serialize};

use crate::memory::ConversationMemory;

/// Conversation phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationState {
    /// First contact; small talk only.
    #[default]
    Greeting,
    /// Gathering constraints.
    Discovery,
    /// Clarifying specifics.
    Narrowing,
    /// Offering one or two options.
    Recommendation,
    /// Agreeing on a visit time.
    Schedule,
    /// Handed to a human; terminal.
    Handoff,
}

impl ConversationState {
    /// Whether inventory retrieval is permitted in this state.
    pub fn allows_retrieval(&self) -> bool {
        matches!(self, Self::Narrowing | Self::Recommendation)
    }
}

/// Transition signals derived from slots and recent turn text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signals {
    pub has_budget: bool,
    pub has_specific_model: bool,
    pub has_vehicle_type: bool,
    pub explicit_schedule_intent: bool,
    pub appointment_confirmed: bool,
    pub legal_or_finance_or_trade: bool,
}

impl Signals {
    /// Derive signals from the slot map and the last five turns of memory.
    pub fn extract(memory: &ConversationMemory) -> Self {
        let window: String = memory
            .turns
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let legal_or_finance_or_trade = [
            "financing",
            "apr",
            "credit",
            "monthly payment",
            "trade-in",
            "trade in",
            "legal",
            "policy",
            "terms",
        ]
        .iter()
        .any(|kw| window.contains(kw));

        let explicit_schedule_intent = ["test drive", "come by", "swing by", "schedule"]
            .iter()
            .any(|kw| window.contains(kw));

        let appointment_confirmed = ["see you at", "confirmed", "booked"]
            .iter()
            .any(|kw| window.contains(kw));

        Self {
            has_budget: memory.slots.budget.is_some(),
            has_specific_model: memory.slots.model.is_some(),
            has_vehicle_type: memory.slots.body_type.is_some(),
            explicit_schedule_intent,
            appointment_confirmed,
            legal_or_finance_or_trade,
        }
    }

    /// Any user-provided constraint at all.
    fn has_min_constraints(&self) -> bool {
        self.has_specific_model || self.has_vehicle_type || self.has_budget
    }

    /// Ready to recommend: a model, or type plus budget.
    fn recommendation_ready(&self) -> bool {
        self.has_specific_model || (self.has_vehicle_type && self.has_budget)
    }
}

/// Result of one transition step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    /// State after the step.
    pub state: ConversationState,
    /// Human-readable reason, for logs.
    pub reason: &'static str,
}

/// Advance the machine one step from `current` under `signals`.
///
/// Deterministic and evaluated in order: the global handoff trigger wins,
/// then the per-state rule applies, else the state holds.
pub fn advance(current: ConversationState, signals: &Signals) -> StateSnapshot {
    use ConversationState::*;

    if signals.legal_or_finance_or_trade {
        return StateSnapshot {
            state: Handoff,
            reason: "financing/trade/legal topic",
        };
    }

    match current {
        Greeting => StateSnapshot {
            state: Discovery,
            reason: "first user message",
        },
        Discovery => {
            if signals.has_min_constraints() {
                StateSnapshot {
                    state: Narrowing,
                    reason: "initial constraints present",
                }
            } else {
                StateSnapshot {
                    state: Discovery,
                    reason: "still gathering constraints",
                }
            }
        }
        Narrowing => {
            if signals.recommendation_ready() {
                StateSnapshot {
                    state: Recommendation,
                    reason: "model, or type plus budget",
                }
            } else {
                StateSnapshot {
                    state: Narrowing,
                    reason: "clarifying specifics",
                }
            }
        }
        Recommendation => {
            if signals.explicit_schedule_intent {
                StateSnapshot {
                    state: Schedule,
                    reason: "customer wants to schedule",
                }
            } else {
                StateSnapshot {
                    state: Recommendation,
                    reason: "keep recommending",
                }
            }
        }
        Schedule => {
            if signals.appointment_confirmed {
                StateSnapshot {
                    state: Handoff,
                    reason: "appointment booked",
                }
            } else {
                StateSnapshot {
                    state: Schedule,
                    reason: "offering time slots",
                }
            }
        }
        Handoff => StateSnapshot {
            state: Handoff,
            reason: "terminal",
        },
    }
}
