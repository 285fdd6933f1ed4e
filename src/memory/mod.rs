//! Short-term per-conversation memory.
//!
//! Each lead's conversation carries a [`ConversationMemory`]: a ring of the
//! last five turns, an extracted slot map, the recently mentioned vehicles
//! for pronoun resolution, and an optional appointment record. Persistence
//! lives in [`store`]; eviction is always survivable — a missing memory
//! loads as empty.

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::VehicleQuery;
use crate::flow::state::ConversationState;
use crate::types::Vehicle;

/// Turns kept in the ring buffer.
pub const MAX_TURNS: usize = 5;

/// Recently mentioned vehicles kept for pronoun resolution.
pub const MAX_RECENT_VEHICLES: usize = 5;

/// One remembered conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryTurn {
    /// `customer` or `agent`.
    pub role: String,
    /// Message text.
    pub text: String,
    /// When the turn was recorded.
    pub ts: DateTime<Utc>,
}

/// Extracted entity slots, merged across turns. A slot is only overwritten
/// by a non-empty value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotMap {
    pub budget: Option<f64>,
    pub body_type: Option<String>,
    pub model: Option<String>,
    pub make: Option<String>,
    pub year: Option<i32>,
    #[serde(default)]
    pub features: Vec<String>,
}

impl SlotMap {
    /// Merge freshly parsed entities into the slot map.
    pub fn merge(&mut self, query: &VehicleQuery) {
        if query.budget.is_some() {
            self.budget = query.budget;
        }
        if query.body_type.is_some() {
            self.body_type = query.body_type.clone();
        }
        if query.model.is_some() {
            self.model = query.model.clone();
        }
        if query.make.is_some() {
            self.make = query.make.clone();
        }
        if query.year.is_some() {
            self.year = query.year;
        }
        for feature in &query.features {
            if !self.features.contains(feature) {
                self.features.push(feature.clone());
            }
        }
    }
}

fn initial_state() -> ConversationState {
    ConversationState::Greeting
}

/// Structured appointment information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentDetails {
    pub date: Option<String>,
    pub time: Option<String>,
    pub vehicle: Option<String>,
    pub confirmed: bool,
    pub created_at: Option<DateTime<Utc>>,
}

/// Per-conversation short-term context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationMemory {
    /// Stable key, derived from the lead id.
    pub conversation_id: String,
    /// Last [`MAX_TURNS`] turns, oldest first.
    #[serde(default)]
    pub turns: Vec<MemoryTurn>,
    /// Merged entity slots.
    #[serde(default)]
    pub slots: SlotMap,
    /// Conversation phase, advanced on every customer message.
    #[serde(default = "initial_state")]
    pub state: ConversationState,
    /// Most recently recommended vehicle.
    pub last_vehicle: Option<Vehicle>,
    /// Recently recommended vehicles, recommendation order.
    #[serde(default)]
    pub recent_vehicles: Vec<Vehicle>,
    /// Booked test-drive appointment, if any.
    pub appointment: Option<AppointmentDetails>,
}

impl ConversationMemory {
    /// Create an empty memory for a conversation.
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            ..Self::default()
        }
    }

    /// Append a turn, evicting the oldest beyond [`MAX_TURNS`].
    pub fn add_turn(&mut self, role: &str, text: &str) {
        self.turns.push(MemoryTurn {
            role: role.to_owned(),
            text: text.to_owned(),
            ts: Utc::now(),
        });
        if self.turns.len() > MAX_TURNS {
            let excess = self.turns.len().saturating_sub(MAX_TURNS);
            self.turns.drain(..excess);
        }
    }

    /// Record the vehicles just recommended, newest list replacing the old.
    pub fn record_recommendations(&mut self, vehicles: &[Vehicle]) {
        if vehicles.is_empty() {
            return;
        }
        self.last_vehicle = vehicles.first().cloned();
        self.recent_vehicles = vehicles.iter().take(MAX_RECENT_VEHICLES).cloned().collect();
    }

    /// Record a confirmed appointment.
    pub fn set_appointment(&mut self, date: &str, time: &str, vehicle: Option<&str>) {
        self.appointment = Some(AppointmentDetails {
            date: Some(date.to_owned()),
            time: Some(time.to_owned()),
            vehicle: vehicle.map(str::to_owned),
            confirmed: true,
            created_at: Some(Utc::now()),
        });
    }

    /// Whether a confirmed appointment exists.
    pub fn has_appointment(&self) -> bool {
        self.appointment.as_ref().is_some_and(|a| a.confirmed)
    }

    /// Natural-language appointment summary for replies.
    pub fn appointment_summary(&self) -> Option<String> {
        let appt = self.appointment.as_ref().filter(|a| a.confirmed)?;
        let mut parts: Vec<String> = Vec::new();
        if let Some(ref date) = appt.date {
            parts.push(date.clone());
        }
        if let Some(ref time) = appt.time {
            parts.push(time.clone());
        }
        if let Some(ref vehicle) = appt.vehicle {
            parts.push(format!("for the {vehicle}"));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }

    /// Resolve a pronoun phrase ("the first one", "the cheaper one") against
    /// the recent vehicles.
    ///
    /// Index rules: first → `[0]`, second → `[1]`, cheaper → min price,
    /// newer → max year, older → min year, anything else → `[0]`. When the
    /// recents list is empty the last mentioned vehicle is returned; no
    /// pronoun pattern at all returns `None`.
    pub fn resolve_pronoun(&self, phrase: &str) -> Option<&Vehicle> {
        let text = phrase.to_lowercase();
        if !contains_pronoun_pattern(&text) {
            return None;
        }
        if self.recent_vehicles.is_empty() {
            return self.last_vehicle.as_ref();
        }
        if text.contains("second") || text.contains("more expensive") {
            return self.recent_vehicles.get(1).or(self.recent_vehicles.first());
        }
        if text.contains("cheaper") {
            return self
                .recent_vehicles
                .iter()
                .min_by(|a, b| cmp_price(a).total_cmp(&cmp_price(b)));
        }
        if text.contains("newer") {
            return self.recent_vehicles.iter().max_by_key(|v| v.year);
        }
        if text.contains("older") {
            return self.recent_vehicles.iter().min_by_key(|v| v.year);
        }
        // "first", "that one", and everything else defaults to the first.
        self.recent_vehicles.first()
    }
}

fn cmp_price(v: &Vehicle) -> f64 {
    v.price.unwrap_or(f64::MAX)
}

fn contains_pronoun_pattern(text: &str) -> bool {
    [
        "that one",
        "the first one",
        "the second one",
        "the third one",
        "the one you mentioned",
        "the one with",
        "the one that",
        "the cheaper one",
        "the more expensive one",
        "the newer one",
        "the older one",
    ]
    .iter()
    .any(|pattern| text.contains(pattern))
}
