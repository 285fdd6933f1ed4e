//! Core domain types shared across the gateway.
//!
//! All identifiers are UUIDs and all timestamps carry a timezone; comparisons
//! happen in UTC. Status enums are stored as text columns and expose
//! `as_str`/`parse` pairs for the places (logs, notifications, wire payloads)
//! that need the canonical string form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Sender {
    /// The lead on the other end of the SMS/chat line.
    Customer,
    /// The automated agent (including approved drafts).
    Agent,
    /// Gateway-generated bookkeeping messages.
    System,
}

impl Sender {
    /// Canonical string form stored in the `conversations` table.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Agent => "agent",
            Self::System => "system",
        }
    }
}

/// Staff role within a dealership, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    /// Full control, including role assignment.
    Owner,
    /// Settings and invite management.
    Manager,
    /// Day-to-day lead handling.
    Salesperson,
}

impl Role {
    /// Numeric privilege level used for `has_role_level` comparisons.
    pub fn level(&self) -> u8 {
        match self {
            Self::Owner => 100,
            Self::Manager => 80,
            Self::Salesperson => 40,
        }
    }

    /// Canonical string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Manager => "manager",
            Self::Salesperson => "salesperson",
        }
    }

    /// Parse from a stored text value.
    ///
    /// # Errors
    ///
    /// Returns the offending value if it names no known role.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "owner" => Ok(Self::Owner),
            "manager" => Ok(Self::Manager),
            "salesperson" => Ok(Self::Salesperson),
            other => Err(other.to_owned()),
        }
    }
}

/// Lifecycle status of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum LeadStatus {
    /// Just created, untouched.
    New,
    /// Some engagement.
    Warm,
    /// Actively shopping.
    Hot,
    /// Needs a nudge.
    #[serde(rename = "follow-up")]
    #[sqlx(rename = "follow-up")]
    FollowUp,
    /// Gone quiet.
    Cold,
    /// A test drive or visit is on the calendar.
    AppointmentBooked,
    /// Closed won.
    DealWon,
    /// Closed lost.
    DealLost,
}

impl LeadStatus {
    /// Canonical string form stored in the `leads` table.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Warm => "warm",
            Self::Hot => "hot",
            Self::FollowUp => "follow-up",
            Self::Cold => "cold",
            Self::AppointmentBooked => "appointment_booked",
            Self::DealWon => "deal_won",
            Self::DealLost => "deal_lost",
        }
    }
}

/// Status of a pending approval draft. Transitions are one-way out of
/// [`ApprovalStatus::Pending`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Waiting for a salesperson decision.
    Pending,
    /// Approved; the generated response was sent.
    Approved,
    /// Rejected; nothing was sent.
    Rejected,
    /// Timed out or superseded by an edit.
    Expired,
    /// Replaced by a custom message sent via FORCE.
    ForceSent,
}

impl ApprovalStatus {
    /// Canonical string form stored in `pending_approvals`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
            Self::ForceSent => "force_sent",
        }
    }
}

/// Status of a staff invite. Transitions are one-way out of
/// [`InviteStatus::Pending`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum InviteStatus {
    /// Created and usable until expiry.
    Pending,
    /// Redeemed.
    Accepted,
    /// Past `expires_at`.
    Expired,
    /// Revoked by a manager.
    Cancelled,
}

/// Availability of an inventory vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum VehicleStatus {
    /// On the lot and searchable.
    Active,
    /// Sold; excluded from retrieval.
    Sold,
    /// Sale in progress; excluded from retrieval.
    Pending,
}

/// A provider-agnostic inbound message after signature verification and
/// payload normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedInbound {
    /// Adapter that received the message (`telnyx`, `vonage`).
    pub provider_name: String,
    /// Provider-side message identifier.
    pub provider_message_id: String,
    /// Sender phone in E.164.
    pub from_phone: String,
    /// Receiving dealership line in E.164.
    pub to_phone: String,
    /// Message body.
    pub text: String,
    /// When the provider accepted the message.
    pub received_at: DateTime<Utc>,
}

/// A customer opportunity, scoped to one dealership.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Lead {
    pub id: Uuid,
    pub dealership_id: Uuid,
    pub name: String,
    pub car_interest: String,
    pub source: String,
    pub status: LeadStatus,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub last_contact_at: DateTime<Utc>,
    pub assigned_user_id: Option<Uuid>,
    pub appointment_datetime: Option<DateTime<Utc>>,
    pub max_price: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One append-only message in a lead's history.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub sender: Sender,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// An inventory vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vehicle {
    pub id: Uuid,
    pub dealership_id: Uuid,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub price: Option<f64>,
    pub mileage: Option<i32>,
    pub condition: Option<String>,
    pub description: Option<String>,
    pub features: Option<String>,
    pub stock_number: Option<String>,
    pub status: VehicleStatus,
}

impl Vehicle {
    /// The text fed to the embedding model. Changing any of these fields
    /// requires an embedding rebuild.
    pub fn embedding_input(&self) -> String {
        let mut parts = vec![format!("{} {} {}", self.year, self.make, self.model)];
        if let Some(price) = self.price {
            parts.push(format!("${price:.0}"));
        }
        if let Some(ref condition) = self.condition {
            parts.push(condition.clone());
        }
        if let Some(ref features) = self.features {
            parts.push(features.clone());
        }
        if let Some(ref description) = self.description {
            parts.push(description.clone());
        }
        parts.join(". ")
    }

    /// Short human-readable label, e.g. `2021 Toyota Camry`.
    pub fn label(&self) -> String {
        format!("{} {} {}", self.year, self.make, self.model)
    }
}

/// A staff member's membership in a dealership. Exactly one role per
/// (user, dealership).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub dealership_id: Uuid,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub timezone: String,
}

/// Tenant root. Owns leads, inventory, staff, approvals, settings, invites.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Dealership {
    pub id: Uuid,
    pub name: String,
    pub location: Option<String>,
    /// Provider name → `{ "phone_numbers": [..] }`.
    pub integration_config: serde_json::Value,
}

/// A draft reply awaiting a salesperson decision.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PendingApproval {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub user_id: Uuid,
    pub dealership_id: Uuid,
    pub customer_message: String,
    pub generated_response: String,
    pub customer_phone: String,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A staff invitation. The plain token is never stored, only its salted hash.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Invite {
    pub id: Uuid,
    pub dealership_id: Uuid,
    pub email: String,
    pub token_hash: String,
    pub role: Role,
    pub invited_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub status: InviteStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_levels_are_ordered() {
        assert!(Role::Owner.level() > Role::Manager.level());
        assert!(Role::Manager.level() > Role::Salesperson.level());
    }

    #[test]
    fn role_parse_round_trips() {
        for role in [Role::Owner, Role::Manager, Role::Salesperson] {
            assert_eq!(Role::parse(role.as_str()).expect("parses"), role);
        }
        assert!(Role::parse("admin").is_err());
    }

    #[test]
    fn lead_status_follow_up_keeps_hyphen() {
        assert_eq!(LeadStatus::FollowUp.as_str(), "follow-up");
    }

    #[test]
    fn embedding_input_includes_key_fields() {
        let vehicle = Vehicle {
            id: Uuid::new_v4(),
            dealership_id: Uuid::new_v4(),
            make: "Toyota".to_owned(),
            model: "Camry".to_owned(),
            year: 2021,
            price: Some(24_500.0),
            mileage: Some(32_000),
            condition: Some("excellent".to_owned()),
            description: Some("one owner".to_owned()),
            features: Some("Apple CarPlay".to_owned()),
            stock_number: None,
            status: VehicleStatus::Active,
        };
        let input = vehicle.embedding_input();
        assert!(input.contains("2021 Toyota Camry"));
        assert!(input.contains("$24500"));
        assert!(input.contains("Apple CarPlay"));
    }
}
