//! Message flow orchestration.
//!
//! The central transducer for every inbound message. Classifies the sender
//! (salesperson phones are never auto-drafted replies), drives the approval
//! state machine for salesperson commands (YES / NO / EDIT / FORCE), and
//! runs the customer pipeline: find-or-create lead, memory, state machine,
//! gated retrieval, reply generation, handoff routing, and reply scheduling.
//!
//! Failure semantics: LLM and retriever errors degrade to template replies;
//! a provider send failure after an approval transition is recorded, never
//! rolled back; memory persistence failures are logged and swallowed.

pub mod locks;
pub mod state;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::calendar;
use crate::commands::{self, BusinessCommand, Confidence};
use crate::entities;
use crate::error::GatewayError;
use crate::handoff::{self, HandoffReason};
use crate::llm::{parse_agent_reply, prompt, LlmClient};
use crate::memory::store::MemoryStore;
use crate::memory::ConversationMemory;
use crate::notify;
use crate::providers::MessagingProvider;
use crate::retrieval::{self, embedder::Embedder, ScoredVehicle, SearchContext};
use crate::scheduler::{self, ScheduleOutcome};
use crate::settings;
use crate::store::{approvals, conversations, dealerships, leads, profiles};
use crate::tasks::{TaskKind, TaskManager};
use crate::types::{
    ApprovalStatus, Lead, NormalizedInbound, PendingApproval, Sender, UserProfile,
};

use self::locks::LeadLocks;
use self::state::{advance, ConversationState, Signals};

/// Vehicles retrieved per customer message.
const RETRIEVAL_TOP_K: usize = 3;

/// Sentinel values for fields a business command failed to provide.
const UNKNOWN_NAME: &str = "Unknown";
const UNKNOWN_INTEREST: &str = "Unknown";

/// Default year for inventory added with no year stated.
const DEFAULT_INVENTORY_YEAR: i32 = 2020;

/// What one orchestrator pass did.
#[derive(Debug)]
pub enum FlowOutcome {
    /// A customer reply was sent or scheduled.
    CustomerReply {
        lead_id: Uuid,
        delayed: bool,
    },
    /// A canned handoff message went out.
    Handoff {
        lead_id: Uuid,
        reason: HandoffReason,
    },
    /// A test drive was booked and confirmed.
    AppointmentBooked {
        lead_id: Uuid,
    },
    /// A draft is waiting for salesperson approval.
    DraftQueued {
        lead_id: Uuid,
        approval_id: Uuid,
    },
    /// A pending approval was resolved by its salesperson.
    ApprovalResolved {
        approval_id: Uuid,
        status: ApprovalStatus,
        response_sent_to_customer: bool,
    },
    /// An EDIT produced a fresh draft for re-approval.
    DraftRegenerated {
        old_approval_id: Uuid,
        new_approval_id: Uuid,
    },
    /// A salesperson business command was handled.
    BusinessCommandHandled {
        kind: &'static str,
    },
    /// The salesperson got the command help message.
    HelpSent,
    /// The message was acknowledged and dropped.
    Dropped {
        reason: String,
    },
}

/// The orchestrator and its collaborators, constructed once at process init.
pub struct MessageFlow {
    pool: PgPool,
    memory: Arc<MemoryStore>,
    embedder: Option<Arc<dyn Embedder>>,
    llm: Option<Arc<dyn LlmClient>>,
    providers: HashMap<String, Arc<dyn MessagingProvider>>,
    tasks: Arc<TaskManager>,
    locks: LeadLocks,
}

impl std::fmt::Debug for MessageFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageFlow")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl MessageFlow {
    /// Wire the orchestrator. `embedder`/`llm` are optional: without them
    /// the pipeline degrades to template replies and keyword parsing.
    pub fn new(
        pool: PgPool,
        memory: Arc<MemoryStore>,
        embedder: Option<Arc<dyn Embedder>>,
        llm: Option<Arc<dyn LlmClient>>,
        providers: HashMap<String, Arc<dyn MessagingProvider>>,
        tasks: Arc<TaskManager>,
    ) -> Self {
        Self {
            pool,
            memory,
            embedder,
            llm,
            providers,
            tasks,
            locks: LeadLocks::new(),
        }
    }

    fn provider(&self, name: &str) -> Option<Arc<dyn MessagingProvider>> {
        self.providers
            .get(name)
            .or_else(|| self.providers.values().next())
            .cloned()
    }

    /// Process one normalized inbound message for a resolved dealership.
    ///
    /// # Errors
    ///
    /// Database failures propagate; everything recoverable degrades inside.
    pub async fn process_inbound(
        &self,
        dealership_id: Uuid,
        inbound: NormalizedInbound,
    ) -> Result<FlowOutcome, GatewayError> {
        // Salespeople are identified by phone within the dealership and are
        // never auto-drafted replies.
        let salesperson =
            profiles::by_phone(&self.pool, dealership_id, &inbound.from_phone).await?;

        match salesperson {
            Some(profile) => {
                info!(user_id = %profile.user_id, "inbound classified as salesperson");
                self.handle_salesperson(dealership_id, &profile, &inbound).await
            }
            None => {
                info!(phone = %inbound.from_phone, "inbound classified as customer");
                self.handle_customer(dealership_id, &inbound).await
            }
        }
    }

    // -----------------------------------------------------------------------
    // Salesperson path
    // -----------------------------------------------------------------------

    async fn handle_salesperson(
        &self,
        dealership_id: Uuid,
        profile: &UserProfile,
        inbound: &NormalizedInbound,
    ) -> Result<FlowOutcome, GatewayError> {
        let pending =
            approvals::get_pending(&self.pool, profile.user_id, dealership_id).await?;

        if let Some(approval) = pending {
            return self
                .handle_approval_response(profile, &approval, inbound)
                .await;
        }
        self.handle_business_command(dealership_id, profile, inbound)
            .await
    }

    async fn handle_approval_response(
        &self,
        profile: &UserProfile,
        approval: &PendingApproval,
        inbound: &NormalizedInbound,
    ) -> Result<FlowOutcome, GatewayError> {
        let provider = self
            .provider(&inbound.provider_name)
            .ok_or_else(|| GatewayError::Fatal("no messaging provider wired".to_owned()))?;

        match interpret_approval_command(&inbound.text) {
            ApprovalCommand::Approve => {
                // Transition first; a failed send never rolls it back.
                approvals::update_status(&self.pool, approval.id, ApprovalStatus::Approved)
                    .await?;
                let sent = match provider
                    .send(&approval.customer_phone, &approval.generated_response)
                    .await
                {
                    Ok(_) => {
                        conversations::append(
                            &self.pool,
                            approval.lead_id,
                            Sender::Agent,
                            &approval.generated_response,
                        )
                        .await?;
                        self.reply_to_salesperson(
                            &provider,
                            profile,
                            "Response approved and sent to customer.",
                        )
                        .await;
                        true
                    }
                    Err(e) => {
                        error!(approval_id = %approval.id, error = %e, "approved send failed");
                        self.reply_to_salesperson(
                            &provider,
                            profile,
                            &format!("Response was approved but failed to send: {e}"),
                        )
                        .await;
                        false
                    }
                };
                Ok(FlowOutcome::ApprovalResolved {
                    approval_id: approval.id,
                    status: ApprovalStatus::Approved,
                    response_sent_to_customer: sent,
                })
            }
            ApprovalCommand::Reject => {
                approvals::update_status(&self.pool, approval.id, ApprovalStatus::Rejected)
                    .await?;
                self.reply_to_salesperson(
                    &provider,
                    profile,
                    "Response rejected. No message was sent to the customer.",
                )
                .await;
                Ok(FlowOutcome::ApprovalResolved {
                    approval_id: approval.id,
                    status: ApprovalStatus::Rejected,
                    response_sent_to_customer: false,
                })
            }
            ApprovalCommand::Edit(instructions) => {
                if instructions.is_empty() {
                    self.reply_to_salesperson(
                        &provider,
                        profile,
                        "Please provide specific instructions for the edit. \
                         Example: 'EDIT Make it more friendly and mention our financing options'",
                    )
                    .await;
                    return Ok(FlowOutcome::HelpSent);
                }
                self.regenerate_draft(profile, approval, &instructions, &provider)
                    .await
            }
            ApprovalCommand::Force(text) => {
                if text.is_empty() {
                    self.reply_to_salesperson(
                        &provider,
                        profile,
                        "Please provide a message to send. \
                         Example: 'FORCE Hi John, I'll call you in 5 minutes.'",
                    )
                    .await;
                    return Ok(FlowOutcome::HelpSent);
                }
                approvals::update_status(&self.pool, approval.id, ApprovalStatus::ForceSent)
                    .await?;
                let sent = match provider.send(&approval.customer_phone, &text).await {
                    Ok(_) => {
                        conversations::append(&self.pool, approval.lead_id, Sender::Agent, &text)
                            .await?;
                        self.reply_to_salesperson(
                            &provider,
                            profile,
                            "Custom message sent directly to customer.",
                        )
                        .await;
                        true
                    }
                    Err(e) => {
                        error!(approval_id = %approval.id, error = %e, "force send failed");
                        self.reply_to_salesperson(
                            &provider,
                            profile,
                            &format!("Failed to send custom message: {e}"),
                        )
                        .await;
                        false
                    }
                };
                Ok(FlowOutcome::ApprovalResolved {
                    approval_id: approval.id,
                    status: ApprovalStatus::ForceSent,
                    response_sent_to_customer: sent,
                })
            }
            ApprovalCommand::Unknown => {
                self.reply_to_salesperson(&provider, profile, APPROVAL_HELP).await;
                Ok(FlowOutcome::HelpSent)
            }
        }
    }

    /// EDIT path: regenerate with the instructions prioritized, validate by
    /// keyword overlap, retry once with stronger emphasis, then queue a new
    /// draft and expire the old one.
    async fn regenerate_draft(
        &self,
        profile: &UserProfile,
        approval: &PendingApproval,
        instructions: &str,
        provider: &Arc<dyn MessagingProvider>,
    ) -> Result<FlowOutcome, GatewayError> {
        let vehicles = self
            .retrieve_for_edit(approval.dealership_id, &approval.customer_message)
            .await;

        let mut new_response = self
            .complete_edit(&approval.customer_message, instructions, false, &vehicles)
            .await;

        if !validate_edit_requirements(&new_response, instructions) {
            warn!(approval_id = %approval.id, "edit requirements not met, regenerating");
            new_response = self
                .complete_edit(&approval.customer_message, instructions, true, &vehicles)
                .await;
            if !validate_edit_requirements(&new_response, instructions) {
                warn!(approval_id = %approval.id, "edit requirements still unmet, proceeding");
            }
        }

        // create() expires the old pending row for this (user, dealership).
        let new_approval = approvals::create(
            &self.pool,
            approvals::NewApproval {
                lead_id: approval.lead_id,
                user_id: approval.user_id,
                dealership_id: approval.dealership_id,
                customer_message: approval.customer_message.clone(),
                generated_response: new_response.clone(),
                customer_phone: approval.customer_phone.clone(),
            },
        )
        .await?;

        let notification = notify::edited_draft_notification(
            &approval.customer_message,
            instructions,
            &new_response,
        );
        self.reply_to_salesperson(provider, profile, &notification).await;

        info!(
            old = %approval.id,
            new = %new_approval.id,
            "edit produced a regenerated draft"
        );
        Ok(FlowOutcome::DraftRegenerated {
            old_approval_id: approval.id,
            new_approval_id: new_approval.id,
        })
    }

    async fn retrieve_for_edit(
        &self,
        dealership_id: Uuid,
        customer_message: &str,
    ) -> Vec<ScoredVehicle> {
        let Some(embedder) = self.embedder.as_deref() else {
            return Vec::new();
        };
        let query = entities::parse_message(customer_message);
        let context = SearchContext {
            budget_range: query.price_range.or(query.budget.map(|b| (0.0, b))),
            vehicle_type: query.body_type,
            preferences: Vec::new(),
            urgency: retrieval::Urgency::Medium,
        };
        match retrieval::search_with_context(
            &self.pool,
            embedder,
            dealership_id,
            customer_message,
            &context,
            RETRIEVAL_TOP_K,
        )
        .await
        {
            Ok(vehicles) => vehicles,
            Err(e) => {
                warn!(error = %e, "retrieval for edit failed, regenerating without vehicles");
                Vec::new()
            }
        }
    }

    async fn complete_edit(
        &self,
        customer_message: &str,
        instructions: &str,
        stronger: bool,
        vehicles: &[ScoredVehicle],
    ) -> String {
        let Some(llm) = self.llm.as_deref() else {
            return prompt::fallback_response(vehicles, None);
        };
        let persona = prompt::AgentPersona::default();
        let user = prompt::edit_prompt(customer_message, instructions, stronger);
        match llm.complete(&prompt::system_prompt(&persona), &user).await {
            Ok(raw) => parse_agent_reply(&raw)
                .map(|r| r.message)
                .unwrap_or_else(|| raw.trim().to_owned()),
            Err(e) => {
                warn!(error = %e, "edit completion failed, using template");
                prompt::fallback_response(vehicles, None)
            }
        }
    }

    async fn handle_business_command(
        &self,
        dealership_id: Uuid,
        profile: &UserProfile,
        inbound: &NormalizedInbound,
    ) -> Result<FlowOutcome, GatewayError> {
        let provider = self
            .provider(&inbound.provider_name)
            .ok_or_else(|| GatewayError::Fatal("no messaging provider wired".to_owned()))?;

        let parsed = commands::parse(self.llm.as_deref(), &inbound.text).await;
        let incomplete = parsed.confidence != Confidence::High;

        let (kind, mut reply) = match parsed.command {
            BusinessCommand::LeadCreation {
                name,
                phone,
                email,
                car_interest,
                price_range,
            } => {
                let lead = leads::create(
                    &self.pool,
                    leads::NewLead {
                        dealership_id,
                        name: name.unwrap_or_else(|| UNKNOWN_NAME.to_owned()),
                        car_interest: car_interest
                            .unwrap_or_else(|| UNKNOWN_INTEREST.to_owned()),
                        source: "SMS Lead Creation".to_owned(),
                        phone: phone.as_deref().and_then(crate::phone::normalize),
                        email,
                        max_price: price_range,
                        assigned_user_id: Some(profile.user_id),
                    },
                )
                .await?;
                info!(lead_id = %lead.id, "lead created from salesperson SMS");
                (
                    "lead_creation",
                    format!(
                        "Lead created: {} ({}), interested in {}.",
                        lead.name,
                        lead.phone.as_deref().unwrap_or("no phone"),
                        lead.car_interest
                    ),
                )
            }
            BusinessCommand::InventoryUpdate {
                year,
                make,
                model,
                mileage,
                condition,
                price,
                description,
                features,
            } => {
                let vehicle = crate::store::inventory::create(
                    &self.pool,
                    crate::store::inventory::NewVehicle {
                        dealership_id,
                        make: make.unwrap_or_else(|| "Vehicle".to_owned()),
                        model: model.unwrap_or_else(|| "Model".to_owned()),
                        year: year.unwrap_or(DEFAULT_INVENTORY_YEAR),
                        price,
                        mileage,
                        condition: Some(condition.unwrap_or_else(|| "unknown".to_owned())),
                        description,
                        features,
                        stock_number: None,
                    },
                )
                .await?;
                self.tasks
                    .enqueue(TaskKind::EmbeddingBuild {
                        dealership_id,
                        vehicle_id: vehicle.id,
                    })
                    .await;
                info!(vehicle_id = %vehicle.id, "inventory added from salesperson SMS");
                (
                    "inventory_update",
                    format!("Added to inventory: {}.", vehicle.label()),
                )
            }
            BusinessCommand::LeadInquiry { lead_identifier, .. } => (
                "lead_inquiry",
                format!(
                    "Got it - checking on lead {}.",
                    lead_identifier.as_deref().unwrap_or("(unspecified)")
                ),
            ),
            BusinessCommand::InventoryInquiry { make, model, .. } => (
                "inventory_inquiry",
                format!(
                    "Got it - checking stock for {} {}.",
                    make.as_deref().unwrap_or("any make"),
                    model.as_deref().unwrap_or("")
                ),
            ),
            BusinessCommand::GeneralQuestion { .. } => (
                "general_question",
                "Got it - I'll pass that along.".to_owned(),
            ),
            BusinessCommand::StatusUpdate { lead_identifier, .. } => (
                "status_update",
                format!(
                    "Noted the update on {}.",
                    lead_identifier.as_deref().unwrap_or("the lead")
                ),
            ),
            BusinessCommand::TestDriveScheduling {
                customer_name,
                preferred_date,
                preferred_time,
                ..
            } => {
                let booking = calendar::schedule_test_drive(
                    customer_name.as_deref().unwrap_or("Customer"),
                    "unknown",
                    "Vehicle",
                    preferred_date.as_deref().unwrap_or("tomorrow"),
                    preferred_time.as_deref().unwrap_or("2pm"),
                    Utc::now().date_naive(),
                );
                (
                    "test_drive_scheduling",
                    format!(
                        "Test drive noted for {}. Calendar link: {}",
                        booking.appointment_datetime.format("%m/%d at %l:%M %p"),
                        booking.calendar_url
                    ),
                )
            }
            BusinessCommand::Unknown => {
                self.reply_to_salesperson(
                    &provider,
                    profile,
                    "Sorry, I couldn't work out what to do with that. You can create \
                     leads ('just met John, 555-1234, wants a Camry'), add inventory \
                     ('picked up a 2020 Camry'), or ask about leads and stock.",
                )
                .await;
                return Ok(FlowOutcome::HelpSent);
            }
        };

        if incomplete {
            reply.push_str(
                "\n\nNote: some information was incomplete. Please update the record \
                 with additional details when possible.",
            );
        }
        self.reply_to_salesperson(&provider, profile, &reply).await;
        Ok(FlowOutcome::BusinessCommandHandled { kind })
    }

    async fn reply_to_salesperson(
        &self,
        provider: &Arc<dyn MessagingProvider>,
        profile: &UserProfile,
        text: &str,
    ) {
        notify::send_to_salesperson(provider.as_ref(), profile, text).await;
    }

    // -----------------------------------------------------------------------
    // Customer path
    // -----------------------------------------------------------------------

    async fn handle_customer(
        &self,
        dealership_id: Uuid,
        inbound: &NormalizedInbound,
    ) -> Result<FlowOutcome, GatewayError> {
        let provider = self
            .provider(&inbound.provider_name)
            .ok_or_else(|| GatewayError::Fatal("no messaging provider wired".to_owned()))?;

        let lead = self.find_or_create_lead(dealership_id, inbound).await?;

        // Per-lead serialization: one orchestrator pass mutates this lead's
        // memory and turns at a time.
        let _guard = self.locks.acquire(lead.id).await;

        conversations::append(&self.pool, lead.id, Sender::Customer, &inbound.text).await?;
        leads::touch_last_contact(&self.pool, lead.id).await?;

        let mut memory = self.memory.load(&lead.id.to_string()).await;
        memory.add_turn("customer", &inbound.text);
        let query = entities::parse_message(&inbound.text);
        memory.slots.merge(&query);

        let signals = Signals::extract(&memory);
        let previous_state = memory.state;
        let snapshot = advance(previous_state, &signals);
        memory.state = snapshot.state;
        info!(
            lead_id = %lead.id,
            from = ?previous_state,
            to = ?snapshot.state,
            reason = snapshot.reason,
            "conversation state advanced"
        );

        // Retrieval gate: state must allow it and the message (or the
        // accumulated context) must carry real signals.
        let vehicles = self
            .retrieve_if_gated(dealership_id, inbound, &memory, &query)
            .await;

        let reply_text = self.generate_reply(&lead, &memory, &vehicles, &inbound.text).await;

        let scheduling_context = memory.state == ConversationState::Schedule
            || signals.explicit_schedule_intent;
        let decision = handoff::should_handoff(
            &inbound.text,
            &reply_text,
            memory.has_appointment(),
            scheduling_context,
        );

        let outcome = if let Some(reason) = decision.reason.filter(|_| decision.should_handoff) {
            self.handle_handoff(
                &provider, &lead, inbound, &mut memory, &vehicles, reason, &decision.reasoning,
            )
            .await?
        } else if memory.has_appointment() && is_appointment_question(&inbound.text) {
            let summary = memory
                .appointment_summary()
                .unwrap_or_else(|| "your appointment".to_owned());
            let text = crate::rapport::appointment_info(&summary);
            self.send_and_record(&provider, &lead, &text).await;
            memory.add_turn("agent", &text);
            FlowOutcome::CustomerReply {
                lead_id: lead.id,
                delayed: false,
            }
        } else {
            self.deliver_reply(&provider, &lead, inbound, &mut memory, &vehicles, reply_text)
                .await?
        };

        memory.record_recommendations(
            &vehicles.iter().map(|v| v.vehicle.clone()).collect::<Vec<_>>(),
        );
        // Memory persistence is never fatal to the flow.
        self.memory.save(&memory).await;

        Ok(outcome)
    }

    async fn find_or_create_lead(
        &self,
        dealership_id: Uuid,
        inbound: &NormalizedInbound,
    ) -> Result<Lead, GatewayError> {
        if let Some(lead) =
            leads::find_by_phone(&self.pool, dealership_id, &inbound.from_phone).await?
        {
            return Ok(lead);
        }

        let name = extract_name(&inbound.text).unwrap_or_else(|| UNKNOWN_NAME.to_owned());
        let car_interest =
            extract_car_interest(&inbound.text).unwrap_or_else(|| UNKNOWN_INTEREST.to_owned());
        let lead = leads::create(
            &self.pool,
            leads::NewLead {
                dealership_id,
                name,
                car_interest,
                source: inbound.provider_name.clone(),
                phone: Some(inbound.from_phone.clone()),
                email: None,
                max_price: None,
                assigned_user_id: None,
            },
        )
        .await?;
        info!(lead_id = %lead.id, "created lead from inbound message");
        Ok(lead)
    }

    async fn retrieve_if_gated(
        &self,
        dealership_id: Uuid,
        inbound: &NormalizedInbound,
        memory: &ConversationMemory,
        query: &entities::VehicleQuery,
    ) -> Vec<ScoredVehicle> {
        if !memory.state.allows_retrieval() {
            return Vec::new();
        }
        let context = SearchContext::from_slots(&memory.slots);
        let has_signals =
            query.has_strong_signals || context.budget_range.is_some() || context.vehicle_type.is_some();
        if !has_signals {
            return Vec::new();
        }
        let Some(embedder) = self.embedder.as_deref() else {
            return Vec::new();
        };

        match retrieval::search_with_context(
            &self.pool,
            embedder,
            dealership_id,
            &inbound.text,
            &context,
            RETRIEVAL_TOP_K,
        )
        .await
        {
            Ok(vehicles) => vehicles,
            Err(e) => {
                warn!(error = %e, "retrieval failed, continuing without vehicles");
                Vec::new()
            }
        }
    }

    async fn generate_reply(
        &self,
        lead: &Lead,
        memory: &ConversationMemory,
        vehicles: &[ScoredVehicle],
        user_message: &str,
    ) -> String {
        let Some(llm) = self.llm.as_deref() else {
            return prompt::fallback_response(vehicles, Some(&lead.name));
        };

        let dealership_name = dealerships::get(&self.pool, lead.dealership_id)
            .await
            .map(|d| d.name)
            .unwrap_or_else(|_| "our dealership".to_owned());
        let persona = prompt::AgentPersona {
            dealership_name,
            ..prompt::AgentPersona::default()
        };
        let system = prompt::system_prompt(&persona);
        let user = prompt::user_prompt(memory, vehicles, user_message);

        match llm.complete(&system, &user).await {
            Ok(raw) => match parse_agent_reply(&raw) {
                Some(reply) => reply.message,
                None => {
                    warn!(lead_id = %lead.id, "agent reply failed JSON contract, using template");
                    prompt::fallback_response(vehicles, Some(&lead.name))
                }
            },
            Err(e) => {
                warn!(lead_id = %lead.id, error = %e, "LLM failed, using template");
                prompt::fallback_response(vehicles, Some(&lead.name))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_handoff(
        &self,
        provider: &Arc<dyn MessagingProvider>,
        lead: &Lead,
        inbound: &NormalizedInbound,
        memory: &mut ConversationMemory,
        vehicles: &[ScoredVehicle],
        reason: HandoffReason,
        reasoning: &str,
    ) -> Result<FlowOutcome, GatewayError> {
        info!(lead_id = %lead.id, reason = reason.as_str(), reasoning, "handoff triggered");

        match reason {
            HandoffReason::TestDriveTimeConfirmed => {
                let date = extract_date_preference(&inbound.text);
                let time = extract_time_preference(&inbound.text);
                let vehicle_label = vehicles
                    .first()
                    .map(|v| v.vehicle.label())
                    .or_else(|| memory.last_vehicle.as_ref().map(|v| v.label()));

                let booking = calendar::schedule_test_drive(
                    &lead.name,
                    lead.phone.as_deref().unwrap_or("unknown"),
                    vehicle_label.as_deref().unwrap_or("Vehicle"),
                    date,
                    time,
                    Utc::now().date_naive(),
                );
                let appointment_utc = booking.appointment_datetime.and_utc();
                leads::record_appointment(&self.pool, lead.id, appointment_utc).await?;
                memory.set_appointment(date, time, vehicle_label.as_deref());

                let text = format!(
                    "{} Here's your calendar link: {}",
                    crate::rapport::appointment_confirmation(time),
                    booking.calendar_url
                );
                self.send_and_record(provider, lead, &text).await;
                memory.add_turn("agent", &text);
                self.notify_assigned(provider, lead, &inbound.text, reason).await;
                Ok(FlowOutcome::AppointmentBooked { lead_id: lead.id })
            }
            HandoffReason::TestDriveScheduling if !memory.has_appointment() => {
                // Request without a confirmed time: ask, don't book.
                let text = "Sure! What day and time work best for you?";
                self.send_and_record(provider, lead, text).await;
                memory.add_turn("agent", text);
                Ok(FlowOutcome::CustomerReply {
                    lead_id: lead.id,
                    delayed: false,
                })
            }
            _ => {
                let text = handoff::handoff_message(reason);
                self.send_and_record(provider, lead, text).await;
                memory.add_turn("agent", text);
                self.notify_assigned(provider, lead, &inbound.text, reason).await;
                Ok(FlowOutcome::Handoff {
                    lead_id: lead.id,
                    reason,
                })
            }
        }
    }

    /// Auto-send or draft-for-approval, honoring the dealership's reply
    /// timing settings.
    async fn deliver_reply(
        &self,
        provider: &Arc<dyn MessagingProvider>,
        lead: &Lead,
        inbound: &NormalizedInbound,
        memory: &mut ConversationMemory,
        _vehicles: &[ScoredVehicle],
        reply_text: String,
    ) -> Result<FlowOutcome, GatewayError> {
        // Approval mode: with auto-response off and a salesperson assigned,
        // the reply becomes a draft instead of a send.
        let auto_enabled =
            settings::get_dealership(&self.pool, lead.dealership_id, "auto_response_enabled")
                .await
                .map(|v| v.as_bool().unwrap_or(true))
                .unwrap_or(true);

        if !auto_enabled {
            if let Some(assigned_user_id) = lead.assigned_user_id {
                return self
                    .queue_draft(provider, lead, assigned_user_id, inbound, reply_text)
                    .await;
            }
            warn!(
                lead_id = %lead.id,
                "auto-response disabled but no assigned salesperson, sending directly"
            );
        }

        let timezone = self.assigned_timezone(lead).await;
        let timing = settings::reply_timing_for_dealership(
            &self.pool,
            lead.dealership_id,
            &timezone,
        )
        .await
        .unwrap_or_default();

        let plan = scheduler::plan_reply(&inbound.text, &timing, Utc::now());
        let delayed = plan.delayed;

        memory.add_turn("agent", &reply_text);
        let reply_for_notification = reply_text.clone();

        let send_provider = Arc::clone(provider);
        let pool = self.pool.clone();
        let lead_id = lead.id;
        let to_phone = lead.phone.clone().unwrap_or_else(|| inbound.from_phone.clone());
        let outcome = scheduler::execute(plan, move || async move {
            match send_provider.send(&to_phone, &reply_text).await {
                Ok(receipt) => {
                    info!(
                        lead_id = %lead_id,
                        provider_message_id = %receipt.provider_message_id,
                        "customer reply delivered"
                    );
                    if let Err(e) =
                        conversations::append(&pool, lead_id, Sender::Agent, &reply_text).await
                    {
                        error!(lead_id = %lead_id, error = %e, "failed to record agent turn");
                    }
                }
                Err(e) => error!(lead_id = %lead_id, error = %e, "customer reply send failed"),
            }
        })
        .await;

        if let ScheduleOutcome::Scheduled(handle) = outcome {
            // The timer task owns the send; dropping the handle must not
            // cancel it.
            let delay = handle.delay;
            tokio::spawn(async move { handle.join().await });
            info!(lead_id = %lead.id, delay_secs = delay.as_secs_f64(), "reply scheduled");
        }

        if let Some(assigned_user_id) = lead.assigned_user_id {
            if let Ok(Some(assigned)) = profiles::by_user_id(&self.pool, assigned_user_id).await {
                let note =
                    notify::auto_sent_notification(lead, &inbound.text, &reply_for_notification);
                notify::send_to_salesperson(provider.as_ref(), &assigned, &note).await;
            }
        }

        Ok(FlowOutcome::CustomerReply {
            lead_id: lead.id,
            delayed,
        })
    }

    async fn queue_draft(
        &self,
        provider: &Arc<dyn MessagingProvider>,
        lead: &Lead,
        assigned_user_id: Uuid,
        inbound: &NormalizedInbound,
        reply_text: String,
    ) -> Result<FlowOutcome, GatewayError> {
        let approval = approvals::create(
            &self.pool,
            approvals::NewApproval {
                lead_id: lead.id,
                user_id: assigned_user_id,
                dealership_id: lead.dealership_id,
                customer_message: inbound.text.clone(),
                generated_response: reply_text,
                customer_phone: inbound.from_phone.clone(),
            },
        )
        .await?;

        if let Ok(Some(assigned)) = profiles::by_user_id(&self.pool, assigned_user_id).await {
            let note =
                notify::draft_notification(lead, &inbound.text, &approval.generated_response);
            notify::send_to_salesperson(provider.as_ref(), &assigned, &note).await;
        }

        info!(lead_id = %lead.id, approval_id = %approval.id, "draft queued for approval");
        Ok(FlowOutcome::DraftQueued {
            lead_id: lead.id,
            approval_id: approval.id,
        })
    }

    async fn send_and_record(
        &self,
        provider: &Arc<dyn MessagingProvider>,
        lead: &Lead,
        text: &str,
    ) {
        let to = lead.phone.clone().unwrap_or_default();
        match provider.send(&to, text).await {
            Ok(_) => {
                if let Err(e) =
                    conversations::append(&self.pool, lead.id, Sender::Agent, text).await
                {
                    error!(lead_id = %lead.id, error = %e, "failed to record agent turn");
                }
            }
            Err(e) => error!(lead_id = %lead.id, error = %e, "send failed"),
        }
    }

    async fn notify_assigned(
        &self,
        provider: &Arc<dyn MessagingProvider>,
        lead: &Lead,
        customer_message: &str,
        reason: HandoffReason,
    ) {
        let Some(assigned_user_id) = lead.assigned_user_id else {
            return;
        };
        match profiles::by_user_id(&self.pool, assigned_user_id).await {
            Ok(Some(assigned)) => {
                let note = notify::handoff_notification(lead, customer_message, reason.as_str());
                notify::send_to_salesperson(provider.as_ref(), &assigned, &note).await;
            }
            Ok(None) => warn!(user_id = %assigned_user_id, "assigned salesperson has no profile"),
            Err(e) => warn!(error = %e, "failed to load assigned salesperson"),
        }
    }

    async fn assigned_timezone(&self, lead: &Lead) -> String {
        if let Some(assigned_user_id) = lead.assigned_user_id {
            if let Ok(Some(profile)) = profiles::by_user_id(&self.pool, assigned_user_id).await {
                return profile.timezone;
            }
        }
        "America/New_York".to_owned()
    }
}

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

/// Help message listing the four approval commands.
const APPROVAL_HELP: &str = "I didn't understand your response. Here are your options:\n\n\
     - Reply 'YES' to send the suggested response to the customer\n\
     - Reply 'NO' to reject the response\n\
     - Reply 'EDIT [instructions]' to have me regenerate the response\n\
     - Reply 'FORCE [your message]' to send your custom message directly\n\n\
     Examples:\n\
     - EDIT Make it more friendly and mention financing\n\
     - FORCE Hi John! I'll call you in 5 minutes about the Camry.";

/// A salesperson's reply to a pending approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalCommand {
    Approve,
    Reject,
    Edit(String),
    Force(String),
    Unknown,
}

const YES_SYNONYMS: &[&str] = &[
    "yes", "y", "send", "approve", "ok", "okay", "\u{1f44d}", "\u{2705}", "send it",
    "looks good", "good", "go ahead", "approve it",
];

const NO_SYNONYMS: &[&str] = &[
    "no", "n", "reject", "cancel", "skip", "\u{1f44e}", "\u{274c}", "don't send",
    "do not send", "reject it", "cancel it", "skip it", "no thanks",
];

/// Interpret a salesperson message as an approval command.
pub fn interpret_approval_command(text: &str) -> ApprovalCommand {
    let trimmed = text.trim();
    let lower = trimmed.to_lowercase();

    if YES_SYNONYMS.contains(&lower.as_str()) {
        return ApprovalCommand::Approve;
    }
    if NO_SYNONYMS.contains(&lower.as_str()) {
        return ApprovalCommand::Reject;
    }
    if lower.starts_with("edit") {
        let instructions = trimmed.get(4..).unwrap_or_default().trim().to_owned();
        return ApprovalCommand::Edit(instructions);
    }
    if lower.starts_with("force") {
        let message = trimmed.get(5..).unwrap_or_default().trim().to_owned();
        return ApprovalCommand::Force(message);
    }
    ApprovalCommand::Unknown
}

/// Keyword-overlap check that a regenerated response actually reflects the
/// edit instructions. Category phrase sets first (60% must appear), then a
/// generic long-word overlap (50%).
pub fn validate_edit_requirements(response: &str, instructions: &str) -> bool {
    let response_lower = response.to_lowercase();
    let edit_lower = instructions.to_lowercase();

    let mut key_phrases: Vec<&str> = Vec::new();
    if edit_lower.contains("friendly") {
        key_phrases.extend(["friendly", "warm", "welcoming", "thanks", "excited", "happy"]);
    }
    if edit_lower.contains("financing") || edit_lower.contains("apr") || edit_lower.contains("payment")
    {
        key_phrases.extend(["financing", "apr", "payment", "0%", "promotion", "offer"]);
    }
    if edit_lower.contains("call") || edit_lower.contains("phone") {
        key_phrases.extend(["call", "phone", "contact", "reach out"]);
    }
    if edit_lower.contains("test drive") {
        key_phrases.extend(["test drive", "schedule", "appointment"]);
    }
    if edit_lower.contains("price") || edit_lower.contains("cost") {
        key_phrases.extend(["price", "cost", "value", "$"]);
    }

    if !key_phrases.is_empty() {
        let found = key_phrases
            .iter()
            .filter(|p| response_lower.contains(*p))
            .count();
        // At least 60% of the expected phrases must land.
        return found.saturating_mul(10) >= key_phrases.len().saturating_mul(6);
    }

    let edit_words: Vec<&str> = edit_lower
        .split_whitespace()
        .filter(|w| w.len() > 3)
        .collect();
    if edit_words.is_empty() {
        return true;
    }
    let response_words: Vec<&str> = response_lower.split_whitespace().collect();
    let matching = edit_words
        .iter()
        .filter(|w| response_words.contains(*w))
        .count();
    matching.saturating_mul(2) >= edit_words.len()
}

/// "my name is X" heuristic for naming a brand-new lead.
fn extract_name(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    let pos = lower.find("my name is")?;
    let after = text.get(pos.saturating_add("my name is".len())..)?;
    let word: String = after
        .trim_start()
        .chars()
        .take_while(|c| c.is_alphabetic())
        .collect();
    (!word.is_empty()).then_some(word)
}

const CAR_KEYWORDS: &[&str] = &[
    "toyota", "honda", "ford", "bmw", "mercedes", "audi", "lexus", "nissan", "mazda",
];

/// Make-keyword scan for a new lead's car interest.
fn extract_car_interest(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    CAR_KEYWORDS.iter().find(|k| lower.contains(*k)).map(|k| {
        let mut label = (*k).to_owned();
        if let Some(first) = label.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        label
    })
}

/// Whether the customer is asking about their existing appointment.
fn is_appointment_question(text: &str) -> bool {
    let lower = text.to_lowercase();
    [
        "what time",
        "when is",
        "my appointment",
        "test drive time",
        "appointment time",
    ]
    .iter()
    .any(|p| lower.contains(p))
}

const SPECIFIC_TIMES: &[&str] = &[
    "2pm", "3pm", "4pm", "10am", "11am", "1pm", "5pm", "6pm", "7pm", "8am", "9am", "12pm",
    "noon",
];

/// Time preference from a scheduling message, defaulting to 2pm.
fn extract_time_preference(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    for time in SPECIFIC_TIMES {
        if lower.contains(time) {
            return time;
        }
    }
    if lower.contains("morning") {
        "10am"
    } else if lower.contains("evening") {
        "6pm"
    } else {
        "2pm"
    }
}

/// Date preference from a scheduling message, defaulting to tomorrow.
fn extract_date_preference(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    if lower.contains("today") {
        "today"
    } else if lower.contains("next week") {
        "next week"
    } else {
        "tomorrow"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yes_synonyms_approve() {
        for text in ["YES", "yes", "y", "Send it", "looks good", "ok", "go ahead"] {
            assert_eq!(
                interpret_approval_command(text),
                ApprovalCommand::Approve,
                "{text}"
            );
        }
    }

    #[test]
    fn no_synonyms_reject() {
        for text in ["NO", "n", "reject", "don't send", "cancel"] {
            assert_eq!(
                interpret_approval_command(text),
                ApprovalCommand::Reject,
                "{text}"
            );
        }
    }

    #[test]
    fn edit_keeps_instructions() {
        assert_eq!(
            interpret_approval_command("EDIT mention 0% APR and be friendlier"),
            ApprovalCommand::Edit("mention 0% APR and be friendlier".to_owned())
        );
        assert_eq!(
            interpret_approval_command("edit"),
            ApprovalCommand::Edit(String::new())
        );
    }

    #[test]
    fn force_keeps_message() {
        assert_eq!(
            interpret_approval_command("FORCE Hi John, calling you in 5."),
            ApprovalCommand::Force("Hi John, calling you in 5.".to_owned())
        );
    }

    #[test]
    fn anything_else_is_unknown() {
        assert_eq!(
            interpret_approval_command("what's the weather"),
            ApprovalCommand::Unknown
        );
    }

    #[test]
    fn edit_validation_financing_phrases() {
        assert!(validate_edit_requirements(
            "We have great financing offers with 0% APR promotion right now!",
            "mention financing and APR"
        ));
        assert!(!validate_edit_requirements(
            "The Camry is a nice sedan.",
            "mention financing and APR"
        ));
    }

    #[test]
    fn edit_validation_generic_word_overlap() {
        assert!(validate_edit_requirements(
            "I'll include the warranty details for the Camry.",
            "include warranty details"
        ));
        assert!(!validate_edit_requirements(
            "Totally unrelated text.",
            "include warranty details"
        ));
    }

    #[test]
    fn edit_validation_trivial_instructions_pass() {
        assert!(validate_edit_requirements("anything", "ok it"));
    }

    #[test]
    fn name_extraction() {
        assert_eq!(extract_name("hi my name is John Smith").as_deref(), Some("John"));
        assert_eq!(extract_name("hello there"), None);
    }

    #[test]
    fn car_interest_extraction() {
        assert_eq!(
            extract_car_interest("looking at a toyota camry").as_deref(),
            Some("Toyota")
        );
        assert_eq!(extract_car_interest("just browsing"), None);
    }

    #[test]
    fn appointment_question_detection() {
        assert!(is_appointment_question("what time is my appointment?"));
        assert!(is_appointment_question("when is my test drive?"));
        assert!(!is_appointment_question("do you have sedans?"));
    }

    #[test]
    fn time_and_date_preferences() {
        assert_eq!(extract_time_preference("tomorrow at 2pm works"), "2pm");
        assert_eq!(extract_time_preference("morning is better"), "10am");
        assert_eq!(extract_time_preference("whenever"), "2pm");
        assert_eq!(extract_date_preference("today please"), "today");
        assert_eq!(extract_date_preference("sometime"), "tomorrow");
    }
}
