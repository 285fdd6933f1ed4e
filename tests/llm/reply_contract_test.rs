//! The strict-JSON reply contract and its template fallback.

use lotline::llm::prompt::{
    fallback_response, no_match_response, system_prompt, user_prompt, AgentPersona,
};
use lotline::llm::{parse_agent_reply, AgentReply};
use lotline::memory::ConversationMemory;
use lotline::retrieval::ScoredVehicle;
use lotline::types::{Vehicle, VehicleStatus};
use uuid::Uuid;

fn camry() -> ScoredVehicle {
    ScoredVehicle {
        vehicle: Vehicle {
            id: Uuid::new_v4(),
            dealership_id: Uuid::new_v4(),
            make: "Toyota".to_owned(),
            model: "Camry".to_owned(),
            year: 2021,
            price: Some(24_500.0),
            mileage: Some(32_000),
            condition: Some("excellent".to_owned()),
            description: Some("2021 Toyota Camry SE sedan".to_owned()),
            features: Some("Apple CarPlay".to_owned()),
            stock_number: Some("T-1042".to_owned()),
            status: VehicleStatus::Active,
        },
        similarity_score: 0.92,
    }
}

#[test]
fn well_formed_model_output_parses_fully() {
    let raw = r#"{
        "message": "We've got a 2021 Camry SE at $24,500. Want to see it?",
        "auto_send": true,
        "handoff": false,
        "handoff_reason": null,
        "retrieval_query": "2021 camry",
        "next_action": "offer test drive"
    }"#;
    let reply: AgentReply = parse_agent_reply(raw).expect("parses");
    assert!(reply.auto_send);
    assert!(!reply.handoff);
    assert_eq!(reply.retrieval_query, "2021 camry");
    assert!(reply.message.contains("Camry"));
}

#[test]
fn fenced_output_still_parses() {
    let raw = "```json\n{\"message\": \"Hello!\", \"handoff\": false}\n```";
    assert_eq!(parse_agent_reply(raw).map(|r| r.message), Some("Hello!".to_owned()));
}

#[test]
fn prose_with_trailing_control_object_parses() {
    let raw = "Sounds good - see you Saturday!\n\
               {\"message\": \"\", \"handoff\": true, \"handoff_reason\": \"appointment_scheduled\", \"next_action\": \"handoff\"}";
    let reply = parse_agent_reply(raw).expect("parses");
    assert_eq!(reply.message, "Sounds good - see you Saturday!");
    assert!(reply.handoff);
    assert_eq!(reply.handoff_reason.as_deref(), Some("appointment_scheduled"));
}

#[test]
fn refusal_prose_fails_and_falls_back_to_template() {
    let raw = "I'm sorry, I can't produce JSON right now.";
    assert!(parse_agent_reply(raw).is_none());

    let fallback = fallback_response(&[camry()], Some("John"));
    assert!(fallback.starts_with("Hi John!"));
    assert!(fallback.contains("2021 Toyota Camry - $24500"));
    assert!(fallback.contains("test drive"));
}

#[test]
fn no_match_template_asks_for_needs_and_budget() {
    let text = no_match_response(None);
    assert!(text.contains("needs and budget"));
}

#[test]
fn prompt_composition_carries_the_full_context_block() {
    let mut memory = ConversationMemory::new("lead-1");
    memory.add_turn("customer", "looking for a camry");
    memory.add_turn("agent", "Great - any budget in mind?");
    memory.add_turn("customer", "under 25k");
    memory.slots.budget = Some(25_000.0);
    memory.slots.model = Some("camry".to_owned());

    let persona = AgentPersona {
        dealership_name: "Sunrise Motors".to_owned(),
        ..AgentPersona::default()
    };
    let system = system_prompt(&persona);
    let user = user_prompt(&memory, &[camry()], "anything in silver?");

    // Persona, rules, and output contract live in the system prompt.
    assert!(system.contains("Sunrise Motors"));
    assert!(system.contains("\"retrieval_query\""));
    // Turns, slots, inventory, and the latest message live in the user prompt.
    assert!(user.contains("Customer: looking for a camry"));
    assert!(user.contains("Agent: Great - any budget in mind?"));
    assert!(user.contains("budget: $25000"));
    assert!(user.contains("2021 Toyota Camry ($24500)"));
    assert!(user.trim_end().ends_with("Customer: anything in silver?"));
}
