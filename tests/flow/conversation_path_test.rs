//! The customer conversation path built from its pure parts: entity
//! extraction feeding the slot map, signals feeding the state machine, and
//! the retrieval gate that hangs off both.

use lotline::entities;
use lotline::flow::state::{advance, ConversationState, Signals};
use lotline::memory::ConversationMemory;

/// Run one customer message through memory, slots, and the state machine.
fn step(memory: &mut ConversationMemory, text: &str) -> ConversationState {
    memory.add_turn("customer", text);
    let query = entities::parse_message(text);
    memory.slots.merge(&query);
    let signals = Signals::extract(memory);
    let snapshot = advance(memory.state, &signals);
    memory.state = snapshot.state;
    memory.state
}

#[test]
fn greeting_message_reaches_discovery_without_retrieval() {
    let mut memory = ConversationMemory::new("lead-1");
    let state = step(&mut memory, "hey");
    assert_eq!(state, ConversationState::Discovery);
    assert!(!state.allows_retrieval());
    assert!(memory.slots.budget.is_none());
}

#[test]
fn specific_model_and_budget_reach_recommendation() {
    let mut memory = ConversationMemory::new("lead-2");
    step(&mut memory, "hi there");
    let state = step(&mut memory, "looking for a 2021 camry under $25k");
    // Model + budget arrive in one message: discovery → narrowing.
    assert_eq!(state, ConversationState::Narrowing);
    assert!(state.allows_retrieval());
    assert_eq!(memory.slots.model.as_deref(), Some("camry"));
    assert_eq!(memory.slots.budget, Some(25_000.0));
    assert_eq!(memory.slots.year, Some(2021));

    // The next message with the slots already full reaches recommendation.
    let state = step(&mut memory, "yeah the camry");
    assert_eq!(state, ConversationState::Recommendation);
    assert!(state.allows_retrieval());
}

#[test]
fn schedule_intent_then_confirmation_reach_handoff() {
    let mut memory = ConversationMemory::new("lead-3");
    step(&mut memory, "hello");
    step(&mut memory, "need a sedan under 20k");
    step(&mut memory, "the sedan sounds right");
    assert_eq!(memory.state, ConversationState::Recommendation);

    let state = step(&mut memory, "can I schedule a test drive?");
    assert_eq!(state, ConversationState::Schedule);

    let state = step(&mut memory, "booked, see you at 2pm");
    assert_eq!(state, ConversationState::Handoff);
}

#[test]
fn financing_short_circuits_to_handoff() {
    let mut memory = ConversationMemory::new("lead-4");
    step(&mut memory, "hi");
    let state = step(&mut memory, "what's your apr on the camry?");
    assert_eq!(state, ConversationState::Handoff);
}

#[test]
fn vague_chatter_never_unlocks_retrieval() {
    let mut memory = ConversationMemory::new("lead-5");
    for text in ["hey", "just looking", "nothing specific", "thanks!"] {
        let state = step(&mut memory, text);
        assert!(!state.allows_retrieval(), "{text:?} should not unlock retrieval");
    }
}

#[test]
fn slots_survive_across_turns() {
    let mut memory = ConversationMemory::new("lead-6");
    step(&mut memory, "my budget is 30k");
    step(&mut memory, "something with leather");
    step(&mut memory, "an suv maybe");
    assert_eq!(memory.slots.budget, Some(30_000.0));
    assert_eq!(memory.slots.body_type.as_deref(), Some("suv"));
    assert!(memory.slots.features.contains(&"leather".to_owned()));
}

#[test]
fn ring_buffer_window_drives_signals() {
    let mut memory = ConversationMemory::new("lead-7");
    // Six filler turns push the original financing mention out of the
    // five-turn window, so it stops forcing handoffs.
    memory.add_turn("customer", "how's financing work?");
    for _ in 0..5 {
        memory.add_turn("customer", "just looking at colors");
    }
    let signals = Signals::extract(&memory);
    assert!(!signals.legal_or_finance_or_trade);
}
