//! Memory persistence through the store: round-trips, eviction behavior,
//! and state survival across loads.

use lotline::flow::state::ConversationState;
use lotline::memory::store::MemoryStore;
use lotline::memory::ConversationMemory;
use lotline::types::{Vehicle, VehicleStatus};
use uuid::Uuid;

fn vehicle(model: &str, year: i32, price: f64) -> Vehicle {
    Vehicle {
        id: Uuid::new_v4(),
        dealership_id: Uuid::new_v4(),
        make: "Toyota".to_owned(),
        model: model.to_owned(),
        year,
        price: Some(price),
        mileage: None,
        condition: None,
        description: None,
        features: None,
        stock_number: None,
        status: VehicleStatus::Active,
    }
}

#[tokio::test]
async fn full_memory_round_trips_through_the_store() {
    let store = MemoryStore::in_process();

    let mut memory = ConversationMemory::new("lead-9");
    memory.add_turn("customer", "looking for a camry under 25k");
    memory.add_turn("agent", "We have two!");
    memory.slots.budget = Some(25_000.0);
    memory.slots.model = Some("camry".to_owned());
    memory.state = ConversationState::Recommendation;
    memory.record_recommendations(&[
        vehicle("Camry", 2021, 24_500.0),
        vehicle("Corolla", 2022, 21_000.0),
    ]);
    memory.set_appointment("tomorrow", "2pm", Some("Camry"));
    store.save(&memory).await;

    let loaded = store.load("lead-9").await;
    assert_eq!(loaded.turns.len(), 2);
    assert_eq!(loaded.slots.budget, Some(25_000.0));
    assert_eq!(loaded.state, ConversationState::Recommendation);
    assert_eq!(loaded.recent_vehicles.len(), 2);
    assert!(loaded.has_appointment());
    assert_eq!(
        loaded.resolve_pronoun("the cheaper one").map(|v| v.model.as_str()),
        Some("Corolla")
    );
}

#[tokio::test]
async fn missing_memory_loads_empty_with_greeting_state() {
    let store = MemoryStore::in_process();
    let memory = store.load("never-seen").await;
    assert_eq!(memory.state, ConversationState::Greeting);
    assert!(memory.turns.is_empty());
    assert!(!memory.has_appointment());
}

#[tokio::test]
async fn eviction_is_survivable() {
    let store = MemoryStore::in_process();
    let mut memory = ConversationMemory::new("lead-10");
    memory.add_turn("customer", "hi");
    store.save(&memory).await;
    store.delete("lead-10").await;

    // Downstream must see an empty memory, not an error.
    let reloaded = store.load("lead-10").await;
    assert!(reloaded.turns.is_empty());
    assert_eq!(reloaded.state, ConversationState::Greeting);
}

#[tokio::test]
async fn saves_are_idempotent_per_conversation() {
    let store = MemoryStore::in_process();
    let mut memory = ConversationMemory::new("lead-11");
    memory.add_turn("customer", "hello");
    store.save(&memory).await;
    store.save(&memory).await;

    let loaded = store.load("lead-11").await;
    assert_eq!(loaded.turns.len(), 1);
}
