//! The context-aware search pipeline over in-memory candidates: derived
//! queries, cross-query dedupe, hard filters, preference rerank.

use lotline::memory::SlotMap;
use lotline::retrieval::{
    apply_filters, dedupe, derive_queries, index::cosine_similarity, rerank, ScoredVehicle,
    SearchContext, Urgency,
};
use lotline::types::{Vehicle, VehicleStatus};
use uuid::Uuid;

fn vehicle(make: &str, model: &str, year: i32, price: f64, description: &str) -> Vehicle {
    Vehicle {
        id: Uuid::new_v4(),
        dealership_id: Uuid::new_v4(),
        make: make.to_owned(),
        model: model.to_owned(),
        year,
        price: Some(price),
        mileage: Some(30_000),
        condition: Some("good".to_owned()),
        description: Some(description.to_owned()),
        features: Some("backup camera, apple carplay".to_owned()),
        stock_number: None,
        status: VehicleStatus::Active,
    }
}

fn scored(v: Vehicle, score: f64) -> ScoredVehicle {
    ScoredVehicle {
        vehicle: v,
        similarity_score: score,
    }
}

/// The camry-under-25k scenario: budget cap plus dedupe leave only
/// qualifying sedans, best match first.
#[test]
fn budget_capped_search_keeps_only_qualifying_vehicles() {
    let context = SearchContext {
        budget_range: Some((0.0, 25_000.0)),
        vehicle_type: None,
        preferences: Vec::new(),
        urgency: Urgency::Medium,
    };

    let candidates = vec![
        scored(vehicle("Toyota", "Camry", 2021, 24_500.0, "2021 Toyota Camry sedan"), 0.91),
        // Same (year, make, model) from a second derived query.
        scored(vehicle("Toyota", "Camry", 2021, 24_500.0, "2021 Toyota Camry sedan"), 0.88),
        scored(vehicle("Toyota", "Highlander", 2022, 38_000.0, "2022 Highlander suv"), 0.84),
        scored(vehicle("Toyota", "Corolla", 2021, 21_000.0, "2021 Toyota Corolla sedan"), 0.80),
    ];

    let results = rerank(apply_filters(dedupe(candidates), &context), &context);
    let models: Vec<&str> = results.iter().map(|r| r.vehicle.model.as_str()).collect();
    assert_eq!(models, vec!["Camry", "Corolla"]);
    assert!(results.iter().all(|r| r.vehicle.price.unwrap_or(0.0) <= 25_000.0));
}

#[test]
fn body_type_filter_reads_descriptions() {
    let context = SearchContext {
        budget_range: None,
        vehicle_type: Some("suv".to_owned()),
        preferences: Vec::new(),
        urgency: Urgency::Medium,
    };
    let candidates = vec![
        scored(vehicle("Toyota", "Camry", 2021, 24_500.0, "2021 Toyota Camry sedan"), 0.9),
        scored(vehicle("Toyota", "RAV4", 2022, 29_000.0, "2022 Toyota RAV4 compact suv"), 0.7),
    ];
    let results = apply_filters(candidates, &context);
    assert_eq!(results.len(), 1);
    assert_eq!(results.first().map(|r| r.vehicle.model.as_str()), Some("RAV4"));
}

#[test]
fn preference_boost_reorders_close_scores() {
    let context = SearchContext {
        budget_range: None,
        vehicle_type: None,
        preferences: vec![("features".to_owned(), "apple carplay".to_owned())],
        urgency: Urgency::Medium,
    };
    let mut plain = vehicle("Honda", "Civic", 2021, 23_000.0, "2021 Honda Civic");
    plain.features = Some("cloth seats".to_owned());

    let candidates = vec![
        scored(plain, 0.85),
        scored(vehicle("Toyota", "Camry", 2021, 24_500.0, "2021 Toyota Camry"), 0.80),
    ];
    let results = rerank(candidates, &context);
    // +0.10 for the carplay match lifts the Camry over the Civic.
    assert_eq!(results.first().map(|r| r.vehicle.model.as_str()), Some("Camry"));
}

#[test]
fn derived_queries_from_conversation_slots() {
    let slots = SlotMap {
        budget: Some(25_000.0),
        body_type: Some("sedan".to_owned()),
        ..SlotMap::default()
    };
    let context = SearchContext::from_slots(&slots);
    let queries = derive_queries("2021 camry", &context);
    assert!(queries.len() <= 4);
    assert!(queries.contains(&"2021 camry".to_owned()));
    assert!(queries.iter().any(|q| q.contains("under $25000")));
    assert!(queries.iter().any(|q| q.starts_with("sedan")));
}

#[test]
fn cosine_orders_by_angle_not_magnitude() {
    let query = vec![1.0f32, 0.0, 0.0];
    let same_direction_longer = vec![10.0f32, 0.0, 0.0];
    let oblique = vec![1.0f32, 1.0, 0.0];
    assert!(
        cosine_similarity(&query, &same_direction_longer)
            > cosine_similarity(&query, &oblique)
    );
    assert!((cosine_similarity(&query, &same_direction_longer) - 1.0).abs() < 1e-9);
}
