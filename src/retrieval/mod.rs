//! Embedding-based vehicle retrieval.
//!
//! [`index`] owns the per-dealership vector index; this module layers the
//! context-aware variant on top: several derived query strings, cross-query
//! deduplication, hard filters from conversation context, and a preference
//! rerank. Retrieval is gated upstream by the conversation state machine —
//! callers outside NARROWING/RECOMMENDATION get an empty result without a
//! search.

pub mod embedder;
pub mod index;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::memory::SlotMap;
use crate::types::Vehicle;

use self::embedder::Embedder;

/// Maximum derived search queries per context search.
const MAX_DERIVED_QUERIES: usize = 4;

/// Score boost per matching preference, capped at a total score of 1.0.
const PREFERENCE_BOOST: f64 = 0.10;

/// A retrieved vehicle with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredVehicle {
    pub vehicle: Vehicle,
    pub similarity_score: f64,
}

/// Customer urgency inferred from the conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
}

/// Conversation-derived context that shapes the search.
#[derive(Debug, Clone, Default)]
pub struct SearchContext {
    /// Inclusive dollar bounds; vehicles priced outside are dropped.
    pub budget_range: Option<(f64, f64)>,
    /// Required body type; vehicles whose description lacks it are dropped.
    pub vehicle_type: Option<String>,
    /// Preference key/value pairs used for reranking.
    pub preferences: Vec<(String, String)>,
    /// Urgency qualifier for query derivation.
    pub urgency: Urgency,
}

impl SearchContext {
    /// Build search context from the conversation's merged slots.
    pub fn from_slots(slots: &SlotMap) -> Self {
        let budget_range = slots.budget.map(|b| (0.0, b));
        let preferences = slots
            .features
            .iter()
            .map(|f| ("features".to_owned(), f.clone()))
            .collect();
        Self {
            budget_range,
            vehicle_type: slots.body_type.clone(),
            preferences,
            urgency: Urgency::Medium,
        }
    }
}

/// Derive up to four query strings from the base query and context.
pub fn derive_queries(base: &str, context: &SearchContext) -> Vec<String> {
    let mut queries = vec![base.to_owned()];
    if let Some((_, hi)) = context.budget_range {
        queries.push(format!("{base} under ${hi:.0}"));
    }
    if let Some(ref vehicle_type) = context.vehicle_type {
        queries.push(format!("{vehicle_type} {base}"));
    }
    if context.urgency == Urgency::High {
        queries.push(format!("{base} available immediately"));
    }
    queries.truncate(MAX_DERIVED_QUERIES);
    queries
}

/// Drop duplicate vehicles by (year, make, model), keeping first occurrence.
pub fn dedupe(results: Vec<ScoredVehicle>) -> Vec<ScoredVehicle> {
    let mut seen: Vec<(i32, String, String)> = Vec::new();
    let mut unique = Vec::new();
    for result in results {
        let key = (
            result.vehicle.year,
            result.vehicle.make.to_lowercase(),
            result.vehicle.model.to_lowercase(),
        );
        if !seen.contains(&key) {
            seen.push(key);
            unique.push(result);
        }
    }
    unique
}

/// Apply hard context filters: budget bounds and required body type.
pub fn apply_filters(results: Vec<ScoredVehicle>, context: &SearchContext) -> Vec<ScoredVehicle> {
    results
        .into_iter()
        .filter(|result| {
            if let (Some((lo, hi)), Some(price)) = (context.budget_range, result.vehicle.price) {
                if price < lo || price > hi {
                    return false;
                }
            }
            if let Some(ref vehicle_type) = context.vehicle_type {
                let description = result
                    .vehicle
                    .description
                    .as_deref()
                    .unwrap_or_default()
                    .to_lowercase();
                if !description.contains(&vehicle_type.to_lowercase()) {
                    return false;
                }
            }
            true
        })
        .collect()
}

/// Boost similarity by +0.10 per matching preference (capped at 1.0), then
/// re-sort descending.
pub fn rerank(mut results: Vec<ScoredVehicle>, context: &SearchContext) -> Vec<ScoredVehicle> {
    if context.preferences.is_empty() {
        return results;
    }
    for result in &mut results {
        let features = result
            .vehicle
            .features
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();
        let mut boost = 0.0;
        for (key, value) in &context.preferences {
            let matched = match key.as_str() {
                "features" => features.contains(&value.to_lowercase()),
                "make" => result.vehicle.make.eq_ignore_ascii_case(value),
                "model" => result.vehicle.model.eq_ignore_ascii_case(value),
                _ => false,
            };
            if matched {
                boost += PREFERENCE_BOOST;
            }
        }
        result.similarity_score = (result.similarity_score + boost).min(1.0);
    }
    results.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
    results
}

/// Context-aware vehicle search: derived queries, dedupe, filters, rerank.
///
/// Individual derived-query failures are logged and skipped; the search only
/// fails when every query fails.
///
/// # Errors
///
/// `Provider` when no derived query could be executed.
pub async fn search_with_context(
    pool: &PgPool,
    embedder: &dyn Embedder,
    dealership_id: Uuid,
    query: &str,
    context: &SearchContext,
    top_k: usize,
) -> Result<Vec<ScoredVehicle>, GatewayError> {
    let queries = derive_queries(query, context);
    let mut all_results = Vec::new();
    let mut any_succeeded = false;

    for search_query in &queries {
        match index::search(pool, embedder, dealership_id, search_query, top_k).await {
            Ok(results) => {
                any_succeeded = true;
                all_results.extend(results);
            }
            Err(e) => {
                warn!(query = %search_query, error = %e, "derived query failed, skipping");
            }
        }
    }

    if !any_succeeded {
        return Err(GatewayError::Provider(
            "all retrieval queries failed".to_owned(),
        ));
    }

    let mut results = rerank(apply_filters(dedupe(all_results), context), context);
    results.truncate(top_k);
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VehicleStatus;

    fn scored(model: &str, year: i32, price: f64, score: f64) -> ScoredVehicle {
        ScoredVehicle {
            vehicle: Vehicle {
                id: Uuid::new_v4(),
                dealership_id: Uuid::new_v4(),
                make: "Toyota".to_owned(),
                model: model.to_owned(),
                year,
                price: Some(price),
                mileage: None,
                condition: None,
                description: Some(format!("{year} Toyota {model} sedan")),
                features: Some("leather, sunroof".to_owned()),
                stock_number: None,
                status: VehicleStatus::Active,
            },
            similarity_score: score,
        }
    }

    #[test]
    fn derives_at_most_four_queries() {
        let context = SearchContext {
            budget_range: Some((0.0, 25_000.0)),
            vehicle_type: Some("sedan".to_owned()),
            preferences: Vec::new(),
            urgency: Urgency::High,
        };
        let queries = derive_queries("camry", &context);
        assert_eq!(queries.len(), 4);
        assert_eq!(queries.first().map(String::as_str), Some("camry"));
        assert!(queries.iter().any(|q| q.contains("under $25000")));
        assert!(queries.iter().any(|q| q.starts_with("sedan ")));
    }

    #[test]
    fn base_query_only_without_context() {
        let queries = derive_queries("camry", &SearchContext::default());
        assert_eq!(queries, vec!["camry".to_owned()]);
    }

    #[test]
    fn dedupe_by_year_make_model() {
        let results = vec![
            scored("Camry", 2021, 24_500.0, 0.9),
            scored("Camry", 2021, 24_500.0, 0.8),
            scored("Camry", 2022, 26_000.0, 0.7),
        ];
        let unique = dedupe(results);
        assert_eq!(unique.len(), 2);
    }

    #[test]
    fn budget_filter_drops_out_of_range() {
        let context = SearchContext {
            budget_range: Some((20_000.0, 25_000.0)),
            ..SearchContext::default()
        };
        let results = vec![
            scored("Camry", 2021, 24_500.0, 0.9),
            scored("Highlander", 2022, 38_000.0, 0.8),
        ];
        let filtered = apply_filters(results, &context);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.first().map(|r| r.vehicle.model.as_str()), Some("Camry"));
    }

    #[test]
    fn type_filter_checks_description() {
        let context = SearchContext {
            vehicle_type: Some("truck".to_owned()),
            ..SearchContext::default()
        };
        let results = vec![scored("Camry", 2021, 24_500.0, 0.9)];
        assert!(apply_filters(results, &context).is_empty());
    }

    #[test]
    fn rerank_boosts_matching_preferences() {
        let context = SearchContext {
            preferences: vec![("features".to_owned(), "leather".to_owned())],
            ..SearchContext::default()
        };
        let results = vec![scored("Camry", 2021, 24_500.0, 0.5)];
        let reranked = rerank(results, &context);
        let score = reranked.first().map(|r| r.similarity_score).unwrap_or(0.0);
        assert!((score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn rerank_caps_at_one() {
        let context = SearchContext {
            preferences: vec![
                ("features".to_owned(), "leather".to_owned()),
                ("features".to_owned(), "sunroof".to_owned()),
            ],
            ..SearchContext::default()
        };
        let results = vec![scored("Camry", 2021, 24_500.0, 0.95)];
        let reranked = rerank(results, &context);
        let score = reranked.first().map(|r| r.similarity_score).unwrap_or(0.0);
        assert!(score <= 1.0);
    }

    #[test]
    fn context_from_slots_uses_budget_as_cap() {
        let slots = SlotMap {
            budget: Some(25_000.0),
            body_type: Some("sedan".to_owned()),
            features: vec!["leather".to_owned()],
            ..SlotMap::default()
        };
        let context = SearchContext::from_slots(&slots);
        assert_eq!(context.budget_range, Some((0.0, 25_000.0)));
        assert_eq!(context.vehicle_type.as_deref(), Some("sedan"));
        assert_eq!(context.preferences.len(), 1);
    }
}
