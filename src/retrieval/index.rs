//! Per-dealership vehicle embedding index.
//!
//! Vectors live in `vehicle_embeddings`, one row per vehicle, alongside the
//! exact input text they were built from. A vehicle's embedding is rebuilt
//! whenever its embedding-input text changes; `ensure_embeddings` makes the
//! whole dealership consistent and is safe to run repeatedly.

use serde_json::Value;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::GatewayError;
use crate::types::Vehicle;

use super::embedder::Embedder;
use super::ScoredVehicle;

/// Cosine similarity between two vectors. Zero-magnitude vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn decode_vector(value: &Value) -> Option<Vec<f32>> {
    serde_json::from_value(value.clone()).ok()
}

/// Joined embedding + vehicle row.
#[derive(sqlx::FromRow)]
struct EmbeddingRow {
    embedding: Value,
    #[sqlx(flatten)]
    vehicle: Vehicle,
}

/// Search a dealership's active vehicles by cosine similarity to `query`.
///
/// # Errors
///
/// Embedding failures surface as `Provider`; database failures propagate.
pub async fn search(
    pool: &PgPool,
    embedder: &dyn Embedder,
    dealership_id: Uuid,
    query: &str,
    top_k: usize,
) -> Result<Vec<ScoredVehicle>, GatewayError> {
    let query_vector = embedder
        .embed(query)
        .await
        .map_err(|e| GatewayError::Provider(format!("query embedding failed: {e}")))?;

    let rows: Vec<EmbeddingRow> = sqlx::query_as(
        "SELECT ve.embedding, \
                i.id, i.dealership_id, i.make, i.model, i.year, i.price, i.mileage, \
                i.condition, i.description, i.features, i.stock_number, i.status \
         FROM vehicle_embeddings ve \
         JOIN inventory i ON i.id = ve.vehicle_id \
         WHERE ve.dealership_id = $1 AND i.status = 'active'",
    )
    .bind(dealership_id)
    .fetch_all(pool)
    .await?;

    let mut scored: Vec<ScoredVehicle> = rows
        .into_iter()
        .filter_map(|row| {
            let vector = decode_vector(&row.embedding)?;
            Some(ScoredVehicle {
                similarity_score: cosine_similarity(&query_vector, &vector),
                vehicle: row.vehicle,
            })
        })
        .collect();

    scored.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
    scored.truncate(top_k);
    Ok(scored)
}

/// Build (or rebuild) the embedding for one vehicle.
///
/// # Errors
///
/// Embedding failures surface as `Transient` so the task manager retries;
/// database failures propagate.
pub async fn upsert_embedding(
    pool: &PgPool,
    embedder: &dyn Embedder,
    vehicle: &Vehicle,
) -> Result<(), GatewayError> {
    let input = vehicle.embedding_input();
    let vector = embedder
        .embed(&input)
        .await
        .map_err(|e| GatewayError::Transient(format!("embedding build failed: {e}")))?;
    let encoded = serde_json::to_value(&vector)
        .map_err(|e| GatewayError::Fatal(format!("vector encode failed: {e}")))?;

    sqlx::query(
        "INSERT INTO vehicle_embeddings \
         (dealership_id, vehicle_id, embedding, input_text, updated_at) \
         VALUES ($1, $2, $3, $4, now()) \
         ON CONFLICT (dealership_id, vehicle_id) \
         DO UPDATE SET embedding = $3, input_text = $4, updated_at = now()",
    )
    .bind(vehicle.dealership_id)
    .bind(vehicle.id)
    .bind(encoded)
    .bind(&input)
    .execute(pool)
    .await?;

    debug!(vehicle_id = %vehicle.id, "vehicle embedding upserted");
    Ok(())
}

/// Remove the embedding for a deleted vehicle. No embedding may outlive its
/// vehicle.
///
/// # Errors
///
/// Database failures propagate.
pub async fn delete_embedding(
    pool: &PgPool,
    dealership_id: Uuid,
    vehicle_id: Uuid,
) -> Result<(), GatewayError> {
    sqlx::query(
        "DELETE FROM vehicle_embeddings WHERE dealership_id = $1 AND vehicle_id = $2",
    )
    .bind(dealership_id)
    .bind(vehicle_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Build embeddings for every active vehicle that lacks one or whose input
/// text has drifted. Idempotent; safe to run on startup.
///
/// Returns the number of embeddings built.
///
/// # Errors
///
/// The first embedding or database failure aborts the sweep.
pub async fn ensure_embeddings(
    pool: &PgPool,
    embedder: &dyn Embedder,
    dealership_id: Uuid,
) -> Result<usize, GatewayError> {
    let vehicles: Vec<Vehicle> = sqlx::query_as(
        "SELECT id, dealership_id, make, model, year, price, mileage, \
                condition, description, features, stock_number, status \
         FROM inventory WHERE dealership_id = $1 AND status = 'active'",
    )
    .bind(dealership_id)
    .fetch_all(pool)
    .await?;

    let mut built = 0usize;
    for vehicle in &vehicles {
        let stored: Option<(String,)> = sqlx::query_as(
            "SELECT input_text FROM vehicle_embeddings \
             WHERE dealership_id = $1 AND vehicle_id = $2",
        )
        .bind(dealership_id)
        .bind(vehicle.id)
        .fetch_optional(pool)
        .await?;

        let current_input = vehicle.embedding_input();
        let up_to_date = stored.as_ref().is_some_and(|(text,)| *text == current_input);
        if up_to_date {
            continue;
        }
        upsert_embedding(pool, embedder, vehicle).await?;
        built = built.saturating_add(1);
    }

    info!(
        dealership_id = %dealership_id,
        total = vehicles.len(),
        built,
        "ensured vehicle embeddings"
    );
    Ok(built)
}
