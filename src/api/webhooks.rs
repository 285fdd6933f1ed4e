//! Inbound webhook endpoints for the messaging providers.
//!
//! Signature failure short-circuits with 403. Unparseable or non-text
//! events are acknowledged with 2xx and dropped — providers retry 5xx, and
//! a malformed event will never parse better the second time. Routing
//! misses (no dealership for the number) are likewise acknowledged and
//! dropped, loudly.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use tracing::{error, info, warn};

use crate::resolver;

use super::AppState;

/// POST /webhooks/:provider
pub async fn inbound(
    State(state): State<Arc<AppState>>,
    Path(provider_name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    let Some(provider) = state.providers.get(&provider_name) else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "status": "unknown provider" })),
        );
    };

    if !provider.verify(&headers, &body) {
        warn!(provider = %provider_name, "webhook signature verification failed");
        return (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({ "status": "invalid signature" })),
        );
    }

    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json");
    let payload = String::from_utf8_lossy(&body);

    let Some(normalized) = provider.parse(&payload, content_type) else {
        info!(provider = %provider_name, "non-text or unparseable event acknowledged");
        return (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ignored" })),
        );
    };

    let dealership_id = match resolver::resolve_dealership(
        &state.pool,
        &normalized.from_phone,
        &normalized.to_phone,
        state.default_dealership_id,
    )
    .await
    {
        Ok(id) => id,
        Err(e) => {
            warn!(
                from = %normalized.from_phone,
                to = %normalized.to_phone,
                error = %e,
                "no dealership for inbound message, dropping"
            );
            return (
                StatusCode::OK,
                Json(serde_json::json!({ "status": "dropped" })),
            );
        }
    };

    match state.flow.process_inbound(dealership_id, normalized).await {
        Ok(outcome) => {
            info!(provider = %provider_name, ?outcome, "inbound processed");
            (
                StatusCode::OK,
                Json(serde_json::json!({ "status": "processed" })),
            )
        }
        Err(e) => {
            error!(provider = %provider_name, error = %e, "inbound processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "status": "error" })),
            )
        }
    }
}
