//! HTTP surface: provider webhooks plus the authenticated control API.
//!
//! Routes are thin — authentication, dealership scoping, and JSON shaping
//! live here; behavior lives in the services. Every dealership-scoped
//! resource is checked against the caller's own dealership, which comes
//! from their profile, never from the request.

pub mod auth;
pub mod integrations;
pub mod inventory;
pub mod invites;
pub mod leads;
pub mod settings;
pub mod webhooks;

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::flow::MessageFlow;
use crate::providers::MessagingProvider;
use crate::tasks::TaskManager;

/// Shared state for all routes.
pub struct AppState {
    pub pool: PgPool,
    pub flow: Arc<MessageFlow>,
    pub providers: HashMap<String, Arc<dyn MessagingProvider>>,
    pub tasks: Arc<TaskManager>,
    pub jwt_secret: Option<String>,
    pub default_dealership_id: Option<Uuid>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Build the full router.
pub fn router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let cors = build_cors(cors_origins);

    Router::new()
        .route("/health", get(health))
        .route("/webhooks/:provider", post(webhooks::inbound))
        .route("/api/leads", post(leads::create).get(leads::list))
        .route("/api/leads/:id", get(leads::fetch))
        .route("/api/leads/:id/status", put(leads::update_status))
        .route("/api/leads/:id/conversations", get(leads::conversations))
        .route(
            "/api/inventory",
            post(inventory::create).get(inventory::list),
        )
        .route(
            "/api/inventory/:id",
            get(inventory::fetch)
                .put(inventory::update)
                .delete(inventory::remove),
        )
        .route("/api/invites", post(invites::create))
        .route("/api/invites/verify/:token", get(invites::verify))
        .route("/api/invites/complete", post(invites::complete))
        .route("/api/invites/:id", delete(invites::cancel))
        .route("/api/settings/definitions", get(settings::definitions))
        .route(
            "/api/settings/user/:key",
            get(settings::get_user)
                .put(settings::set_user)
                .delete(settings::delete_user),
        )
        .route(
            "/api/settings/dealership/:key",
            get(settings::get_dealership).put(settings::set_dealership),
        )
        .route("/api/integrations", get(integrations::fetch))
        .route("/api/integrations/:provider", put(integrations::set_phones))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ])
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
