#![allow(missing_docs)]

//! Gateway entrypoint: construct every component once, wire them by handle,
//! and serve the webhook + control API listener. One-shot subcommands cover
//! operational chores (embedding backfill, approval expiry).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use lotline::api::{self, AppState};
use lotline::config::GatewayConfig;
use lotline::error::GatewayError;
use lotline::flow::MessageFlow;
use lotline::llm::{LlmClient, OpenAiChat};
use lotline::logging;
use lotline::memory::store::MemoryStore;
use lotline::providers::{telnyx::TelnyxProvider, vonage::VonageProvider, MessagingProvider};
use lotline::retrieval::embedder::{Embedder, OpenAiEmbedder};
use lotline::retrieval::index;
use lotline::store::{self, approvals, inventory};
use lotline::tasks::{TaskExecutor, TaskKind, TaskManager};

/// Janitor cadence for approval expiry and task GC.
const JANITOR_INTERVAL: Duration = Duration::from_secs(600);

#[derive(Debug, Parser)]
#[command(name = "lotline", about = "Conversational gateway for auto dealerships")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the webhook + control API server (default).
    Serve,
    /// Build any missing vehicle embeddings for a dealership.
    EnsureEmbeddings {
        /// Dealership to backfill.
        dealership_id: Uuid,
    },
    /// Expire pending approvals past their deadline.
    ExpireApprovals,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = GatewayConfig::load()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::EnsureEmbeddings { dealership_id } => {
            logging::init_cli();
            ensure_embeddings(config, dealership_id).await
        }
        Command::ExpireApprovals => {
            logging::init_cli();
            expire_approvals(config).await
        }
    }
}

async fn serve(config: GatewayConfig) -> Result<()> {
    let _guard = logging::init_production(Path::new(&config.server.logs_dir))?;
    info!("lotline starting");

    let pool = store::connect(&config.database.url, config.database.max_connections)
        .await
        .context("failed to connect to database")?;

    let memory = Arc::new(MemoryStore::connect(config.memory.redis_url.as_deref()).await);

    let embedder = build_embedder(&config);
    let llm = build_llm(&config);
    let providers = build_providers(&config);

    let executor = Arc::new(GatewayTaskExecutor {
        pool: pool.clone(),
        embedder: embedder.clone(),
        providers: providers.clone(),
    });
    let tasks = Arc::new(TaskManager::new(executor));

    let flow = Arc::new(MessageFlow::new(
        pool.clone(),
        Arc::clone(&memory),
        embedder,
        llm,
        providers.clone(),
        Arc::clone(&tasks),
    ));

    spawn_janitor(pool.clone(), Arc::clone(&tasks));

    let state = Arc::new(AppState {
        pool,
        flow,
        providers,
        tasks,
        jwt_secret: config.auth.jwt_secret.clone(),
        default_dealership_id: config.routing.default_dealership_id,
    });

    let router = api::router(state, &config.server.cors_origins);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "lotline listening");

    axum::serve(listener, router)
        .await
        .context("server terminated")
}

async fn ensure_embeddings(config: GatewayConfig, dealership_id: Uuid) -> Result<()> {
    let pool = store::connect(&config.database.url, config.database.max_connections)
        .await
        .context("failed to connect to database")?;
    let embedder = build_embedder(&config).context("no embedding API key configured")?;

    let built = index::ensure_embeddings(&pool, embedder.as_ref(), dealership_id)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    info!(dealership_id = %dealership_id, built, "embedding backfill complete");
    Ok(())
}

async fn expire_approvals(config: GatewayConfig) -> Result<()> {
    let pool = store::connect(&config.database.url, config.database.max_connections)
        .await
        .context("failed to connect to database")?;
    let expired = approvals::expire_stale(&pool, Utc::now())
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    info!(expired, "stale approvals expired");
    Ok(())
}

fn build_embedder(config: &GatewayConfig) -> Option<Arc<dyn Embedder>> {
    let key = config
        .llm
        .embedding_api_key
        .as_deref()
        .or(config.llm.api_key.as_deref())?;
    info!(model = %config.llm.embedding_model, "embedding provider registered");
    Some(Arc::new(OpenAiEmbedder::new(
        &config.llm.embedding_model,
        key,
        &config.llm.base_url,
    )))
}

fn build_llm(config: &GatewayConfig) -> Option<Arc<dyn LlmClient>> {
    let key = config.llm.api_key.as_deref()?;
    info!(model = %config.llm.model, "LLM provider registered");
    Some(Arc::new(OpenAiChat::new(
        &config.llm.model,
        key,
        &config.llm.base_url,
    )))
}

fn build_providers(config: &GatewayConfig) -> HashMap<String, Arc<dyn MessagingProvider>> {
    let mut providers: HashMap<String, Arc<dyn MessagingProvider>> = HashMap::new();
    let telnyx = TelnyxProvider::new(
        config.providers.telnyx.clone(),
        config.providers.telnyx.from_number.clone(),
    );
    providers.insert("telnyx".to_owned(), Arc::new(telnyx));
    let vonage = VonageProvider::new(
        config.providers.vonage.clone(),
        config.providers.vonage.from_number.clone(),
    );
    providers.insert("vonage".to_owned(), Arc::new(vonage));
    providers
}

/// Periodic chores: expire stale approvals, garbage-collect finished tasks.
fn spawn_janitor(pool: PgPool, tasks: Arc<TaskManager>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(JANITOR_INTERVAL);
        loop {
            ticker.tick().await;
            match approvals::expire_stale(&pool, Utc::now()).await {
                Ok(0) => {}
                Ok(expired) => info!(expired, "janitor expired stale approvals"),
                Err(e) => warn!(error = %e, "janitor approval expiry failed"),
            }
            tasks.gc(Utc::now()).await;
        }
    });
}

/// Executes background tasks against the live collaborators.
struct GatewayTaskExecutor {
    pool: PgPool,
    embedder: Option<Arc<dyn Embedder>>,
    providers: HashMap<String, Arc<dyn MessagingProvider>>,
}

#[async_trait]
impl TaskExecutor for GatewayTaskExecutor {
    async fn execute(&self, kind: &TaskKind) -> Result<(), GatewayError> {
        match kind {
            TaskKind::EmbeddingBuild {
                dealership_id,
                vehicle_id,
            } => {
                let Some(embedder) = self.embedder.as_deref() else {
                    warn!("embedding build requested but no embedder configured");
                    return Ok(());
                };
                // The vehicle may be gone by the time the task runs; that is
                // completion, not failure.
                let vehicle =
                    match inventory::get(&self.pool, *dealership_id, *vehicle_id).await {
                        Ok(vehicle) => vehicle,
                        Err(GatewayError::NotFound(_)) => {
                            index::delete_embedding(&self.pool, *dealership_id, *vehicle_id)
                                .await?;
                            return Ok(());
                        }
                        Err(e) => return Err(e),
                    };
                index::upsert_embedding(&self.pool, embedder, &vehicle).await
            }
            TaskKind::EmbeddingDelete {
                dealership_id,
                vehicle_id,
            } => index::delete_embedding(&self.pool, *dealership_id, *vehicle_id).await,
            TaskKind::DelayedSend {
                provider, to, text, ..
            } => {
                let client = self
                    .providers
                    .get(provider)
                    .or_else(|| self.providers.values().next())
                    .ok_or_else(|| GatewayError::Fatal("no provider wired".to_owned()))?;
                client
                    .send(to, text)
                    .await
                    .map(|receipt| {
                        info!(
                            provider_message_id = %receipt.provider_message_id,
                            "delayed send delivered"
                        );
                    })
                    .map_err(|e| GatewayError::Transient(e.to_string()))
            }
        }
    }
}
