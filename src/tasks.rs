//! Background task manager: queued retries for embedding builds and
//! delayed sends.
//!
//! Tasks move queued → running → {completed, retrying, failed}; up to three
//! attempts with a fixed delay between them, last error recorded on the
//! task. Completed and failed tasks older than 24 hours are garbage
//! collected. A small semaphore bounds concurrent embedding builds to
//! protect the embedding provider.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Semaphore};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::GatewayError;

/// Maximum execution attempts per task.
const MAX_ATTEMPTS: u32 = 3;

/// Fixed delay between attempts.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Age past which finished tasks are garbage collected.
const GC_MAX_AGE_HOURS: i64 = 24;

/// Concurrent embedding builds allowed.
const EMBEDDING_POOL_SIZE: usize = 4;

/// Work item kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskKind {
    /// Build or rebuild one vehicle's embedding.
    EmbeddingBuild {
        dealership_id: Uuid,
        vehicle_id: Uuid,
    },
    /// Remove one vehicle's embedding.
    EmbeddingDelete {
        dealership_id: Uuid,
        vehicle_id: Uuid,
    },
    /// Send a text at a fixed future time.
    DelayedSend {
        provider: String,
        to: String,
        text: String,
        fire_at: DateTime<Utc>,
    },
}

impl TaskKind {
    /// Kind name for logs and status reporting.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmbeddingBuild { .. } => "embedding_build",
            Self::EmbeddingDelete { .. } => "embedding_delete",
            Self::DelayedSend { .. } => "delayed_send",
        }
    }

    fn needs_embedding_permit(&self) -> bool {
        matches!(self, Self::EmbeddingBuild { .. } | Self::EmbeddingDelete { .. })
    }
}

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Retrying,
    Completed,
    Failed,
}

impl TaskState {
    /// Canonical string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Registry entry for one task.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: Uuid,
    pub kind: &'static str,
    pub state: TaskState,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Executes one task attempt. The production executor closes over the pool,
/// embedder, and provider handles; tests inject failures.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Run one attempt of `kind`.
    ///
    /// # Errors
    ///
    /// Any error marks the attempt failed; `Transient` and other kinds alike
    /// are retried up to the attempt limit.
    async fn execute(&self, kind: &TaskKind) -> Result<(), GatewayError>;
}

/// Process-wide task registry with retry.
pub struct TaskManager {
    registry: Arc<Mutex<HashMap<Uuid, TaskRecord>>>,
    executor: Arc<dyn TaskExecutor>,
    embedding_permits: Arc<Semaphore>,
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager").finish_non_exhaustive()
    }
}

impl TaskManager {
    /// Create a manager around the given executor.
    pub fn new(executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
            executor,
            embedding_permits: Arc::new(Semaphore::new(EMBEDDING_POOL_SIZE)),
        }
    }

    /// Enqueue a task and return its id. The task runs on a spawned tokio
    /// task; delayed sends first sleep until their fire time.
    pub async fn enqueue(&self, kind: TaskKind) -> Uuid {
        let id = Uuid::new_v4();
        let record = TaskRecord {
            id,
            kind: kind.as_str(),
            state: TaskState::Queued,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            finished_at: None,
        };
        self.registry.lock().await.insert(id, record);
        info!(task_id = %id, kind = kind.as_str(), "task enqueued");

        let registry = Arc::clone(&self.registry);
        let executor = Arc::clone(&self.executor);
        let permits = Arc::clone(&self.embedding_permits);
        tokio::spawn(async move {
            run_task(id, kind, registry, executor, permits).await;
        });
        id
    }

    /// Snapshot a task's record.
    pub async fn status(&self, id: Uuid) -> Option<TaskRecord> {
        self.registry.lock().await.get(&id).cloned()
    }

    /// Drop completed/failed tasks finished more than 24 h before `now`.
    /// Returns the number removed.
    pub async fn gc(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now
            .checked_sub_signed(chrono::Duration::hours(GC_MAX_AGE_HOURS))
            .unwrap_or(now);
        let mut registry = self.registry.lock().await;
        let before = registry.len();
        registry.retain(|_, record| {
            !matches!(record.state, TaskState::Completed | TaskState::Failed)
                || record.finished_at.is_none_or(|t| t > cutoff)
        });
        let removed = before.saturating_sub(registry.len());
        if removed > 0 {
            info!(removed, "garbage collected finished tasks");
        }
        removed
    }

    /// Number of tasks currently tracked.
    pub async fn len(&self) -> usize {
        self.registry.lock().await.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.registry.lock().await.is_empty()
    }
}

async fn run_task(
    id: Uuid,
    kind: TaskKind,
    registry: Arc<Mutex<HashMap<Uuid, TaskRecord>>>,
    executor: Arc<dyn TaskExecutor>,
    permits: Arc<Semaphore>,
) {
    // Delayed sends hold off until their fire time.
    if let TaskKind::DelayedSend { fire_at, .. } = &kind {
        let now = Utc::now();
        if *fire_at > now {
            let wait = fire_at
                .signed_duration_since(now)
                .to_std()
                .unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;
        }
    }

    // Bound concurrent embedding work.
    let _permit = if kind.needs_embedding_permit() {
        match permits.acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(_) => return,
        }
    } else {
        None
    };

    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        set_state(&registry, id, TaskState::Running, attempt, None).await;

        match executor.execute(&kind).await {
            Ok(()) => {
                finish(&registry, id, TaskState::Completed).await;
                info!(task_id = %id, kind = kind.as_str(), attempt, "task completed");
                return;
            }
            Err(e) => {
                let message = e.to_string();
                if attempt < MAX_ATTEMPTS {
                    warn!(
                        task_id = %id,
                        kind = kind.as_str(),
                        attempt,
                        error = %message,
                        "task attempt failed, retrying"
                    );
                    set_state(&registry, id, TaskState::Retrying, attempt, Some(message)).await;
                    tokio::time::sleep(RETRY_DELAY).await;
                } else {
                    error!(
                        task_id = %id,
                        kind = kind.as_str(),
                        attempt,
                        error = %message,
                        "task failed after final attempt"
                    );
                    set_last_error(&registry, id, message).await;
                    finish(&registry, id, TaskState::Failed).await;
                    return;
                }
            }
        }
    }
}

async fn set_state(
    registry: &Mutex<HashMap<Uuid, TaskRecord>>,
    id: Uuid,
    state: TaskState,
    attempts: u32,
    last_error: Option<String>,
) {
    if let Some(record) = registry.lock().await.get_mut(&id) {
        record.state = state;
        record.attempts = attempts;
        if last_error.is_some() {
            record.last_error = last_error;
        }
    }
}

async fn set_last_error(registry: &Mutex<HashMap<Uuid, TaskRecord>>, id: Uuid, message: String) {
    if let Some(record) = registry.lock().await.get_mut(&id) {
        record.last_error = Some(message);
    }
}

async fn finish(registry: &Mutex<HashMap<Uuid, TaskRecord>>, id: Uuid, state: TaskState) {
    if let Some(record) = registry.lock().await.get_mut(&id) {
        record.state = state;
        record.finished_at = Some(Utc::now());
    }
}
