//! Conversation memory persistence.
//!
//! Backed by Redis when a cache URL is configured, with a process-local
//! fallback map that is always written as well. Loads never fail: a Redis
//! error, an evicted key, or a corrupt payload all degrade to an empty
//! memory, which downstream treats as a fresh conversation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::ConversationMemory;

/// Memory TTL, refreshed on every save.
const MEMORY_TTL_DAYS: i64 = 7;

/// Storage adapter for conversation memory.
pub struct MemoryStore {
    client: Option<ConnectionManager>,
    fallback: Arc<RwLock<HashMap<String, FallbackEntry>>>,
}

struct FallbackEntry {
    payload: String,
    expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("redis", &self.client.is_some())
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Connect to Redis when a URL is given; otherwise run fallback-only.
    ///
    /// A failed connection is downgraded to fallback-only with a warning —
    /// the gateway must keep answering even without its cache.
    pub async fn connect(redis_url: Option<&str>) -> Self {
        let client = match redis_url {
            Some(url) => match Self::open(url).await {
                Ok(manager) => {
                    info!("connected to redis for conversation memory");
                    Some(manager)
                }
                Err(e) => {
                    warn!(error = %e, "redis unavailable, using in-process memory only");
                    None
                }
            },
            None => {
                info!("no cache URL configured, using in-process memory only");
                None
            }
        };
        Self {
            client,
            fallback: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn open(url: &str) -> Result<ConnectionManager, redis::RedisError> {
        let client = redis::Client::open(url)?;
        ConnectionManager::new(client).await
    }

    /// Fallback-only store for tests.
    pub fn in_process() -> Self {
        Self {
            client: None,
            fallback: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn key(conversation_id: &str) -> String {
        format!("conv_mem:{conversation_id}")
    }

    /// Load memory for a conversation. Never fails; absent or unreadable
    /// entries come back empty.
    pub async fn load(&self, conversation_id: &str) -> ConversationMemory {
        let key = Self::key(conversation_id);

        if let Some(manager) = &self.client {
            let mut conn = manager.clone();
            match conn.get::<_, Option<String>>(&key).await {
                Ok(Some(payload)) => {
                    if let Some(memory) = Self::decode(conversation_id, &payload) {
                        return memory;
                    }
                }
                Ok(None) => {}
                Err(e) => error!(error = %e, "redis load failed, trying fallback"),
            }
        }

        let map = self.fallback.read().await;
        if let Some(entry) = map.get(&key) {
            if entry.expires_at > Utc::now() {
                if let Some(memory) = Self::decode(conversation_id, &entry.payload) {
                    return memory;
                }
            }
        }
        ConversationMemory::new(conversation_id)
    }

    /// Persist memory, refreshing the 7-day TTL. Errors are logged and
    /// swallowed — memory persistence is never fatal to a message flow.
    pub async fn save(&self, memory: &ConversationMemory) {
        let key = Self::key(&memory.conversation_id);
        let payload = match serde_json::to_string(memory) {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "failed to serialize conversation memory");
                return;
            }
        };

        if let Some(manager) = &self.client {
            let mut conn = manager.clone();
            let ttl_secs = Duration::days(MEMORY_TTL_DAYS).num_seconds().unsigned_abs();
            if let Err(e) = conn.set_ex::<_, _, ()>(&key, &payload, ttl_secs).await {
                error!(error = %e, "redis save failed");
            } else {
                debug!(conversation_id = %memory.conversation_id, "saved memory to redis");
            }
        }

        // Always mirror into the fallback map.
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(Duration::days(MEMORY_TTL_DAYS))
            .unwrap_or(now);
        let mut map = self.fallback.write().await;
        map.insert(key, FallbackEntry { payload, expires_at });
    }

    /// Delete memory for a conversation.
    pub async fn delete(&self, conversation_id: &str) {
        let key = Self::key(conversation_id);
        if let Some(manager) = &self.client {
            let mut conn = manager.clone();
            if let Err(e) = conn.del::<_, ()>(&key).await {
                error!(error = %e, "redis delete failed");
            }
        }
        self.fallback.write().await.remove(&key);
    }

    fn decode(conversation_id: &str, payload: &str) -> Option<ConversationMemory> {
        match serde_json::from_str::<ConversationMemory>(payload) {
            Ok(mut memory) => {
                memory.conversation_id = conversation_id.to_owned();
                Some(memory)
            }
            Err(e) => {
                warn!(error = %e, "corrupt memory payload, starting fresh");
                None
            }
        }
    }
}
