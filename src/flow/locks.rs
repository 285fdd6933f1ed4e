//! Sharded per-lead locks.
//!
//! For a given lead, at most one orchestrator pass may mutate memory and
//! conversation turns at a time. Locks live in a sharded map keyed by lead
//! id so unrelated leads never contend on the same mutex.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Number of shards. Power of two so the shard index is a cheap mask.
const SHARD_COUNT: usize = 16;

/// Mask selecting a shard from a lead id byte.
const SHARD_MASK: usize = SHARD_COUNT - 1;

/// Sharded lock table keyed by lead id.
#[derive(Debug)]
pub struct LeadLocks {
    shards: Vec<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl LeadLocks {
    /// Create an empty lock table.
    pub fn new() -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        Self { shards }
    }

    fn shard_for(&self, lead_id: Uuid) -> Option<&Mutex<HashMap<Uuid, Arc<Mutex<()>>>>> {
        let last_byte = lead_id.as_bytes().last().copied().unwrap_or(0);
        let index = usize::from(last_byte) & SHARD_MASK;
        self.shards.get(index)
    }

    /// Acquire the lock for a lead, creating it on first use.
    pub async fn acquire(&self, lead_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = match self.shard_for(lead_id) {
            Some(shard) => {
                let mut map = shard.lock().await;
                Arc::clone(map.entry(lead_id).or_insert_with(|| Arc::new(Mutex::new(()))))
            }
            // Shards are fixed at construction; a miss can only mean an
            // empty table, so fall back to an uncontended lock.
            None => Arc::new(Mutex::new(())),
        };
        lock.lock_owned().await
    }
}

impl Default for LeadLocks {
    fn default() -> Self {
        Self::new()
    }
}
