//! In-memory call-attempt cache.
//!
//! One entry per ringing/active call, keyed by the receiver's user id so a
//! receiver that reloads mid-ring can re-request the caller snapshot without
//! the caller re-initiating. Entries are removed when the call reaches a
//! terminal transition (declined, ended) and additionally expired by TTL so
//! abandoned rings cannot accumulate forever.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Caller identity snapshot taken at initiation time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerSnapshot {
    pub id: String,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// Ephemeral state of one call attempt. Distinct from the persisted
/// call-history message.
#[derive(Debug, Clone)]
pub struct CallAttempt {
    pub caller: CallerSnapshot,
    pub call_type: String,
    pub room_id: String,
    started: Instant,
}

impl CallAttempt {
    pub fn new(caller: CallerSnapshot, call_type: String, room_id: String) -> Self {
        Self {
            caller,
            call_type,
            room_id,
            started: Instant::now(),
        }
    }
}

/// Expiry backstop for attempts that never reach a terminal transition.
const ATTEMPT_TTL: Duration = Duration::from_secs(6 * 3600);

/// Sweep cadence for the background eviction task.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Registry of live call attempts keyed by receiver user id.
#[derive(Clone)]
pub struct CallRegistry {
    attempts: Arc<DashMap<String, CallAttempt>>,
    ttl: Duration,
}

impl Default for CallRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::with_ttl(ATTEMPT_TTL)
    }

    fn with_ttl(ttl: Duration) -> Self {
        Self {
            attempts: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Record a new attempt for a receiver. A later call to the same
    /// receiver overwrites the stale entry, so the cache can never serve a
    /// previous caller's snapshot for a fresh ring.
    pub fn insert(&self, receiver_id: &str, attempt: CallAttempt) {
        self.attempts.insert(receiver_id.to_string(), attempt);
    }

    /// Look up the attempt for a receiver. Expired entries are dropped on
    /// read rather than served stale.
    pub fn get(&self, receiver_id: &str) -> Option<CallAttempt> {
        let expired = match self.attempts.get(receiver_id) {
            Some(entry) => entry.value().started.elapsed() > self.ttl,
            None => return None,
        };
        if expired {
            self.attempts.remove(receiver_id);
            return None;
        }
        self.attempts.get(receiver_id).map(|e| e.value().clone())
    }

    /// Remove and return the attempt for a receiver (terminal transition).
    pub fn remove(&self, receiver_id: &str) -> Option<CallAttempt> {
        self.attempts.remove(receiver_id).map(|(_, attempt)| attempt)
    }

    /// Evict expired attempts; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let before = self.attempts.len();
        let ttl = self.ttl;
        self.attempts.retain(|_, attempt| attempt.started.elapsed() <= ttl);
        before - self.attempts.len()
    }

    /// Spawn the background eviction task.
    pub fn spawn_sweeper(&self) {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(SWEEP_INTERVAL);
            timer.tick().await;
            loop {
                timer.tick().await;
                let evicted = registry.sweep();
                if evicted > 0 {
                    tracing::info!("Evicted {} expired call attempts", evicted);
                }
            }
        });
    }
}
