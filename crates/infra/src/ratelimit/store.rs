//! Shared bucket state. Each `take` is one atomic read-modify-write.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::bucket::{take, BucketParams, BucketState, TakeOutcome};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimiterStoreError {
    #[error("bucket store unavailable: {0}")]
    Unavailable(String),

    #[error("bucket store returned malformed state: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Refill and try to take one token from the bucket at `key`.
    ///
    /// Must be atomic with respect to concurrent callers on the same key.
    async fn take(
        &self,
        key: &str,
        params: &BucketParams,
        now_ms: i64,
    ) -> Result<TakeOutcome, LimiterStoreError>;
}

/// Idle buckets are dropped after this long.
pub const BUCKET_TTL: Duration = Duration::from_secs(3600);

/// Minimum spacing between eviction sweeps of the in-memory store.
const SWEEP_INTERVAL_MS: i64 = 60_000;

#[derive(Debug, Clone, Copy)]
struct Entry {
    state: BucketState,
    params: BucketParams,
}

impl Entry {
    /// A bucket that has refilled to capacity is indistinguishable from a
    /// missing one, so it can go.
    fn is_idle(&self, now_ms: i64, ttl_ms: i64) -> bool {
        let elapsed = now_ms - self.state.last_refill_ms;
        elapsed >= ttl_ms
            || self.params.refill(self.state.tokens, elapsed) >= f64::from(self.params.capacity)
    }
}

#[derive(Debug, Default)]
struct Buckets {
    entries: HashMap<String, Entry>,
    last_sweep_ms: i64,
}

/// Process-local buckets. The map lock is held only for one take; idle
/// buckets are swept at most once a minute.
#[derive(Debug)]
pub struct InMemoryBucketStore {
    buckets: Mutex<Buckets>,
    ttl: Duration,
}

impl Default for InMemoryBucketStore {
    fn default() -> Self {
        Self {
            buckets: Mutex::new(Buckets::default()),
            ttl: BUCKET_TTL,
        }
    }
}

impl InMemoryBucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn len(&self) -> usize {
        self.buckets.lock().map(|b| b.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BucketStore for InMemoryBucketStore {
    async fn take(
        &self,
        key: &str,
        params: &BucketParams,
        now_ms: i64,
    ) -> Result<TakeOutcome, LimiterStoreError> {
        let mut buckets = self
            .buckets
            .lock()
            .map_err(|_| LimiterStoreError::Unavailable("bucket lock poisoned".to_string()))?;

        if now_ms - buckets.last_sweep_ms >= SWEEP_INTERVAL_MS {
            let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
            buckets.entries.retain(|_, entry| !entry.is_idle(now_ms, ttl_ms));
            buckets.last_sweep_ms = now_ms;
        }

        let current = buckets.entries.get(key).map(|entry| entry.state);
        let (state, outcome) = take(current, params, now_ms);
        buckets.entries.insert(
            key.to_string(),
            Entry {
                state,
                params: *params,
            },
        );
        Ok(outcome)
    }
}
