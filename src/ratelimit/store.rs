//! Bucket storage.
//!
//! The store is the only place bucket state is mutated, and it does so
//! through one atomic operation: [`RateLimitStore::acquire`] reads, refills,
//! debits and writes back without any other caller interleaving.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::ratelimit::bucket::{step, BucketOutcome, BucketRequest, BucketState};
use crate::store::StoreError;

/// Keys under which a bucket's token count and refill timestamp live.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKeys {
    pub tokens: String,
    pub timestamp: String,
}

impl BucketKeys {
    /// Keys for one limited identity. The braces form a hash tag so that a
    /// clustered store keeps both keys on the same shard.
    pub fn for_id(id: &str) -> Self {
        let prefix = format!("request_rate_limiter.{{{}}}", id);
        Self {
            tokens: format!("{}.tokens", prefix),
            timestamp: format!("{}.timestamp", prefix),
        }
    }
}

/// Atomic token bucket execution against shared state.
#[async_trait]
pub trait RateLimitStore: Send + Sync + fmt::Debug {
    async fn acquire(&self, keys: &BucketKeys, request: &BucketRequest) -> Result<BucketOutcome, StoreError>;
}

#[derive(Debug, Clone, Copy)]
struct StoredBucket {
    state: BucketState,
    expires_at: Duration,
}

/// Single-process store.
///
/// The bucket is updated while holding its dashmap shard lock and with no
/// `.await` in between, so concurrent checks on one key are serialized and a
/// cancelled request can never leave a half-written bucket.
#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    buckets: DashMap<String, StoredBucket>,
    operations: AtomicU64,
}

const SWEEP_EVERY: u64 = 1024;

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    fn sweep(&self, now: Duration) {
        self.buckets.retain(|_, bucket| bucket.expires_at > now);
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn acquire(&self, keys: &BucketKeys, request: &BucketRequest) -> Result<BucketOutcome, StoreError> {
        let now = request.now;
        let expires_at = now + request.ttl();

        let outcome = match self.buckets.entry(keys.tokens.clone()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                let live = (current.expires_at > now).then_some(current.state);
                let (state, outcome) = step(live, request);
                occupied.insert(StoredBucket { state, expires_at });
                outcome
            }
            Entry::Vacant(vacant) => {
                let (state, outcome) = step(None, request);
                vacant.insert(StoredBucket { state, expires_at });
                outcome
            }
        };

        if self.operations.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep(now);
        }
        Ok(outcome)
    }
}
