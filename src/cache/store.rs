//! Cache storage.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::cache::entry::{CachedMetadata, CachedResponse};
use crate::clock::Clock;
use crate::store::StoreError;

/// Storage for cached responses and per-resource metadata.
#[async_trait]
pub trait CacheStore: Send + Sync + fmt::Debug {
    async fn get(&self, key: &str) -> Result<Option<CachedResponse>, StoreError>;

    /// Store a response. Fails with [`StoreError::Rejected`] when the entry
    /// alone exceeds the store's size bound.
    async fn put(&self, key: &str, response: CachedResponse) -> Result<(), StoreError>;

    async fn get_metadata(&self, key: &str) -> Result<Option<CachedMetadata>, StoreError>;

    async fn put_metadata(&self, key: &str, metadata: CachedMetadata) -> Result<(), StoreError>;
}

#[derive(Debug)]
struct StoredResponse {
    response: CachedResponse,
    weight: u64,
    sequence: u64,
}

/// Single-process store bounded by TTL and total weight.
///
/// When a write pushes the total weight over the bound, the oldest entries
/// are evicted until it fits again. Every [`SWEEP_EVERY`] writes, expired
/// responses and metadata are dropped, so keys that are never read again do
/// not accumulate.
#[derive(Debug)]
pub struct InMemoryCacheStore {
    responses: DashMap<String, StoredResponse>,
    metadata: DashMap<String, (CachedMetadata, Duration)>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    max_bytes: u64,
    weight: AtomicU64,
    sequence: AtomicU64,
    writes: AtomicU64,
}

pub const SWEEP_EVERY: u64 = 1024;

impl InMemoryCacheStore {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration, max_bytes: u64) -> Self {
        Self {
            responses: DashMap::new(),
            metadata: DashMap::new(),
            clock,
            ttl,
            max_bytes,
            weight: AtomicU64::new(0),
            sequence: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// Number of metadata entries, expired ones included until swept.
    pub fn metadata_len(&self) -> usize {
        self.metadata.len()
    }

    /// Total weight of stored responses in bytes.
    pub fn weight(&self) -> u64 {
        self.weight.load(Ordering::SeqCst)
    }

    fn remove(&self, key: &str) {
        if let Some((_, stored)) = self.responses.remove(key) {
            self.weight.fetch_sub(stored.weight, Ordering::SeqCst);
        }
    }

    fn record_write(&self) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % SWEEP_EVERY == 0 {
            self.sweep();
        }
    }

    fn sweep(&self) {
        let now = self.clock.now();
        self.metadata.retain(|_, (_, expires_at)| *expires_at > now);

        let expired: Vec<String> = self
            .responses
            .iter()
            .filter(|entry| now >= entry.value().response.stored_at + self.ttl)
            .map(|entry| entry.key().clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        tracing::debug!(
            responses = self.responses.len(),
            metadata = self.metadata.len(),
            "Swept expired cache entries"
        );
    }

    fn evict_oldest(&self) -> bool {
        let oldest = self
            .responses
            .iter()
            .min_by_key(|entry| entry.value().sequence)
            .map(|entry| entry.key().clone());

        match oldest {
            Some(key) => {
                tracing::debug!(key = %key, "Evicting cached response");
                self.remove(&key);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CachedResponse>, StoreError> {
        let now = self.clock.now();
        let expired = match self.responses.get(key) {
            Some(stored) if now < stored.response.stored_at + self.ttl => {
                return Ok(Some(stored.response.clone()))
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.remove(key);
        }
        Ok(None)
    }

    async fn put(&self, key: &str, response: CachedResponse) -> Result<(), StoreError> {
        self.record_write();
        let weight = response.weight();
        if weight > self.max_bytes {
            return Err(StoreError::Rejected(format!(
                "entry of {} bytes exceeds cache size {}",
                weight, self.max_bytes
            )));
        }

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let previous = self.responses.insert(
            key.to_string(),
            StoredResponse {
                response,
                weight,
                sequence,
            },
        );
        self.weight.fetch_add(weight, Ordering::SeqCst);
        if let Some(previous) = previous {
            self.weight.fetch_sub(previous.weight, Ordering::SeqCst);
        }

        while self.weight() > self.max_bytes {
            if !self.evict_oldest() {
                break;
            }
        }
        Ok(())
    }

    async fn get_metadata(&self, key: &str) -> Result<Option<CachedMetadata>, StoreError> {
        let now = self.clock.now();
        let live = self
            .metadata
            .get(key)
            .map(|entry| (entry.1 > now).then(|| entry.0.clone()));
        match live {
            Some(Some(metadata)) => Ok(Some(metadata)),
            Some(None) => {
                self.metadata.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put_metadata(&self, key: &str, metadata: CachedMetadata) -> Result<(), StoreError> {
        self.record_write();
        let expires_at = self.clock.now() + self.ttl;
        self.metadata.insert(key.to_string(), (metadata, expires_at));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use axum::http::{HeaderMap, StatusCode};
    use bytes::Bytes;

    fn entry(clock: &ManualClock, body: &'static str) -> CachedResponse {
        CachedResponse::new(StatusCode::OK, HeaderMap::new(), Bytes::from_static(body.as_bytes()), clock.now())
    }

    fn store(clock: &ManualClock, max_bytes: u64) -> InMemoryCacheStore {
        InMemoryCacheStore::new(Arc::new(clock.clone()), Duration::from_secs(10), max_bytes)
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let clock = ManualClock::default();
        let store = store(&clock, 1024);
        store.put("k", entry(&clock, "body")).await.unwrap();

        clock.advance(Duration::from_secs(9));
        assert!(store.get("k").await.unwrap().is_some());

        clock.advance(Duration::from_secs(1));
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.is_empty());
        assert_eq!(store.weight(), 0);
    }

    #[tokio::test]
    async fn test_oversize_entry_rejected() {
        let clock = ManualClock::default();
        let store = store(&clock, 3);
        let result = store.put("k", entry(&clock, "too big")).await;
        assert!(matches!(result, Err(StoreError::Rejected(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_oldest_evicted_when_full() {
        let clock = ManualClock::default();
        let store = store(&clock, 10);
        store.put("a", entry(&clock, "aaaa")).await.unwrap();
        store.put("b", entry(&clock, "bbbb")).await.unwrap();
        store.put("c", entry(&clock, "cccc")).await.unwrap();

        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.get("b").await.unwrap().is_some());
        assert!(store.get("c").await.unwrap().is_some());
        assert_eq!(store.weight(), 8);
    }

    #[tokio::test]
    async fn test_overwrite_adjusts_weight() {
        let clock = ManualClock::default();
        let store = store(&clock, 100);
        store.put("a", entry(&clock, "aaaa")).await.unwrap();
        store.put("a", entry(&clock, "aa")).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.weight(), 2);
    }

    #[tokio::test]
    async fn test_metadata_expires_with_ttl() {
        let clock = ManualClock::default();
        let store = store(&clock, 100);
        let metadata = CachedMetadata::new(vec!["accept".into()]);
        store.put_metadata("m", metadata.clone()).await.unwrap();
        assert_eq!(store.get_metadata("m").await.unwrap(), Some(metadata));

        clock.advance(Duration::from_secs(10));
        assert_eq!(store.get_metadata("m").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unread_expired_entries_are_swept() {
        let clock = ManualClock::default();
        let store = store(&clock, 64);
        for i in 0..100 {
            store
                .put_metadata(&format!("stale-{}", i), CachedMetadata::new(Vec::new()))
                .await
                .unwrap();
            store.put(&format!("stale-{}", i), entry(&clock, "x")).await.unwrap();
        }
        assert_eq!(store.metadata_len(), 100);

        clock.advance(Duration::from_secs(3600));
        for i in 0..SWEEP_EVERY {
            store
                .put_metadata(&format!("fresh-{}", i), CachedMetadata::new(Vec::new()))
                .await
                .unwrap();
        }

        assert_eq!(store.metadata_len(), SWEEP_EVERY as usize);
        assert!(store.is_empty());
        assert_eq!(store.weight(), 0);
    }
}
