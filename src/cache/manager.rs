//! Lookup, storage and serving of cached responses.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, Response, StatusCode};
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, StreamExt};

use crate::cache::directives::{self, is_response_cacheable, is_vary_wildcard, rewrite_max_age};
use crate::cache::entry::{decode_body, CachedMetadata, CachedResponse};
use crate::cache::key::{self, RequestSnapshot};
use crate::cache::store::CacheStore;
use crate::clock::Clock;
use crate::store::StoreError;

/// Outcome of a cache lookup.
#[derive(Debug)]
pub enum CacheLookup {
    /// The request (or the resource) may not be served from or stored in the cache.
    Uncacheable,
    Hit(CachedResponse),
    Miss,
}

impl CacheLookup {
    /// Label used for metrics and logs.
    pub fn outcome(&self) -> &'static str {
        match self {
            CacheLookup::Uncacheable => "bypass",
            CacheLookup::Hit(_) => "hit",
            CacheLookup::Miss => "miss",
        }
    }
}

#[derive(Debug)]
pub struct ResponseCacheManager {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    max_bytes: u64,
}

impl ResponseCacheManager {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>, ttl: Duration, max_bytes: u64) -> Self {
        Self {
            store,
            clock,
            ttl,
            max_bytes,
        }
    }

    pub async fn lookup(&self, snapshot: &RequestSnapshot) -> CacheLookup {
        if !directives::is_request_cacheable(&snapshot.method, &snapshot.headers) {
            return CacheLookup::Uncacheable;
        }

        let metadata = match self.store.get_metadata(&key::metadata_key(snapshot)).await {
            Ok(metadata) => metadata.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "Cache metadata lookup failed, treating as miss");
                return CacheLookup::Miss;
            }
        };
        if metadata.is_wildcard() {
            return CacheLookup::Uncacheable;
        }

        match self.store.get(&key::generate(snapshot, &metadata.vary)).await {
            Ok(Some(cached)) => CacheLookup::Hit(cached),
            Ok(None) => CacheLookup::Miss,
            Err(e) => {
                tracing::warn!(error = %e, "Cache lookup failed, treating as miss");
                CacheLookup::Miss
            }
        }
    }

    /// Seconds of freshness left for an entry.
    pub fn remaining_secs(&self, cached: &CachedResponse) -> u64 {
        let age = self.clock.now().saturating_sub(cached.stored_at);
        self.ttl.saturating_sub(age).as_secs()
    }

    /// Build the response for a hit. A `no-cache` request gets `304` with
    /// no body.
    pub fn serve(&self, cached: &CachedResponse, revalidate: bool) -> Response<Body> {
        let mut headers = cached.headers.clone();
        rewrite_max_age(&mut headers, self.remaining_secs(cached));

        let mut response = if revalidate {
            headers.remove(header::CONTENT_LENGTH);
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::NOT_MODIFIED;
            response
        } else {
            let mut response = Response::new(Body::from(cached.body.clone()));
            *response.status_mut() = cached.status;
            response
        };
        *response.headers_mut() = headers;
        response
    }

    /// Pass an upstream response through, storing a copy once its body has
    /// been read to the end.
    ///
    /// A body that errors or is dropped early is never stored.
    pub async fn capture(self: &Arc<Self>, snapshot: RequestSnapshot, response: Response<Body>) -> Response<Body> {
        let (mut parts, body) = response.into_parts();

        if !is_response_cacheable(parts.status, &parts.headers) {
            if is_vary_wildcard(&parts.headers) {
                let wildcard = CachedMetadata::new(vec!["*".to_string()]);
                if let Err(e) = self.store.put_metadata(&key::metadata_key(&snapshot), wildcard).await {
                    tracing::warn!(error = %e, "Failed to remember Vary wildcard");
                }
            }
            return Response::from_parts(parts, body);
        }

        let capture = Capture {
            manager: self.clone(),
            snapshot,
            status: parts.status,
            headers: parts.headers.clone(),
            buffer: BytesMut::new(),
            overflow: false,
        };

        parts.headers.remove(header::PRAGMA);
        parts.headers.remove(header::EXPIRES);
        rewrite_max_age(&mut parts.headers, self.ttl.as_secs());

        let chunks = stream::unfold(Some((body.into_data_stream(), capture)), |state| async move {
            let (mut data, mut capture) = state?;
            match data.next().await {
                Some(Ok(chunk)) => {
                    capture.push(&chunk);
                    Some((Ok(chunk), Some((data, capture))))
                }
                Some(Err(e)) => Some((Err(e), None)),
                None => {
                    capture.finish().await;
                    None
                }
            }
        });

        Response::from_parts(parts, Body::from_stream(chunks))
    }

    async fn save(&self, snapshot: &RequestSnapshot, status: StatusCode, mut headers: HeaderMap, body: Bytes) {
        let body = match decode_body(&mut headers, body) {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(error = %e, uri = %snapshot.uri, "Response body not cacheable");
                return;
            }
        };

        let metadata = CachedMetadata::new(directives::vary_headers(&headers));
        let key = key::generate(snapshot, &metadata.vary);
        let cached = CachedResponse::new(status, headers, body, self.clock.now());

        let stored = match self.store.put_metadata(&key::metadata_key(snapshot), metadata).await {
            Ok(()) => self.store.put(&key, cached).await,
            Err(e) => Err(e),
        };
        match stored {
            Ok(()) => tracing::debug!(uri = %snapshot.uri, "Stored response in cache"),
            Err(StoreError::Rejected(reason)) => {
                tracing::info!(uri = %snapshot.uri, reason = %reason, "Response too large to cache")
            }
            Err(e) => tracing::warn!(uri = %snapshot.uri, error = %e, "Failed to store response in cache"),
        }
    }
}

/// Accumulates a response body on its way to the client.
struct Capture {
    manager: Arc<ResponseCacheManager>,
    snapshot: RequestSnapshot,
    status: StatusCode,
    headers: HeaderMap,
    buffer: BytesMut,
    overflow: bool,
}

impl Capture {
    fn push(&mut self, chunk: &Bytes) {
        if self.overflow {
            return;
        }
        if (self.buffer.len() + chunk.len()) as u64 > self.manager.max_bytes {
            self.overflow = true;
            self.buffer = BytesMut::new();
            return;
        }
        self.buffer.extend_from_slice(chunk);
    }

    async fn finish(self) {
        if self.overflow {
            tracing::info!(uri = %self.snapshot.uri, "Response too large to cache");
            return;
        }
        self.manager
            .save(&self.snapshot, self.status, self.headers, self.buffer.freeze())
            .await;
    }
}
