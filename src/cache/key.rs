//! Cache key derivation.
//!
//! Keys are SHA-256 digests over length-prefixed fields, so no two distinct
//! field sequences can collide by concatenation. Derivation is a pure
//! function of the request snapshot.

use axum::http::{header, HeaderMap, Method};
use sha2::{Digest, Sha256};

use crate::http::exchange::Exchange;

/// The parts of a request that cache keys are derived from.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    pub method: Method,
    /// `host/path?query`, host lowercased.
    pub uri: String,
    pub headers: HeaderMap,
}

impl RequestSnapshot {
    pub fn new(method: Method, uri: String, headers: HeaderMap) -> Self {
        Self {
            method,
            uri,
            headers,
        }
    }

    pub fn from_exchange(exchange: &Exchange) -> Self {
        let request = exchange.request();
        let host = exchange
            .attributes()
            .original_uri
            .authority()
            .map(|a| a.as_str().to_ascii_lowercase())
            .unwrap_or_default();
        let path = request
            .uri()
            .path_and_query()
            .map(|p| p.as_str())
            .unwrap_or("/");

        Self {
            method: request.method().clone(),
            uri: format!("{}{}", host, path),
            headers: request.headers().clone(),
        }
    }
}

struct KeyHasher(Sha256);

impl KeyHasher {
    fn new(namespace: &[u8]) -> Self {
        let mut hasher = Self(Sha256::new());
        hasher.bytes(namespace);
        hasher
    }

    fn bytes(&mut self, value: &[u8]) {
        self.0.update((value.len() as u64).to_be_bytes());
        self.0.update(value);
    }

    /// A named, optional field. Absent and empty values hash differently.
    fn field(&mut self, name: &str, value: Option<&[u8]>) {
        self.bytes(name.as_bytes());
        match value {
            Some(value) => {
                self.0.update([1u8]);
                self.bytes(value);
            }
            None => self.0.update([0u8]),
        }
    }

    fn finish(self) -> String {
        hex::encode(self.0.finalize())
    }
}

fn joined(headers: &HeaderMap, name: &str) -> Option<Vec<u8>> {
    let values: Vec<&[u8]> = headers.get_all(name).iter().map(|v| v.as_bytes()).collect();
    if values.is_empty() {
        None
    } else {
        Some(values.join(&b","[..]))
    }
}

/// Key under which the Vary list of a resource is remembered.
pub fn metadata_key(snapshot: &RequestSnapshot) -> String {
    let mut hasher = KeyHasher::new(b"metadata");
    hasher.field("method", Some(snapshot.method.as_str().as_bytes()));
    hasher.field("uri", Some(snapshot.uri.as_bytes()));
    hasher.finish()
}

/// Key of the cached response for this request and Vary list.
pub fn generate(snapshot: &RequestSnapshot, vary: &[String]) -> String {
    let mut hasher = KeyHasher::new(b"response");
    hasher.field("method", Some(snapshot.method.as_str().as_bytes()));
    hasher.field("uri", Some(snapshot.uri.as_bytes()));
    hasher.field(
        "authorization",
        joined(&snapshot.headers, header::AUTHORIZATION.as_str()).as_deref(),
    );
    hasher.field("cookie", joined(&snapshot.headers, header::COOKIE.as_str()).as_deref());
    for name in vary {
        let name = name.to_ascii_lowercase();
        hasher.field(&format!("vary:{}", name), joined(&snapshot.headers, &name).as_deref());
    }
    hasher.finish()
}
