//! Cached values.

use std::io::{self, Read};
use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use bytes::Bytes;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};

/// A stored response. The body is always decoded.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Wall-clock time the response was stored.
    pub stored_at: Duration,
}

impl CachedResponse {
    /// Build an entry, dropping headers that would contradict the
    /// `max-age` computed at serve time.
    pub fn new(status: StatusCode, mut headers: HeaderMap, body: Bytes, stored_at: Duration) -> Self {
        headers.remove(header::PRAGMA);
        headers.remove(header::EXPIRES);
        Self {
            status,
            headers,
            body,
            stored_at,
        }
    }

    /// Bytes counted against the store's size bound.
    pub fn weight(&self) -> u64 {
        let headers: usize = self
            .headers
            .iter()
            .map(|(name, value)| name.as_str().len() + value.len())
            .sum();
        (self.body.len() + headers) as u64
    }
}

/// What the cache remembers about a resource independent of any variant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedMetadata {
    /// Lowercased header names from the response `Vary`.
    pub vary: Vec<String>,
}

impl CachedMetadata {
    pub fn new(vary: Vec<String>) -> Self {
        Self { vary }
    }

    /// `Vary: *` was seen; no variant of this resource can be cached.
    pub fn is_wildcard(&self) -> bool {
        self.vary.iter().any(|n| n == "*")
    }
}

/// Decode a gzip/deflate body, fixing up `Content-Encoding` and
/// `Content-Length` to match the decoded bytes.
pub fn decode_body(headers: &mut HeaderMap, body: Bytes) -> io::Result<Bytes> {
    let encoding = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_ascii_lowercase());

    let decoded = match encoding.as_deref() {
        None | Some("") | Some("identity") => return Ok(body),
        Some("gzip") | Some("x-gzip") => read_all(GzDecoder::new(&body[..]))?,
        // Servers disagree on whether "deflate" means zlib-wrapped or raw.
        Some("deflate") => {
            read_all(ZlibDecoder::new(&body[..])).or_else(|_| read_all(DeflateDecoder::new(&body[..])))?
        }
        Some(other) => {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unsupported content encoding '{}'", other),
            ))
        }
    };

    headers.remove(header::CONTENT_ENCODING);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(decoded.len()));
    Ok(Bytes::from(decoded))
}

fn read_all(mut reader: impl Read) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}
