//! Helpers for the legacy `X-Forwarded-*` headers.

use axum::http::{HeaderMap, HeaderName, HeaderValue, Uri};

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_PORT: HeaderName = HeaderName::from_static("x-forwarded-port");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_PREFIX: HeaderName = HeaderName::from_static("x-forwarded-prefix");

const HTTP_PORT: u16 = 80;
const HTTPS_PORT: u16 = 443;

/// Write one `X-Forwarded-*` header.
///
/// Appending adds `value` to the existing entries, drops entries rejected by
/// `keep` and joins the rest with `,` into a single header (no dedupe).
/// Overwriting replaces the header only when `value` passes `keep`.
pub fn write_header(
    headers: &mut HeaderMap,
    name: &HeaderName,
    value: Option<&str>,
    append: bool,
    keep: impl Fn(&str) -> bool,
) {
    if !append {
        if let Some(value) = value.filter(|v| keep(v)) {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.insert(name.clone(), value);
            }
        }
        return;
    }

    let mut entries: Vec<String> = headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();
    if let Some(value) = value {
        entries.push(value.to_string());
    }
    entries.retain(|v| keep(v));

    headers.remove(name);
    if entries.is_empty() {
        return;
    }
    if let Ok(joined) = HeaderValue::from_str(&entries.join(",")) {
        headers.insert(name.clone(), joined);
    }
}

/// The externally visible path prefix removed by routing.
///
/// One trailing `/` is stripped from both paths; if the original path ends
/// with the current one, the remainder in front of it is the prefix.
pub fn infer_prefix(original_path: &str, current_path: &str) -> Option<String> {
    let original = original_path.strip_suffix('/').unwrap_or(original_path);
    let current = current_path.strip_suffix('/').unwrap_or(current_path);

    if !original.ends_with(current) {
        return None;
    }
    let prefix = &original[..original.len() - current.len()];
    (!prefix.is_empty()).then(|| prefix.to_string())
}

pub fn default_port(scheme: &str) -> u16 {
    if scheme.eq_ignore_ascii_case("https") {
        HTTPS_PORT
    } else {
        HTTP_PORT
    }
}

pub fn scheme(uri: &Uri) -> &str {
    uri.scheme_str().unwrap_or("http")
}

pub fn port(uri: &Uri) -> u16 {
    uri.port_u16().unwrap_or_else(|| default_port(scheme(uri)))
}

/// `host[:port]`, omitting the port when it is the scheme default.
pub fn host_header(uri: &Uri) -> Option<String> {
    let host = uri.host()?;
    match uri.port_u16() {
        Some(port) if port != default_port(scheme(uri)) => Some(format!("{}:{}", host, port)),
        _ => Some(host.to_string()),
    }
}
