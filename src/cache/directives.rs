//! Cache-Control and Vary handling.

use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};

const FORBIDDEN_DIRECTIVES: [&str; 2] = ["private", "no-store"];
const CACHEABLE_STATUSES: [StatusCode; 3] = [
    StatusCode::OK,
    StatusCode::PARTIAL_CONTENT,
    StatusCode::MOVED_PERMANENTLY,
];
const MAX_AGE: &str = "max-age=";

/// Lowercased Cache-Control directives, split on commas.
pub fn cache_control(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|d| d.trim().to_ascii_lowercase())
        .filter(|d| !d.is_empty())
        .collect()
}

pub fn has_directive(headers: &HeaderMap, directive: &str) -> bool {
    cache_control(headers).iter().any(|d| d == directive)
}

fn forbids_caching(headers: &HeaderMap) -> bool {
    cache_control(headers)
        .iter()
        .any(|d| FORBIDDEN_DIRECTIVES.contains(&d.as_str()))
}

fn has_body(headers: &HeaderMap) -> bool {
    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0);
    content_length > 0 || headers.contains_key(header::TRANSFER_ENCODING)
}

/// GET/HEAD without a body and without `no-store`/`private`.
pub fn is_request_cacheable(method: &Method, headers: &HeaderMap) -> bool {
    (method == Method::GET || method == Method::HEAD) && !has_body(headers) && !forbids_caching(headers)
}

/// Cacheable status, no `no-store`/`private`, no `Vary: *`.
pub fn is_response_cacheable(status: StatusCode, headers: &HeaderMap) -> bool {
    CACHEABLE_STATUSES.contains(&status) && !forbids_caching(headers) && !is_vary_wildcard(headers)
}

/// Header names listed in `Vary`, lowercased, in order of appearance.
pub fn vary_headers(headers: &HeaderMap) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in headers
        .get_all(header::VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|n| n.trim().to_ascii_lowercase())
        .filter(|n| !n.is_empty())
    {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

pub fn is_vary_wildcard(headers: &HeaderMap) -> bool {
    vary_headers(headers).iter().any(|n| n == "*")
}

/// Replace every `max-age=N` with `seconds`, or append one if absent.
pub fn rewrite_max_age(headers: &mut HeaderMap, seconds: u64) {
    let existing: Vec<String> = headers
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect();

    let mut rewritten = Vec::with_capacity(existing.len() + 1);
    let mut replaced = false;
    for value in existing {
        if value.contains(MAX_AGE) {
            let directives: Vec<String> = value
                .split(',')
                .map(|d| {
                    let trimmed = d.trim();
                    if trimmed.to_ascii_lowercase().starts_with(MAX_AGE) {
                        format!("{}{}", MAX_AGE, seconds)
                    } else {
                        trimmed.to_string()
                    }
                })
                .collect();
            rewritten.push(directives.join(", "));
            replaced = true;
        } else {
            rewritten.push(value);
        }
    }
    if !replaced {
        rewritten.push(format!("{}{}", MAX_AGE, seconds));
    }

    headers.remove(header::CACHE_CONTROL);
    for value in rewritten {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.append(header::CACHE_CONTROL, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.append(*name, HeaderValue::from_static(value));
        }
        headers
    }

    #[test]
    fn test_request_gate() {
        assert!(is_request_cacheable(&Method::GET, &HeaderMap::new()));
        assert!(is_request_cacheable(&Method::HEAD, &HeaderMap::new()));
        assert!(!is_request_cacheable(&Method::POST, &HeaderMap::new()));
        assert!(!is_request_cacheable(&Method::GET, &headers(&[("content-length", "4")])));
        assert!(!is_request_cacheable(&Method::GET, &headers(&[("cache-control", "no-store")])));
        assert!(!is_request_cacheable(
            &Method::GET,
            &headers(&[("cache-control", "max-age=0, Private")])
        ));
        assert!(is_request_cacheable(&Method::GET, &headers(&[("cache-control", "no-cache")])));
    }

    #[test]
    fn test_response_gate() {
        assert!(is_response_cacheable(StatusCode::OK, &HeaderMap::new()));
        assert!(is_response_cacheable(StatusCode::MOVED_PERMANENTLY, &HeaderMap::new()));
        assert!(!is_response_cacheable(StatusCode::NOT_FOUND, &HeaderMap::new()));
        assert!(!is_response_cacheable(StatusCode::OK, &headers(&[("cache-control", "private")])));
        assert!(is_response_cacheable(StatusCode::OK, &headers(&[("cache-control", "public")])));
        assert!(!is_response_cacheable(StatusCode::OK, &headers(&[("vary", "Accept, *")])));
    }

    #[test]
    fn test_vary_headers_normalized() {
        let h = headers(&[("vary", "Accept-Language, X-Tenant"), ("vary", "accept-language")]);
        assert_eq!(vary_headers(&h), vec!["accept-language", "x-tenant"]);
    }

    #[test]
    fn test_rewrite_existing_max_age() {
        let mut h = headers(&[("cache-control", "public, max-age=300")]);
        rewrite_max_age(&mut h, 42);
        assert_eq!(h["cache-control"], "public, max-age=42");
    }

    #[test]
    fn test_rewrite_appends_max_age() {
        let mut h = headers(&[("cache-control", "public")]);
        rewrite_max_age(&mut h, 7);
        let values: Vec<_> = h.get_all("cache-control").iter().collect();
        assert_eq!(values, vec!["public", "max-age=7"]);

        let mut empty = HeaderMap::new();
        rewrite_max_age(&mut empty, 0);
        assert_eq!(empty["cache-control"], "max-age=0");
    }
}
