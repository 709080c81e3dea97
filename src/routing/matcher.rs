//! Route predicates.
//!
//! # Responsibilities
//! - Match path and host patterns (`*`, `**`, `{var}`)
//! - Match method, header, query parameter and peer address
//! - Combine conditions with And/Or/Not
//!
//! # Design Decisions
//! - Host matching is case-insensitive, port ignored
//! - Path matching is case-sensitive
//! - Patterns compile to anchored regexes once, at route build time
//! - Weight membership is decided before matching; the matcher only reads it

use std::net::IpAddr;

use axum::http::{header, HeaderName, Method};
use ipnet::IpNet;
use regex::Regex;

use crate::config::ConfigError;
use crate::http::exchange::Exchange;

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, exchange: &Exchange) -> bool;
}

/// Matches everything; used for routes without predicates.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysMatcher;

impl Matcher for AlwaysMatcher {
    fn matches(&self, _exchange: &Exchange) -> bool {
        true
    }
}

/// Translate a glob pattern into regex source.
///
/// `**` spans separators, `*` and `{var}` stay within one segment,
/// `{*var}` captures the rest.
fn glob_to_regex(pattern: &str, separator: char) -> Result<String, ConfigError> {
    let segment = format!("[^{}]", regex::escape(&separator.to_string()));
    let mut out = String::new();
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            }
            '*' => out.push_str(&format!("{}*", segment)),
            '?' => out.push_str(&segment),
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => {
                            return Err(ConfigError::invalid(
                                format!("pattern '{}'", pattern),
                                "unterminated '{'",
                            ))
                        }
                    }
                }
                if name.starts_with('*') {
                    out.push_str(".*");
                } else {
                    out.push_str(&format!("{}+", segment));
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    Ok(out)
}

fn compile(source: &str, pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(source).map_err(|e| ConfigError::invalid(format!("pattern '{}'", pattern), e.to_string()))
}

fn anchored(pattern: &str) -> Result<Regex, ConfigError> {
    compile(&format!("^(?:{})$", pattern), pattern)
}

/// Matches the request path against one or more patterns.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    patterns: Vec<String>,
    regexes: Vec<Regex>,
}

impl PathMatcher {
    /// With `match_trailing_slash`, `/foo` also matches `/foo/`.
    pub fn new(patterns: &[String], match_trailing_slash: bool) -> Result<Self, ConfigError> {
        if patterns.is_empty() {
            return Err(ConfigError::invalid("Path predicate", "at least one pattern is required"));
        }

        let regexes = patterns
            .iter()
            .map(|pattern| {
                let (body, any_tail) = match pattern.strip_suffix("/**") {
                    Some(body) => (body, true),
                    None => (pattern.as_str(), false),
                };
                let mut source = format!("^{}", glob_to_regex(body, '/')?);
                if any_tail {
                    source.push_str("(?:/.*)?");
                } else if match_trailing_slash && !body.ends_with('/') {
                    source.push_str("/?");
                }
                source.push('$');
                compile(&source, pattern)
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            patterns: patterns.to_vec(),
            regexes,
        })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Matcher for PathMatcher {
    fn matches(&self, exchange: &Exchange) -> bool {
        let path = exchange.request().uri().path();
        self.regexes.iter().any(|r| r.is_match(path))
    }
}

/// Matches the Host header against one or more patterns.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    regexes: Vec<Regex>,
}

impl HostMatcher {
    /// Create a new host matcher.
    /// Patterns are normalized to lowercase for case-insensitive matching.
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        if patterns.is_empty() {
            return Err(ConfigError::invalid("Host predicate", "at least one pattern is required"));
        }
        let regexes = patterns
            .iter()
            .map(|p| anchored(&glob_to_regex(&p.to_lowercase(), '.')?))
            .collect::<Result<_, _>>()?;
        Ok(Self { regexes })
    }
}

fn request_host(exchange: &Exchange) -> Option<String> {
    let host = exchange
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| exchange.attributes().original_uri.authority().map(|a| a.to_string()))?;

    let without_port = if host.starts_with('[') {
        host.split_inclusive(']').next().unwrap_or(&host).to_string()
    } else {
        host.split(':').next().unwrap_or(&host).to_string()
    };
    Some(without_port.to_lowercase())
}

impl Matcher for HostMatcher {
    fn matches(&self, exchange: &Exchange) -> bool {
        request_host(exchange)
            .map(|host| self.regexes.iter().any(|r| r.is_match(&host)))
            .unwrap_or(false)
    }
}

/// Matches the request method.
#[derive(Debug, Clone)]
pub struct MethodMatcher {
    methods: Vec<Method>,
}

impl MethodMatcher {
    pub fn new(methods: &[String]) -> Result<Self, ConfigError> {
        if methods.is_empty() {
            return Err(ConfigError::invalid("Method predicate", "at least one method is required"));
        }
        let methods = methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes())
                    .map_err(|_| ConfigError::invalid("Method predicate", format!("invalid method '{}'", m)))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { methods })
    }
}

impl Matcher for MethodMatcher {
    fn matches(&self, exchange: &Exchange) -> bool {
        self.methods.contains(exchange.request().method())
    }
}

/// Matches when a header is present and, if a regex is given, any of its
/// values matches it in full.
#[derive(Debug, Clone)]
pub struct HeaderMatcher {
    name: HeaderName,
    regex: Option<Regex>,
}

impl HeaderMatcher {
    pub fn new(name: &str, regexp: Option<&str>) -> Result<Self, ConfigError> {
        let name = HeaderName::try_from(name)
            .map_err(|e| ConfigError::invalid("Header predicate", e.to_string()))?;
        let regex = regexp.map(anchored).transpose()?;
        Ok(Self { name, regex })
    }
}

impl Matcher for HeaderMatcher {
    fn matches(&self, exchange: &Exchange) -> bool {
        let mut values = exchange
            .headers()
            .get_all(&self.name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .peekable();
        match &self.regex {
            None => values.peek().is_some(),
            Some(regex) => values.any(|v| regex.is_match(v)),
        }
    }
}

/// Matches when a query parameter is present and, if a regex is given,
/// any of its values matches it in full.
#[derive(Debug, Clone)]
pub struct QueryMatcher {
    param: String,
    regex: Option<Regex>,
}

impl QueryMatcher {
    pub fn new(param: &str, regexp: Option<&str>) -> Result<Self, ConfigError> {
        if param.is_empty() {
            return Err(ConfigError::invalid("Query predicate", "param may not be empty"));
        }
        Ok(Self {
            param: param.to_string(),
            regex: regexp.map(anchored).transpose()?,
        })
    }
}

impl Matcher for QueryMatcher {
    fn matches(&self, exchange: &Exchange) -> bool {
        let Some(query) = exchange.request().uri().query() else {
            return false;
        };
        url::form_urlencoded::parse(query.as_bytes())
            .filter(|(name, _)| name == &self.param)
            .any(|(_, value)| self.regex.as_ref().map_or(true, |r| r.is_match(&value)))
    }
}

/// Matches the peer address against CIDR ranges or single addresses.
#[derive(Debug, Clone)]
pub struct RemoteAddrMatcher {
    sources: Vec<IpNet>,
}

impl RemoteAddrMatcher {
    pub fn new(sources: &[String]) -> Result<Self, ConfigError> {
        if sources.is_empty() {
            return Err(ConfigError::invalid("RemoteAddr predicate", "at least one source is required"));
        }
        let sources = sources
            .iter()
            .map(|s| {
                let s = s.trim();
                s.parse::<IpNet>()
                    .or_else(|_| s.parse::<IpAddr>().map(IpNet::from))
                    .map_err(|_| ConfigError::invalid("RemoteAddr predicate", format!("invalid source '{}'", s)))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { sources })
    }
}

impl Matcher for RemoteAddrMatcher {
    fn matches(&self, exchange: &Exchange) -> bool {
        exchange
            .attributes()
            .peer_addr
            .map(|addr| self.sources.iter().any(|net| net.contains(&addr.ip())))
            .unwrap_or(false)
    }
}

/// Matches when this route was drawn for its weight group.
#[derive(Debug, Clone)]
pub struct WeightMatcher {
    group: String,
    route_id: String,
}

impl WeightMatcher {
    pub fn new(group: impl Into<String>, route_id: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            route_id: route_id.into(),
        }
    }
}

impl Matcher for WeightMatcher {
    fn matches(&self, exchange: &Exchange) -> bool {
        exchange
            .attributes()
            .weights
            .get(&self.group)
            .is_some_and(|chosen| chosen == &self.route_id)
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, exchange: &Exchange) -> bool {
        // All matchers must pass (AND)
        self.matchers.iter().all(|m| m.matches(exchange))
    }
}

/// Combines multiple matchers with OR semantics.
#[derive(Debug)]
pub struct OrMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl OrMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for OrMatcher {
    fn matches(&self, exchange: &Exchange) -> bool {
        self.matchers.iter().any(|m| m.matches(exchange))
    }
}

#[derive(Debug)]
pub struct NotMatcher {
    inner: Box<dyn Matcher>,
}

impl NotMatcher {
    pub fn new(inner: Box<dyn Matcher>) -> Self {
        Self { inner }
    }
}

impl Matcher for NotMatcher {
    fn matches(&self, exchange: &Exchange) -> bool {
        !self.inner.matches(exchange)
    }
}
