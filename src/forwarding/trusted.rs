//! Trusted proxy predicate.

use regex::Regex;

use crate::config::ConfigError;
use crate::forwarding::forwarded::unquote;

/// Decides whether a peer address may contribute forwarding headers.
///
/// The pattern must match the whole address. Besides the literal value, the
/// bare host (brackets and port removed) is also tested, so `10\.0\.0\..*`
/// accepts `"10.0.0.5:4711"` taken from a `Forwarded` hop.
#[derive(Debug, Clone)]
pub struct TrustedProxies {
    pattern: Regex,
}

impl TrustedProxies {
    pub fn from_pattern(pattern: &str) -> Result<Self, ConfigError> {
        if pattern.trim().is_empty() {
            return Err(ConfigError::invalid(
                "forwarded.trusted_proxies",
                "pattern must not be empty",
            ));
        }

        let anchored = format!("^(?:{})$", pattern);
        let pattern = Regex::new(&anchored)
            .map_err(|e| ConfigError::invalid("forwarded.trusted_proxies", e.to_string()))?;
        Ok(Self { pattern })
    }

    pub fn is_trusted(&self, address: &str) -> bool {
        let value = unquote(address.trim());
        if value.is_empty() {
            return false;
        }
        self.pattern.is_match(value) || self.pattern.is_match(host_only(value))
    }
}

/// Strip an optional port and IPv6 brackets.
fn host_only(value: &str) -> &str {
    if let Some(rest) = value.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match value.rsplit_once(':') {
        // More than one colon without brackets is a bare IPv6 literal.
        Some((host, port)) if !host.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => value,
    }
}
