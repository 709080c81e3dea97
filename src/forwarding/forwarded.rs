//! RFC 7239 `Forwarded` header codec.

use std::fmt;

/// One hop of a `Forwarded` header: ordered `key=value` pairs with
/// case-insensitive keys.
///
/// Values are stored exactly as they appear on the wire (quotes included);
/// [`Forwarded::put`] quotes values that need it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Forwarded {
    pairs: Vec<(String, String)>,
}

impl Forwarded {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, quoting it when it contains `:`.
    ///
    /// An existing pair with the same key is replaced in place.
    pub fn put(mut self, key: &str, value: &str) -> Self {
        let value = quote_if_needed(value);
        self.set_raw(key, value);
        self
    }

    fn set_raw(&mut self, key: &str, value: String) {
        match self.pairs.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((key.to_string(), value)),
        }
    }

    /// The raw (possibly quoted) value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// The value of `key` with surrounding quotes removed.
    pub fn get_unquoted(&self, key: &str) -> Option<&str> {
        self.get(key).map(unquote)
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn to_header_value(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Forwarded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}

/// Parse every hop out of a list of `Forwarded` header values.
///
/// Commas and semicolons inside quoted strings do not split. Pairs without
/// `=` or with an empty key are skipped, and hops left empty are dropped.
pub fn parse_forwarded<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<Forwarded> {
    values
        .into_iter()
        .flat_map(|value| split_unquoted(value, ','))
        .filter_map(parse_hop)
        .collect()
}

/// Parse a single hop (`key=value;key=value`).
pub fn parse_hop(segment: &str) -> Option<Forwarded> {
    let mut hop = Forwarded::new();
    for pair in split_unquoted(segment, ';') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            continue;
        }
        hop.set_raw(key, value.to_string());
    }

    (!hop.is_empty()).then_some(hop)
}

fn split_unquoted(input: &str, delimiter: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (i, c) in input.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => {
                parts.push(input[start..i].trim());
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(input[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

fn quote_if_needed(value: &str) -> String {
    if value.contains(':') && !is_quoted(value) {
        format!("\"{}\"", value)
    } else {
        value.to_string()
    }
}

fn is_quoted(value: &str) -> bool {
    value.len() >= 2 && value.starts_with('"') && value.ends_with('"')
}

pub(crate) fn unquote(value: &str) -> &str {
    if is_quoted(value) {
        &value[1..value.len() - 1]
    } else {
        value
    }
}
