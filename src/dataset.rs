//! Configuration-attribute decoding.
//!
//! Host attributes in the `data-` namespace carry per-instance
//! configuration. They are decoded once per mount into a [`ParsedConfig`]:
//! keys are camel-cased dataset style (`data-user-id` → `userId`) and raw
//! values run through [`decode`], which degrades gracefully — a value that
//! is neither percent-encoded JSON nor plain JSON stays a string.

use indexmap::IndexMap;
use serde_json::Value;

use crate::node::CONFIG_ATTRIBUTE_PREFIX;

/// Decoded configuration for one component instance, read-only to hooks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedConfig {
    entries: IndexMap<String, Value>,
}

impl ParsedConfig {
    pub(crate) fn from_attributes<'a>(
        attributes: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let mut entries = IndexMap::new();
        for (name, raw) in attributes {
            if let Some(rest) = name.strip_prefix(CONFIG_ATTRIBUTE_PREFIX) {
                entries.insert(camel_case(rest), decode(raw));
            }
        }
        Self { entries }
    }

    /// Looks up a decoded value by dataset key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Looks up a value that decoded to a plain string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    /// Iterates entries in host-attribute order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of configuration entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the host declared no configuration attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Decodes one raw configuration value.
///
/// Attempts, in order: percent-decode then parse as JSON, parse the raw
/// string as JSON, and finally fall back to the raw string unchanged.
/// Never fails.
#[must_use]
pub fn decode(raw: &str) -> Value {
    if let Ok(value) = serde_json::from_str(&percent_decode(raw)) {
        return value;
    }
    if let Ok(value) = serde_json::from_str(raw) {
        return value;
    }
    Value::String(raw.to_owned())
}

/// Lenient percent-decoding: malformed `%` sequences pass through
/// literally, and invalid UTF-8 falls back to the raw input.
fn percent_decode(raw: &str) -> String {
    fn is_hex(b: u8) -> bool {
        b.is_ascii_hexdigit()
    }

    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() && is_hex(bytes[i + 1]) && is_hex(bytes[i + 2]) => {
                let hi = char::from(bytes[i + 1]).to_digit(16).unwrap_or(0);
                let lo = char::from(bytes[i + 2]).to_digit(16).unwrap_or(0);
                out.push(u8::try_from(hi * 16 + lo).unwrap_or(b'%'));
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8(out).unwrap_or_else(|_| raw.to_owned())
}

fn camel_case(dataset_key: &str) -> String {
    let mut out = String::with_capacity(dataset_key.len());
    let mut upper_next = false;
    for c in dataset_key.chars() {
        if c == '-' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}
