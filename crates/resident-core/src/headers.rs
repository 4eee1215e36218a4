//! Case-preserving header multimap.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Well-known header names used by the bridge.
pub mod header_names {
    /// Request cookies.
    pub const COOKIE: &str = "Cookie";
    /// Response cookies.
    pub const SET_COOKIE: &str = "Set-Cookie";
    /// Body media type.
    pub const CONTENT_TYPE: &str = "Content-Type";
    /// Host the request was addressed to.
    pub const HOST: &str = "Host";
    /// Proxy chain, client first.
    pub const X_FORWARDED_FOR: &str = "X-Forwarded-For";
}

/// An ordered header multimap.
///
/// Names keep the case they were inserted with; lookups are case-insensitive.
/// Repeated names are stored as separate entries so nothing is ever merged into
/// a single comma-joined value behind the caller's back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Create an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, keeping any existing values for the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replace every value for `name` with a single value.
    ///
    /// The new entry takes the position of the first removed one so header
    /// order stays stable.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(pos) => {
                self.entries[pos] = (name.clone(), value);
                let mut index = 0;
                self.entries.retain(|(k, _)| {
                    let keep = index <= pos || !k.eq_ignore_ascii_case(&name);
                    index += 1;
                    keep
                });
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Remove every value for `name`.
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether any value exists for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Append every entry of `other` after the existing ones.
    pub fn extend_from(&mut self, other: &Headers) {
        self.entries.extend(other.entries.iter().cloned());
    }

    /// Iterate over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries (not distinct names).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Parse a raw `Name: value` header line, as emitted through a side channel.
    ///
    /// Lines without a colon are ignored.
    pub fn append_raw(&mut self, line: &str) -> bool {
        match line.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() => {
                self.append(name.trim(), value.trim());
                true
            }
            _ => false,
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.append(k, v);
        }
        headers
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            writeln!(f, "{}: {}", name, value)?;
        }
        Ok(())
    }
}
