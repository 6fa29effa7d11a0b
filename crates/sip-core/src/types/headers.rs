//! Extension headers
//!
//! The structured headers (Via branch, From, To, Call-ID, CSeq, Contact,
//! Route, Record-Route) are fields of [`Request`](crate::Request) and
//! [`Response`](crate::Response). Everything else travels here as ordered
//! name/value pairs with case-insensitive lookup.

use serde::{Deserialize, Serialize};

/// Well-known extension header names
pub mod names {
    pub const EXPIRES: &str = "Expires";
    pub const REASON: &str = "Reason";
    pub const ALLOW: &str = "Allow";
    pub const SUPPORTED: &str = "Supported";
    pub const RETRY_AFTER: &str = "Retry-After";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping any existing values of the same name
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replace every value of `name` with a single value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.entries.push((name, value.into()));
    }

    /// First value of `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value of `name` in order of insertion
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Remove every value of `name`, returning how many were dropped
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.push(name, value);
        }
        headers
    }
}

impl Extend<(String, String)> for Headers {
    fn extend<T: IntoIterator<Item = (String, String)>>(&mut self, iter: T) {
        self.entries.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut headers = Headers::new();
        headers.push("X-Custom", "1");
        headers.push("x-custom", "2");
        assert_eq!(headers.get("X-CUSTOM"), Some("1"));
        assert_eq!(headers.get_all("x-Custom").collect::<Vec<_>>(), vec!["1", "2"]);
    }

    #[test]
    fn test_set_replaces_all_values() {
        let mut headers: Headers = [("Expires", "30"), ("expires", "40")].into_iter().collect();
        headers.set(names::EXPIRES, "10");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("expires"), Some("10"));
        assert_eq!(headers.remove("Expires"), 1);
        assert!(headers.is_empty());
    }
}
