use std::fmt;

use crate::util::compare_lowercase_ascii;

/// Ordered header list.
///
/// Lookups are case insensitive, but the original casing is kept for display
/// and for writing to the wire. Duplicate names are allowed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Headers::default()
    }

    /// Add a header, keeping any previous header of the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replace all headers of the same name with this one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.entries.push((name, value.into()));
    }

    pub fn remove(&mut self, name: &str) {
        let lower = name.to_ascii_lowercase();
        self.entries
            .retain(|(n, _)| !compare_lowercase_ascii(n, &lower));
    }

    /// The last value of a header. Servers that repeat a single-value header
    /// (like `Location`) are taken at their last word.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).last()
    }

    pub fn get_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        let lower = name.to_ascii_lowercase();
        self.entries
            .iter()
            .filter(move |(n, _)| compare_lowercase_ascii(n, &lower))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Check whether a comma separated header contains a token, ignoring case.
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        let token = token.to_ascii_lowercase();
        self.get_all(name)
            .flat_map(|v| v.split(','))
            .any(|v| compare_lowercase_ascii(v.trim(), &token))
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

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut h = Headers::new();
        for (k, v) in iter {
            h.append(k, v);
        }
        h
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
