//! Named parameters and collision-free placeholder allocation.
//!
//! Fragments are written with named placeholders (`:users_id`). Every fragment
//! that enters a statement is renamed through a [`PlaceholderAllocator`], which
//! prefixes its placeholders with a fresh numeric id (`:7_users_id`), so two
//! fragments merged into one statement never share a name. Named placeholders
//! are converted to the driver's positional style only at execution time.

use crate::value::Value;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Ordered map from placeholder name (without the leading `:`) to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamMap {
    entries: Vec<(String, Value)>,
}

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a parameter. A leading `:` on `name` is ignored.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let name = name.strip_prefix(':').map(str::to_string).unwrap_or(name);
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let name = name.strip_prefix(':').unwrap_or(name);
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Merge `other` into this map; entries in `other` win on name clashes.
    pub fn extend(&mut self, other: ParamMap) {
        for (name, value) in other.entries {
            self.insert(name, value);
        }
    }
}

impl IntoIterator for ParamMap {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ParamMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = ParamMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// Issues monotonically increasing ids used to namespace placeholders.
#[derive(Debug)]
pub struct PlaceholderAllocator {
    next: AtomicU64,
}

impl Default for PlaceholderAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaceholderAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Process-wide allocator for callers merging fragments outside a statement.
    pub fn global() -> &'static PlaceholderAllocator {
        static GLOBAL: OnceLock<PlaceholderAllocator> = OnceLock::new();
        GLOBAL.get_or_init(PlaceholderAllocator::new)
    }

    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Prefix every placeholder in `fragment` that names one of `params` with a
    /// fresh `{id}_`. Placeholders without a matching parameter are left alone.
    pub fn namespace(&self, fragment: &str, params: ParamMap) -> (String, ParamMap) {
        if params.is_empty() {
            return (fragment.to_string(), params);
        }
        let id = self.next_id();
        let sql = rewrite_placeholders(fragment, |name| {
            params.contains(name).then(|| format!(":{id}_{name}"))
        });
        let params = params
            .into_iter()
            .map(|(name, value)| (format!("{id}_{name}"), value))
            .collect();
        (sql, params)
    }
}

fn is_placeholder_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Visit every `:name` placeholder outside quoted text and `::` casts.
///
/// `replace` receives the bare name and returns the replacement for the whole
/// token (including the colon), or `None` to keep it.
pub(crate) fn rewrite_placeholders(
    sql: &str,
    mut replace: impl FnMut(&str) -> Option<String>,
) -> String {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => {
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == quote {
                        if bytes.get(i + 1) == Some(&quote) {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i += 1;
            }
            b':' if bytes.get(i + 1) == Some(&b':') => i += 2,
            b':' if bytes.get(i + 1).copied().is_some_and(is_placeholder_char) => {
                let start = i;
                i += 1;
                while i < bytes.len() && is_placeholder_char(bytes[i]) {
                    i += 1;
                }
                if let Some(replacement) = replace(&sql[start + 1..i]) {
                    out.push_str(&sql[copied..start]);
                    out.push_str(&replacement);
                    copied = i;
                }
            }
            _ => i += 1,
        }
    }

    out.push_str(&sql[copied.min(sql.len())..]);
    out
}

/// Names of all placeholders in `sql`, in order of appearance. Quoted text
/// and `::type` casts are skipped.
pub fn placeholder_names(sql: &str) -> Vec<String> {
    let mut names = Vec::new();
    rewrite_placeholders(sql, |name| {
        names.push(name.to_string());
        None
    });
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_is_token_exact() {
        let alloc = PlaceholderAllocator::new();
        let params = ParamMap::new().with("id", 1).with("id2", 2);
        let (sql, params) = alloc.namespace("a = :id AND b = :id2 AND c = :other", params);
        assert_eq!(sql, "a = :1_id AND b = :1_id2 AND c = :other");
        assert_eq!(params.get("1_id"), Some(&Value::Int(1)));
        assert_eq!(params.get("1_id2"), Some(&Value::Int(2)));
        assert!(!params.contains("id"));
    }

    #[test]
    fn namespacing_twice_gives_distinct_names() {
        let alloc = PlaceholderAllocator::new();
        let a = alloc.namespace("x = :v", ParamMap::new().with("v", 1));
        let b = alloc.namespace("x = :v", ParamMap::new().with("v", 1));
        assert_ne!(a.0, b.0);
        assert!(a.1.names().all(|n| !b.1.contains(n)));
    }

    #[test]
    fn scanner_skips_literals_and_casts() {
        let names = placeholder_names("a = ':no' AND b = :yes::int AND \"c:d\" = `e:f` AND t = '12:30'");
        assert_eq!(names, vec!["yes"]);
    }

    #[test]
    fn param_map_insert_replaces_and_strips_colon() {
        let mut map = ParamMap::new();
        map.insert(":a", 1);
        map.insert("a", 2);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(":a"), Some(&Value::Int(2)));
    }

    #[test]
    fn global_allocator_is_shared() {
        let first = PlaceholderAllocator::global().next_id();
        let second = PlaceholderAllocator::global().next_id();
        assert!(second > first);
    }
}
