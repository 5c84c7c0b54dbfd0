//! Transaction-scoped variable storage.
//!
//! A [`VariableStore`] is an ordered multimap from key to value. Keys encode
//! collection membership as `COLLECTION:subkey` (`ARGS:id`), and rules reach
//! the stored values through one of three resolution tiers:
//!
//! - **single match** (`ARGS:id`): entries stored under exactly that key;
//!   a map lookup, never a scan.
//! - **multi match** (`ARGS`): the bare key plus every `ARGS:*` entry, the
//!   collection name compared case-insensitively.
//! - **regular expression** (`ARGS:/^id/`): every `ARGS:*` entry whose
//!   sub-key the pattern finds a match in; the collection name is compared
//!   case-sensitively.
//!
//! Reads never fail: a miss or a malformed expression resolves to nothing.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Serialize;

/// Separator between a collection name and a sub-key.
pub const COLLECTION_SEPARATOR: char = ':';

/// One resolved `(key, value)` pair.
///
/// Only ever produced by resolution; the store keeps its own copies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Variable {
    pub key: String,
    pub value: String,
}

impl Variable {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Variable {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// The storage and resolution contract of a variable collection.
///
/// [`VariableStore`] is the in-memory, per-transaction implementation.
/// Backends shared between transactions must provide their own locking.
pub trait Collection {
    /// Insert unconditionally; a key may hold any number of values.
    fn store(&mut self, key: &str, value: &str);

    /// Overwrite the first value stored under `key`. Returns `false`, and
    /// leaves the store untouched, when the key is absent.
    fn update_first(&mut self, key: &str, value: &str) -> bool;

    /// Remove every value stored under `key`. Absent keys are a no-op.
    fn del(&mut self, key: &str);

    /// First value stored under `key`, or `None`.
    fn resolve_first(&self, key: &str) -> Option<&str>;

    /// Every entry stored under exactly `key`, in insertion order.
    fn resolve_single_match(&self, key: &str) -> Vec<Variable>;

    /// Exact entries for `key` plus all `key:*` collection members, in
    /// reverse discovery order (exact entries last).
    fn resolve_multi_matches(&self, key: &str) -> Vec<Variable>;

    /// Resolve a `COLLECTION:/pattern/` expression, in reverse discovery
    /// order.
    fn resolve_regular_expression(&self, key: &str) -> Vec<Variable>;

    /// Update the first value for `key`, or insert it when absent.
    ///
    /// Never fails; always returns `true`.
    fn store_or_update_first(&mut self, key: &str, value: &str) -> bool {
        if !self.update_first(key, value) {
            self.store(key, value);
        }
        true
    }

    /// First value stored under `key`, or an empty string.
    ///
    /// A stored empty string and a missing key look the same here; use
    /// [`Collection::resolve_first`] when the difference matters.
    fn resolve_first_copy(&self, key: &str) -> String {
        self.resolve_first(key).map(str::to_string).unwrap_or_default()
    }
}

/// In-memory variable store owned by a single transaction.
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    entries: BTreeMap<String, Vec<String>>,
}

impl VariableStore {
    pub fn new() -> Self {
        VariableStore {
            entries: BTreeMap::new(),
        }
    }

    /// Total number of stored values across all keys.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry. Called when the owning transaction ends.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate over all `(key, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(k, values)| values.iter().map(move |v| (k.as_str(), v.as_str())))
    }
}

impl Collection for VariableStore {
    fn store(&mut self, key: &str, value: &str) {
        self.entries
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
    }

    fn update_first(&mut self, key: &str, value: &str) -> bool {
        match self.entries.get_mut(key).and_then(|values| values.first_mut()) {
            Some(first) => {
                *first = value.to_string();
                true
            }
            None => false,
        }
    }

    fn del(&mut self, key: &str) {
        self.entries.remove(key);
    }

    fn resolve_first(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    fn resolve_single_match(&self, key: &str) -> Vec<Variable> {
        self.entries
            .get(key)
            .map(|values| values.iter().map(|v| Variable::new(key, v.as_str())).collect())
            .unwrap_or_default()
    }

    fn resolve_multi_matches(&self, key: &str) -> Vec<Variable> {
        let mut out = self.resolve_single_match(key);

        for (stored, values) in &self.entries {
            if !is_member(stored, key, |a, b| a.eq_ignore_ascii_case(b)) {
                continue;
            }
            out.extend(values.iter().map(|v| Variable::new(stored.as_str(), v.as_str())));
        }

        out.reverse();
        out
    }

    fn resolve_regular_expression(&self, key: &str) -> Vec<Variable> {
        let Some((collection, pattern)) = split_regex_expression(key) else {
            log::debug!("not a regex variable expression: {key}");
            return Vec::new();
        };
        let re = match Regex::new(pattern) {
            Ok(re) => re,
            Err(e) => {
                log::debug!("regex variable expression {key} does not compile: {e}");
                return Vec::new();
            }
        };

        let mut out = Vec::new();
        for (stored, values) in &self.entries {
            if !is_member(stored, collection, |a, b| a == b) {
                continue;
            }
            let name = &stored[collection.len() + 1..];
            if !re.is_match(name) {
                continue;
            }
            out.extend(values.iter().map(|v| Variable::new(stored.as_str(), v.as_str())));
        }

        out.reverse();
        out
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Whether `stored` names a member `collection:<non-empty>` of `collection`.
fn is_member(stored: &str, collection: &str, eq: impl Fn(&[u8], &[u8]) -> bool) -> bool {
    let stored = stored.as_bytes();
    let n = collection.len();
    stored.len() > n + 1
        && stored[n] == COLLECTION_SEPARATOR as u8
        && eq(&stored[..n], collection.as_bytes())
}

/// Split `COLLECTION:/pattern/` into its collection and pattern.
///
/// The pattern starts two characters after the first colon and stops one
/// character before the end, which strips the delimiters.
fn split_regex_expression(key: &str) -> Option<(&str, &str)> {
    let colon = key.find(COLLECTION_SEPARATOR)?;
    if key.len() < colon + 3 {
        return None;
    }
    let pattern = key.get(colon + 2..key.len() - 1)?;
    Some((&key[..colon], pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_store() -> VariableStore {
        let mut s = VariableStore::new();
        s.store("ARGS", "1");
        s.store("ARGS", "2");
        s.store("ARGS:foo", "3");
        s
    }

    fn values(vars: &[Variable]) -> Vec<&str> {
        vars.iter().map(|v| v.value.as_str()).collect()
    }

    #[test]
    fn test_store_then_resolve_first() {
        let mut s = VariableStore::new();
        s.store("REQUEST_URI", "/index.php");
        assert_eq!(s.resolve_first("REQUEST_URI"), Some("/index.php"));
        assert_eq!(s.resolve_first_copy("REQUEST_URI"), "/index.php");
    }

    #[test]
    fn test_resolve_first_absent() {
        let s = VariableStore::new();
        assert_eq!(s.resolve_first("MISSING"), None);
        assert_eq!(s.resolve_first_copy("MISSING"), "");
    }

    #[test]
    fn test_copy_cannot_tell_empty_from_absent() {
        let mut s = VariableStore::new();
        s.store("EMPTY", "");
        // The copy accessor collapses both cases...
        assert_eq!(s.resolve_first_copy("EMPTY"), s.resolve_first_copy("MISSING"));
        // ...the optional accessor keeps them apart.
        assert_eq!(s.resolve_first("EMPTY"), Some(""));
        assert_eq!(s.resolve_first("MISSING"), None);
    }

    #[test]
    fn test_store_keeps_duplicates() {
        let mut s = VariableStore::new();
        s.store("k", "v");
        s.store("k", "v");
        assert_eq!(s.resolve_single_match("k").len(), 2);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_update_first_mutates_in_place() {
        let mut s = VariableStore::new();
        s.store("k", "v1");
        s.store("k", "other");
        assert!(s.update_first("k", "v2"));
        assert_eq!(values(&s.resolve_single_match("k")), vec!["v2", "other"]);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_update_first_absent_is_noop() {
        let mut s = VariableStore::new();
        s.store("a", "1");
        assert!(!s.update_first("b", "2"));
        assert_eq!(s.resolve_first("b"), None);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_store_or_update_first() {
        let mut s = VariableStore::new();
        assert!(s.store_or_update_first("TX:score", "1"));
        assert!(s.store_or_update_first("TX:score", "5"));
        assert_eq!(values(&s.resolve_single_match("TX:score")), vec!["5"]);
    }

    #[test]
    fn test_del_removes_all_values() {
        let mut s = args_store();
        s.del("ARGS");
        assert_eq!(s.resolve_first("ARGS"), None);
        assert_eq!(s.resolve_first("ARGS:foo"), Some("3"));
        s.del("ARGS");
        s.del("NEVER_STORED");
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_single_match_is_exact() {
        let s = args_store();
        assert_eq!(values(&s.resolve_single_match("ARGS")), vec!["1", "2"]);
        assert!(s.resolve_single_match("args").is_empty());
    }

    #[test]
    fn test_multi_match_reverse_discovery_order() {
        let s = args_store();
        let vars = s.resolve_multi_matches("ARGS");
        assert_eq!(values(&vars), vec!["3", "2", "1"]);
        assert_eq!(vars[0].key, "ARGS:foo");
        assert_eq!(vars[2].key, "ARGS");
    }

    #[test]
    fn test_multi_match_collection_is_case_insensitive() {
        let mut s = VariableStore::new();
        s.store("args:foo", "lower");
        s.store("ARGS:Bar", "upper");
        let vars = s.resolve_multi_matches("Args");
        assert_eq!(vars.len(), 2);
        assert!(vars.iter().any(|v| v.key == "args:foo"));
        assert!(vars.iter().any(|v| v.key == "ARGS:Bar"));
    }

    #[test]
    fn test_multi_match_requires_separator_and_subkey() {
        let mut s = VariableStore::new();
        s.store("ARGS_NAMES", "x");
        s.store("ARGS:", "empty-subkey");
        s.store("ARGSX:foo", "other");
        assert!(s.resolve_multi_matches("ARGS").is_empty());
    }

    #[test]
    fn test_regex_match() {
        let s = args_store();
        let vars = s.resolve_regular_expression("ARGS:/^f/");
        assert_eq!(vars, vec![Variable::new("ARGS:foo", "3")]);
    }

    #[test]
    fn test_regex_is_a_search_not_full_match() {
        let mut s = VariableStore::new();
        s.store("ARGS:user_id", "7");
        s.store("ARGS:name", "n");
        let vars = s.resolve_regular_expression("ARGS:/id/");
        assert_eq!(values(&vars), vec!["7"]);
    }

    #[test]
    fn test_regex_collection_is_case_sensitive() {
        let mut s = VariableStore::new();
        s.store("args:foo", "lower");
        assert!(s.resolve_regular_expression("ARGS:/foo/").is_empty());
        assert_eq!(s.resolve_regular_expression("args:/foo/").len(), 1);
    }

    #[test]
    fn test_regex_reverse_discovery_order() {
        let mut s = VariableStore::new();
        s.store("ARGS:id_a", "a");
        s.store("ARGS:id_b", "b");
        let vars = s.resolve_regular_expression("ARGS:/^id_/");
        assert_eq!(values(&vars), vec!["b", "a"]);
    }

    #[test]
    fn test_regex_malformed_expressions_are_empty() {
        let s = args_store();
        assert!(s.resolve_regular_expression("BADKEY").is_empty());
        assert!(s.resolve_regular_expression("ARGS:/").is_empty());
        assert!(s.resolve_regular_expression("ARGS:/(unclosed/").is_empty());
    }

    #[test]
    fn test_regex_empty_pattern_matches_every_member() {
        let s = args_store();
        assert_eq!(s.resolve_regular_expression("ARGS://").len(), 1);
    }

    #[test]
    fn test_iter_and_clear() {
        let mut s = args_store();
        let pairs: Vec<_> = s.iter().collect();
        assert_eq!(pairs, vec![("ARGS", "1"), ("ARGS", "2"), ("ARGS:foo", "3")]);
        s.clear();
        assert!(s.is_empty());
    }

    #[test]
    fn test_trait_object_usage() {
        let mut s = VariableStore::new();
        let c: &mut dyn Collection = &mut s;
        c.store_or_update_first("TX:a", "1");
        assert_eq!(c.resolve_first_copy("TX:a"), "1");
    }
}
