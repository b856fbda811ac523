//! Key-scoped lookups over insertion-ordered maps
//!
//! Records are keyed by the set of ids that scope them. A record "belongs"
//! under another when its key contains the other's key, so lookups are
//! subset scans in insertion order rather than hash lookups.

use serde::{Deserialize, Serialize};

use crate::records::KeySet;

/// How [`match_key`] compares the lookup key against stored keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// First entry whose key contains the lookup key
    Subset,
    /// First entry whose key equals or contains the lookup key.
    ///
    /// A single ordered scan, so an earlier containing entry wins over a later
    /// equal one. Since an equal key also contains the lookup key, this finds the
    /// same entry as `Subset`; the mode records the caller's intent.
    Exact,
}

/// Insertion-ordered map from key sets to values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyedMap<V> {
    entries: Vec<KeyedEntry<V>>,
}

/// One keyed record, as it appears in a bundle file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyedEntry<V> {
    pub key: KeySet,
    pub record: V,
}

impl<V> KeyedMap<V> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Insert a value; an existing key keeps its position and gets the new value
    pub fn insert(&mut self, key: KeySet, value: V) -> Option<V> {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.key == key) {
            return Some(std::mem::replace(&mut entry.record, value));
        }
        self.entries.push(KeyedEntry { key, record: value });
        None
    }

    pub fn get(&self, key: &KeySet) -> Option<&V> {
        self.entries
            .iter()
            .find(|e| &e.key == key)
            .map(|e| &e.record)
    }

    pub fn contains_key(&self, key: &KeySet) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&KeySet, &V)> {
        self.entries.iter().map(|e| (&e.key, &e.record))
    }

    pub fn keys(&self) -> impl Iterator<Item = &KeySet> {
        self.entries.iter().map(|e| &e.key)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|e| &e.record)
    }
}

impl<V> Default for KeyedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> FromIterator<(KeySet, V)> for KeyedMap<V> {
    fn from_iter<I: IntoIterator<Item = (KeySet, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<V> Extend<(KeySet, V)> for KeyedMap<V> {
    fn extend<I: IntoIterator<Item = (KeySet, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

/// Find the value scoped by `key`, see [`MatchMode`]
pub fn match_key<'a, V>(map: &'a KeyedMap<V>, key: &KeySet, mode: MatchMode) -> Option<&'a V> {
    match_entry(map, key, mode).map(|(_, v)| v)
}

/// Like [`match_key`] but also returns the key the value is stored under
pub fn match_entry<'a, V>(
    map: &'a KeyedMap<V>,
    key: &KeySet,
    mode: MatchMode,
) -> Option<(&'a KeySet, &'a V)> {
    match mode {
        MatchMode::Subset => map.iter().find(|(k, _)| key.is_subset(k)),
        MatchMode::Exact => map.iter().find(|(k, _)| *k == key || key.is_subset(k)),
    }
}

/// Every entry whose key strictly contains `key`, in insertion order
pub fn search_subordinate_keys<'a, V>(
    map: &'a KeyedMap<V>,
    key: &KeySet,
) -> Vec<(&'a KeySet, &'a V)> {
    map.iter()
        .filter(|(k, _)| key.is_subset(k) && *k != key)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::keyset;

    fn sample() -> KeyedMap<&'static str> {
        let mut map = KeyedMap::new();
        map.insert(keyset(["a1", "t1", "d1"]), "datasource");
        map.insert(keyset(["a1", "m1"]), "model");
        map.insert(keyset(["a1"]), "agent");
        map.insert(keyset(["a1", "t1"]), "tool");
        map
    }

    #[test]
    fn test_subset_match_returns_first_container() {
        let map = sample();
        assert_eq!(
            match_key(&map, &keyset(["a1"]), MatchMode::Subset),
            Some(&"datasource")
        );
        assert_eq!(
            match_key(&map, &keyset(["m1"]), MatchMode::Subset),
            Some(&"model")
        );
    }

    #[test]
    fn test_exact_match_returns_first_equal_or_container() {
        let map = sample();
        assert_eq!(
            match_key(&map, &keyset(["a1"]), MatchMode::Exact),
            Some(&"datasource")
        );
        assert_eq!(
            match_key(&map, &keyset(["a1", "m1"]), MatchMode::Exact),
            Some(&"model")
        );
    }

    #[test]
    fn test_exact_match_earlier_container_beats_later_equal_key() {
        let mut map = KeyedMap::new();
        map.insert(keyset(["a1", "x"]), "superset-first");
        map.insert(keyset(["a1"]), "exact-later");
        assert_eq!(
            match_key(&map, &keyset(["a1"]), MatchMode::Exact),
            Some(&"superset-first")
        );

        let mut map = KeyedMap::new();
        map.insert(keyset(["a1"]), "exact-first");
        map.insert(keyset(["a1", "x"]), "superset-later");
        assert_eq!(
            match_key(&map, &keyset(["a1"]), MatchMode::Exact),
            Some(&"exact-first")
        );
    }

    #[test]
    fn test_exact_match_falls_back_to_container() {
        let map = sample();
        assert_eq!(
            match_key(&map, &keyset(["t1", "d1"]), MatchMode::Exact),
            Some(&"datasource")
        );
    }

    #[test]
    fn test_no_match() {
        let map = sample();
        assert!(match_key(&map, &keyset(["zz"]), MatchMode::Subset).is_none());
        assert!(match_key(&map, &keyset(["a1", "zz"]), MatchMode::Exact).is_none());
    }

    #[test]
    fn test_empty_key_matches_first_entry() {
        let map = sample();
        assert_eq!(
            match_key(&map, &KeySet::new(), MatchMode::Subset),
            Some(&"datasource")
        );
    }

    #[test]
    fn test_match_entry_returns_stored_key() {
        let map = sample();
        let (key, value) = match_entry(&map, &keyset(["m1"]), MatchMode::Subset).unwrap();
        assert_eq!(key, &keyset(["a1", "m1"]));
        assert_eq!(*value, "model");
    }

    #[test]
    fn test_subordinates_exclude_equal_key() {
        let map = sample();
        let subs: Vec<&str> = search_subordinate_keys(&map, &keyset(["a1", "t1"]))
            .into_iter()
            .map(|(_, v)| *v)
            .collect();
        assert_eq!(subs, vec!["datasource"]);

        let subs: Vec<&str> = search_subordinate_keys(&map, &keyset(["a1"]))
            .into_iter()
            .map(|(_, v)| *v)
            .collect();
        assert_eq!(subs, vec!["datasource", "model", "tool"]);
    }

    #[test]
    fn test_subordinates_of_empty_key_skip_empty_entry() {
        let mut map = KeyedMap::new();
        map.insert(keyset(["a1"]), "agent");
        map.insert(KeySet::new(), "unscoped");
        map.insert(keyset(["a1", "m1"]), "model");
        map.insert(keyset(["k1"]), "task");

        let subs: Vec<&str> = search_subordinate_keys(&map, &KeySet::new())
            .into_iter()
            .map(|(_, v)| *v)
            .collect();
        assert_eq!(subs, vec!["agent", "model", "task"]);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut map = sample();
        let old = map.insert(keyset(["a1", "m1"]), "model-v2");
        assert_eq!(old, Some("model"));
        assert_eq!(map.len(), 4);
        let order: Vec<&str> = map.values().copied().collect();
        assert_eq!(order, vec!["datasource", "model-v2", "agent", "tool"]);
    }

    #[test]
    fn test_keyed_map_json_shape() {
        let mut map = KeyedMap::new();
        map.insert(keyset(["x", "y"]), 7u32);
        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json[0]["key"], serde_json::json!(["x", "y"]));
        assert_eq!(json[0]["record"], 7);
    }
}
