//! Tool binding cache
//!
//! Tool-definition payloads are built per distinct tool set. The key is the
//! normalized set of tool names, so `["b", "a", "a"]` and `["a", "b"]` share
//! an entry. Least recently used entries are evicted past `capacity`.

use serde_json::Value;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ToolSetKey(BTreeSet<String>);

impl ToolSetKey {
    pub fn new(names: &[&str]) -> Self {
        Self(
            names
                .iter()
                .map(|n| n.trim())
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

pub struct ToolBindingCache {
    capacity: usize,
    // Front is most recently used.
    entries: VecDeque<(ToolSetKey, Arc<Vec<Value>>)>,
}

impl ToolBindingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn get_or_insert_with<F>(&mut self, key: ToolSetKey, build: F) -> Arc<Vec<Value>>
    where
        F: FnOnce(&ToolSetKey) -> Vec<Value>,
    {
        if let Some(pos) = self.entries.iter().position(|(k, _)| *k == key) {
            if let Some(entry) = self.entries.remove(pos) {
                let bound = Arc::clone(&entry.1);
                self.entries.push_front(entry);
                return bound;
            }
        }

        let bound = Arc::new(build(&key));
        self.entries.push_front((key, Arc::clone(&bound)));
        while self.entries.len() > self.capacity {
            if let Some((evicted, _)) = self.entries.pop_back() {
                debug!("Evicted tool binding {:?}", evicted);
            }
        }
        bound
    }

    pub fn contains(&self, key: &ToolSetKey) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_order_and_duplicate_insensitive() {
        assert_eq!(ToolSetKey::new(&["b", "a", "a"]), ToolSetKey::new(&["a", " b "]));
        assert!(ToolSetKey::new(&[""]).is_empty());
    }

    #[test]
    fn test_hit_does_not_rebuild() {
        let mut cache = ToolBindingCache::new(2);
        let mut builds = 0;
        for _ in 0..3 {
            cache.get_or_insert_with(ToolSetKey::new(&["a"]), |_| {
                builds += 1;
                vec![]
            });
        }
        assert_eq!(builds, 1);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = ToolBindingCache::new(2);
        let a = ToolSetKey::new(&["a"]);
        let b = ToolSetKey::new(&["b"]);
        let c = ToolSetKey::new(&["c"]);
        cache.get_or_insert_with(a.clone(), |_| vec![]);
        cache.get_or_insert_with(b.clone(), |_| vec![]);
        // touch a so b becomes the oldest
        cache.get_or_insert_with(a.clone(), |_| vec![]);
        cache.get_or_insert_with(c.clone(), |_| vec![]);

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&a));
        assert!(cache.contains(&c));
        assert!(!cache.contains(&b));
    }
}
