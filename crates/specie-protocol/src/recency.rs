//! Exact bounded memory of recent activity, keyed by coin id or
//! transaction hash. Corroborates Bloom-filter hits and catches verbatim
//! replays; evicts oldest entries first when over capacity.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use specie_core::types::{CoinId, Timestamp, WalletId};

/// What a witness remembers about one recent validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<WalletId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<WalletId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coin_id: Option<CoinId>,
}

/// Bounded map with oldest-timestamp-first eviction.
#[derive(Debug, Clone)]
pub struct RecencyCache {
    entries: HashMap<String, CacheEntry>,
    capacity: usize,
}

impl RecencyCache {
    pub fn new(capacity: usize) -> Self {
        Self { entries: HashMap::new(), capacity: capacity.max(1) }
    }

    /// Insert an entry, pruning oldest-first if the cache grows past its
    /// capacity.
    pub fn insert(&mut self, key: impl Into<String>, entry: CacheEntry) {
        self.entries.insert(key.into(), entry);
        if self.entries.len() > self.capacity {
            self.prune();
        }
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // Remove oldest entries until at capacity.
    fn prune(&mut self) {
        let excess = self.entries.len().saturating_sub(self.capacity);
        if excess == 0 {
            return;
        }
        let mut by_age: Vec<(String, Timestamp)> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.timestamp))
            .collect();
        by_age.sort_by_key(|(_, ts)| *ts);
        for (key, _) in by_age.into_iter().take(excess) {
            self.entries.remove(&key);
        }
    }

    /// Dump all entries for persistence.
    pub fn snapshot(&self) -> Vec<(String, CacheEntry)> {
        self.entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Rebuild from a persisted dump, respecting the capacity bound.
    pub fn restore(capacity: usize, entries: Vec<(String, CacheEntry)>) -> Self {
        let mut cache = Self::new(capacity);
        for (key, entry) in entries {
            cache.insert(key, entry);
        }
        cache
    }
}
