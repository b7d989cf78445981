use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// A cached value and the instant it stops being valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: Value,
    pub expiration: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(value: Value, expiration: DateTime<Utc>) -> Self {
        Self { value, expiration }
    }

    /// An entry is valid up to and including its expiration instant.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expiration >= now
    }
}

/// The node's in-memory share of the cache.
///
/// Expired entries are logically absent from `get` even before `prune`
/// removes them. `replace_all` swaps in a fully built map under the write
/// lock, so readers see either the old contents or the new ones.
#[derive(Default)]
pub struct LocalCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl LocalCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str, now: DateTime<Utc>) -> Option<Value> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }

    pub async fn set(&self, key: impl Into<String>, value: Value, expiration: DateTime<Utc>) {
        self.entries
            .write()
            .await
            .insert(key.into(), CacheEntry::new(value, expiration));
    }

    /// Drop every entry that expired before `now`, returning how many went.
    pub async fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    pub async fn replace_all(&self, new_entries: HashMap<String, CacheEntry>) {
        let mut entries = self.entries.write().await;
        *entries = new_entries;
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn contains_key(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }

    /// Ordered copy of the current contents, expired entries included.
    pub async fn snapshot(&self) -> BTreeMap<String, CacheEntry> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect()
    }
}
