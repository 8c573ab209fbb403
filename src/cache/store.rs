//! Resource Cache Module
//!
//! Two-tier cache engine: a volatile memory tier in front of an optional
//! persistent tier, both with their own TTL, keyed by normalized URL.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::pending::{PendingFetch, PendingRequests};
use crate::cache::{current_timestamp_ms, normalize_key, CacheEntry, CacheStats, PersistentStore};

/// Persisted blob layout: normalized URL -> `{ value, timestamp }`, in write order.
type PersistedMap = IndexMap<String, Value>;

// == Cache Options ==
/// Configuration of a single cache instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    /// Namespace of this cache in the persistent tier
    pub storage_key: String,
    /// Memory tier TTL in milliseconds
    pub memory_ttl_ms: u64,
    /// Persistent tier TTL in milliseconds
    pub storage_ttl_ms: u64,
    /// Cap on entry count, enforced after every `set`
    pub max_entries: Option<usize>,
}

impl CacheOptions {
    pub fn new(storage_key: impl Into<String>, memory_ttl_ms: u64, storage_ttl_ms: u64) -> Self {
        Self {
            storage_key: storage_key.into(),
            memory_ttl_ms,
            storage_ttl_ms,
            max_entries: None,
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }
}

// == Resource Cache ==
/// Generic two-tier cache for JSON-serializable values.
///
/// No operation fails: storage problems degrade to memory-only behaviour and
/// malformed persisted data reads as a miss.
///
/// The cache owns its namespace in the persistent tier. The blob is read once
/// and then mirrored in memory; every change is written back in full.
#[derive(Debug)]
pub struct ResourceCache<V> {
    options: CacheOptions,
    /// Memory tier, in write order
    memory: IndexMap<String, CacheEntry<V>>,
    /// Persistent tier, absent when no backend is available
    storage: Option<Arc<dyn PersistentStore>>,
    /// Last blob read from or written to `storage`; `None` until loaded
    persisted: Option<PersistedMap>,
    /// In-flight fetches
    pending: PendingRequests<V>,
}

impl<V> ResourceCache<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    // == Constructor ==
    /// Creates a cache over an optional persistent backend.
    pub fn new(options: CacheOptions, storage: Option<Arc<dyn PersistentStore>>) -> Self {
        Self {
            options,
            memory: IndexMap::new(),
            storage,
            persisted: None,
            pending: PendingRequests::new(),
        }
    }

    /// Creates a cache without a persistent tier.
    pub fn memory_only(options: CacheOptions) -> Self {
        Self::new(options, None)
    }

    /// Returns the cache configuration.
    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Returns true if a persistent backend is attached.
    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }

    // == Get ==
    /// Looks up a live value, memory tier first.
    ///
    /// A live persisted value is promoted into the memory tier with a fresh
    /// timestamp. Stale entries met along the way are dropped.
    pub fn get(&mut self, url: &str) -> Option<V> {
        let key = normalize_key(url);
        let now = current_timestamp_ms();

        if let Some(entry) = self.memory.get(&key) {
            if entry.is_fresh(self.options.memory_ttl_ms, now) {
                debug!(key = %key, "Memory tier hit");
                return Some(entry.value.clone());
            }
            self.memory.shift_remove(&key);
        }

        let raw = self.persisted()?.get(&key)?.clone();

        match serde_json::from_value::<CacheEntry<V>>(raw) {
            Ok(entry) if entry.is_fresh(self.options.storage_ttl_ms, now) => {
                debug!(
                    key = %key,
                    age_ms = entry.age_ms(now),
                    "Storage tier hit, promoting to memory"
                );
                self.memory
                    .insert(key, CacheEntry::at(entry.value.clone(), now));
                Some(entry.value)
            }
            Ok(_) => {
                debug!(key = %key, "Storage tier entry expired");
                self.drop_persisted(&key);
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding malformed persisted entry");
                self.drop_persisted(&key);
                None
            }
        }
    }

    // == Set ==
    /// Writes a value to both tiers, then enforces `max_entries`.
    ///
    /// When the persistent write does not happen the cap is applied to the
    /// memory tier instead.
    pub fn set(&mut self, url: &str, value: V) {
        let key = normalize_key(url);
        let entry = CacheEntry::new(value);

        let persisted = self.persist_entry(&key, &entry);

        self.memory.shift_remove(&key);
        self.memory.insert(key, entry);

        if !persisted {
            let excess = excess_keys(
                self.options.max_entries,
                self.memory.iter().map(|(k, e)| (k.as_str(), e.timestamp)),
            );
            for evicted in excess {
                debug!(key = %evicted, "Evicting oldest memory entry");
                self.memory.shift_remove(&evicted);
            }
        }
    }

    // == Remove ==
    /// Deletes a key from both tiers. Absent keys are ignored.
    pub fn remove(&mut self, url: &str) {
        let key = normalize_key(url);
        self.memory.shift_remove(&key);
        self.drop_persisted(&key);
    }

    // == Clear ==
    /// Empties both tiers for this cache's namespace.
    pub fn clear(&mut self) {
        self.memory.clear();

        if let Some(storage) = &self.storage {
            match storage.delete(&self.options.storage_key) {
                Ok(()) => self.persisted = Some(PersistedMap::new()),
                Err(e) => {
                    warn!(
                        namespace = %self.options.storage_key,
                        error = %e,
                        "Failed to clear persistent tier"
                    );
                    self.persisted = None;
                }
            }
        }
    }

    // == Stats ==
    /// Returns tier sizes and the persisted timestamp range.
    pub fn stats(&self) -> CacheStats {
        let loaded;
        let persisted = match &self.persisted {
            Some(persisted) => persisted,
            None => {
                loaded = self.read_persisted().unwrap_or_default();
                &loaded
            }
        };

        CacheStats::from_timestamps(
            self.memory.len(),
            persisted.len(),
            persisted
                .values()
                .filter_map(|v| v.get("timestamp").and_then(Value::as_u64)),
        )
    }

    // == Purge Expired ==
    /// Drops every expired entry from both tiers.
    ///
    /// Returns the number of entries removed across tiers.
    pub fn purge_expired(&mut self) -> usize {
        let now = current_timestamp_ms();
        let memory_ttl = self.options.memory_ttl_ms;
        let storage_ttl = self.options.storage_ttl_ms;

        let before = self.memory.len();
        self.memory.retain(|_, entry| entry.is_fresh(memory_ttl, now));
        let mut removed = before - self.memory.len();

        let Some(current) = self.persisted() else {
            return removed;
        };
        let mut next = current.clone();
        next.retain(|_, raw| {
            raw.get("timestamp")
                .and_then(Value::as_u64)
                .is_some_and(|ts| CacheEntry::at((), ts).is_fresh(storage_ttl, now))
        });

        let purged = current.len() - next.len();
        if purged > 0 && self.commit(next) {
            removed += purged;
        }

        removed
    }

    // == Memory Entry ==
    /// Returns the memory tier entry for a key without touching the persistent tier.
    pub fn memory_entry(&self, url: &str) -> Option<&CacheEntry<V>> {
        self.memory.get(&normalize_key(url))
    }

    // == Pending Requests ==
    /// Registers an in-flight fetch for `url`.
    pub fn set_pending_request(&mut self, url: &str, fetch: PendingFetch<V>) {
        self.pending.insert(url, fetch);
    }

    /// Returns the in-flight fetch for `url`, if one is registered.
    pub fn get_pending_request(&self, url: &str) -> Option<PendingFetch<V>> {
        self.pending.get(url)
    }

    /// Clears the in-flight marker for `url`.
    pub fn remove_pending_request(&mut self, url: &str) {
        self.pending.remove(url);
    }

    // == Persistent Tier Helpers ==
    /// Returns the mirrored blob, reading it from the backend on first use.
    ///
    /// `None` when there is no backend or the backend could not be read; the
    /// read is retried on the next call.
    fn persisted(&mut self) -> Option<&mut PersistedMap> {
        if self.persisted.is_none() {
            self.persisted = self.read_persisted();
        }
        self.persisted.as_mut()
    }

    /// Reads the namespace blob from the backend.
    ///
    /// An absent or malformed blob is an empty map, so the next write
    /// replaces it. A backend failure is `None`: nothing may be written over
    /// data that could not be read.
    fn read_persisted(&self) -> Option<PersistedMap> {
        let storage = self.storage.as_ref()?;
        let namespace = &self.options.storage_key;

        match storage.load(namespace) {
            Ok(None) => Some(PersistedMap::new()),
            Ok(Some(data)) => match serde_json::from_str::<PersistedMap>(&data) {
                Ok(map) => Some(map),
                Err(e) => {
                    warn!(namespace = %namespace, error = %e, "Persisted cache is malformed, ignoring");
                    Some(PersistedMap::new())
                }
            },
            Err(e) => {
                warn!(namespace = %namespace, error = %e, "Persistent tier unreadable");
                None
            }
        }
    }

    /// Writes `entry` under `key` and evicts down to `max_entries`.
    ///
    /// Returns false when nothing was persisted.
    fn persist_entry(&mut self, key: &str, entry: &CacheEntry<V>) -> bool {
        let Some(current) = self.persisted() else {
            return false;
        };
        let mut next = current.clone();

        let raw = match serde_json::to_value(entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "Value not serializable, caching in memory only");
                return false;
            }
        };
        next.shift_remove(key);
        next.insert(key.to_string(), raw);

        let evicted = excess_keys(
            self.options.max_entries,
            next.iter().map(|(k, v)| (k.as_str(), persisted_timestamp(v))),
        );
        for key in &evicted {
            next.shift_remove(key);
        }

        if !self.commit(next) {
            return false;
        }
        for key in evicted {
            debug!(key = %key, "Evicting oldest persisted entry");
            self.memory.shift_remove(&key);
        }
        true
    }

    /// Removes `key` from the persistent tier if it is there.
    fn drop_persisted(&mut self, key: &str) {
        let Some(current) = self.persisted() else {
            return;
        };
        if !current.contains_key(key) {
            return;
        }
        let mut next = current.clone();
        next.shift_remove(key);
        self.commit(next);
    }

    /// Saves `next` as the namespace blob; the mirror only follows a
    /// successful write.
    fn commit(&mut self, next: PersistedMap) -> bool {
        let Some(storage) = &self.storage else {
            return false;
        };
        let namespace = &self.options.storage_key;

        let result = serde_json::to_string(&next)
            .map_err(|e| e.to_string())
            .and_then(|data| storage.save(namespace, &data).map_err(|e| e.to_string()));

        match result {
            Ok(()) => {
                self.persisted = Some(next);
                true
            }
            Err(e) => {
                warn!(namespace = %namespace, error = %e, "Persistent write failed, continuing memory-only");
                false
            }
        }
    }
}

/// Picks the keys to evict so that at most `max_entries` remain.
///
/// Oldest timestamp first; ties go to the earliest written.
fn excess_keys<'a>(
    max_entries: Option<usize>,
    entries: impl Iterator<Item = (&'a str, u64)>,
) -> Vec<String> {
    let Some(max_entries) = max_entries else {
        return Vec::new();
    };

    let mut by_age: Vec<(&str, u64)> = entries.collect();
    if by_age.len() <= max_entries {
        return Vec::new();
    }

    by_age.sort_by_key(|(_, ts)| *ts);
    let excess = by_age.len() - max_entries;
    by_age
        .into_iter()
        .take(excess)
        .map(|(k, _)| k.to_string())
        .collect()
}

/// Timestamp of a persisted entry; unreadable entries count as oldest.
fn persisted_timestamp(raw: &Value) -> u64 {
    raw.get("timestamp").and_then(Value::as_u64).unwrap_or(0)
}
