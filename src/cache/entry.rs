//! Cache Entry Module
//!
//! Defines the structure for individual cache entries and key normalization.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// == Cache Entry ==
/// Represents a single cached value together with its write time.
///
/// Entries are never mutated in place; a `set` replaces the whole entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Write timestamp (Unix milliseconds)
    pub timestamp: u64,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new entry stamped with the current time.
    pub fn new(value: V) -> Self {
        Self::at(value, current_timestamp_ms())
    }

    /// Creates a new entry with an explicit timestamp.
    pub fn at(value: V, timestamp: u64) -> Self {
        Self { value, timestamp }
    }

    // == Is Fresh ==
    /// Checks whether the entry is still live for the given TTL.
    ///
    /// Boundary condition: an entry whose age equals the TTL is stale.
    pub fn is_fresh(&self, ttl_ms: u64, now: u64) -> bool {
        now.saturating_sub(self.timestamp) < ttl_ms
    }

    // == Age ==
    /// Returns how long ago the entry was written, in milliseconds.
    pub fn age_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.timestamp)
    }
}

// == Key Normalization ==
/// Normalizes a cache key by stripping a single trailing slash.
///
/// `https://idp/jwks` and `https://idp/jwks/` address the same entry.
pub fn normalize_key(url: &str) -> String {
    url.strip_suffix('/').unwrap_or(url).to_string()
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
