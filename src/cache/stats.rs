//! Cache Statistics Module
//!
//! Snapshot of tier occupancy and persisted entry age range.

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time view of a cache's two tiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Entries held in the memory tier (live or not yet lazily expired)
    pub memory_entries: usize,
    /// Entries held in the persistent tier
    pub storage_entries: usize,
    /// Oldest persisted write timestamp (Unix milliseconds)
    pub oldest_entry: Option<u64>,
    /// Newest persisted write timestamp (Unix milliseconds)
    pub newest_entry: Option<u64>,
}

impl CacheStats {
    // == Constructor ==
    /// Creates empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    // == From Timestamps ==
    /// Builds statistics from tier sizes and the persisted entry timestamps.
    pub fn from_timestamps(
        memory_entries: usize,
        storage_entries: usize,
        timestamps: impl IntoIterator<Item = u64>,
    ) -> Self {
        let mut oldest_entry = None;
        let mut newest_entry = None;

        for ts in timestamps {
            oldest_entry = Some(oldest_entry.map_or(ts, |o: u64| o.min(ts)));
            newest_entry = Some(newest_entry.map_or(ts, |n: u64| n.max(ts)));
        }

        Self {
            memory_entries,
            storage_entries,
            oldest_entry,
            newest_entry,
        }
    }

    // == Is Empty ==
    /// Returns true if neither tier holds anything.
    pub fn is_empty(&self) -> bool {
        self.memory_entries == 0 && self.storage_entries == 0
    }
}
