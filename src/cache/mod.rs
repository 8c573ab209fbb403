//! Cache Module
//!
//! Two-tier resource caching with TTL expiry, oldest-write eviction and
//! in-flight fetch de-duplication, plus the JWKS / OIDC specializations.

mod documents;
mod entry;
mod pending;
mod stats;
mod storage;
mod store;
mod warming;


use std::sync::Arc;

use tokio::sync::RwLock;

// Re-export public types
pub use documents::{
    discovery_url, jwks_cache_options, oidc_cache_options, CachedDocument, Jwk, Jwks, JwksCache,
    OidcConfigCache, OidcConfiguration, SchemaError, JWKS_STORAGE_KEY, OIDC_STORAGE_KEY,
};
pub use entry::{current_timestamp_ms, normalize_key, CacheEntry};
pub use pending::{fetch_through, PendingFetch, PendingRequests};
pub use stats::CacheStats;
pub use storage::{FileStore, InMemoryStore, PersistentStore, StorageError};
pub use store::{CacheOptions, ResourceCache};
pub use warming::{fetch_document, warm_oidc_cache, WarmReport, WELL_KNOWN_PROVIDERS};

/// A cache shared between tasks.
pub type SharedCache<V> = Arc<RwLock<ResourceCache<V>>>;

// == Public Constants ==
/// Default JWKS memory tier TTL (5 minutes)
pub const JWKS_MEMORY_TTL_MS: u64 = 5 * 60 * 1000;

/// Default JWKS persistent tier TTL (1 hour)
pub const JWKS_STORAGE_TTL_MS: u64 = 60 * 60 * 1000;

/// Default discovery document memory tier TTL (10 minutes)
pub const OIDC_MEMORY_TTL_MS: u64 = 10 * 60 * 1000;

/// Default discovery document persistent tier TTL (24 hours)
pub const OIDC_STORAGE_TTL_MS: u64 = 24 * 60 * 60 * 1000;

/// Default entry cap for the specialized caches
pub const DEFAULT_MAX_ENTRIES: usize = 50;
