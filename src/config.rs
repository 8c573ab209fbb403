//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::cache::{
    jwks_cache_options, oidc_cache_options, CacheOptions, DEFAULT_MAX_ENTRIES,
    JWKS_MEMORY_TTL_MS, JWKS_STORAGE_TTL_MS, OIDC_MEMORY_TTL_MS, OIDC_STORAGE_TTL_MS,
};

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Directory for the persistent tier; `None` runs memory-only
    pub storage_dir: Option<PathBuf>,
    /// JWKS memory tier TTL in milliseconds
    pub jwks_memory_ttl_ms: u64,
    /// JWKS persistent tier TTL in milliseconds
    pub jwks_storage_ttl_ms: u64,
    /// Discovery document memory tier TTL in milliseconds
    pub oidc_memory_ttl_ms: u64,
    /// Discovery document persistent tier TTL in milliseconds
    pub oidc_storage_ttl_ms: u64,
    /// Entry cap applied to both caches
    pub max_entries: usize,
    /// Seconds between expired-entry purges, 0 disables the task
    pub cleanup_interval: u64,
    /// Warm the discovery cache at startup
    pub warm_oidc_cache: bool,
    /// Outbound HTTP timeout in seconds
    pub fetch_timeout_secs: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `STORAGE_DIR` - persistent tier directory (default: unset, memory-only)
    /// - `JWKS_MEMORY_TTL_MS` / `JWKS_STORAGE_TTL_MS` (default: 5 min / 1 h)
    /// - `OIDC_MEMORY_TTL_MS` / `OIDC_STORAGE_TTL_MS` (default: 10 min / 24 h)
    /// - `CACHE_MAX_ENTRIES` - entry cap per cache (default: 50)
    /// - `CLEANUP_INTERVAL` - purge frequency in seconds (default: 300)
    /// - `WARM_OIDC_CACHE` - `true`/`1` to warm at startup (default: false)
    /// - `FETCH_TIMEOUT_SECS` - outbound request timeout (default: 10)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            storage_dir: env::var("STORAGE_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            jwks_memory_ttl_ms: parse_var("JWKS_MEMORY_TTL_MS")
                .unwrap_or(defaults.jwks_memory_ttl_ms),
            jwks_storage_ttl_ms: parse_var("JWKS_STORAGE_TTL_MS")
                .unwrap_or(defaults.jwks_storage_ttl_ms),
            oidc_memory_ttl_ms: parse_var("OIDC_MEMORY_TTL_MS")
                .unwrap_or(defaults.oidc_memory_ttl_ms),
            oidc_storage_ttl_ms: parse_var("OIDC_STORAGE_TTL_MS")
                .unwrap_or(defaults.oidc_storage_ttl_ms),
            max_entries: parse_var("CACHE_MAX_ENTRIES").unwrap_or(defaults.max_entries),
            cleanup_interval: parse_var("CLEANUP_INTERVAL").unwrap_or(defaults.cleanup_interval),
            warm_oidc_cache: env::var("WARM_OIDC_CACHE")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.warm_oidc_cache),
            fetch_timeout_secs: parse_var("FETCH_TIMEOUT_SECS")
                .unwrap_or(defaults.fetch_timeout_secs),
        }
    }

    /// Options of the JWKS cache under this configuration.
    pub fn jwks_options(&self) -> CacheOptions {
        CacheOptions {
            memory_ttl_ms: self.jwks_memory_ttl_ms,
            storage_ttl_ms: self.jwks_storage_ttl_ms,
            max_entries: Some(self.max_entries),
            ..jwks_cache_options()
        }
    }

    /// Options of the discovery document cache under this configuration.
    pub fn oidc_options(&self) -> CacheOptions {
        CacheOptions {
            memory_ttl_ms: self.oidc_memory_ttl_ms,
            storage_ttl_ms: self.oidc_storage_ttl_ms,
            max_entries: Some(self.max_entries),
            ..oidc_cache_options()
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            storage_dir: None,
            jwks_memory_ttl_ms: JWKS_MEMORY_TTL_MS,
            jwks_storage_ttl_ms: JWKS_STORAGE_TTL_MS,
            oidc_memory_ttl_ms: OIDC_MEMORY_TTL_MS,
            oidc_storage_ttl_ms: OIDC_STORAGE_TTL_MS,
            max_entries: DEFAULT_MAX_ENTRIES,
            cleanup_interval: 300,
            warm_oidc_cache: false,
            fetch_timeout_secs: 10,
        }
    }
}
