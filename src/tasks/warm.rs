//! Startup Warming Task
//!
//! Runs discovery cache warming once in the background so the server can
//! accept requests while providers are being fetched.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::cache::{
    warm_oidc_cache, OidcConfiguration, SharedCache, WarmReport, WELL_KNOWN_PROVIDERS,
};
use crate::fetch::JsonFetcher;

/// Spawns a one-shot task warming the discovery cache with the well-known
/// providers. The handle yields the warming report.
pub fn spawn_warm_task(
    oidc: SharedCache<OidcConfiguration>,
    fetcher: Arc<dyn JsonFetcher>,
) -> JoinHandle<WarmReport> {
    tokio::spawn(async move { warm_oidc_cache(&oidc, fetcher, WELL_KNOWN_PROVIDERS).await })
}
