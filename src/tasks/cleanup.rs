//! Expired Entry Purge Task
//!
//! Background task that periodically drops expired entries from both tiers
//! of the JWKS and discovery caches. Reads already expire lazily; this keeps
//! entries that are never read again from piling up in the persistent tier.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{Jwks, OidcConfiguration, SharedCache};

/// Spawns a background task that periodically purges expired cache entries.
///
/// The task runs in an infinite loop, sleeping for the specified interval
/// between runs, and takes each cache's write lock only for the purge itself.
///
/// # Arguments
/// * `jwks` - shared JWKS cache
/// * `oidc` - shared discovery document cache
/// * `cleanup_interval_secs` - Interval in seconds between purge runs
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
pub fn spawn_cleanup_task(
    jwks: SharedCache<Jwks>,
    oidc: SharedCache<OidcConfiguration>,
    cleanup_interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting cache purge task with interval of {} seconds",
            cleanup_interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed_jwks = jwks.write().await.purge_expired();
            let removed_oidc = oidc.write().await.purge_expired();

            if removed_jwks + removed_oidc > 0 {
                info!(
                    jwks = removed_jwks,
                    oidc = removed_oidc,
                    "Cache purge removed expired entries"
                );
            } else {
                debug!("Cache purge: no expired entries found");
            }
        }
    })
}
