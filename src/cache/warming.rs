//! Cache Warming Module
//!
//! Best-effort pre-population of the discovery document cache.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{discovery_url, CachedDocument, OidcConfiguration, SharedCache};
use crate::fetch::{FetchError, JsonFetcher};

/// Discovery documents of widely used identity providers.
pub const WELL_KNOWN_PROVIDERS: &[&str] = &[
    "https://accounts.google.com/.well-known/openid-configuration",
    "https://login.microsoftonline.com/common/v2.0/.well-known/openid-configuration",
    "https://appleid.apple.com/.well-known/openid-configuration",
    "https://gitlab.com/.well-known/openid-configuration",
    "https://login.salesforce.com/.well-known/openid-configuration",
];

// == Fetch Document ==
/// Fetches a URL and validates the body as a `D`.
pub async fn fetch_document<D: CachedDocument>(
    fetcher: Arc<dyn JsonFetcher>,
    url: String,
) -> Result<D, FetchError> {
    let raw = fetcher.fetch_json(&url).await?;
    D::from_json(raw).map_err(|e| {
        debug!(url = %url, kind = D::KIND, error = %e, "Rejected malformed document");
        FetchError::Malformed(format!("Invalid {}: {}", D::KIND, e))
    })
}

// == Warm Report ==
/// Outcome of a warming run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmReport {
    /// URLs now cached
    pub warmed: Vec<String>,
    /// URLs that could not be fetched, with the reason
    pub failed: Vec<(String, String)>,
}

// == Warm OIDC Cache ==
/// Fetches and caches each discovery document in `urls`.
///
/// Each URL is independent: a failure is recorded and the run continues.
/// Entries are fetched sequentially to keep startup traffic modest.
pub async fn warm_oidc_cache(
    cache: &SharedCache<OidcConfiguration>,
    fetcher: Arc<dyn JsonFetcher>,
    urls: &[&str],
) -> WarmReport {
    let mut report = WarmReport::default();

    for url in urls {
        let url = discovery_url(url);
        match fetch_document::<OidcConfiguration>(fetcher.clone(), url.clone()).await {
            Ok(config) => {
                cache.write().await.set(&url, config);
                debug!(url = %url, "Warmed discovery document");
                report.warmed.push(url);
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to warm discovery document");
                report.failed.push((url, e.to_string()));
            }
        }
    }

    info!(
        warmed = report.warmed.len(),
        failed = report.failed.len(),
        "OIDC cache warming finished"
    );
    report
}
