//! API Handlers
//!
//! HTTP request handlers for each endpoint.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{Query, State},
    Json,
};
use tokio::sync::RwLock;
use tracing::warn;

use crate::cache::{
    discovery_url, fetch_document, fetch_through, CachedDocument, FileStore, Jwks, JwksCache,
    OidcConfigCache, OidcConfiguration, PersistentStore, ResourceCache, SharedCache,
};
use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::fetch::{FetchError, JsonFetcher, ReqwestFetcher};
use crate::models::{
    ClearResponse, HealthResponse, JwksQuery, KeySource, OidcQuery, StatsResponse,
    VerifyRequest, VerifyResponse,
};
use crate::verify::JwksVerifier;

/// Application state shared across all handlers.
///
/// Built explicitly from its parts; nothing here is a process-wide global.
#[derive(Clone)]
pub struct AppState {
    /// JWKS cache, shared with the verifier
    pub jwks: SharedCache<Jwks>,
    /// Discovery document cache
    pub oidc: SharedCache<OidcConfiguration>,
    /// Outbound HTTP
    pub fetcher: Arc<dyn JsonFetcher>,
    /// Signature verification with refresh
    pub verifier: JwksVerifier,
}

impl AppState {
    /// Creates a new AppState from its collaborators.
    pub fn new(jwks: JwksCache, oidc: OidcConfigCache, fetcher: Arc<dyn JsonFetcher>) -> Self {
        let jwks = Arc::new(RwLock::new(jwks));
        let oidc = Arc::new(RwLock::new(oidc));
        let verifier = JwksVerifier::new(jwks.clone(), fetcher.clone());
        Self {
            jwks,
            oidc,
            fetcher,
            verifier,
        }
    }

    /// Creates a new AppState from configuration.
    ///
    /// A storage directory that cannot be opened leaves the caches memory-only.
    pub fn from_config(config: &Config) -> std::result::Result<Self, FetchError> {
        let storage: Option<Arc<dyn PersistentStore>> =
            config.storage_dir.as_ref().and_then(|dir| match FileStore::open(dir) {
                Ok(store) => Some(Arc::new(store) as Arc<dyn PersistentStore>),
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Persistent tier unavailable, running memory-only");
                    None
                }
            });

        let fetcher = ReqwestFetcher::new(std::time::Duration::from_secs(config.fetch_timeout_secs))?;

        Ok(Self::new(
            ResourceCache::new(config.jwks_options(), storage.clone()),
            ResourceCache::new(config.oidc_options(), storage),
            Arc::new(fetcher),
        ))
    }

    /// Loads a document through `cache`, fetching at most once per key at a time.
    async fn load<D: CachedDocument>(&self, cache: &SharedCache<D>, url: &str) -> Result<D> {
        let fetcher = self.fetcher.clone();
        let owned = url.to_string();
        let document = fetch_through(cache, url, move || fetch_document::<D>(fetcher, owned)).await?;
        Ok(document)
    }
}

/// Handler for GET /jwks?uri=
///
/// Returns the key set published at `uri`, from cache when possible.
pub async fn jwks_handler(
    State(state): State<AppState>,
    Query(query): Query<JwksQuery>,
) -> Result<Json<Jwks>> {
    if let Some(error_msg) = query.validate() {
        return Err(ApiError::InvalidRequest(error_msg));
    }

    let jwks = state.load(&state.jwks, &query.uri).await?;
    Ok(Json(jwks))
}

/// Handler for GET /oidc?issuer=
///
/// Returns the discovery document of `issuer`, from cache when possible.
pub async fn oidc_handler(
    State(state): State<AppState>,
    Query(query): Query<OidcQuery>,
) -> Result<Json<OidcConfiguration>> {
    if let Some(error_msg) = query.validate() {
        return Err(ApiError::InvalidRequest(error_msg));
    }

    let url = discovery_url(&query.issuer);
    let config = state.load(&state.oidc, &url).await?;
    Ok(Json(config))
}

/// Handler for POST /verify
///
/// Verifies a token, refreshing the key set from `jwks_uri` on failure.
pub async fn verify_handler(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>> {
    let initial = match req.validate().map_err(ApiError::InvalidRequest)? {
        KeySource::Inline(raw) => Jwks::from_json(raw.clone())?,
        KeySource::Remote(uri) => state.load(&state.jwks, uri).await?,
    };

    let refreshed: Mutex<Option<Jwks>> = Mutex::new(None);
    let on_refresh = |jwks: &Jwks| {
        *refreshed.lock().unwrap_or_else(|e| e.into_inner()) = Some(jwks.clone());
    };

    let result = state
        .verifier
        .verify(&req.token, req.jwks_uri.as_deref(), &initial, Some(&on_refresh))
        .await;

    let refreshed = refreshed.into_inner().unwrap_or_else(|e| e.into_inner());
    Ok(Json(VerifyResponse::new(result, refreshed)))
}

/// Handler for GET /stats
///
/// Returns tier statistics of both caches.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let jwks = state.jwks.read().await.stats();
    let oidc = state.oidc.read().await.stats();

    Json(StatsResponse { jwks, oidc })
}

/// Handler for DELETE /cache
///
/// Empties both caches, memory and persistent tiers.
pub async fn clear_handler(State(state): State<AppState>) -> Json<ClearResponse> {
    state.jwks.write().await.clear();
    state.oidc.write().await.clear();

    Json(ClearResponse::all())
}

/// Handler for DELETE /cache/jwks?uri=
///
/// Drops one key set so the next lookup fetches it again.
pub async fn remove_jwks_handler(
    State(state): State<AppState>,
    Query(query): Query<JwksQuery>,
) -> Result<Json<ClearResponse>> {
    if let Some(error_msg) = query.validate() {
        return Err(ApiError::InvalidRequest(error_msg));
    }

    state.jwks.write().await.remove(&query.uri);
    Ok(Json(ClearResponse::removed(&query.uri)))
}

/// Handler for GET /health
///
/// Returns health status of the server.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
