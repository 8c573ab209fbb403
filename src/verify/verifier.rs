//! Verification with JWKS refresh.
//!
//! A token that fails against the caller's key set is retried against the
//! cached key set, then once more against a freshly fetched one. This covers
//! signing-key rotation at the identity provider without retrying forever.

use std::str::FromStr;
use std::sync::Arc;

use jsonwebtoken::{crypto, Algorithm};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{fetch_document, fetch_through, Jwks, SharedCache};
use crate::fetch::JsonFetcher;
use crate::verify::token::DecodedToken;

pub const NO_KEYS: &str = "No keys found in the JWKS data";
pub const MISSING_KID: &str = "Token header does not contain a key ID (kid)";
pub const SIGNATURE_FAILED: &str = "Signature verification failed";

/// Callback invoked with a freshly fetched key set.
pub type RefreshCallback<'a> = &'a (dyn Fn(&Jwks) + Send + Sync);

// == Verification Result ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerificationResult {
    pub fn valid() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
        }
    }
}

// == JWKS Verifier ==
/// Verifies token signatures against a JWKS, refreshing it on failure.
#[derive(Clone)]
pub struct JwksVerifier {
    cache: SharedCache<Jwks>,
    fetcher: Arc<dyn JsonFetcher>,
}

impl JwksVerifier {
    pub fn new(cache: SharedCache<Jwks>, fetcher: Arc<dyn JsonFetcher>) -> Self {
        Self { cache, fetcher }
    }

    pub fn cache(&self) -> &SharedCache<Jwks> {
        &self.cache
    }

    /// Verifies `token` against `initial`, falling back to the key set
    /// published at `jwks_uri`.
    ///
    /// At most two key sets beyond `initial` are tried: the cached copy (if
    /// it differs from `initial`) and one fresh fetch. `on_refresh` is called
    /// with the fetched key set before the final attempt.
    pub async fn verify(
        &self,
        token: &str,
        jwks_uri: Option<&str>,
        initial: &Jwks,
        on_refresh: Option<RefreshCallback<'_>>,
    ) -> VerificationResult {
        if initial.is_empty() {
            return VerificationResult::invalid(NO_KEYS);
        }

        let decoded = match DecodedToken::decode(token) {
            Ok(decoded) => decoded,
            Err(e) => return VerificationResult::invalid(format!("{SIGNATURE_FAILED}: {e}")),
        };
        let Some(kid) = decoded.header.kid.as_deref() else {
            return VerificationResult::invalid(MISSING_KID);
        };

        let first_error = match verify_with_keys(&decoded, kid, initial) {
            Ok(()) => return VerificationResult::valid(),
            Err(e) => e,
        };
        let Some(uri) = jwks_uri else {
            return VerificationResult::invalid(first_error);
        };

        debug!(kid = %kid, uri = %uri, error = %first_error, "Verification failed, trying cached JWKS");

        // A previous call may already have refreshed the cache
        let cached = self.cache.write().await.get(uri);
        if let Some(cached) = cached.filter(|cached| cached != initial) {
            if verify_with_keys(&decoded, kid, &cached).is_ok() {
                debug!(kid = %kid, "Verified against cached JWKS");
                return VerificationResult::valid();
            }
        }

        self.cache.write().await.remove(uri);
        let fetcher = self.fetcher.clone();
        let url = uri.to_string();
        let fresh = fetch_through(&self.cache, uri, move || fetch_document::<Jwks>(fetcher, url)).await;

        let fresh = match fresh {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!(uri = %uri, error = %e, "JWKS refresh failed");
                return VerificationResult::invalid(format!(
                    "{first_error} (JWKS refresh also failed: {e})"
                ));
            }
        };

        info!(uri = %uri, keys = fresh.len(), "JWKS refreshed after verification failure");
        if let Some(on_refresh) = on_refresh {
            on_refresh(&fresh);
        }

        match verify_with_keys(&decoded, kid, &fresh) {
            Ok(()) => VerificationResult::valid(),
            Err(e) => VerificationResult::invalid(e),
        }
    }
}

/// One verification attempt against one key set.
fn verify_with_keys(decoded: &DecodedToken, kid: &str, jwks: &Jwks) -> Result<(), String> {
    let jwk = jwks
        .find(kid)
        .ok_or_else(|| format!("No key with ID \"{kid}\" found in the JWKS"))?;

    let alg = &decoded.header.alg;
    let algorithm = Algorithm::from_str(alg)
        .map_err(|_| format!("{SIGNATURE_FAILED}: unsupported algorithm \"{alg}\""))?;
    let key = jwk
        .decoding_key()
        .map_err(|e| format!("{SIGNATURE_FAILED}: {e}"))?;

    match crypto::verify(
        &decoded.signature,
        decoded.signing_input.as_bytes(),
        &key,
        algorithm,
    ) {
        Ok(true) => Ok(()),
        Ok(false) => Err(SIGNATURE_FAILED.to_string()),
        Err(e) => Err(format!("{SIGNATURE_FAILED}: {e}")),
    }
}
