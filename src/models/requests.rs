//! Request DTOs for the HTTP API
//!
//! Defines the structure of incoming query strings and request bodies.

use serde::Deserialize;
use serde_json::Value;

/// Request body for POST /verify
///
/// # Fields
/// - `token`: compact JWS to verify
/// - `jwks_uri`: where the key set is published, enables refresh
/// - `jwks`: key set to verify against; loaded from `jwks_uri` when omitted
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyRequest {
    pub token: String,
    #[serde(default, alias = "jwksUri")]
    pub jwks_uri: Option<String>,
    #[serde(default)]
    pub jwks: Option<Value>,
}

/// Where the key set for a verification comes from
#[derive(Debug, Clone, PartialEq)]
pub enum KeySource<'a> {
    /// Key set supplied in the request body
    Inline(&'a Value),
    /// Key set loaded through the cache from this URL
    Remote(&'a str),
}

impl VerifyRequest {
    /// Validates the request data
    ///
    /// Returns the key source to verify against, or an error message.
    /// An inline `jwks` takes precedence over `jwks_uri`.
    pub fn validate(&self) -> Result<KeySource<'_>, String> {
        if self.token.trim().is_empty() {
            return Err("Token cannot be empty".to_string());
        }
        if let Some(error_msg) = self.jwks_uri.as_deref().and_then(validate_url) {
            return Err(error_msg);
        }
        match (&self.jwks, self.jwks_uri.as_deref()) {
            (Some(jwks), _) => Ok(KeySource::Inline(jwks)),
            (None, Some(uri)) => Ok(KeySource::Remote(uri)),
            (None, None) => Err("Either jwks or jwks_uri must be provided".to_string()),
        }
    }
}

/// Query for GET /jwks and DELETE /cache/jwks
#[derive(Debug, Clone, Deserialize)]
pub struct JwksQuery {
    pub uri: String,
}

impl JwksQuery {
    pub fn validate(&self) -> Option<String> {
        validate_url(&self.uri)
    }
}

/// Query for GET /oidc
///
/// `issuer` may be an issuer URL or a complete discovery URL.
#[derive(Debug, Clone, Deserialize)]
pub struct OidcQuery {
    pub issuer: String,
}

impl OidcQuery {
    pub fn validate(&self) -> Option<String> {
        validate_url(&self.issuer)
    }
}

fn validate_url(url: &str) -> Option<String> {
    if url.starts_with("https://") || url.starts_with("http://") {
        None
    } else {
        Some(format!("Not an http(s) URL: {url}"))
    }
}
