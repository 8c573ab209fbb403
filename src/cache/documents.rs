//! Cached Documents Module
//!
//! The two document shapes this crate caches, JWKS key sets and OIDC
//! discovery documents, and the validated parse step they pass through
//! before they may be stored.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::DecodingKey;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::cache::{
    CacheOptions, ResourceCache, DEFAULT_MAX_ENTRIES, JWKS_MEMORY_TTL_MS, JWKS_STORAGE_TTL_MS,
    OIDC_MEMORY_TTL_MS, OIDC_STORAGE_TTL_MS,
};

/// Persistent namespace of the JWKS cache
pub const JWKS_STORAGE_KEY: &str = "iam-toolkit:jwks-cache";

/// Persistent namespace of the discovery document cache
pub const OIDC_STORAGE_KEY: &str = "iam-toolkit:oidc-config-cache";

const DISCOVERY_SUFFIX: &str = "/.well-known/openid-configuration";

/// Two-tier cache of JWKS documents keyed by JWKS URI.
pub type JwksCache = ResourceCache<Jwks>;

/// Two-tier cache of discovery documents keyed by discovery URL.
pub type OidcConfigCache = ResourceCache<OidcConfiguration>;

// == Schema Error ==
/// A fetched document does not have the required shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Expected a JSON object")]
    NotAnObject,

    #[error("Missing or invalid \"{0}\" member")]
    MissingMember(&'static str),

    #[error("Invalid key at index {index}: {reason}")]
    InvalidKey { index: usize, reason: String },

    #[error("Unusable key: {0}")]
    UnusableKey(String),

    #[error("Invalid document: {0}")]
    Invalid(String),
}

// == Cached Document ==
/// A document type that is validated on its way into a cache.
pub trait CachedDocument: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Human-readable document kind for logs
    const KIND: &'static str;

    /// Validates and converts a raw JSON document.
    fn from_json(value: Value) -> Result<Self, SchemaError>;
}

// == JWKS ==
/// A JSON Web Key Set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

/// Individual JSON Web Key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type (RSA, EC, OKP, oct)
    pub kty: String,
    /// Key ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Algorithm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// Key use (sig, enc)
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    // RSA parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    // EC / OKP parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,

    // Symmetric key material
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,

    /// Members not interpreted here (x5c, x5t, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Jwks {
    /// Returns the key whose `kid` matches.
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }
}

impl CachedDocument for Jwks {
    const KIND: &'static str = "JWKS";

    fn from_json(value: Value) -> Result<Self, SchemaError> {
        let Value::Object(mut object) = value else {
            return Err(SchemaError::NotAnObject);
        };
        let Some(Value::Array(raw_keys)) = object.remove("keys") else {
            return Err(SchemaError::MissingMember("keys"));
        };

        let keys = raw_keys
            .into_iter()
            .enumerate()
            .map(|(index, raw)| {
                serde_json::from_value::<Jwk>(raw).map_err(|e| SchemaError::InvalidKey {
                    index,
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { keys })
    }
}

impl Jwk {
    /// Builds a verification key from the JWK parameters.
    pub fn decoding_key(&self) -> Result<DecodingKey, SchemaError> {
        let missing =
            |member: &str| SchemaError::UnusableKey(format!("{} key missing '{}'", self.kty, member));

        match self.kty.as_str() {
            "RSA" => {
                let n = self.n.as_deref().ok_or_else(|| missing("n"))?;
                let e = self.e.as_deref().ok_or_else(|| missing("e"))?;
                DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| SchemaError::UnusableKey(e.to_string()))
            }
            "EC" => {
                let x = self.x.as_deref().ok_or_else(|| missing("x"))?;
                let y = self.y.as_deref().ok_or_else(|| missing("y"))?;
                DecodingKey::from_ec_components(x, y)
                    .map_err(|e| SchemaError::UnusableKey(e.to_string()))
            }
            "OKP" => {
                let x = self.x.as_deref().ok_or_else(|| missing("x"))?;
                DecodingKey::from_ed_components(x)
                    .map_err(|e| SchemaError::UnusableKey(e.to_string()))
            }
            "oct" => {
                let k = self.k.as_deref().ok_or_else(|| missing("k"))?;
                let secret = URL_SAFE_NO_PAD
                    .decode(k.trim_end_matches('='))
                    .map_err(|e| SchemaError::UnusableKey(e.to_string()))?;
                Ok(DecodingKey::from_secret(&secret))
            }
            kty => Err(SchemaError::UnusableKey(format!("Unsupported key type: {kty}"))),
        }
    }
}

// == OIDC Configuration ==
/// An OpenID Provider discovery document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OidcConfiguration {
    pub issuer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_types_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub id_token_signing_alg_values_supported: Vec<String>,
    /// Provider-specific metadata
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CachedDocument for OidcConfiguration {
    const KIND: &'static str = "OIDC configuration";

    fn from_json(value: Value) -> Result<Self, SchemaError> {
        let Value::Object(object) = &value else {
            return Err(SchemaError::NotAnObject);
        };
        if !object.get("issuer").is_some_and(Value::is_string) {
            return Err(SchemaError::MissingMember("issuer"));
        }
        serde_json::from_value(value).map_err(|e| SchemaError::Invalid(e.to_string()))
    }
}

// == Options ==
/// Default options of the JWKS cache.
pub fn jwks_cache_options() -> CacheOptions {
    CacheOptions::new(JWKS_STORAGE_KEY, JWKS_MEMORY_TTL_MS, JWKS_STORAGE_TTL_MS)
        .with_max_entries(DEFAULT_MAX_ENTRIES)
}

/// Default options of the discovery document cache.
pub fn oidc_cache_options() -> CacheOptions {
    CacheOptions::new(OIDC_STORAGE_KEY, OIDC_MEMORY_TTL_MS, OIDC_STORAGE_TTL_MS)
        .with_max_entries(DEFAULT_MAX_ENTRIES)
}

// == Discovery URL ==
/// Turns an issuer URL into its discovery document URL.
///
/// Already-complete discovery URLs are returned unchanged.
pub fn discovery_url(issuer: &str) -> String {
    let issuer = issuer.trim_end_matches('/');
    if issuer.ends_with(DISCOVERY_SUFFIX) {
        issuer.to_string()
    } else {
        format!("{issuer}{DISCOVERY_SUFFIX}")
    }
}
