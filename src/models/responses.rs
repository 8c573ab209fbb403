//! Response DTOs for the HTTP API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::{CacheStats, Jwks};
use crate::verify::VerificationResult;

/// Response body for POST /verify
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Key set fetched during verification, so the client can replace its copy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refreshed_jwks: Option<Jwks>,
}

impl VerifyResponse {
    pub fn new(result: VerificationResult, refreshed_jwks: Option<Jwks>) -> Self {
        Self {
            valid: result.valid,
            error: result.error,
            refreshed_jwks,
        }
    }
}

/// Response body for GET /stats
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub jwks: CacheStats,
    pub oidc: CacheStats,
}

/// Response body for the DELETE endpoints
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    /// Success message
    pub message: String,
}

impl ClearResponse {
    pub fn all() -> Self {
        Self {
            message: "All caches cleared".to_string(),
        }
    }

    pub fn removed(key: impl AsRef<str>) -> Self {
        Self {
            message: format!("Entry '{}' removed", key.as_ref()),
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
