//! Fetch Module
//!
//! The network capability the cache and verifier consume. Production code
//! uses [`ReqwestFetcher`]; tests substitute their own [`JsonFetcher`].

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

// == Fetch Error ==
/// Failure to obtain a JSON document from a URL.
///
/// `Clone` because a single in-flight fetch may be awaited by several callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Request never produced a response (DNS, connect, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Response carried a non-success status
    #[error("HTTP {status}: {status_text}")]
    Status { status: u16, status_text: String },

    /// Body was not JSON or not the expected document shape
    #[error("Malformed response: {0}")]
    Malformed(String),
}

// == Json Fetcher ==
/// Fetches a URL and parses the body as JSON.
#[async_trait]
pub trait JsonFetcher: Send + Sync {
    async fn fetch_json(&self, url: &str) -> Result<Value, FetchError>;
}

// == Reqwest Fetcher ==
/// [`JsonFetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    /// Creates a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("iam_cache/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl JsonFetcher for ReqwestFetcher {
    async fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        debug!(url = %url, "Fetching JSON document");

        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::Malformed(e.to_string()))
    }
}
