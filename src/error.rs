//! Error types for the HTTP surface
//!
//! Cache and verification operations do not fail; these errors only cover
//! bad requests and upstream fetches made on a client's behalf.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::cache::SchemaError;
use crate::fetch::FetchError;

// == API Error Enum ==
/// Unified error type for the HTTP API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Client supplied a document with the wrong shape
    #[error("Invalid document: {0}")]
    InvalidDocument(#[from] SchemaError),

    /// Upstream identity provider could not be reached or answered badly
    #[error("Upstream fetch failed: {0}")]
    Upstream(#[from] FetchError),
}

// == IntoResponse Implementation ==
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidDocument(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the HTTP API.
pub type Result<T> = std::result::Result<T, ApiError>;
