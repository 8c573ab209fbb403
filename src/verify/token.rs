//! Compact JWS decoding.
//!
//! Structural decoding only: no signature or claim is checked here.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token must have 3 segments, found {0}")]
    SegmentCount(usize),

    #[error("header is not valid base64url")]
    HeaderEncoding,

    #[error("header is not a valid JSON object: {0}")]
    HeaderJson(String),
}

/// The protected header of a compact JWS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenHeader {
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A compact JWS split into its parts.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedToken {
    pub header: TokenHeader,
    /// Decoded payload, when it is JSON
    pub payload: Option<Value>,
    /// `header.payload` exactly as it appeared in the token
    pub signing_input: String,
    /// Signature segment, still base64url encoded
    pub signature: String,
}

impl DecodedToken {
    pub fn decode(token: &str) -> Result<Self, TokenError> {
        let segments: Vec<&str> = token.trim().split('.').collect();
        let [header_b64, payload_b64, signature] = segments.as_slice() else {
            return Err(TokenError::SegmentCount(segments.len()));
        };

        let header_bytes = decode_segment(header_b64).ok_or(TokenError::HeaderEncoding)?;
        let header: TokenHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| TokenError::HeaderJson(e.to_string()))?;

        let payload = decode_segment(payload_b64)
            .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok());

        Ok(Self {
            header,
            payload,
            signing_input: format!("{header_b64}.{payload_b64}"),
            signature: signature.to_string(),
        })
    }
}

fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(segment.trim_end_matches('=')).ok()
}
