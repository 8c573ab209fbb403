//! Verify Module
//!
//! JWT signature verification against JWKS with refresh on key rotation.

mod token;
mod verifier;

pub use token::{DecodedToken, TokenError, TokenHeader};
pub use verifier::{
    JwksVerifier, RefreshCallback, VerificationResult, MISSING_KID, NO_KEYS, SIGNATURE_FAILED,
};
