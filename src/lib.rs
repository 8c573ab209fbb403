//! IAM Cache - JWKS and OIDC discovery caching with signature verification
//!
//! Two-tier (memory + persistent) caching of identity provider documents,
//! in-flight fetch de-duplication, and JWT signature checks that refresh the
//! key set once when a signing key has rotated.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod tasks;
pub mod verify;

pub use api::{create_router, AppState};
pub use cache::{Jwks, OidcConfiguration, ResourceCache, SharedCache};
pub use config::Config;
pub use fetch::{FetchError, JsonFetcher, ReqwestFetcher};
pub use tasks::{spawn_cleanup_task, spawn_warm_task};
pub use verify::{JwksVerifier, VerificationResult};
