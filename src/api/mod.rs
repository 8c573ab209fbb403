//! API Module
//!
//! HTTP handlers and routing for the JWKS / discovery cache service.
//!
//! # Endpoints
//! - `GET /jwks?uri=` - Key set through the cache
//! - `GET /oidc?issuer=` - Discovery document through the cache
//! - `POST /verify` - Signature verification with JWKS refresh
//! - `GET /stats` - Cache statistics
//! - `DELETE /cache` - Clear both caches
//! - `DELETE /cache/jwks?uri=` - Drop one key set
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
