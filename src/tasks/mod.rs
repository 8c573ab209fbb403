//! Background Tasks Module
//!
//! Contains background tasks that run alongside the HTTP server.
//!
//! # Tasks
//! - Purge: Removes expired cache entries at configured intervals
//! - Warm: Pre-populates the discovery cache once at startup

mod cleanup;
mod warm;

pub use cleanup::spawn_cleanup_task;
pub use warm::spawn_warm_task;
