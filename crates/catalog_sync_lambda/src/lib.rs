//! AWS-oriented adapters and handlers for catalog synchronization.
//!
//! This crate owns runtime integration details (Lambda handlers, Redis and S3
//! adapters, credential caching, environment configuration). The rebuild and
//! read algorithms themselves live in `catalog_sync_core`.

pub mod adapters;
pub mod config;
pub mod context;
pub mod handlers;
pub mod telemetry;
