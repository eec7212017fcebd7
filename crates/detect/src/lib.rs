//! Duplicate-detection orchestration for the ingot bulk importer.
//!
//! This crate provides the remote half of duplicate detection:
//! - A per-store connection pool producing typed streaming and batched
//!   clients ([`pool`])
//! - A planner translating a table descriptor into key-range requests
//!   ([`planner`])
//! - The duplicate manager fanning requests out over the live region map,
//!   persisting collisions and reconciling index entries against the
//!   authoritative remote values ([`manager`])

#![deny(unsafe_code)]
// gRPC clients return tonic::Status - standard practice for gRPC error handling
#![allow(clippy::result_large_err)]

pub mod config;
pub mod manager;
pub mod planner;
pub mod pool;
pub mod regions;
pub mod waiter;

pub use config::DetectConfig;
pub use manager::{DetectError, DuplicateManager};
pub use planner::{build_duplicate_requests, DuplicateRequest};
pub use pool::{ClientPool, PoolConfig, PoolError};
pub use regions::paginate_scan_regions;
pub use waiter::TableWaiters;
