//! Shared test utilities for ingot crates.
//!
//! This crate provides common test helpers to reduce boilerplate across test
//! modules:
//!
//! - [`MockStore`] / [`spawn_mock_store`] - In-process gRPC store serving
//!   scripted duplicate-detect streams and batched gets
//! - [`MockTopology`] - In-memory region topology with call counters
//! - [`RowIdSuffixEncoder`] - Handle encoder for index values carrying an
//!   integer row id suffix

#![deny(unsafe_code)]
// Test utilities are allowed to panic for simplicity
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod encoder;
mod store;
mod topology;

pub use encoder::{index_value_with_row_id, RowIdSuffixEncoder};
pub use store::{
    pairs_response, region_error_response, spawn_mock_store, DetectScript, MockStore,
    MockStoreServer,
};
pub use topology::MockTopology;

use rand::RngCore;

/// Returns `len` random bytes.
pub fn rand_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Installs a test subscriber honoring `RUST_LOG`. Safe to call from every
/// test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
