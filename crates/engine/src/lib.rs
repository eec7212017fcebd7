//! Local sorted-run engine for the ingot bulk importer.
//!
//! This crate provides the local half of duplicate detection:
//! - An order-preserving key codec that suffixes each user key with its
//!   `(row_id, offset)` source position ([`codec`])
//! - A thin wrapper over an embedded LSM holding one sorted run, with a
//!   lazily created sibling store for collision records ([`store`])
//! - An iterator adapter that fuses entries sharing one user key while
//!   diverting every group member into the collision store ([`iterator`])

#![deny(unsafe_code)]

pub mod codec;
pub mod iterator;
pub mod store;

pub use iterator::{DuplicateIter, DuplicateSink, KvIter};
pub use store::{Engine, EngineId, EngineOptions, EngineState, IterOptions, StoreIter, WriteBatch};

use snafu::Snafu;

/// Errors surfaced by the local engine.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum EngineError {
    /// The engine was closed; no further writes or iterators are allowed.
    #[snafu(display("engine is closed"))]
    ClosedEngine,

    /// An operation was attempted from the wrong lifecycle state.
    #[snafu(display("invalid engine state {state:?}, expected {expected:?}"))]
    InvalidState {
        /// Observed state.
        state: store::EngineState,
        /// State the operation requires.
        expected: store::EngineState,
    },

    /// The embedded store failed.
    #[snafu(display("storage error: {source}"))]
    Storage {
        /// Underlying LSM error.
        source: fjall::Error,
    },

    /// A stored key could not be decoded.
    #[snafu(display("key codec error: {source}"))]
    Codec {
        /// Underlying codec error.
        source: codec::CodecError,
    },

    /// Filesystem operation outside the store failed.
    #[snafu(display("i/o error: {source}"))]
    Io {
        /// Underlying I/O error.
        source: std::io::Error,
    },
}
