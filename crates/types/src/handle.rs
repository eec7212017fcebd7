//! Row-handle encoder collaborator trait.
//!
//! An index entry references its owning table row through a handle. The full
//! row-format codec lives outside this toolchain; duplicate detection only
//! needs to map an index entry back to its row key, which this trait models.

use snafu::Snafu;

use crate::table::{IndexId, IndexInfo};

/// A compact row identifier recovered from an index entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Handle {
    /// Integer primary key.
    Int(i64),
    /// Clustered (common) handle: the encoded primary-key column bytes.
    Common(Vec<u8>),
}

/// Errors from mapping an index entry to its row handle.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum HandleDecodeError {
    /// The index entry's value is too short to carry a handle.
    #[snafu(display("index {index_id} value too short: {len} bytes"))]
    ShortIndexValue {
        /// Index identifier.
        index_id: IndexId,
        /// Observed value length.
        len: usize,
    },

    /// The entry is structurally invalid.
    #[snafu(display("malformed index entry: {message}"))]
    Malformed {
        /// Failure description.
        message: String,
    },
}

/// Maps index entries to row handles and handles to row keys.
///
/// Implementations are bound to one table.
pub trait HandleEncoder: Send + Sync {
    /// Recovers the row handle referenced by an index entry.
    fn decode_handle_from_index(
        &self,
        index: &IndexInfo,
        key: &[u8],
        value: &[u8],
    ) -> Result<Handle, HandleDecodeError>;

    /// Encodes the row key a handle points at.
    fn encode_handle_key(&self, handle: &Handle) -> Vec<u8>;
}
