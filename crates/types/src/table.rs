//! Table model consumed by the duplicate-detection request planner.
//!
//! Only the slice of schema information the importer needs: table and
//! partition identifiers plus index descriptors with their lifecycle state.

use serde::{Deserialize, Serialize};

/// Identifier of a table (or of a partition's physical table).
pub type TableId = i64;

/// Identifier of an index within its table.
pub type IndexId = i64;

/// Lifecycle state of an index in the schema-change state machine.
///
/// Only [`IndexState::Public`] indexes are visible to readers and therefore
/// participate in duplicate detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexState {
    /// The index does not exist yet.
    None,
    /// The index only observes deletions.
    DeleteOnly,
    /// The index observes writes but is not readable.
    WriteOnly,
    /// The index is fully built and readable.
    Public,
}

/// An index descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    /// Index identifier, unique within the owning table.
    pub id: IndexId,
    /// Index name as declared in the schema.
    pub name: String,
    /// Lifecycle state; only `Public` indexes are planned.
    pub state: IndexState,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
}

/// A partition of a partitioned table.
///
/// Each partition owns a distinct physical table id, so its row keys live in
/// their own keyspace range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionInfo {
    /// Physical table id of the partition.
    pub id: TableId,
    /// Partition name.
    pub name: String,
}

/// Table descriptor: the planner's input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Logical table id.
    pub id: TableId,
    /// Table name.
    pub name: String,
    /// Partitions, empty for an unpartitioned table.
    #[serde(default)]
    pub partitions: Vec<PartitionInfo>,
    /// Index descriptors in schema order.
    #[serde(default)]
    pub indices: Vec<IndexInfo>,
}

impl TableInfo {
    /// Returns the indexes that are readable and therefore subject to
    /// duplicate detection.
    pub fn public_indices(&self) -> impl Iterator<Item = &IndexInfo> {
        self.indices.iter().filter(|idx| idx.state == IndexState::Public)
    }
}
