//! Core types shared across the ingot bulk-import toolchain.
//!
//! This crate provides the foundational types used throughout the importer:
//! - The table model consumed by the request planner (tables, partitions,
//!   indexes and their lifecycle states)
//! - The keyspace layout (record and index key prefixes, range successors)
//! - The region model exposed by the cluster topology (regions, peers, stores)
//! - Collaborator traits for the region topology and the row-handle encoder
//! - A small retry/backoff utility used by the networked paths

#![deny(unsafe_code)]

pub mod handle;
pub mod keys;
pub mod kv;
pub mod region;
pub mod retry;
pub mod table;
pub mod topology;

// Re-export commonly used types at crate root
pub use handle::{Handle, HandleDecodeError, HandleEncoder};
pub use keys::KeyRange;
pub use kv::KvPair;
pub use region::{Peer, RegionEpoch, RegionInfo, StoreInfo};
pub use table::{IndexId, IndexInfo, IndexState, PartitionInfo, TableId, TableInfo};
pub use topology::{RegionTopology, TopologyError};
