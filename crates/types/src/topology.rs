//! Region topology collaborator trait.
//!
//! The importer never owns cluster metadata; it consumes it through this
//! trait. Production wires it to the placement driver's client, tests wire it
//! to an in-memory map.

use async_trait::async_trait;
use snafu::Snafu;

use crate::region::{RegionInfo, StoreInfo};

/// Errors surfaced by topology lookups.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TopologyError {
    /// The store is not registered with the cluster.
    #[snafu(display("store {store_id} not found"))]
    StoreNotFound {
        /// Store identifier.
        store_id: u64,
    },

    /// The region is not known (e.g. merged away).
    #[snafu(display("region {region_id} not found"))]
    RegionNotFound {
        /// Region identifier.
        region_id: u64,
    },

    /// A region scan failed or returned an inconsistent cover.
    #[snafu(display("region scan failed: {message}"))]
    Scan {
        /// Failure description.
        message: String,
    },
}

/// Read access to the sharding of the remote key space.
///
/// Keys are in the cluster's encoded (memcomparable) form.
#[async_trait]
pub trait RegionTopology: Send + Sync {
    /// Returns up to `limit` regions intersecting `[start, end)`, in key
    /// order, starting from the region containing `start`.
    async fn scan_regions(
        &self,
        start: &[u8],
        end: &[u8],
        limit: usize,
    ) -> Result<Vec<RegionInfo>, TopologyError>;

    /// Returns the current metadata of one region.
    async fn get_region_by_id(&self, region_id: u64) -> Result<RegionInfo, TopologyError>;

    /// Returns the store hosting a peer.
    async fn get_store(&self, store_id: u64) -> Result<StoreInfo, TopologyError>;
}
