//! In-memory region topology.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ingot_types::{
    Peer, RegionEpoch, RegionInfo, RegionTopology, StoreInfo, TopologyError,
};
use parking_lot::Mutex;

/// A fixed region map with call counters.
///
/// Regions are held in key order; `scan_regions` answers with the slice
/// intersecting the requested range, `get_store` counts lookups so tests can
/// assert how many dials the pool performed.
#[derive(Default)]
pub struct MockTopology {
    regions: Mutex<Vec<RegionInfo>>,
    stores: Mutex<HashMap<u64, StoreInfo>>,
    get_store_calls: AtomicUsize,
    scan_calls: AtomicUsize,
}

impl MockTopology {
    /// An empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// A topology with one region spanning the whole key space, led by a
    /// peer on `store_id` reachable at `addr`.
    pub fn single_region(store_id: u64, addr: SocketAddr) -> Self {
        let topology = Self::new();
        let peer = Peer { id: store_id * 10 + 1, store_id };
        topology.insert_region(RegionInfo {
            id: 1,
            start_key: Vec::new(),
            end_key: Vec::new(),
            epoch: RegionEpoch { conf_ver: 1, version: 1 },
            leader: Some(peer),
            peers: vec![peer],
        });
        topology.insert_store(StoreInfo {
            id: store_id,
            address: addr.to_string(),
            peer_address: String::new(),
        });
        topology
    }

    /// Adds or replaces a region, keeping the map sorted by start key.
    pub fn insert_region(&self, region: RegionInfo) {
        let mut regions = self.regions.lock();
        regions.retain(|existing| existing.id != region.id);
        regions.push(region);
        regions.sort_by(|a, b| a.start_key.cmp(&b.start_key));
    }

    /// Registers a store.
    pub fn insert_store(&self, store: StoreInfo) {
        self.stores.lock().insert(store.id, store);
    }

    /// How many times `get_store` resolved an address (a proxy for dials).
    pub fn get_store_calls(&self) -> usize {
        self.get_store_calls.load(Ordering::SeqCst)
    }

    /// How many region-scan pages were requested.
    pub fn scan_calls(&self) -> usize {
        self.scan_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegionTopology for MockTopology {
    async fn scan_regions(
        &self,
        start: &[u8],
        end: &[u8],
        limit: usize,
    ) -> Result<Vec<RegionInfo>, TopologyError> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        let regions = self
            .regions
            .lock()
            .iter()
            .filter(|region| {
                let after_start =
                    region.end_key.is_empty() || region.end_key.as_slice() > start;
                let before_end = end.is_empty() || region.start_key.as_slice() < end;
                after_start && before_end
            })
            .take(limit)
            .cloned()
            .collect();
        Ok(regions)
    }

    async fn get_region_by_id(&self, region_id: u64) -> Result<RegionInfo, TopologyError> {
        self.regions
            .lock()
            .iter()
            .find(|region| region.id == region_id)
            .cloned()
            .ok_or(TopologyError::RegionNotFound { region_id })
    }

    async fn get_store(&self, store_id: u64) -> Result<StoreInfo, TopologyError> {
        self.get_store_calls.fetch_add(1, Ordering::SeqCst);
        self.stores
            .lock()
            .get(&store_id)
            .cloned()
            .ok_or(TopologyError::StoreNotFound { store_id })
    }
}
