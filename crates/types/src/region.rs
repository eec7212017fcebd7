//! Region model: the sharding of the remote key space.
//!
//! Region boundary keys are in the cluster's memcomparable-encoded form; an
//! empty end key means the region extends to +∞. The topology refreshes a
//! region's metadata whenever the server reports an epoch change.

use serde::{Deserialize, Serialize};

/// Version pair tracking a region's membership and range changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionEpoch {
    /// Bumped on membership (replica set) changes.
    pub conf_ver: u64,
    /// Bumped on splits and merges.
    pub version: u64,
}

/// One replica of a region, living on a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// Peer identifier.
    pub id: u64,
    /// Identifier of the store hosting this peer.
    pub store_id: u64,
}

/// A contiguous `[start_key, end_key)` shard of the remote key space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionInfo {
    /// Region identifier.
    pub id: u64,
    /// Encoded inclusive start key.
    pub start_key: Vec<u8>,
    /// Encoded exclusive end key; empty means +∞.
    pub end_key: Vec<u8>,
    /// Current epoch.
    pub epoch: RegionEpoch,
    /// Leader replica, if known.
    pub leader: Option<Peer>,
    /// All replicas.
    pub peers: Vec<Peer>,
}

impl RegionInfo {
    /// The peer requests should be sent to: the leader when known, otherwise
    /// the first replica.
    pub fn leader_or_first(&self) -> Option<Peer> {
        self.leader.or_else(|| self.peers.first().copied())
    }

    /// Whether `key` (encoded form) falls inside this region's range.
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start_key.as_slice() && (self.end_key.is_empty() || key < self.end_key.as_slice())
    }
}

/// A store (node) of the remote cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreInfo {
    /// Store identifier.
    pub id: u64,
    /// Client address.
    pub address: String,
    /// Peer-to-peer address; preferred for dialing when non-empty.
    pub peer_address: String,
}

impl StoreInfo {
    /// Address to dial, preferring the peer address when present.
    pub fn dial_address(&self) -> &str {
        if self.peer_address.is_empty() { &self.address } else { &self.peer_address }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(start: &[u8], end: &[u8]) -> RegionInfo {
        RegionInfo {
            id: 1,
            start_key: start.to_vec(),
            end_key: end.to_vec(),
            epoch: RegionEpoch::default(),
            leader: None,
            peers: vec![Peer { id: 10, store_id: 100 }],
        }
    }

    #[test]
    fn contains_respects_bounds() {
        let r = region(b"b", b"d");
        assert!(!r.contains(b"a"));
        assert!(r.contains(b"b"));
        assert!(r.contains(b"c"));
        assert!(!r.contains(b"d"));
    }

    #[test]
    fn empty_end_is_unbounded() {
        let r = region(b"b", b"");
        assert!(r.contains(b"zzzz"));
    }

    #[test]
    fn leader_falls_back_to_first_peer() {
        let r = region(b"", b"");
        assert_eq!(r.leader_or_first(), Some(Peer { id: 10, store_id: 100 }));
    }
}
