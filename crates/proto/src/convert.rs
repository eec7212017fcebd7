//! Conversions from `ingot-types` domain types to wire types.

use ingot_types::{Peer, RegionEpoch, RegionInfo};

use crate::proto;

impl From<RegionEpoch> for proto::RegionEpoch {
    fn from(epoch: RegionEpoch) -> Self {
        Self { conf_ver: epoch.conf_ver, version: epoch.version }
    }
}

impl From<Peer> for proto::Peer {
    fn from(peer: Peer) -> Self {
        Self { id: peer.id, store_id: peer.store_id }
    }
}

/// Builds the request routing context addressed at a region's peer.
///
/// `peer` is usually the region's leader; it is passed explicitly because the
/// caller already resolved the fallback when no leader is known.
pub fn region_context(region: &RegionInfo, peer: Peer) -> proto::Context {
    proto::Context {
        region_id: region.id,
        region_epoch: Some(region.epoch.into()),
        peer: Some(peer.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_carries_epoch_and_peer() {
        let region = RegionInfo {
            id: 7,
            start_key: vec![],
            end_key: vec![],
            epoch: RegionEpoch { conf_ver: 2, version: 9 },
            leader: Some(Peer { id: 71, store_id: 1 }),
            peers: vec![Peer { id: 71, store_id: 1 }],
        };
        let ctx = region_context(&region, region.leader_or_first().unwrap());
        assert_eq!(ctx.region_id, 7);
        assert_eq!(ctx.region_epoch, Some(proto::RegionEpoch { conf_ver: 2, version: 9 }));
        assert_eq!(ctx.peer, Some(proto::Peer { id: 71, store_id: 1 }));
    }
}
