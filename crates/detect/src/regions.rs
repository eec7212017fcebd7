//! Paged region scans.

use ingot_types::{RegionInfo, RegionTopology, TopologyError};

/// Collects the contiguous set of regions covering `[start, end)` by issuing
/// `limit`-sized pages until the cover reaches `end`.
///
/// Keys are in the cluster's encoded form; an empty `end` means +∞.
pub async fn paginate_scan_regions(
    topology: &dyn RegionTopology,
    start: &[u8],
    end: &[u8],
    limit: usize,
) -> Result<Vec<RegionInfo>, TopologyError> {
    let mut regions = Vec::new();
    let mut cursor = start.to_vec();
    loop {
        let page = topology.scan_regions(&cursor, end, limit).await?;
        let page_len = page.len();
        let Some(last) = page.last() else { break };
        let last_end = last.end_key.clone();
        regions.extend(page);
        let covered =
            last_end.is_empty() || (!end.is_empty() && last_end.as_slice() >= end);
        if covered || page_len < limit {
            break;
        }
        cursor = last_end;
    }
    Ok(regions)
}
