//! Request planner.
//!
//! Translates a table descriptor into the set of key ranges duplicate
//! detection must cover: the row-key range of the table (or of each
//! partition) plus the range of every public index. The planner works purely
//! on the keyspace layout; it never consults the region map.

use ingot_types::keys;
use ingot_types::{IndexId, IndexInfo, TableId, TableInfo};

/// One key range to run duplicate detection over.
///
/// Requests are closed-open `[start, end)` over raw (unencoded) keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateRequest {
    /// Logical table the range belongs to.
    pub table_id: TableId,
    /// Index the range covers; `0` marks a table (row-key) request.
    pub index_id: IndexId,
    /// Inclusive start key.
    pub start: Vec<u8>,
    /// Exclusive end key.
    pub end: Vec<u8>,
    /// Index descriptor, present only on index requests.
    pub index_info: Option<IndexInfo>,
}

impl DuplicateRequest {
    /// Whether this request covers row keys rather than an index.
    pub fn is_table_request(&self) -> bool {
        self.index_info.is_none()
    }
}

fn table_request(table_id: TableId) -> DuplicateRequest {
    let range = keys::record_range(table_id);
    DuplicateRequest { table_id, index_id: 0, start: range.start, end: range.end, index_info: None }
}

fn index_request(table_id: TableId, index: &IndexInfo) -> DuplicateRequest {
    let range = keys::index_range(table_id, index.id);
    DuplicateRequest {
        table_id,
        index_id: index.id,
        start: range.start,
        end: range.end,
        index_info: Some(index.clone()),
    }
}

/// Plans the duplicate-detection requests for one table: one per partition's
/// row-key range (one for the table itself when unpartitioned) and one per
/// public index.
pub fn build_duplicate_requests(table: &TableInfo) -> Vec<DuplicateRequest> {
    let mut requests = Vec::new();
    if table.partitions.is_empty() {
        requests.push(table_request(table.id));
    } else {
        for partition in &table.partitions {
            requests.push(table_request(partition.id));
        }
    }
    for index in table.public_indices() {
        requests.push(index_request(table.id, index));
    }
    requests
}

#[cfg(test)]
mod tests {
    use ingot_types::IndexState;

    use super::*;

    fn index(id: IndexId, state: IndexState) -> IndexInfo {
        IndexInfo { id, name: format!("idx_{id}"), state, unique: false }
    }

    #[test]
    fn unpartitioned_table_without_indexes_yields_one_request() {
        let table =
            TableInfo { id: 4, name: "t".into(), partitions: vec![], indices: vec![] };
        let requests = build_duplicate_requests(&table);
        assert_eq!(requests.len(), 1);
        assert!(requests[0].is_table_request());
        assert_eq!(requests[0].start, keys::record_range(4).start);
        assert_eq!(requests[0].end, keys::record_range(4).end);
    }

    #[test]
    fn only_public_indexes_are_planned() {
        let table = TableInfo {
            id: 4,
            name: "t".into(),
            partitions: vec![],
            indices: vec![
                index(1, IndexState::Public),
                index(2, IndexState::WriteOnly),
                index(3, IndexState::DeleteOnly),
                index(4, IndexState::Public),
            ],
        };
        let requests = build_duplicate_requests(&table);
        assert_eq!(requests.len(), 3);
        let index_ids: Vec<_> = requests.iter().map(|r| r.index_id).collect();
        assert_eq!(index_ids, vec![0, 1, 4]);
    }

    #[test]
    fn partitions_and_indexes_cover_disjoint_ranges() {
        // p partitions and k public indexes yield exactly p + k requests.
        let table = TableInfo {
            id: 9,
            name: "t".into(),
            partitions: vec![
                ingot_types::PartitionInfo { id: 101, name: "p0".into() },
                ingot_types::PartitionInfo { id: 102, name: "p1".into() },
                ingot_types::PartitionInfo { id: 103, name: "p2".into() },
            ],
            indices: vec![index(1, IndexState::Public), index(2, IndexState::Public)],
        };
        let requests = build_duplicate_requests(&table);
        assert_eq!(requests.len(), 5);

        // Pairwise disjoint: sorted by start, each range ends before the
        // next begins.
        let mut ranges: Vec<_> =
            requests.iter().map(|r| (r.start.clone(), r.end.clone())).collect();
        ranges.sort();
        for pair in ranges.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "ranges overlap: {pair:02x?}");
        }

        // Exact cover: every partition's record range and every public
        // index range is present.
        for partition_id in [101, 102, 103] {
            let range = keys::record_range(partition_id);
            assert!(requests.iter().any(|r| r.start == range.start && r.end == range.end));
        }
        for index_id in [1, 2] {
            let range = keys::index_range(9, index_id);
            assert!(requests.iter().any(|r| r.start == range.start && r.end == range.end));
        }
    }
}
