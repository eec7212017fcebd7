//! Keyspace layout for table rows and index entries.
//!
//! Row keys are `t{table_id}_r{handle}` and index keys are
//! `t{table_id}_i{index_id}...`, with the numeric components encoded so that
//! byte order equals numeric order. The layout guarantees that record ranges
//! and index ranges of one table never overlap: `_i` sorts before `_r`.

use serde::{Deserialize, Serialize};

use crate::table::{IndexId, TableId};

const TABLE_PREFIX: u8 = b't';
const RECORD_SEP: &[u8] = b"_r";
const INDEX_SEP: &[u8] = b"_i";
const SIGN_MASK: u64 = 0x8000_0000_0000_0000;

/// A closed-open `[start, end)` key range. An empty `end` means +∞.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    /// Inclusive lower bound.
    pub start: Vec<u8>,
    /// Exclusive upper bound; empty means unbounded.
    pub end: Vec<u8>,
}

impl KeyRange {
    /// The range covering every key starting with `prefix`.
    pub fn from_prefix(prefix: Vec<u8>) -> Self {
        let end = prefix_next(&prefix);
        Self { start: prefix, end }
    }
}

/// Appends a signed integer in an order-preserving form: flipping the sign
/// bit makes the big-endian bytes of negative values sort before positives.
pub fn append_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&((v as u64) ^ SIGN_MASK).to_be_bytes());
}

/// Decodes an integer written by [`append_i64`].
pub fn decode_i64(data: &[u8]) -> Option<i64> {
    let bytes: [u8; 8] = data.get(..8)?.try_into().ok()?;
    Some((u64::from_be_bytes(bytes) ^ SIGN_MASK) as i64)
}

/// Prefix of every row key of `table_id`.
pub fn record_prefix(table_id: TableId) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 8 + RECORD_SEP.len());
    key.push(TABLE_PREFIX);
    append_i64(&mut key, table_id);
    key.extend_from_slice(RECORD_SEP);
    key
}

/// Prefix of every entry of index `index_id` of `table_id`.
pub fn index_prefix(table_id: TableId, index_id: IndexId) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 8 + INDEX_SEP.len() + 8);
    key.push(TABLE_PREFIX);
    append_i64(&mut key, table_id);
    key.extend_from_slice(INDEX_SEP);
    append_i64(&mut key, index_id);
    key
}

/// Row key of the row identified by an integer handle.
pub fn record_key(table_id: TableId, handle: i64) -> Vec<u8> {
    let mut key = record_prefix(table_id);
    append_i64(&mut key, handle);
    key
}

/// Smallest key strictly greater than every key starting with `key`.
///
/// Returns an empty vector (the +∞ sentinel) when no such finite key exists,
/// i.e. when `key` is all `0xFF`.
pub fn prefix_next(key: &[u8]) -> Vec<u8> {
    let mut next = key.to_vec();
    for i in (0..next.len()).rev() {
        if next[i] != 0xFF {
            next[i] += 1;
            next.truncate(i + 1);
            return next;
        }
    }
    Vec::new()
}

/// The full range of row keys of `table_id`.
pub fn record_range(table_id: TableId) -> KeyRange {
    KeyRange::from_prefix(record_prefix(table_id))
}

/// The full range of entries of one index.
pub fn index_range(table_id: TableId, index_id: IndexId) -> KeyRange {
    KeyRange::from_prefix(index_prefix(table_id, index_id))
}
