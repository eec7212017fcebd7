//! Duplicate-fusing iterator.
//!
//! [`DuplicateIter`] walks a store of suffix-encoded keys and surfaces
//! exactly one entry per distinct user key. Whenever a group of entries
//! shares a user key, every member of the group (including the surviving
//! one) is diverted to a [`DuplicateSink`]. The adapter is generic over
//! [`KvIter`] so it can run over the real store or an in-memory substitute.

use crate::codec;
use crate::EngineError;

/// Movement-based iterator over encoded key-value entries.
///
/// Movement methods return `Ok(true)` while positioned on an entry; the
/// first storage failure is returned by the movement that hit it.
pub trait KvIter {
    /// Positions at the smallest entry.
    fn first(&mut self) -> Result<bool, EngineError>;
    /// Positions at the greatest entry.
    fn last(&mut self) -> Result<bool, EngineError>;
    /// Advances to the next entry.
    fn next(&mut self) -> Result<bool, EngineError>;
    /// Moves back to the previous entry.
    fn prev(&mut self) -> Result<bool, EngineError>;
    /// Whether the iterator is positioned on an entry.
    fn valid(&self) -> bool;
    /// Key of the current entry; empty when not valid.
    fn key(&self) -> &[u8];
    /// Value of the current entry; empty when not valid.
    fn value(&self) -> &[u8];
    /// Releases underlying resources.
    fn close(&mut self) -> Result<(), EngineError>;
}

/// Receiver of collision records.
pub trait DuplicateSink {
    /// Accepts one member of a collision group as a full
    /// `(encoded_key, value)` tuple.
    fn record(&mut self, encoded_key: &[u8], value: &[u8]) -> Result<(), EngineError>;
    /// Persists buffered records.
    fn flush(&mut self) -> Result<(), EngineError>;
}

/// Iterator that collapses entries sharing one user key into a single
/// visible entry and diverts collision groups to a sink.
///
/// Going forward the visible entry is the group member with the smallest
/// encoded key, i.e. the smallest `(row_id, offset)`; `prev` mirrors the
/// behavior in the backward direction. `key()` returns the decoded user key,
/// `value()` the surviving member's value.
pub struct DuplicateIter<I, S> {
    inner: I,
    sink: S,
    cur_key: Vec<u8>,
    cur_raw_key: Vec<u8>,
    cur_val: Vec<u8>,
    valid: bool,
}

impl<I: KvIter, S: DuplicateSink> DuplicateIter<I, S> {
    /// Wraps an iterator of suffix-encoded entries.
    pub fn new(inner: I, sink: S) -> Self {
        Self {
            inner,
            sink,
            cur_key: Vec::new(),
            cur_raw_key: Vec::new(),
            cur_val: Vec::new(),
            valid: false,
        }
    }

    fn fill_current(&mut self) -> Result<(), EngineError> {
        let (key, _, _) =
            codec::decode_key_suffix(self.inner.key()).map_err(|source| EngineError::Codec { source })?;
        self.cur_key = key;
        self.cur_raw_key.clear();
        self.cur_raw_key.extend_from_slice(self.inner.key());
        self.cur_val.clear();
        self.cur_val.extend_from_slice(self.inner.value());
        self.valid = true;
        Ok(())
    }

    /// Positions at the smallest user key; `false` when the store is empty.
    pub fn first(&mut self) -> Result<bool, EngineError> {
        if !self.inner.first()? {
            self.valid = false;
            return Ok(false);
        }
        self.fill_current()?;
        Ok(true)
    }

    /// Positions at the greatest user key; `false` when the store is empty.
    pub fn last(&mut self) -> Result<bool, EngineError> {
        if !self.inner.last()? {
            self.valid = false;
            return Ok(false);
        }
        self.fill_current()?;
        Ok(true)
    }

    /// Advances past the entire current user-key group.
    ///
    /// Group members skipped over, including the surviving first member, are
    /// recorded to the sink.
    pub fn next(&mut self) -> Result<bool, EngineError> {
        if !self.valid {
            return Ok(false);
        }
        let mut recorded_first = false;
        while self.inner.next()? {
            let (key, _, _) = codec::decode_key_suffix(self.inner.key())
                .map_err(|source| EngineError::Codec { source })?;
            if key != self.cur_key {
                self.cur_key = key;
                self.cur_raw_key.clear();
                self.cur_raw_key.extend_from_slice(self.inner.key());
                self.cur_val.clear();
                self.cur_val.extend_from_slice(self.inner.value());
                return Ok(true);
            }
            if !recorded_first {
                self.sink.record(&self.cur_raw_key, &self.cur_val)?;
                recorded_first = true;
            }
            self.sink.record(self.inner.key(), self.inner.value())?;
        }
        self.valid = false;
        Ok(false)
    }

    /// Moves back past the entire current user-key group, mirroring
    /// [`DuplicateIter::next`].
    pub fn prev(&mut self) -> Result<bool, EngineError> {
        if !self.valid {
            return Ok(false);
        }
        let mut recorded_first = false;
        while self.inner.prev()? {
            let (key, _, _) = codec::decode_key_suffix(self.inner.key())
                .map_err(|source| EngineError::Codec { source })?;
            if key != self.cur_key {
                self.cur_key = key;
                self.cur_raw_key.clear();
                self.cur_raw_key.extend_from_slice(self.inner.key());
                self.cur_val.clear();
                self.cur_val.extend_from_slice(self.inner.value());
                return Ok(true);
            }
            if !recorded_first {
                self.sink.record(&self.cur_raw_key, &self.cur_val)?;
                recorded_first = true;
            }
            self.sink.record(self.inner.key(), self.inner.value())?;
        }
        self.valid = false;
        Ok(false)
    }

    /// Whether the iterator is positioned on an entry.
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Decoded user key of the visible entry.
    pub fn key(&self) -> &[u8] {
        &self.cur_key
    }

    /// Value of the surviving member.
    pub fn value(&self) -> &[u8] {
        &self.cur_val
    }

    /// Flushes the sink and releases the underlying iterator.
    pub fn close(&mut self) -> Result<(), EngineError> {
        self.sink.flush()?;
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_key_suffix;

    /// In-memory sorted store for exercising the adapter without an LSM.
    struct MemIter {
        entries: Vec<(Vec<u8>, Vec<u8>)>,
        pos: Option<usize>,
    }

    impl MemIter {
        fn new(mut entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
            entries.sort();
            Self { entries, pos: None }
        }
    }

    impl KvIter for MemIter {
        fn first(&mut self) -> Result<bool, EngineError> {
            self.pos = if self.entries.is_empty() { None } else { Some(0) };
            Ok(self.pos.is_some())
        }

        fn last(&mut self) -> Result<bool, EngineError> {
            self.pos = self.entries.len().checked_sub(1);
            Ok(self.pos.is_some())
        }

        fn next(&mut self) -> Result<bool, EngineError> {
            self.pos = match self.pos {
                Some(p) if p + 1 < self.entries.len() => Some(p + 1),
                _ => None,
            };
            Ok(self.pos.is_some())
        }

        fn prev(&mut self) -> Result<bool, EngineError> {
            self.pos = match self.pos {
                Some(p) => p.checked_sub(1),
                None => None,
            };
            Ok(self.pos.is_some())
        }

        fn valid(&self) -> bool {
            self.pos.is_some()
        }

        fn key(&self) -> &[u8] {
            self.pos.map_or(&[], |p| &self.entries[p].0)
        }

        fn value(&self) -> &[u8] {
            self.pos.map_or(&[], |p| &self.entries[p].1)
        }

        fn close(&mut self) -> Result<(), EngineError> {
            self.pos = None;
            Ok(())
        }
    }

    #[derive(Default)]
    struct VecSink(Vec<(Vec<u8>, Vec<u8>)>);

    impl DuplicateSink for VecSink {
        fn record(&mut self, encoded_key: &[u8], value: &[u8]) -> Result<(), EngineError> {
            self.0.push((encoded_key.to_vec(), value.to_vec()));
            Ok(())
        }

        fn flush(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
    }

    fn entry(key: &[u8], row_id: i64, offset: i64, val: &[u8]) -> (Vec<u8>, Vec<u8>) {
        (encode_key_suffix(Vec::new(), key, row_id, offset), val.to_vec())
    }

    #[test]
    fn empty_store_yields_nothing() {
        let mut iter = DuplicateIter::new(MemIter::new(vec![]), VecSink::default());
        assert!(!iter.first().unwrap());
        assert!(!iter.last().unwrap());
        assert!(!iter.valid());
    }

    #[test]
    fn unique_keys_pass_through() {
        let entries = vec![
            entry(b"a", 1, 0, b"va"),
            entry(b"b", 1, 8, b"vb"),
            entry(b"c", 1, 16, b"vc"),
        ];
        let mut iter = DuplicateIter::new(MemIter::new(entries), VecSink::default());
        let mut seen = Vec::new();
        let mut more = iter.first().unwrap();
        while more {
            seen.push((iter.key().to_vec(), iter.value().to_vec()));
            more = iter.next().unwrap();
        }
        assert_eq!(
            seen,
            vec![
                (b"a".to_vec(), b"va".to_vec()),
                (b"b".to_vec(), b"vb".to_vec()),
                (b"c".to_vec(), b"vc".to_vec()),
            ]
        );
    }

    #[test]
    fn groups_collapse_to_first_member() {
        let entries = vec![
            entry(b"dup", 1, 0, b"first"),
            entry(b"dup", 1, 100, b"second"),
            entry(b"dup", 2, 0, b"third"),
            entry(b"solo", 1, 200, b"alone"),
        ];
        let mut iter = DuplicateIter::new(MemIter::new(entries), VecSink::default());
        assert!(iter.first().unwrap());
        assert_eq!(iter.key(), b"dup");
        assert_eq!(iter.value(), b"first");
        assert!(iter.next().unwrap());
        assert_eq!(iter.key(), b"solo");
        assert!(!iter.next().unwrap());

        // All three members of the group were recorded, survivor included.
        let recorded: Vec<&[u8]> = iter.sink.0.iter().map(|(_, v)| v.as_slice()).collect();
        assert_eq!(recorded, vec![b"first".as_slice(), b"second", b"third"]);
    }

    #[test]
    fn single_group_yields_one_visible_entry() {
        let entries: Vec<_> = (0..10).map(|i| entry(b"only", 1, i * 8, b"v")).collect();
        let mut iter = DuplicateIter::new(MemIter::new(entries), VecSink::default());
        assert!(iter.first().unwrap());
        assert!(!iter.next().unwrap());
        assert_eq!(iter.sink.0.len(), 10);
    }

    #[test]
    fn backward_traversal_mirrors_forward() {
        let entries = vec![
            entry(b"a", 1, 0, b"va"),
            entry(b"dup", 1, 0, b"d0"),
            entry(b"dup", 1, 8, b"d1"),
        ];
        let mut iter = DuplicateIter::new(MemIter::new(entries), VecSink::default());
        assert!(iter.last().unwrap());
        assert_eq!(iter.key(), b"dup");
        assert!(iter.prev().unwrap());
        assert_eq!(iter.key(), b"a");
        assert_eq!(iter.value(), b"va");
        assert!(!iter.prev().unwrap());
        assert_eq!(iter.sink.0.len(), 2);
    }

    #[test]
    fn close_flushes_and_releases() {
        let entries = vec![entry(b"a", 1, 0, b"va")];
        let mut iter = DuplicateIter::new(MemIter::new(entries), VecSink::default());
        assert!(iter.first().unwrap());
        iter.close().unwrap();
    }
}
