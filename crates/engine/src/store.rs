//! Thin wrapper over the embedded LSM holding one local sorted run.
//!
//! An [`Engine`] owns two stores: the main keyspace at its root path, and a
//! lazily created sibling keyspace at `<path>/duplicates` that receives every
//! member of every collision group. The engine moves through a linear
//! lifecycle (`Open → Closed → Imported → Cleaned`); operations from the
//! wrong state fail instead of corrupting the run.

use std::ops::Bound;
use std::path::{Path, PathBuf};

use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use parking_lot::Mutex;
use serde::Deserialize;
use snafu::ResultExt;
use tracing::debug;
use uuid::Uuid;

use crate::codec;
use crate::iterator::{DuplicateIter, DuplicateSink, KvIter};
use crate::{EngineError, IoSnafu, StorageSnafu};

/// Name of the sibling directory holding collision records.
const DUPLICATES_DIR: &str = "duplicates";

/// Opaque 128-bit identifier of one local engine instance.
///
/// Persisted as 16 raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineId(Uuid);

impl EngineId {
    /// Generates a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The 16-byte persisted form.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Reconstructs an identifier from its persisted form.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for EngineId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EngineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of an engine. Transitions are monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Accepting writes and iterators.
    Open,
    /// Sealed; contents are final.
    Closed,
    /// Shipped to the remote cluster.
    Imported,
    /// Local state destroyed.
    Cleaned,
}

/// Engine tuning knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineOptions {
    /// Whether plain batch commits also fsync the journal.
    #[serde(default)]
    pub sync_writes: bool,
    /// How many collision records accumulate before the duplicate store is
    /// written.
    #[serde(default = "default_duplicate_flush_count")]
    pub duplicate_flush_count: usize,
}

fn default_duplicate_flush_count() -> usize {
    128
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { sync_writes: false, duplicate_flush_count: default_duplicate_flush_count() }
    }
}

/// Iterator bounds. `None` means unbounded on that side.
#[derive(Debug, Clone, Default)]
pub struct IterOptions {
    /// Inclusive lower bound.
    pub lower_bound: Option<Vec<u8>>,
    /// Exclusive upper bound.
    pub upper_bound: Option<Vec<u8>>,
}

#[derive(Clone)]
struct DuplicateStore {
    keyspace: Keyspace,
    partition: PartitionHandle,
}

/// One local sorted run being prepared for bulk import.
pub struct Engine {
    id: EngineId,
    path: PathBuf,
    keyspace: Keyspace,
    kv: PartitionHandle,
    duplicates: Mutex<Option<DuplicateStore>>,
    state: Mutex<EngineState>,
    opts: EngineOptions,
}

impl Engine {
    /// Opens (or creates) an engine at `path`.
    ///
    /// The duplicates store is not created here; it appears on the first
    /// recorded collision.
    pub fn open(path: impl AsRef<Path>, opts: EngineOptions) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();
        let keyspace = fjall::Config::new(&path).open().context(StorageSnafu)?;
        let kv = keyspace
            .open_partition("kv", PartitionCreateOptions::default())
            .context(StorageSnafu)?;
        let id = EngineId::new();
        debug!(engine = %id, path = %path.display(), "opened local engine");
        Ok(Self {
            id,
            path,
            keyspace,
            kv,
            duplicates: Mutex::new(None),
            state: Mutex::new(EngineState::Open),
            opts,
        })
    }

    /// This engine's identifier.
    pub fn id(&self) -> EngineId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    /// Root path of the main store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn duplicates_path(&self) -> PathBuf {
        self.path.join(DUPLICATES_DIR)
    }

    fn check_open(&self) -> Result<(), EngineError> {
        match *self.state.lock() {
            EngineState::Open => Ok(()),
            _ => Err(EngineError::ClosedEngine),
        }
    }

    /// Starts a new write batch against the main store.
    pub fn new_batch(&self) -> Result<WriteBatch<'_>, EngineError> {
        self.check_open()?;
        Ok(WriteBatch { engine: self, inner: self.keyspace.batch(), count: 0 })
    }

    /// Writes ingested pairs under their suffix-encoded keys in one batch.
    pub fn write_pairs(&self, pairs: &[ingot_types::KvPair], sync: bool) -> Result<(), EngineError> {
        let mut batch = self.new_batch()?;
        let mut buf = Vec::new();
        for pair in pairs {
            buf = codec::encode_key_suffix(buf, &pair.key, pair.row_id, pair.offset);
            batch.set(&buf, &pair.val);
        }
        batch.commit(sync)
    }

    /// Point lookup in the main store.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        self.check_open()?;
        let value = self.kv.get(key).context(StorageSnafu)?;
        Ok(value.map(|v| v.to_vec()))
    }

    /// Opens an iterator over the main store.
    ///
    /// The iterator observes a snapshot taken now; later writes are
    /// invisible to it.
    pub fn new_iter(&self, opts: IterOptions) -> Result<StoreIter, EngineError> {
        self.check_open()?;
        Ok(StoreIter {
            snapshot: self.kv.snapshot(),
            lower: opts.lower_bound,
            upper: opts.upper_bound,
            entry: None,
        })
    }

    /// Opens a duplicate-fusing iterator over the main store.
    ///
    /// Collision groups encountered while iterating are written to the
    /// duplicates store; see [`DuplicateIter`] for the contract.
    pub fn new_duplicate_iter(
        &self,
        opts: IterOptions,
    ) -> Result<DuplicateIter<StoreIter, EngineDuplicateSink<'_>>, EngineError> {
        let inner = self.new_iter(opts)?;
        let sink = EngineDuplicateSink {
            engine: self,
            pending: Vec::new(),
            flush_count: self.opts.duplicate_flush_count.max(1),
        };
        Ok(DuplicateIter::new(inner, sink))
    }

    /// Returns every collision record currently persisted, in key order.
    pub fn duplicate_records(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, EngineError> {
        let Some(dup) = self.duplicate_store_if_exists()? else {
            return Ok(Vec::new());
        };
        let mut records = Vec::new();
        for item in dup.partition.iter() {
            let (key, value) = item.context(StorageSnafu)?;
            records.push((key.to_vec(), value.to_vec()));
        }
        Ok(records)
    }

    /// Seals the engine: flushes both stores durably and rejects further
    /// writes.
    pub fn close(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        match *state {
            EngineState::Open => {}
            other => {
                return Err(EngineError::InvalidState { state: other, expected: EngineState::Open })
            }
        }
        self.keyspace.persist(PersistMode::SyncAll).context(StorageSnafu)?;
        if let Some(dup) = self.duplicates.lock().as_ref() {
            dup.keyspace.persist(PersistMode::SyncAll).context(StorageSnafu)?;
        }
        *state = EngineState::Closed;
        debug!(engine = %self.id, "closed local engine");
        Ok(())
    }

    /// Records that the sealed run has been shipped to the remote cluster.
    pub fn mark_imported(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        match *state {
            EngineState::Closed => {
                *state = EngineState::Imported;
                Ok(())
            }
            other => {
                Err(EngineError::InvalidState { state: other, expected: EngineState::Closed })
            }
        }
    }

    /// Destroys local state of an imported engine, including the duplicates
    /// store.
    pub fn cleanup(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        match *state {
            EngineState::Imported => {}
            other => {
                return Err(EngineError::InvalidState {
                    state: other,
                    expected: EngineState::Imported,
                })
            }
        }
        // Drop the handle before deleting the directory underneath it.
        *self.duplicates.lock() = None;
        let dup_path = self.duplicates_path();
        if dup_path.exists() {
            std::fs::remove_dir_all(&dup_path).context(IoSnafu)?;
        }
        *state = EngineState::Cleaned;
        debug!(engine = %self.id, "cleaned local engine");
        Ok(())
    }

    fn duplicate_store_if_exists(&self) -> Result<Option<DuplicateStore>, EngineError> {
        if let Some(dup) = self.duplicates.lock().as_ref() {
            return Ok(Some(dup.clone()));
        }
        if !self.duplicates_path().exists() {
            return Ok(None);
        }
        self.duplicate_store().map(Some)
    }

    /// Opens the duplicates store, creating it on first use.
    fn duplicate_store(&self) -> Result<DuplicateStore, EngineError> {
        let mut guard = self.duplicates.lock();
        if let Some(dup) = guard.as_ref() {
            return Ok(dup.clone());
        }
        let keyspace =
            fjall::Config::new(self.duplicates_path()).open().context(StorageSnafu)?;
        let partition = keyspace
            .open_partition("kv", PartitionCreateOptions::default())
            .context(StorageSnafu)?;
        debug!(engine = %self.id, "created duplicates store");
        let dup = DuplicateStore { keyspace, partition };
        *guard = Some(dup.clone());
        Ok(dup)
    }
}

impl DuplicateStore {
    fn write_all(
        &self,
        records: impl Iterator<Item = (Vec<u8>, Vec<u8>)>,
    ) -> Result<(), EngineError> {
        let mut batch = self.keyspace.batch();
        for (key, value) in records {
            batch.insert(&self.partition, key, value);
        }
        batch.commit().context(StorageSnafu)
    }
}

/// An atomic batch of writes to the main store.
pub struct WriteBatch<'a> {
    engine: &'a Engine,
    inner: fjall::Batch,
    count: usize,
}

impl WriteBatch<'_> {
    /// Stages a write.
    pub fn set(&mut self, key: &[u8], value: &[u8]) {
        self.inner.insert(&self.engine.kv, key, value);
        self.count += 1;
    }

    /// Number of staged writes.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Commits the batch atomically; durable iff `sync`.
    pub fn commit(self, sync: bool) -> Result<(), EngineError> {
        self.engine.check_open()?;
        self.inner.commit().context(StorageSnafu)?;
        if sync || self.engine.opts.sync_writes {
            self.engine.keyspace.persist(PersistMode::SyncAll).context(StorageSnafu)?;
        }
        Ok(())
    }
}

/// Snapshot-consistent iterator over the main store.
///
/// Movement methods return `Ok(false)` at the end of the range; the first
/// storage failure is returned by the movement that hit it.
pub struct StoreIter {
    snapshot: fjall::Snapshot,
    lower: Option<Vec<u8>>,
    upper: Option<Vec<u8>>,
    entry: Option<(fjall::Slice, fjall::Slice)>,
}

impl StoreIter {
    fn lower_bound(&self) -> Bound<Vec<u8>> {
        match &self.lower {
            Some(key) => Bound::Included(key.clone()),
            None => Bound::Unbounded,
        }
    }

    fn upper_bound(&self) -> Bound<Vec<u8>> {
        match &self.upper {
            Some(key) => Bound::Excluded(key.clone()),
            None => Bound::Unbounded,
        }
    }

    fn seek(
        &self,
        range: (Bound<Vec<u8>>, Bound<Vec<u8>>),
        backward: bool,
    ) -> Result<Option<(fjall::Slice, fjall::Slice)>, EngineError> {
        let mut iter = self.snapshot.range(range);
        let item = if backward { iter.next_back() } else { iter.next() };
        item.transpose().map_err(fjall::Error::from).context(StorageSnafu)
    }
}

impl KvIter for StoreIter {
    fn first(&mut self) -> Result<bool, EngineError> {
        self.entry = self.seek((self.lower_bound(), self.upper_bound()), false)?;
        Ok(self.entry.is_some())
    }

    fn last(&mut self) -> Result<bool, EngineError> {
        self.entry = self.seek((self.lower_bound(), self.upper_bound()), true)?;
        Ok(self.entry.is_some())
    }

    fn next(&mut self) -> Result<bool, EngineError> {
        let Some((key, _)) = &self.entry else { return Ok(false) };
        self.entry = self.seek((Bound::Excluded(key.to_vec()), self.upper_bound()), false)?;
        Ok(self.entry.is_some())
    }

    fn prev(&mut self) -> Result<bool, EngineError> {
        let Some((key, _)) = &self.entry else { return Ok(false) };
        self.entry = self.seek((self.lower_bound(), Bound::Excluded(key.to_vec())), true)?;
        Ok(self.entry.is_some())
    }

    fn valid(&self) -> bool {
        self.entry.is_some()
    }

    fn key(&self) -> &[u8] {
        self.entry.as_ref().map_or(&[], |(key, _)| key.as_ref())
    }

    fn value(&self) -> &[u8] {
        self.entry.as_ref().map_or(&[], |(_, value)| value.as_ref())
    }

    fn close(&mut self) -> Result<(), EngineError> {
        self.entry = None;
        Ok(())
    }
}

/// Sink that batches collision records into the engine's duplicates store.
pub struct EngineDuplicateSink<'a> {
    engine: &'a Engine,
    pending: Vec<(Vec<u8>, Vec<u8>)>,
    flush_count: usize,
}

impl DuplicateSink for EngineDuplicateSink<'_> {
    fn record(&mut self, encoded_key: &[u8], value: &[u8]) -> Result<(), EngineError> {
        self.pending.push((encoded_key.to_vec(), value.to_vec()));
        if self.pending.len() >= self.flush_count {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EngineError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let dup = self.engine.duplicate_store()?;
        dup.write_all(self.pending.drain(..))
    }
}
