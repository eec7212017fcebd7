//! Duplicate manager.
//!
//! Orchestrates remote duplicate detection for one table: plans key-range
//! requests, fans them out over the live region map, consumes the streaming
//! responses, persists collision pairs into the local engine, resolves index
//! collisions to their row keys and reconciles those against the
//! authoritative remote values via batched gets.
//!
//! ## Failure model
//!
//! Per-pair decode failures are logged and skipped. Region-level trouble
//! (stream errors, key errors, region errors, dial failures) defers the
//! region and retries with refreshed metadata; a pass that defers every
//! region sleeps before the next attempt and consumes one retry. Local
//! commit failures are retried a bounded number of times and then escalate;
//! the first escalated error cancels the table's remaining workers.

use std::sync::Arc;

use futures::future::join_all;
use ingot_engine::codec::{self, CodecError};
use ingot_engine::{Engine, EngineError};
use ingot_proto::proto::{DuplicateDetectResponse, KvPair};
use ingot_types::{HandleEncoder, RegionInfo, RegionTopology, TableId, TableInfo, TopologyError};
use snafu::{ResultExt, Snafu};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tonic::codec::Streaming;
use tonic::transport::ClientTlsConfig;
use tracing::{debug, error, warn};

use crate::config::DetectConfig;
use crate::planner::{build_duplicate_requests, DuplicateRequest};
use crate::pool::{ClientPool, PoolError};
use crate::regions::paginate_scan_regions;
use crate::waiter::TableWaiters;

/// Errors surfaced by the duplicate manager.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DetectError {
    /// A region kept failing past the retry budget.
    #[snafu(display("retry limit exceeded with {region_count} regions unfinished"))]
    RetryExceeded {
        /// Regions still deferred when the budget ran out.
        region_count: usize,
    },

    /// The region topology failed.
    #[snafu(display("region topology error: {source}"))]
    Topology {
        /// Underlying topology error.
        source: TopologyError,
    },

    /// The connection pool failed.
    #[snafu(display("client pool error: {source}"))]
    Pool {
        /// Underlying pool error.
        source: PoolError,
    },

    /// A store answered a batched get with a region error.
    #[snafu(display("region error from store: {message}"))]
    RegionFailure {
        /// Server-reported message.
        message: String,
    },

    /// A store answered a batched get with a key error.
    #[snafu(display("key error from store: {message}"))]
    KeyFailure {
        /// Server-reported message.
        message: String,
    },

    /// A key could not be decoded and the failure is not skippable.
    #[snafu(display("key codec error: {source}"))]
    Codec {
        /// Underlying codec error.
        source: CodecError,
    },

    /// Local writes kept failing past the retry budget.
    #[snafu(display("local engine write failed after retries: {source}"))]
    LocalIo {
        /// Last engine error observed.
        source: EngineError,
    },

    /// The local engine rejected the operation outright.
    #[snafu(display("local engine rejected operation: {source}"))]
    Engine {
        /// Underlying engine error.
        source: EngineError,
    },

    /// The operation was cancelled.
    #[snafu(display("duplicate detection cancelled"))]
    Cancelled,

    /// A worker task terminated abnormally.
    #[snafu(display("worker task failed: {message}"))]
    Worker {
        /// Join failure description.
        message: String,
    },
}

/// What became of one duplicate-detect stream.
enum StreamOutcome {
    /// The stream drained to EOF.
    Finished { row_keys: Vec<Vec<u8>> },
    /// The region must be retried, possibly re-sharded.
    Deferred { regions: Vec<RegionInfo>, row_keys: Vec<Vec<u8>> },
}

struct ManagerInner {
    engine: Arc<Engine>,
    topology: Arc<dyn RegionTopology>,
    pool: ClientPool,
    config: DetectConfig,
    read_ts: u64,
    shutdown: CancellationToken,
    waiters: TableWaiters,
}

/// Orchestrator of remote duplicate detection. Cheap to clone.
#[derive(Clone)]
pub struct DuplicateManager {
    inner: Arc<ManagerInner>,
}

impl DuplicateManager {
    /// Creates a manager writing collisions into `engine` and reading the
    /// remote key space through `topology`.
    ///
    /// `read_ts` is the timestamp batched value fetches read at; `shutdown`
    /// cancels every in-flight operation when triggered.
    pub fn new(
        engine: Arc<Engine>,
        topology: Arc<dyn RegionTopology>,
        tls: Option<ClientTlsConfig>,
        config: DetectConfig,
        read_ts: u64,
        shutdown: CancellationToken,
    ) -> Self {
        let pool = ClientPool::new(topology.clone(), tls, config.pool_config());
        Self {
            inner: Arc::new(ManagerInner {
                engine,
                topology,
                pool,
                config,
                read_ts,
                shutdown,
                waiters: TableWaiters::new(),
            }),
        }
    }

    /// Blocks until every in-flight detection for `table_id` has completed.
    pub async fn wait_for_table(&self, table_id: TableId) {
        self.inner.waiters.wait(table_id).await;
    }

    /// Runs duplicate detection for one table.
    ///
    /// Fans one worker out per planned request; the first fatal error
    /// cancels the table's remaining workers, is drained and returned.
    pub async fn duplicate_table(
        &self,
        table: &TableInfo,
        encoder: Arc<dyn HandleEncoder>,
    ) -> Result<(), DetectError> {
        let requests = build_duplicate_requests(table);
        debug!(table_id = table.id, requests = requests.len(), "starting duplicate detection");
        let _guard = self.inner.waiters.register(table.id);
        let token = self.inner.shutdown.child_token();
        let semaphore = Arc::new(Semaphore::new(self.inner.config.region_concurrency.max(1)));

        let mut workers = JoinSet::new();
        for request in requests {
            let manager = self.clone();
            let encoder = encoder.clone();
            let token = token.clone();
            let semaphore = semaphore.clone();
            workers.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return Err(DetectError::Cancelled);
                };
                manager.send_request(&token, encoder.as_ref(), request).await
            });
        }

        let mut first_err = None;
        while let Some(joined) = workers.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(join_err) => Err(DetectError::Worker { message: join_err.to_string() }),
            };
            if let Err(err) = result {
                if first_err.is_none() {
                    error!(table_id = table.id, error = %err, "duplicate detection request failed");
                    token.cancel();
                    first_err = Some(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => {
                debug!(table_id = table.id, "duplicate detection finished");
                Ok(())
            }
        }
    }

    /// Drives one planned request to completion over the region map.
    async fn send_request(
        &self,
        token: &CancellationToken,
        encoder: &dyn HandleEncoder,
        request: DuplicateRequest,
    ) -> Result<(), DetectError> {
        let inner = &self.inner;
        let start_enc = codec::encode_bytes(Vec::new(), &request.start);
        let end_enc = codec::encode_bytes(Vec::new(), &request.end);
        let mut regions = paginate_scan_regions(
            inner.topology.as_ref(),
            &start_enc,
            &end_enc,
            inner.config.scan_region_page_size,
        )
        .await
        .context(TopologySnafu)?;

        let mut row_keys: Vec<Vec<u8>> = Vec::new();
        let mut retries = 0usize;
        while !regions.is_empty() {
            if token.is_cancelled() {
                return Err(DetectError::Cancelled);
            }
            if retries >= inner.config.max_retry_times {
                return Err(DetectError::RetryExceeded { region_count: regions.len() });
            }
            let total = regions.len();
            let mut deferred: Vec<RegionInfo> = Vec::new();
            let mut streams = Vec::new();
            let mut pending = regions.into_iter();
            while let Some(region) = pending.next() {
                if streams.len() >= inner.config.region_concurrency {
                    deferred.push(region);
                    deferred.extend(pending);
                    break;
                }
                let (start, end) = clamp_range(&region, &request)?;
                match inner.pool.duplicate_detect_stream(&region, start, end, false).await {
                    Ok(stream) => streams.push((region, stream)),
                    Err(err) => {
                        warn!(
                            region_id = region.id,
                            error = %err,
                            "failed to open duplicate-detect stream, deferring region"
                        );
                        deferred.push(self.refreshed_region(&region).await);
                    }
                }
            }

            let outcomes = join_all(streams.into_iter().map(|(region, stream)| {
                self.drain_stream(token, &request, encoder, region, stream)
            }))
            .await;
            for outcome in outcomes {
                match outcome? {
                    StreamOutcome::Finished { row_keys: keys } => row_keys.extend(keys),
                    StreamOutcome::Deferred { regions: shards, row_keys: keys } => {
                        row_keys.extend(keys);
                        deferred.extend(shards);
                    }
                }
            }

            if !row_keys.is_empty() {
                row_keys = self.get_values(token, row_keys).await?;
            }

            if deferred.len() == total {
                // Every region failed this pass; back off before hitting the
                // cluster again.
                retries += 1;
                tokio::select! {
                    _ = token.cancelled() => return Err(DetectError::Cancelled),
                    _ = tokio::time::sleep(inner.config.retry_backoff()) => {}
                }
            }
            regions = deferred;
        }

        // Row keys whose batched gets kept failing are drained under the
        // same retry budget instead of being dropped.
        let mut drain_retries = 0usize;
        while !row_keys.is_empty() {
            if token.is_cancelled() {
                return Err(DetectError::Cancelled);
            }
            if drain_retries >= inner.config.max_retry_times {
                return Err(DetectError::RetryExceeded { region_count: 0 });
            }
            let before = row_keys.len();
            row_keys = self.get_values(token, row_keys).await?;
            if row_keys.len() >= before {
                drain_retries += 1;
                tokio::select! {
                    _ = token.cancelled() => return Err(DetectError::Cancelled),
                    _ = tokio::time::sleep(inner.config.retry_backoff()) => {}
                }
            }
        }
        Ok(())
    }

    /// Consumes one duplicate-detect stream.
    async fn drain_stream(
        &self,
        token: &CancellationToken,
        request: &DuplicateRequest,
        encoder: &dyn HandleEncoder,
        region: RegionInfo,
        mut stream: Streaming<DuplicateDetectResponse>,
    ) -> Result<StreamOutcome, DetectError> {
        let mut row_keys = Vec::new();
        loop {
            let message = tokio::select! {
                _ = token.cancelled() => return Err(DetectError::Cancelled),
                message = stream.message() => message,
            };
            let response = match message {
                Ok(Some(response)) => response,
                Ok(None) => return Ok(StreamOutcome::Finished { row_keys }),
                Err(status) => {
                    warn!(
                        region_id = region.id,
                        error = %status,
                        "duplicate-detect stream failed, deferring region"
                    );
                    let refreshed = self.refreshed_region(&region).await;
                    return Ok(StreamOutcome::Deferred { regions: vec![refreshed], row_keys });
                }
            };

            if let Some(key_error) = response.key_error {
                warn!(
                    region_id = region.id,
                    message = %key_error.message,
                    "key error in duplicate-detect response, deferring region"
                );
                let refreshed = self.refreshed_region(&region).await;
                return Ok(StreamOutcome::Deferred { regions: vec![refreshed], row_keys });
            }
            if let Some(region_error) = response.region_error {
                warn!(
                    region_id = region.id,
                    message = %region_error.message,
                    "region error in duplicate-detect response, re-scanning range"
                );
                let shards = match paginate_scan_regions(
                    self.inner.topology.as_ref(),
                    &region.start_key,
                    &region.end_key,
                    self.inner.config.scan_region_page_size,
                )
                .await
                {
                    Ok(shards) if !shards.is_empty() => shards,
                    Ok(_) => vec![region.clone()],
                    Err(err) => {
                        warn!(region_id = region.id, error = %err, "re-scan failed, retrying region as-is");
                        vec![region.clone()]
                    }
                };
                return Ok(StreamOutcome::Deferred { regions: shards, row_keys });
            }

            self.store_pairs(request, encoder, &response.pairs, &mut row_keys)?;
        }
    }

    /// Persists a response's pairs: table-request pairs go straight into the
    /// local engine, index-request pairs are resolved to row keys for the
    /// batched value fetch.
    fn store_pairs(
        &self,
        request: &DuplicateRequest,
        encoder: &dyn HandleEncoder,
        pairs: &[KvPair],
        row_keys: &mut Vec<Vec<u8>>,
    ) -> Result<(), DetectError> {
        let Some(index) = &request.index_info else {
            return self.commit_pairs(pairs);
        };
        for pair in pairs {
            match encoder.decode_handle_from_index(index, &pair.key, &pair.value) {
                Ok(handle) => row_keys.push(encoder.encode_handle_key(&handle)),
                Err(err) => {
                    warn!(
                        index_id = index.id,
                        commit_ts = pair.commit_ts,
                        error = %err,
                        "failed to decode handle from index entry, skipping pair"
                    );
                }
            }
        }
        Ok(())
    }

    /// Reconciles collision row keys against the authoritative remote
    /// values.
    ///
    /// Keys are sorted, partitioned into per-region batches and fetched with
    /// one batched get each; fetched values are committed to the local
    /// engine in bounded batches. Keys whose fetch failed are returned for
    /// the caller to retry.
    async fn get_values(
        &self,
        token: &CancellationToken,
        mut keys: Vec<Vec<u8>>,
    ) -> Result<Vec<Vec<u8>>, DetectError> {
        if keys.is_empty() {
            return Ok(keys);
        }
        keys.sort();
        let inner = &self.inner;
        let start_enc = codec::encode_bytes(Vec::new(), &keys[0]);
        let last_enc = codec::encode_bytes(Vec::new(), &keys[keys.len() - 1]);
        let end_enc = ingot_types::keys::prefix_next(&last_enc);
        let regions = match paginate_scan_regions(
            inner.topology.as_ref(),
            &start_enc,
            &end_enc,
            inner.config.batch_get_page_size,
        )
        .await
        {
            Ok(regions) => regions,
            Err(err) => {
                warn!(error = %err, "region scan for value fetch failed, keeping keys for retry");
                return Ok(keys);
            }
        };

        let mut residual = Vec::new();
        let mut idx = 0;
        let mut enc_buf = Vec::new();
        for region in regions {
            if idx >= keys.len() {
                break;
            }
            let mut batch = Vec::new();
            while idx < keys.len() {
                enc_buf = codec::encode_bytes(enc_buf, &keys[idx]);
                if !region.end_key.is_empty() && enc_buf.as_slice() >= region.end_key.as_slice() {
                    break;
                }
                batch.push(keys[idx].clone());
                idx += 1;
            }
            if batch.is_empty() {
                continue;
            }
            if token.is_cancelled() {
                return Err(DetectError::Cancelled);
            }
            match self.fetch_region_values(&region, &batch).await {
                Ok(()) => {}
                Err(
                    err @ (DetectError::LocalIo { .. }
                    | DetectError::Engine { .. }
                    | DetectError::Cancelled),
                ) => return Err(err),
                Err(err) => {
                    warn!(
                        region_id = region.id,
                        keys = batch.len(),
                        error = %err,
                        "batched value fetch failed, keeping keys for retry"
                    );
                    residual.extend(batch);
                }
            }
        }
        // Keys past the scanned cover stay pending as well.
        residual.extend(keys.drain(idx..));
        Ok(residual)
    }

    /// Issues one batched get against a region and commits the result.
    async fn fetch_region_values(
        &self,
        region: &RegionInfo,
        keys: &[Vec<u8>],
    ) -> Result<(), DetectError> {
        let response = self
            .inner
            .pool
            .batch_get(region, keys.to_vec(), self.inner.read_ts)
            .await
            .context(PoolSnafu)?;
        if let Some(region_error) = response.region_error {
            return Err(DetectError::RegionFailure { message: region_error.message });
        }
        if let Some(key_error) = response.error {
            return Err(DetectError::KeyFailure { message: key_error.message });
        }
        for chunk in response.pairs.chunks(self.inner.config.max_write_batch_count.max(1)) {
            self.commit_pairs(chunk)?;
        }
        Ok(())
    }

    /// Commits pairs to the local engine, retrying transient storage
    /// failures up to the configured budget.
    fn commit_pairs(&self, pairs: &[KvPair]) -> Result<(), DetectError> {
        if pairs.is_empty() {
            return Ok(());
        }
        let attempts = self.inner.config.max_retry_times.max(1);
        let mut attempt = 0;
        loop {
            match self.try_commit(pairs) {
                Ok(()) => return Ok(()),
                Err(
                    err @ (EngineError::ClosedEngine | EngineError::InvalidState { .. }),
                ) => return Err(DetectError::Engine { source: err }),
                Err(err) => {
                    attempt += 1;
                    if attempt >= attempts {
                        return Err(DetectError::LocalIo { source: err });
                    }
                    warn!(attempt, error = %err, "local batch commit failed, retrying");
                }
            }
        }
    }

    fn try_commit(&self, pairs: &[KvPair]) -> Result<(), EngineError> {
        let mut batch = self.inner.engine.new_batch()?;
        for pair in pairs {
            batch.set(&pair.key, &pair.value);
        }
        batch.commit(false)
    }

    /// Fetches fresh metadata for a region, falling back to the stale copy.
    async fn refreshed_region(&self, region: &RegionInfo) -> RegionInfo {
        match self.inner.topology.get_region_by_id(region.id).await {
            Ok(fresh) => fresh,
            Err(err) => {
                warn!(region_id = region.id, error = %err, "failed to refresh region metadata");
                region.clone()
            }
        }
    }
}

/// Intersects a region's range with a request's range in raw key space.
///
/// Region boundaries arrive in encoded form; a boundary that is absent or
/// too short to decode falls back to the request's own bound.
fn clamp_range(
    region: &RegionInfo,
    request: &DuplicateRequest,
) -> Result<(Vec<u8>, Vec<u8>), DetectError> {
    let start = match decode_boundary(&region.start_key)? {
        Some(decoded) if decoded > request.start => decoded,
        _ => request.start.clone(),
    };
    let end = match decode_boundary(&region.end_key)? {
        Some(decoded) if decoded < request.end => decoded,
        _ => request.end.clone(),
    };
    Ok((start, end))
}

fn decode_boundary(boundary: &[u8]) -> Result<Option<Vec<u8>>, DetectError> {
    if boundary.is_empty() {
        return Ok(None);
    }
    match codec::decode_bytes(boundary) {
        Ok((_, decoded)) => Ok(Some(decoded)),
        // A truncated boundary is treated as absent; anything else is not
        // our encoding and detection cannot proceed safely.
        Err(CodecError::ShortInput { .. }) => Ok(None),
        Err(source) => Err(DetectError::Codec { source }),
    }
}

#[cfg(test)]
mod tests {
    use ingot_types::RegionEpoch;

    use super::*;

    fn region(start_raw: &[u8], end_raw: Option<&[u8]>) -> RegionInfo {
        RegionInfo {
            id: 1,
            start_key: if start_raw.is_empty() {
                Vec::new()
            } else {
                codec::encode_bytes(Vec::new(), start_raw)
            },
            end_key: end_raw.map_or(Vec::new(), |end| codec::encode_bytes(Vec::new(), end)),
            epoch: RegionEpoch::default(),
            leader: None,
            peers: vec![],
        }
    }

    fn request(start: &[u8], end: &[u8]) -> DuplicateRequest {
        DuplicateRequest {
            table_id: 1,
            index_id: 0,
            start: start.to_vec(),
            end: end.to_vec(),
            index_info: None,
        }
    }

    #[test]
    fn clamp_uses_request_bounds_for_spanning_region() {
        let (start, end) = clamp_range(&region(b"", None), &request(b"c", b"k")).unwrap();
        assert_eq!(start, b"c".to_vec());
        assert_eq!(end, b"k".to_vec());
    }

    #[test]
    fn clamp_narrows_to_region_interior() {
        let (start, end) =
            clamp_range(&region(b"d", Some(b"f")), &request(b"c", b"k")).unwrap();
        assert_eq!(start, b"d".to_vec());
        assert_eq!(end, b"f".to_vec());
    }

    #[test]
    fn clamp_keeps_request_when_region_is_wider() {
        let (start, end) =
            clamp_range(&region(b"a", Some(b"z")), &request(b"c", b"k")).unwrap();
        assert_eq!(start, b"c".to_vec());
        assert_eq!(end, b"k".to_vec());
    }
}
