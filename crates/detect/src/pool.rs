//! Per-store connection cache.
//!
//! One gRPC channel is kept per store; the cache is a single async mutex held
//! across the dial so concurrent callers for the same store produce exactly
//! one dial. From a cached channel the pool hands out the two typed clients
//! the duplicate manager needs: the streaming duplicate-detect client and the
//! batched value-get client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ingot_proto::convert::region_context;
use ingot_proto::proto::import_service_client::ImportServiceClient;
use ingot_proto::proto::kv_service_client::KvServiceClient;
use ingot_proto::proto::{
    BatchGetRequest, BatchGetResponse, DuplicateDetectRequest, DuplicateDetectResponse,
};
use ingot_types::retry::{with_retry, ExponentialBackoffer};
use ingot_types::{RegionInfo, RegionTopology, TopologyError};
use snafu::{ResultExt, Snafu};
use tokio::sync::Mutex;
use tonic::codec::Streaming;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tracing::{debug, warn};

/// Errors surfaced by the connection pool.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PoolError {
    /// The topology could not resolve the store's address.
    #[snafu(display("failed to resolve store {store_id}: {source}"))]
    Resolve {
        /// Store identifier.
        store_id: u64,
        /// Underlying topology error.
        source: TopologyError,
    },

    /// Dialing the store failed after the backoff budget.
    #[snafu(display("failed to dial store {store_id} at {address}: {source}"))]
    Dial {
        /// Store identifier.
        store_id: u64,
        /// Address that was dialed.
        address: String,
        /// Underlying transport error.
        source: tonic::transport::Error,
    },

    /// The region has no peer to address a request at.
    #[snafu(display("region {region_id} has no peers"))]
    NoPeer {
        /// Region identifier.
        region_id: u64,
    },

    /// An RPC against a store failed at the transport or status level.
    #[snafu(display("rpc to store {store_id} failed: {source}"))]
    Rpc {
        /// Store identifier.
        store_id: u64,
        /// gRPC status.
        source: tonic::Status,
    },
}

/// Connection-pool tuning knobs.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Budget for establishing one connection.
    pub dial_timeout: Duration,
    /// HTTP/2 keep-alive ping interval.
    pub keepalive_interval: Duration,
    /// How long to wait for a keep-alive ack before declaring the connection
    /// dead.
    pub keepalive_timeout: Duration,
    /// First delay of the dial backoff.
    pub dial_backoff_base: Duration,
    /// Ceiling of the dial backoff.
    pub dial_backoff_cap: Duration,
    /// Connect attempts within one dial.
    pub dial_retries: usize,
    /// Re-dial attempts when resetting a connection.
    pub reset_retry_times: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(10),
            keepalive_timeout: Duration::from_secs(3),
            dial_backoff_base: Duration::from_millis(100),
            dial_backoff_cap: Duration::from_secs(3),
            dial_retries: 5,
            reset_retry_times: 3,
        }
    }
}

/// Cache of one gRPC channel per store.
pub struct ClientPool {
    topology: Arc<dyn RegionTopology>,
    conns: Mutex<HashMap<u64, Channel>>,
    tls: Option<ClientTlsConfig>,
    config: PoolConfig,
}

impl ClientPool {
    /// Creates an empty pool resolving addresses through `topology`.
    pub fn new(
        topology: Arc<dyn RegionTopology>,
        tls: Option<ClientTlsConfig>,
        config: PoolConfig,
    ) -> Self {
        Self { topology, conns: Mutex::new(HashMap::new()), tls, config }
    }

    /// Returns the cached channel for a store, dialing on first use.
    pub async fn get_conn(&self, store_id: u64) -> Result<Channel, PoolError> {
        let mut conns = self.conns.lock().await;
        if let Some(channel) = conns.get(&store_id) {
            return Ok(channel.clone());
        }
        let channel = self.dial(store_id).await?;
        conns.insert(store_id, channel.clone());
        Ok(channel)
    }

    /// Drops the cached channel for a store and dials a fresh one, retrying
    /// up to the configured reset budget with a linear sleep between
    /// attempts.
    pub async fn reset_conn(&self, store_id: u64) -> Result<Channel, PoolError> {
        let mut conns = self.conns.lock().await;
        conns.remove(&store_id);
        let attempts = self.config.reset_retry_times.max(1);
        let mut attempt = 0;
        loop {
            match self.dial(store_id).await {
                Ok(channel) => {
                    conns.insert(store_id, channel.clone());
                    return Ok(channel);
                }
                Err(err) => {
                    attempt += 1;
                    if attempt >= attempts {
                        return Err(err);
                    }
                    warn!(store_id, attempt, error = %err, "failed to reset connection, retrying");
                    tokio::time::sleep(Duration::from_secs(attempt as u64 + 3)).await;
                }
            }
        }
    }

    /// Drops every cached channel. Idempotent.
    pub async fn close(&self) {
        self.conns.lock().await.clear();
    }

    async fn dial(&self, store_id: u64) -> Result<Channel, PoolError> {
        let store =
            self.topology.get_store(store_id).await.context(ResolveSnafu { store_id })?;
        let address = store.dial_address().to_string();
        let mut endpoint = Endpoint::new(format!("http://{address}"))
            .context(DialSnafu { store_id, address: address.clone() })?
            .connect_timeout(self.config.dial_timeout)
            .http2_keep_alive_interval(self.config.keepalive_interval)
            .keep_alive_timeout(self.config.keepalive_timeout)
            .keep_alive_while_idle(true);
        if let Some(tls) = &self.tls {
            endpoint = endpoint
                .tls_config(tls.clone())
                .context(DialSnafu { store_id, address: address.clone() })?;
        }
        let mut backoffer = ExponentialBackoffer::new(
            self.config.dial_retries,
            self.config.dial_backoff_base,
            self.config.dial_backoff_cap,
        );
        let channel = with_retry(|| endpoint.connect(), &mut backoffer)
            .await
            .context(DialSnafu { store_id, address: address.clone() })?;
        debug!(store_id, address, "dialed store");
        Ok(channel)
    }

    /// Opens a duplicate-detect stream over `[start, end)` of a region,
    /// addressed at its leader.
    pub async fn duplicate_detect_stream(
        &self,
        region: &RegionInfo,
        start: Vec<u8>,
        end: Vec<u8>,
        key_only: bool,
    ) -> Result<Streaming<DuplicateDetectResponse>, PoolError> {
        let peer = region.leader_or_first().ok_or(PoolError::NoPeer { region_id: region.id })?;
        let channel = self.get_conn(peer.store_id).await?;
        let mut client = ImportServiceClient::new(channel);
        let request = DuplicateDetectRequest {
            context: Some(region_context(region, peer)),
            start_key: start,
            end_key: end,
            key_only,
        };
        let response = client
            .duplicate_detect(request)
            .await
            .context(RpcSnafu { store_id: peer.store_id })?;
        Ok(response.into_inner())
    }

    /// Fetches `keys` from a region's leader at the given read timestamp.
    pub async fn batch_get(
        &self,
        region: &RegionInfo,
        keys: Vec<Vec<u8>>,
        read_ts: u64,
    ) -> Result<BatchGetResponse, PoolError> {
        let peer = region.leader_or_first().ok_or(PoolError::NoPeer { region_id: region.id })?;
        let channel = self.get_conn(peer.store_id).await?;
        let mut client = KvServiceClient::new(channel);
        let request = BatchGetRequest {
            context: Some(region_context(region, peer)),
            keys,
            version: read_ts,
        };
        let response =
            client.kv_batch_get(request).await.context(RpcSnafu { store_id: peer.store_id })?;
        Ok(response.into_inner())
    }
}
