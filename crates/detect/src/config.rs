//! Duplicate-detection configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::pool::PoolConfig;

/// Tuning knobs of the duplicate manager.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectConfig {
    /// Maximum number of concurrently open duplicate-detect streams per
    /// request, and of concurrently processed requests.
    #[serde(default = "default_region_concurrency")]
    pub region_concurrency: usize,
    /// Per-region retry budget; exceeding it fails the request.
    #[serde(default = "default_max_retry_times")]
    pub max_retry_times: usize,
    /// Sleep between passes that made no progress (milliseconds).
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Budget for dialing one store (milliseconds).
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,
    /// Re-dial attempts when resetting a cached connection.
    #[serde(default = "default_reset_retry_times")]
    pub reset_retry_times: usize,
    /// Page size of region scans covering a request range.
    #[serde(default = "default_scan_region_page_size")]
    pub scan_region_page_size: usize,
    /// Page size of region scans covering a batched value fetch.
    #[serde(default = "default_batch_get_page_size")]
    pub batch_get_page_size: usize,
    /// Maximum writes per local batch commit on the value-fetch path.
    #[serde(default = "default_max_write_batch_count")]
    pub max_write_batch_count: usize,
}

fn default_region_concurrency() -> usize {
    16
}

fn default_max_retry_times() -> usize {
    5
}

fn default_retry_backoff_ms() -> u64 {
    3000
}

fn default_dial_timeout_ms() -> u64 {
    30_000
}

fn default_reset_retry_times() -> usize {
    3
}

fn default_scan_region_page_size() -> usize {
    1024
}

fn default_batch_get_page_size() -> usize {
    128
}

fn default_max_write_batch_count() -> usize {
    128
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            region_concurrency: default_region_concurrency(),
            max_retry_times: default_max_retry_times(),
            retry_backoff_ms: default_retry_backoff_ms(),
            dial_timeout_ms: default_dial_timeout_ms(),
            reset_retry_times: default_reset_retry_times(),
            scan_region_page_size: default_scan_region_page_size(),
            batch_get_page_size: default_batch_get_page_size(),
            max_write_batch_count: default_max_write_batch_count(),
        }
    }
}

impl DetectConfig {
    /// Backoff between no-progress passes.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// The connection-pool slice of this configuration.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            dial_timeout: Duration::from_millis(self.dial_timeout_ms),
            reset_retry_times: self.reset_retry_times,
            ..PoolConfig::default()
        }
    }
}
