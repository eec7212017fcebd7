//! Connection-cache behavior of the client pool.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use ingot_detect::{ClientPool, PoolConfig};
use ingot_test_utils::{spawn_mock_store, MockTopology};

fn pool_config() -> PoolConfig {
    PoolConfig {
        dial_timeout: Duration::from_secs(2),
        dial_backoff_base: Duration::from_millis(10),
        dial_backoff_cap: Duration::from_millis(50),
        ..PoolConfig::default()
    }
}

#[tokio::test]
async fn concurrent_get_conn_dials_once() {
    let server = spawn_mock_store().await;
    let topology = Arc::new(MockTopology::single_region(1, server.addr));
    let pool = ClientPool::new(topology.clone(), None, pool_config());

    let results = join_all((0..8).map(|_| pool.get_conn(1))).await;
    for result in results {
        result.expect("every caller gets a channel");
    }
    assert_eq!(topology.get_store_calls(), 1, "one dial for concurrent callers");
}

#[tokio::test]
async fn reset_conn_dials_exactly_once_more() {
    let server = spawn_mock_store().await;
    let topology = Arc::new(MockTopology::single_region(1, server.addr));
    let pool = ClientPool::new(topology.clone(), None, pool_config());

    pool.get_conn(1).await.unwrap();
    assert_eq!(topology.get_store_calls(), 1);

    pool.reset_conn(1).await.unwrap();
    assert_eq!(topology.get_store_calls(), 2, "reset re-dials");

    pool.get_conn(1).await.unwrap();
    assert_eq!(topology.get_store_calls(), 2, "fresh channel is cached");
}

#[tokio::test]
async fn unknown_store_surfaces_resolve_error() {
    let server = spawn_mock_store().await;
    let topology = Arc::new(MockTopology::single_region(1, server.addr));
    let pool = ClientPool::new(topology, None, pool_config());

    let err = pool.get_conn(99).await.unwrap_err();
    assert!(err.to_string().contains("store 99"), "got {err}");
}

#[tokio::test]
async fn close_is_idempotent() {
    let server = spawn_mock_store().await;
    let topology = Arc::new(MockTopology::single_region(1, server.addr));
    let pool = ClientPool::new(topology.clone(), None, pool_config());

    pool.get_conn(1).await.unwrap();
    pool.close().await;
    pool.close().await;

    // A new conn after close dials again.
    pool.get_conn(1).await.unwrap();
    assert_eq!(topology.get_store_calls(), 2);
}
