//! Per-table completion waiters.
//!
//! The restore-side sender needs to block until duplicate detection for a
//! table has finished without holding references to the in-flight request
//! objects. [`TableWaiters`] maps a table id to a count of outstanding
//! workers; dropping the last [`WaitGuard`] wakes every waiter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ingot_types::TableId;
use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Default)]
struct WaitState {
    pending: AtomicUsize,
    notify: Notify,
}

/// Registry of in-flight duplicate-detection work per table.
#[derive(Default)]
pub struct TableWaiters {
    inner: Mutex<HashMap<TableId, Arc<WaitState>>>,
}

impl TableWaiters {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one unit of work for `table_id`; the returned guard releases
    /// it on drop.
    pub fn register(&self, table_id: TableId) -> WaitGuard {
        let state = self.inner.lock().entry(table_id).or_default().clone();
        state.pending.fetch_add(1, Ordering::SeqCst);
        WaitGuard { state }
    }

    /// Waits until every registered unit of work for `table_id` has
    /// completed. Returns immediately when none is in flight.
    pub async fn wait(&self, table_id: TableId) {
        let state = self.inner.lock().get(&table_id).cloned();
        let Some(state) = state else { return };
        loop {
            let notified = state.notify.notified();
            if state.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Releases one unit of work on drop.
pub struct WaitGuard {
    state: Arc<WaitState>,
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        if self.state.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn wait_returns_immediately_without_work() {
        let waiters = TableWaiters::new();
        waiters.wait(1).await;
    }

    #[tokio::test]
    async fn wait_blocks_until_last_guard_drops() {
        let waiters = Arc::new(TableWaiters::new());
        let first = waiters.register(1);
        let second = waiters.register(1);

        let waiter = {
            let waiters = waiters.clone();
            tokio::spawn(async move { waiters.wait(1).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished(), "waiter must block while work is in flight");

        drop(first);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished(), "one guard is still alive");

        drop(second);
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }
}
