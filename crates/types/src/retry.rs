//! Retry driver with pluggable backoff policies.

use std::time::Duration;

/// A backoff policy for retrying operations.
pub trait Backoffer {
    /// Returns the duration to wait before the next attempt and consumes one
    /// attempt.
    fn next_backoff(&mut self) -> Duration;
    /// Remaining attempts.
    fn attempts_left(&self) -> usize;
}

/// Doubling backoff with a cap on the per-attempt delay.
#[derive(Debug, Clone)]
pub struct ExponentialBackoffer {
    attempts: usize,
    delay: Duration,
    cap: Duration,
}

impl ExponentialBackoffer {
    /// A policy allowing `attempts` retries, starting at `base` and doubling
    /// up to `cap`.
    pub fn new(attempts: usize, base: Duration, cap: Duration) -> Self {
        Self { attempts, delay: base, cap }
    }
}

impl Backoffer for ExponentialBackoffer {
    fn next_backoff(&mut self) -> Duration {
        let current = self.delay;
        self.delay = (self.delay * 2).min(self.cap);
        self.attempts = self.attempts.saturating_sub(1);
        current
    }

    fn attempts_left(&self) -> usize {
        self.attempts
    }
}

/// Runs `op`, retrying on failure according to `backoffer`.
///
/// The last error is returned once the attempt budget is exhausted.
pub async fn with_retry<T, E, F, Fut>(mut op: F, backoffer: &mut impl Backoffer) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if backoffer.attempts_left() == 0 {
                    return Err(err);
                }
                tokio::time::sleep(backoffer.next_backoff()).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn exponential_doubles_up_to_cap() {
        let mut b =
            ExponentialBackoffer::new(4, Duration::from_millis(100), Duration::from_millis(300));
        assert_eq!(b.next_backoff(), Duration::from_millis(100));
        assert_eq!(b.next_backoff(), Duration::from_millis(200));
        assert_eq!(b.next_backoff(), Duration::from_millis(300));
        assert_eq!(b.next_backoff(), Duration::from_millis(300));
        assert_eq!(b.attempts_left(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = AtomicUsize::new(0);
        let mut backoffer =
            ExponentialBackoffer::new(5, Duration::from_millis(1), Duration::from_millis(2));
        let result: Result<usize, &str> = with_retry(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { if n < 2 { Err("transient") } else { Ok(n) } }
            },
            &mut backoffer,
        )
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_last_error_when_exhausted() {
        let mut backoffer =
            ExponentialBackoffer::new(2, Duration::from_millis(1), Duration::from_millis(1));
        let result: Result<(), String> =
            with_retry(|| async { Err("always".to_string()) }, &mut backoffer).await;
        assert_eq!(result, Err("always".to_string()));
    }
}
