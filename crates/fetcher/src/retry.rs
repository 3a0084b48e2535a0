//! Explicit retry policy struct, per the design note replacing a decorator-based retry with
//! `{attempts, min_backoff, max_backoff, retry_on}` applied by a helper.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// The policy mandated by §4.7 for every Data Fetcher task: 3 attempts, exponential
    /// backoff between 5s and 20s.
    #[must_use]
    pub const fn data_fetcher() -> Self {
        Self {
            attempts: 3,
            min_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(20),
        }
    }

    /// Runs `op` until it succeeds, `retry_on` returns `false` for its error, or `attempts`
    /// is exhausted — whichever comes first. Sleeps with doubling backoff (capped at
    /// `max_backoff`) between attempts.
    pub async fn execute<T, E, F, Fut>(&self, retry_on: impl Fn(&E) -> bool, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0u32;
        let mut backoff = self.min_backoff;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.attempts && retry_on(&err) => {
                    warn!(attempt, %err, "retrying after transient error");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.max_backoff);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let policy = RetryPolicy {
            attempts: 5,
            min_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        };
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = policy
            .execute(
                |_: &&str| true,
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move { if n < 2 { Err("transient") } else { Ok(42) } }
                },
            )
            .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_retrying_when_retry_on_says_no() {
        let policy = RetryPolicy {
            attempts: 5,
            min_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        };
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = policy
            .execute(
                |_: &&str| false,
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { Err("permanent") }
                },
            )
            .await;
        assert_eq!(result, Err("permanent"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_final_attempt() {
        let policy = RetryPolicy {
            attempts: 3,
            min_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        };
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = policy
            .execute(
                |_: &&str| true,
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { Err("always fails") }
                },
            )
            .await;
        assert_eq!(result, Err("always fails"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
