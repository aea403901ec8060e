use crate::Result;
use std::future::Future;
use tokio::time;

/// Retries an operation a fixed number of times with a fixed delay between attempts.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: time::Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: time::Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// At least one attempt is always made.
    pub fn new(attempts: u32, delay: time::Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Runs `op` until it succeeds, fails with an error that is not retryable, or the attempts are
    /// exhausted. The last error is returned unchanged.
    ///
    /// Dropping the returned future abandons any remaining attempts, including one waiting out
    /// the delay.
    pub async fn retry<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !error.is_retryable() {
                tracing::debug!(%error, attempt, "Not retrying");
                return Err(error);
            }
            if attempt >= self.attempts {
                tracing::warn!(%error, attempts = self.attempts, "Giving up");
                return Err(error);
            }

            tracing::debug!(%error, attempt, max = self.attempts, "Retrying");
            attempt += 1;
            time::sleep(self.delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    const DELAY: time::Duration = time::Duration::from_millis(1);

    fn failing_until(successful_attempt: u32, calls: &AtomicU32) -> impl Future<Output = Result<u32>> + '_ {
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < successful_attempt {
                Err(Error::Conflict(format!("error on invocation {n}")))
            } else {
                Ok(n)
            }
        }
    }

    #[tokio::test]
    async fn retries_on_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, DELAY);

        let res = policy.retry(|| failing_until(2, &calls)).await;
        assert_eq!(res.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn succeeds_on_last_attempt() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, DELAY);

        let res = policy.retry(|| failing_until(5, &calls)).await;
        assert_eq!(res.unwrap(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn gives_up_after_all_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, DELAY);

        let error = policy
            .retry(|| failing_until(u32::MAX, &calls))
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(error.to_string(), "conflicting update: error on invocation 5");
    }

    #[tokio::test]
    async fn stops_on_forbidden() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, DELAY);

        let error = policy
            .retry(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::Forbidden("configmaps is forbidden".to_string()))
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(error, Error::Forbidden(_)));
    }

    #[tokio::test]
    async fn makes_at_least_one_attempt() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(0, DELAY);
        assert_eq!(policy.attempts(), 1);

        let res = policy.retry(|| failing_until(2, &calls)).await;
        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_retry_stops_further_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, time::Duration::from_secs(10));

        let res = time::timeout(
            time::Duration::from_secs(15),
            policy.retry(|| failing_until(u32::MAX, &calls)),
        )
        .await;
        assert!(res.is_err(), "retry must still be waiting out its delay");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        time::advance(time::Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy, RetryPolicy::new(5, time::Duration::from_secs(2)));
    }
}
