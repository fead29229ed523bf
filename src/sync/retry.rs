//! Exponential backoff with jitter for individual remote calls.
//!
//! Before retry `k + 1` the policy sleeps
//! `min(2^(k-1) * 1s + jitter, max_backoff)` where jitter is drawn from
//! `0..=jitter`. Callers pick what exhaustion means: [`RetryPolicy::execute`]
//! propagates the last error, [`RetryPolicy::execute_or`] degrades to a
//! fallback value.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use log::warn;
use rand::Rng;

/// Delay before the first retry, doubled on every further attempt
const BASE_DELAY_MS: u64 = 1_000;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    max_backoff: Duration,
    jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_backoff: Duration::from_millis(32_000),
            jitter: Duration::from_millis(1_000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, max_backoff: Duration, jitter: Duration) -> Self {
        Self {
            // The operation always runs at least once
            max_attempts: max_attempts.max(1),
            max_backoff,
            jitter,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = 2_u64
            .saturating_pow(attempt.saturating_sub(1))
            .saturating_mul(BASE_DELAY_MS);
        let jitter_ms = rand::rng().random_range(0..=self.jitter.as_millis() as u64);

        Duration::from_millis(base_ms.saturating_add(jitter_ms)).min(self.max_backoff)
    }

    /// Runs `op` until it succeeds or `max_attempts` is reached, returning the
    /// last error on exhaustion.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_attempts => {
                    warn!(
                        "Failed to fetch {} after {} attempts: {:#}",
                        label, self.max_attempts, e
                    );
                    return Err(e.context(format!(
                        "{} failed after {} attempts",
                        label, self.max_attempts
                    )));
                },
                Err(e) => {
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        "Retry {}/{} for {} in {:?}: {:#}",
                        attempt, self.max_attempts, label, delay, e
                    );
                    tokio::time::sleep(delay).await;
                },
            }
        }
    }

    /// Like [`execute`](Self::execute), but exhaustion yields `fallback`.
    pub async fn execute_or<T, F, Fut>(&self, label: &str, fallback: T, op: F) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.execute(label, op).await {
            Ok(value) => value,
            Err(_) => {
                warn!("Using fallback value for {}", label);
                fallback
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use anyhow::anyhow;
    use tokio::time::Instant;

    use super::*;

    #[test]
    fn test_backoff_delay_bounds() {
        let policy = RetryPolicy::default();

        for attempt in 1..=8 {
            let floor = Duration::from_millis(2_u64.pow(attempt - 1) * 1_000)
                .min(Duration::from_millis(32_000));
            let ceiling = Duration::from_millis(2_u64.pow(attempt - 1) * 1_000 + 1_000)
                .min(Duration::from_millis(32_000));

            for _ in 0..20 {
                let delay = policy.backoff_delay(attempt);
                assert!(delay >= floor, "attempt {attempt}: {delay:?} < {floor:?}");
                assert!(delay <= ceiling, "attempt {attempt}: {delay:?} > {ceiling:?}");
            }
        }
    }

    #[test]
    fn test_backoff_delay_without_jitter() {
        let policy = RetryPolicy::new(5, Duration::from_secs(32), Duration::ZERO);

        assert_eq!(policy.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(5), Duration::from_secs(16));
        assert_eq!(policy.backoff_delay(6), Duration::from_secs(32));
        assert_eq!(policy.backoff_delay(40), Duration::from_secs(32));
    }

    #[test]
    fn test_zero_attempts_runs_once() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, Duration::ZERO).max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_attempt() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result = policy
            .execute("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(42)
            })
            .await
            .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result = policy
            .execute("op", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(anyhow!("rate limited"))
                } else {
                    Ok(n)
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_propagates_after_max_attempts() {
        let attempts = Mutex::new(Vec::new());
        let policy = RetryPolicy::default();

        let err = policy
            .execute("tickBitmap(7)", || async {
                attempts.lock().unwrap().push(Instant::now());
                Err::<(), _>(anyhow!("node unavailable"))
            })
            .await
            .unwrap_err();

        let attempts = attempts.into_inner().unwrap();
        assert_eq!(attempts.len(), 5);
        assert!(err.to_string().contains("tickBitmap(7) failed after 5 attempts"));
        assert_eq!(err.root_cause().to_string(), "node unavailable");

        // Gap between attempt k and k+1 stays within min(2^(k-1)*1000 + 1000, ceiling)
        for (k, pair) in attempts.windows(2).enumerate() {
            let k = k as u32 + 1;
            let gap = pair[1] - pair[0];
            let floor = Duration::from_millis(2_u64.pow(k - 1) * 1_000);
            let ceiling = Duration::from_millis(2_u64.pow(k - 1) * 1_000 + 1_000)
                .min(Duration::from_millis(32_000));
            assert!(gap >= floor, "attempt {k}: {gap:?} < {floor:?}");
            assert!(gap <= ceiling, "attempt {k}: {gap:?} > {ceiling:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_degrades_to_fallback() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_secs(32), Duration::ZERO);

        let value = policy
            .execute_or("tickBitmap(-1)", 0_u64, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(anyhow!("timeout"))
            })
            .await;

        assert_eq!(value, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
