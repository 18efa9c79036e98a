use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

// ============================================================================
// Bounded Exponential Backoff
// ============================================================================

#[derive(Clone, Copy, Debug)]
pub struct Backoff {
    /// Total attempts, including the first one.
    pub attempts: u32,
    /// Delay before the second attempt; doubles afterwards.
    pub base: Duration,
    /// Upper bound on any single delay.
    pub cap: Duration,
}

impl Backoff {
    pub const fn new(attempts: u32, base: Duration, cap: Duration) -> Self {
        Self {
            attempts,
            base,
            cap,
        }
    }

    /// Two quick attempts; enough to ride out a momentary transport blip
    /// without stalling the rest of a batch.
    pub const fn quick() -> Self {
        Self::new(2, Duration::from_millis(100), Duration::from_secs(1))
    }

    fn delay_before(&self, next_attempt: u32) -> Duration {
        let factor = 1u32 << (next_attempt.saturating_sub(2)).min(16);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// Run `operation` until it succeeds or the attempt budget is spent. The last
/// error is returned as-is so callers keep their typed failure.
pub async fn retry<T, E, F, Fut>(policy: Backoff, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if attempt < policy.attempts => {
                let delay = policy.delay_before(attempt + 1);
                tracing::warn!(
                    attempt,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "Operation failed, retrying"
                );
                sleep(delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_succeeds_within_budget() {
        let calls = AtomicU32::new(0);
        let policy = Backoff::new(3, Duration::from_millis(1), Duration::from_millis(5));

        let result: Result<&str, &str> = retry(policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { if n < 1 { Err("flaky") } else { Ok("done") } }
        })
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_returns_last_error_when_exhausted() {
        let calls = AtomicU32::new(0);
        let policy = Backoff::new(2, Duration::from_millis(1), Duration::from_millis(5));

        let result: Result<(), &str> = retry(policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("down") }
        })
        .await;

        assert_eq!(result, Err("down"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = Backoff::new(10, Duration::from_millis(100), Duration::from_millis(250));
        assert_eq!(policy.delay_before(2), Duration::from_millis(100));
        assert_eq!(policy.delay_before(3), Duration::from_millis(200));
        assert_eq!(policy.delay_before(4), Duration::from_millis(250));
        assert_eq!(policy.delay_before(9), Duration::from_millis(250));
    }
}
