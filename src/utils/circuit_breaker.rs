use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Gate in front of the transport. Closed passes calls through; after
// `max_failures` consecutive failures the breaker opens and `allow` answers
// false until `reset_after` has elapsed, at which point a limited number of
// probe calls decide whether to close again.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    pub max_failures: u32,
    /// How long the breaker stays open before probing.
    pub reset_after: Duration,
    /// Successful probes needed to close again.
    pub probes_to_close: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            reset_after: Duration::from_secs(30),
            probes_to_close: 3,
        }
    }
}

struct Inner {
    state: BreakerState,
    failures: u32,
    probe_successes: u32,
    opened_at: Option<Instant>,
}

pub struct Breaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl Breaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
                probe_successes: 0,
                opened_at: None,
            }),
        }
    }

    /// May the next call go out?
    pub fn allow(&self) -> bool {
        let mut inner = self.lock();

        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.reset_after {
                    tracing::info!("Circuit breaker half-open, probing transport");
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();

        match inner.state {
            BreakerState::Closed => inner.failures = 0,
            BreakerState::HalfOpen => {
                inner.probe_successes += 1;
                if inner.probe_successes >= self.config.probes_to_close {
                    tracing::info!(
                        probes = inner.probe_successes,
                        "Circuit breaker closed"
                    );
                    inner.state = BreakerState::Closed;
                    inner.failures = 0;
                    inner.opened_at = None;
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();

        match inner.state {
            BreakerState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.config.max_failures {
                    tracing::warn!(
                        failures = inner.failures,
                        "Circuit breaker opened"
                    );
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            BreakerState::HalfOpen => {
                tracing::warn!("Probe failed, circuit breaker reopened");
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_successes = 0;
            }
            BreakerState::Open => {
                inner.opened_at = Some(Instant::now());
            }
        }
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_failures: u32, reset_after: Duration) -> BreakerConfig {
        BreakerConfig {
            max_failures,
            reset_after,
            probes_to_close: 1,
        }
    }

    #[test]
    fn test_opens_after_consecutive_failures() {
        let breaker = Breaker::new(config(3, Duration::from_secs(60)));

        for _ in 0..3 {
            assert!(breaker.allow());
            breaker.record_failure();
        }

        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow());
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let breaker = Breaker::new(config(2, Duration::from_secs(60)));

        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();

        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.allow());
    }

    #[test]
    fn test_probe_closes_after_reset_window() {
        let breaker = Breaker::new(config(1, Duration::from_millis(0)));

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);

        // reset_after is zero, so the next allow() starts probing.
        assert!(breaker.allow());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_failed_probe_reopens() {
        let breaker = Breaker::new(config(1, Duration::from_millis(0)));

        breaker.record_failure();
        assert!(breaker.allow());
        breaker.record_failure();

        assert_eq!(breaker.state(), BreakerState::Open);
    }
}
