//! Fibonacci backoff with a bounded attempt budget.
//!
//! The scheduler produces the delay series `initial, initial, 2*initial,
//! 3*initial, 5*initial, ...`, capped at a maximum delay. Once the attempt
//! budget is exhausted it hands the triggering error back to the caller
//! unchanged, so the failure that surfaces is the real one rather than a
//! synthetic "too many retries" wrapper.

use crate::error::{Error, Result};
use rand::Rng;
use std::time::Duration;

/// Tuning knobs for the backoff schedule.
///
/// # Examples
///
/// ```
/// use limpet::BackoffConfig;
/// use std::time::Duration;
///
/// // Defaults: 100ms initial delay, 10s cap, 10 attempts, no jitter.
/// let config = BackoffConfig::default();
/// assert_eq!(config.max_attempts, 10);
///
/// // Tighter budget for latency-sensitive paths.
/// let config = BackoffConfig {
///     max_attempts: 4,
///     max_delay: Duration::from_secs(2),
///     ..BackoffConfig::default()
/// };
/// ```
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    /// Seed for the Fibonacci series; also the first two delays.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Total invocation budget. The first failure counts as attempt 1, so a
    /// budget of `n` allows `n - 1` waits before giving up. Values below 2
    /// disable retries entirely.
    pub max_attempts: u32,
    /// Whether to randomize each delay to between 50% and 100% of its
    /// nominal value.
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            max_attempts: 10,
            jitter: false,
        }
    }
}

/// One retry budget, scoped to a single top-level call.
///
/// `backoff` either sleeps and returns `Ok(())` (retry now) or returns the
/// error it was handed (budget exhausted). `reset` re-arms the budget after
/// any success, so only consecutive failures accumulate.
#[derive(Debug)]
pub(crate) struct Backoff {
    config: BackoffConfig,
    attempt: u32,
    delay: Duration,
    next_delay: Duration,
}

impl Backoff {
    pub(crate) fn new(config: BackoffConfig) -> Self {
        Backoff {
            config,
            attempt: 0,
            delay: Duration::ZERO,
            next_delay: config.initial_delay,
        }
    }

    /// Records a failed attempt. Sleeps for the next Fibonacci delay and
    /// returns `Ok(())` if the budget allows another try, otherwise returns
    /// `error` unchanged.
    pub(crate) async fn backoff(&mut self, error: Error) -> Result<()> {
        self.attempt += 1;
        if self.attempt >= self.config.max_attempts {
            tracing::warn!(
                attempt = self.attempt,
                error = %error,
                "Retry budget exhausted, giving up"
            );
            return Err(error);
        }

        let delay = self.advance();
        tracing::debug!(
            attempt = self.attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Backing off before retry"
        );
        tokio::time::sleep(delay).await;
        Ok(())
    }

    /// Forgets accumulated failures and restarts the delay series.
    pub(crate) fn reset(&mut self) {
        self.attempt = 0;
        self.delay = Duration::ZERO;
        self.next_delay = self.config.initial_delay;
    }

    /// Produces the next delay in the series. The capped value is fed back
    /// into the sum, so growth stays linear once the cap is reached.
    fn advance(&mut self) -> Duration {
        let delay = self.next_delay.min(self.config.max_delay);
        self.next_delay = self.next_delay.saturating_add(self.delay);
        self.delay = delay;

        if self.config.jitter {
            // Jitter: random value between 50% and 100% of the delay
            let jitter_factor = rand::thread_rng().gen_range(0.5..=1.0);
            delay.mul_f64(jitter_factor)
        } else {
            delay
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn millis(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[test]
    fn test_fibonacci_sequence() {
        let mut backoff = Backoff::new(BackoffConfig::default());

        let delays: Vec<Duration> = (0..9).map(|_| backoff.advance()).collect();
        assert_eq!(
            delays,
            [100, 100, 200, 300, 500, 800, 1300, 2100, 3400].map(millis)
        );
    }

    #[test]
    fn test_delay_cap_feeds_back_into_series() {
        let mut backoff = Backoff::new(BackoffConfig {
            initial_delay: millis(100),
            max_delay: millis(250),
            ..BackoffConfig::default()
        });

        let delays: Vec<Duration> = (0..5).map(|_| backoff.advance()).collect();
        assert_eq!(delays, [100, 100, 200, 250, 250].map(millis));
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut backoff = Backoff::new(BackoffConfig::default());
        backoff.advance();
        backoff.advance();
        backoff.advance();

        backoff.reset();
        assert_eq!(backoff.advance(), millis(100));
        assert_eq!(backoff.advance(), millis(100));
        assert_eq!(backoff.advance(), millis(200));
    }

    #[tokio::test]
    async fn test_budget_exhaustion_returns_original_error() {
        let mut backoff = Backoff::new(BackoffConfig {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_attempts: 3,
            jitter: false,
        });

        assert!(backoff
            .backoff(Error::Configuration("first".to_string()))
            .await
            .is_ok());
        assert!(backoff
            .backoff(Error::Configuration("second".to_string()))
            .await
            .is_ok());

        let err = backoff
            .backoff(Error::Configuration("third".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg == "third"));
    }

    #[tokio::test]
    async fn test_reset_rearms_budget() {
        let mut backoff = Backoff::new(BackoffConfig {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_attempts: 2,
            jitter: false,
        });

        assert!(backoff
            .backoff(Error::Configuration("one".to_string()))
            .await
            .is_ok());
        backoff.reset();
        assert!(backoff
            .backoff(Error::Configuration("two".to_string()))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_single_attempt_budget_never_waits() {
        let mut backoff = Backoff::new(BackoffConfig {
            max_attempts: 1,
            ..BackoffConfig::default()
        });

        let err = backoff
            .backoff(Error::Configuration("boom".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg == "boom"));
    }
}
