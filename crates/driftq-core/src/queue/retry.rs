//! Retry policy: decides backoff delays.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with a cap and optional jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay for attempt 0.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub backoff_factor: f64,

    /// Upper bound applied before jitter.
    pub max_delay: Duration,

    /// Scale each delay by a uniform factor in `[0.5, 1.0]`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(300),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Same as the default policy but deterministic.
    pub fn without_jitter() -> Self {
        Self {
            jitter: false,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt`.
    ///
    /// `delay = min(base_delay * backoff_factor^attempt, max_delay)`, then
    /// jittered. Negative attempts count as 0.
    ///
    /// Example with the defaults and no jitter:
    /// - attempt 0: 1s
    /// - attempt 1: 2s
    /// - attempt 3: 8s
    /// - attempt 9+: 300s
    pub fn delay(&self, attempt: i32) -> Duration {
        let capped = self.capped_delay(attempt);
        if !self.jitter {
            return capped;
        }
        let factor = rand::thread_rng().gen_range(0.5..=1.0);
        capped.mul_f64(factor)
    }

    fn capped_delay(&self, attempt: i32) -> Duration {
        let exponent = attempt.max(0);
        let max_secs = self.max_delay.as_secs_f64();
        let secs = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        // powi overflows to inf for large exponents; min() keeps it finite.
        if !secs.is_finite() || secs >= max_secs {
            return self.max_delay;
        }
        // A negative factor flips the sign on odd exponents.
        if secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(secs)
    }
}
