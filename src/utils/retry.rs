use rand::Rng;
use std::time::Duration;

/// Backoff policy for reconnecting to the message broker.
///
/// The policy is an explicit value injected where reconnects happen (the
/// fan-out listener's redial loop) instead of ad-hoc sleeps scattered through
/// the code. Delays grow exponentially from `base_delay`, are capped at
/// `max_delay`, and carry uniform jitter so that multiple server processes do
/// not redial a recovering broker in lockstep.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    base_delay: Duration,
    /// Upper bound for any computed delay.
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Computes the delay before retry number `attempt` (zero-based).
    ///
    /// The result is `base_delay * 2^attempt` capped at `max_delay`, then
    /// jittered uniformly into the upper half of that window. The returned
    /// delay never exceeds `max_delay`.
    pub fn delay(&self, attempt: u32) -> Duration {
        // Exponent is clamped so the multiplication cannot overflow.
        let factor = 2u32.saturating_pow(attempt.min(16));
        let capped = self.base_delay.saturating_mul(factor).min(self.max_delay);

        let cap_ms = capped.as_millis() as u64;
        if cap_ms < 2 {
            return capped;
        }
        let jittered = rand::rng().random_range(cap_ms / 2..=cap_ms);
        Duration::from_millis(jittered)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_and_is_capped() {
        let policy = RetryPolicy::new(Duration::from_millis(100), Duration::from_secs(5));

        for attempt in 0..20 {
            let delay = policy.delay(attempt);
            assert!(delay <= Duration::from_secs(5), "delay exceeded cap");
        }

        // Late attempts land in the upper half of the cap window.
        let late = policy.delay(15);
        assert!(late >= Duration::from_millis(2500));
    }

    #[test]
    fn test_delay_first_attempt_within_base_window() {
        let policy = RetryPolicy::new(Duration::from_millis(100), Duration::from_secs(5));
        let first = policy.delay(0);
        assert!(first >= Duration::from_millis(50));
        assert!(first <= Duration::from_millis(100));
    }
}
