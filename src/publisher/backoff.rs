//! Reconnect backoff

use serde::Serialize;
use std::time::Duration;

const MAX_EXPONENT: i32 = 32;

/// Exponential reconnect delays bounded by `max`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReconnectPolicy {
    /// Delay before the first retry
    pub initial: Duration,
    /// Upper bound on any delay
    pub max: Duration,
    /// Growth factor between attempts
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30))
    }
}

impl ReconnectPolicy {
    /// Doubling policy between `initial` and `max`
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max: max.max(initial), multiplier: 2.0 }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = (attempt.saturating_sub(1) as i32).min(MAX_EXPONENT);
        let multiplier = if self.multiplier.is_finite() { self.multiplier.max(1.0) } else { 1.0 };
        let seconds = self.initial.as_secs_f64() * multiplier.powi(exponent);

        if !seconds.is_finite() || seconds >= self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(seconds)
        }
    }

    /// Fresh backoff sequence
    pub fn backoff(&self) -> Backoff {
        Backoff { policy: *self, attempt: 0 }
    }
}

/// Position in a backoff sequence
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    /// Delay to wait after the next failure
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        self.policy.delay(self.attempt)
    }

    /// Failures recorded since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Start over after a successful connection
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_until_capped() {
        let policy = ReconnectPolicy::new(Duration::from_millis(500), Duration::from_secs(4));
        let delays: Vec<_> = (1..=6).map(|attempt| policy.delay(attempt)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(4),
                Duration::from_secs(4),
            ]
        );
    }

    #[test]
    fn test_huge_attempt_counts_stay_bounded() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_resets() {
        let mut backoff = ReconnectPolicy::default().backoff();
        backoff.next_delay();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.attempts(), 2);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_max_never_below_initial() {
        let policy = ReconnectPolicy::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(5));
    }
}
