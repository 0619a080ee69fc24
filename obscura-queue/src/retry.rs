//! Retry policy — pure backoff arithmetic, no I/O.
//!
//! Two horizons govern retries:
//! - **in-burst**: the bounded retry loop inside a single executor
//!   invocation uses short linear backoff (`base`, `2*base`, ...);
//! - **cross-invocation**: failures recorded back into the queue get an
//!   exponential delay seeded from the task's persisted attempt count,
//!   capped so a flaky network never pushes retries out indefinitely.

use std::time::Duration;

/// What to do with a task after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule another attempt after the delay.
    RetryAfter(Duration),
    /// Terminal: attempts exhausted or the error cannot self-resolve.
    Exhausted,
}

/// Backoff policy consulted by the drain driver and the upload executor.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts per executor invocation (first try included).
    pub burst_attempts: u32,
    /// Base delay for in-burst linear backoff.
    pub burst_base: Duration,
    /// Base delay for cross-invocation exponential backoff.
    pub long_base: Duration,
    /// Upper bound on the cross-invocation delay.
    pub long_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            burst_attempts: 3,
            burst_base: Duration::from_millis(500),
            long_base: Duration::from_secs(30),
            long_cap: Duration::from_secs(30 * 60),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next in-burst attempt, linear in the attempt that
    /// just failed (1-based): `base`, `2*base`, ...
    pub fn burst_delay(&self, failed_attempt: u32) -> Duration {
        self.burst_base.saturating_mul(failed_attempt.max(1))
    }

    /// Cross-invocation delay seeded from the task's persisted attempt
    /// count: `long_base * 2^(attempt_count - 1)`, capped at `long_cap`.
    pub fn next_delay(&self, attempt_count: u32) -> Duration {
        let exponent = attempt_count.saturating_sub(1).min(20);
        let delay = self.long_base.saturating_mul(1u32 << exponent);
        delay.min(self.long_cap)
    }

    /// Decides the fate of a task whose attempt just failed.
    ///
    /// `attempt_count` is the counter *after* the failure was recorded.
    /// Non-retryable errors (missing config, vanished local file) are
    /// terminal immediately, but still count as an attempt — the queue
    /// surfaces the message so the UI can prompt for reconfiguration
    /// instead of silently rescheduling.
    pub fn decide(&self, attempt_count: u32, max_attempts: u32, retryable: bool) -> RetryDecision {
        if !retryable || attempt_count >= max_attempts {
            RetryDecision::Exhausted
        } else {
            RetryDecision::RetryAfter(self.next_delay(attempt_count))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_delay_is_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.burst_delay(1), Duration::from_millis(500));
        assert_eq!(policy.burst_delay(2), Duration::from_millis(1000));
        assert_eq!(policy.burst_delay(3), Duration::from_millis(1500));
    }

    #[test]
    fn long_delay_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_delay(1), Duration::from_secs(30));
        assert_eq!(policy.next_delay(2), Duration::from_secs(60));
        assert_eq!(policy.next_delay(3), Duration::from_secs(120));
        // Way past the cap.
        assert_eq!(policy.next_delay(30), Duration::from_secs(30 * 60));
    }

    #[test]
    fn exhausts_at_max_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(3, 3, true), RetryDecision::Exhausted);
        assert_eq!(policy.decide(4, 3, true), RetryDecision::Exhausted);
    }

    #[test]
    fn retryable_failure_below_max_gets_a_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(1, 3, true),
            RetryDecision::RetryAfter(Duration::from_secs(30))
        );
        assert_eq!(
            policy.decide(2, 3, true),
            RetryDecision::RetryAfter(Duration::from_secs(60))
        );
    }

    #[test]
    fn non_retryable_is_terminal_regardless_of_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(1, 5, false), RetryDecision::Exhausted);
    }
}
