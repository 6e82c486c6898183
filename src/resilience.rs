//! Circuit breaker and retry policy guarding the parallel-mode remote
//! quantum-manager client against a flapping or unreachable server (§4.3
//! ambient stack, adapted from the teacher's `error_handling` module).

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_duration_secs: u64,
    pub half_open_max_attempts: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, open_duration_secs: 30, half_open_max_attempts: 1 }
    }
}

/// Tracks consecutive remote-call failures and trips from `Closed` to `Open`
/// once `failure_threshold` is reached, rejecting calls outright until
/// `open_duration_secs` has elapsed, then allowing one probe (`HalfOpen`)
/// before fully resetting.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    consecutive_failures: AtomicU32,
    opened_at: AtomicU64,
    state: std::sync::atomic::AtomicU8,
}

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            consecutive_failures: AtomicU32::new(0),
            opened_at: AtomicU64::new(0),
            state: std::sync::atomic::AtomicU8::new(STATE_CLOSED),
        }
    }

    fn now_secs() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
    }

    pub fn state(&self) -> CircuitState {
        match self.state.load(Ordering::Acquire) {
            STATE_OPEN => {
                if Self::now_secs().saturating_sub(self.opened_at.load(Ordering::Acquire)) >= self.config.open_duration_secs {
                    self.state.store(STATE_HALF_OPEN, Ordering::Release);
                    CircuitState::HalfOpen
                } else {
                    CircuitState::Open
                }
            }
            STATE_HALF_OPEN => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    /// Returns `true` if a call should be allowed through right now.
    pub fn allow_call(&self) -> bool {
        !matches!(self.state(), CircuitState::Open)
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        self.state.store(STATE_CLOSED, Ordering::Release);
    }

    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= self.config.failure_threshold {
            self.state.store(STATE_OPEN, Ordering::Release);
            self.opened_at.store(Self::now_secs(), Ordering::Release);
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 50, max_delay_ms: 2_000 }
    }
}

impl RetryConfig {
    /// Exponential backoff with a hard ceiling; `attempt` is 0-indexed.
    pub fn delay_for_attempt(&self, attempt: u32) -> std::time::Duration {
        let millis = self.base_delay_ms.saturating_mul(1u64 << attempt.min(16)).min(self.max_delay_ms);
        std::time::Duration::from_millis(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaker_trips_after_threshold_failures() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig { failure_threshold: 2, ..Default::default() });
        assert!(breaker.allow_call());
        breaker.record_failure();
        assert!(breaker.allow_call());
        breaker.record_failure();
        assert!(!breaker.allow_call());
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig { failure_threshold: 2, ..Default::default() });
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert!(breaker.allow_call());
    }

    #[test]
    fn retry_backoff_is_bounded_by_max_delay() {
        let retry = RetryConfig { max_attempts: 5, base_delay_ms: 100, max_delay_ms: 500 };
        assert_eq!(retry.delay_for_attempt(10).as_millis(), 500);
    }
}
