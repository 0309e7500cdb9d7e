//! # Circuit Breaker Module
//!
//! This module implements the circuit breaker pattern for the external
//! analysis provider. While the provider keeps failing, label analysis goes
//! straight to the local fallback instead of waiting on doomed requests.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

use crate::config::LlmConfig;

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

/// Circuit breaker for provider calls
///
/// ## State Machine
///
/// ```text
/// CLOSED ────failures ≥ threshold────► OPEN
///    ▲                                      │
///    │                                      │
///    └─────────reset timeout───────────────┘
/// ```
///
/// - **CLOSED → OPEN**: consecutive failures reach `threshold`
/// - **OPEN → CLOSED**: `reset_timeout` has elapsed since the last failure;
///   the counter is cleared and the next call probes the provider
/// - Any success clears the counter
///
/// Failure count and timestamp share one `parking_lot::Mutex`, so a
/// transition is never observed half-applied.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    threshold: u32,
    reset_timeout: Duration,
}

impl CircuitBreaker {
    /// Create a closed circuit breaker
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use label_scan::circuit_breaker::CircuitBreaker;
    ///
    /// let breaker = CircuitBreaker::new(5, Duration::from_secs(60));
    /// assert!(!breaker.is_open());
    /// ```
    pub fn new(threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            threshold,
            reset_timeout,
        }
    }

    /// Circuit breaker using the provider settings
    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(
            config.circuit_breaker_threshold,
            Duration::from_secs(config.circuit_breaker_reset_secs),
        )
    }

    /// Check if the circuit is open (provider calls should be skipped)
    ///
    /// Resets to closed once the reset timeout has elapsed since the last
    /// failure.
    pub fn is_open(&self) -> bool {
        let mut state = self.state.lock();

        if state.failure_count >= self.threshold {
            if let Some(last_time) = state.last_failure_time {
                if last_time.elapsed() < self.reset_timeout {
                    return true;
                }
                *state = BreakerState::default();
                crate::observability::update_circuit_breaker_state(false);
            }
        }
        false
    }

    /// Record a failed provider call
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.failure_count += 1;
        state.last_failure_time = Some(Instant::now());
        if state.failure_count == self.threshold {
            tracing::warn!(
                failures = state.failure_count,
                reset_secs = self.reset_timeout.as_secs(),
                "Provider circuit breaker opened"
            );
            crate::observability::update_circuit_breaker_state(true);
        }
    }

    /// Record a successful provider call
    pub fn record_success(&self) {
        *self.state.lock() = BreakerState::default();
    }

    /// Consecutive failures recorded so far
    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        breaker.record_failure();
        assert!(!breaker.is_open());
        breaker.record_failure();
        assert!(breaker.is_open());
    }

    #[test]
    fn test_success_closes_circuit() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        breaker.record_failure();
        assert!(breaker.is_open());
        breaker.record_success();
        assert!(!breaker.is_open());
        assert_eq!(breaker.failure_count(), 0);
    }

    #[test]
    fn test_resets_after_timeout() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0));
        breaker.record_failure();
        assert!(!breaker.is_open());
        assert_eq!(breaker.failure_count(), 0);
    }
}
