//! Per-service-key circuit breakers, generalizing the teacher's
//! `vclip-media::core::infrastructure::circuit_breaker::CircuitBreaker`
//! (one `RwLock<CircuitState>` per call site) into a map owned by a single
//! [`crate::core::RetryRateCore`] handle, keyed by service (`media`,
//! `store`, `model`).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Closed,
    Open { opened_at: Instant },
    HalfOpen { probe_in_flight: bool },
}

struct Breaker {
    state: State,
    consecutive_failures: u32,
}

/// A process-wide table of circuit breakers, one per service key, each
/// independently tracking `Closed -> Open -> HalfOpen -> Closed`.
pub struct CircuitBreakers {
    breakers: Mutex<HashMap<String, Breaker>>,
    failure_threshold: u32,
    recovery_timeout: Duration,
}

impl CircuitBreakers {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            breakers: Mutex::new(HashMap::new()),
            failure_threshold,
            recovery_timeout,
        }
    }

    /// Returns `true` if a call against `key` may proceed. `Open` breakers
    /// fail fast until `recovery_timeout` has elapsed, at which point the
    /// caller that observes the transition becomes the single `HalfOpen`
    /// probe; concurrent callers are rejected until that probe resolves.
    pub fn allow(&self, key: &str) -> bool {
        let mut breakers = self.breakers.lock().unwrap();
        let breaker = breakers.entry(key.to_string()).or_insert(Breaker {
            state: State::Closed,
            consecutive_failures: 0,
        });

        match breaker.state {
            State::Closed => true,
            State::Open { opened_at } => {
                if opened_at.elapsed() >= self.recovery_timeout {
                    breaker.state = State::HalfOpen {
                        probe_in_flight: true,
                    };
                    true
                } else {
                    false
                }
            }
            State::HalfOpen { probe_in_flight } => {
                if probe_in_flight {
                    false
                } else {
                    breaker.state = State::HalfOpen {
                        probe_in_flight: true,
                    };
                    true
                }
            }
        }
    }

    pub fn record_success(&self, key: &str) {
        let mut breakers = self.breakers.lock().unwrap();
        if let Some(breaker) = breakers.get_mut(key) {
            breaker.state = State::Closed;
            breaker.consecutive_failures = 0;
        }
    }

    pub fn record_failure(&self, key: &str) {
        let mut breakers = self.breakers.lock().unwrap();
        let breaker = breakers.entry(key.to_string()).or_insert(Breaker {
            state: State::Closed,
            consecutive_failures: 0,
        });

        match breaker.state {
            State::Closed => {
                breaker.consecutive_failures += 1;
                if breaker.consecutive_failures >= self.failure_threshold {
                    breaker.state = State::Open {
                        opened_at: Instant::now(),
                    };
                }
            }
            State::HalfOpen { .. } => {
                breaker.state = State::Open {
                    opened_at: Instant::now(),
                };
                breaker.consecutive_failures = 0;
            }
            State::Open { .. } => {}
        }
    }

    /// Whether the breaker for `key` is currently open (diagnostic use only).
    pub fn is_open(&self, key: &str) -> bool {
        let breakers = self.breakers.lock().unwrap();
        matches!(breakers.get(key).map(|b| b.state), Some(State::Open { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_n_consecutive_failures() {
        let breakers = CircuitBreakers::new(5, Duration::from_secs(60));
        for _ in 0..4 {
            assert!(breakers.allow("model"));
            breakers.record_failure("model");
        }
        assert!(!breakers.is_open("model"));
        assert!(breakers.allow("model"));
        breakers.record_failure("model");
        assert!(breakers.is_open("model"));
        assert!(!breakers.allow("model"));
    }

    #[test]
    fn half_open_success_closes_and_resets() {
        let breakers = CircuitBreakers::new(1, Duration::from_millis(10));
        breakers.allow("store");
        breakers.record_failure("store");
        assert!(breakers.is_open("store"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(breakers.allow("store"), "half-open probe should be admitted");
        breakers.record_success("store");
        assert!(!breakers.is_open("store"));
        assert!(breakers.allow("store"));
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let breakers = CircuitBreakers::new(1, Duration::from_millis(10));
        breakers.allow("media");
        breakers.record_failure("media");
        std::thread::sleep(Duration::from_millis(20));
        assert!(breakers.allow("media"));
        breakers.record_failure("media");
        assert!(breakers.is_open("media"));
    }

    #[test]
    fn only_one_half_open_probe_admitted_concurrently() {
        let breakers = CircuitBreakers::new(1, Duration::from_millis(10));
        breakers.allow("model");
        breakers.record_failure("model");
        std::thread::sleep(Duration::from_millis(20));
        assert!(breakers.allow("model"));
        assert!(!breakers.allow("model"), "second concurrent probe must be rejected");
    }
}
