//! `RetryRateCore`: the single façade C2-C4 call through. Owns the
//! process-global circuit-breaker and rate-limiter tables behind a cheap
//! `Clone` handle (an `Arc` each) rather than ambient globals, per the
//! REDESIGN FLAGS — one instance is constructed in `main` and threaded
//! through the orchestrator by reference.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use subgen_models::ErrorClass;

use crate::backoff::RetryProfile;
use crate::circuit_breaker::CircuitBreakers;
use crate::error::RetryError;
use crate::rate_limiter::RateLimiters;

const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Implemented by every leaf port error so the retry core can decide,
/// without depending on the port's concrete crate, whether a failure is
/// worth another attempt.
pub trait Classify {
    fn error_class(&self) -> ErrorClass;
}

#[derive(Clone)]
pub struct RetryRateCore {
    breakers: Arc<CircuitBreakers>,
    limiters: Arc<RateLimiters>,
}

impl RetryRateCore {
    pub fn new() -> Self {
        Self {
            breakers: Arc::new(CircuitBreakers::new(
                DEFAULT_FAILURE_THRESHOLD,
                DEFAULT_RECOVERY_TIMEOUT,
            )),
            limiters: Arc::new(RateLimiters::new()),
        }
    }

    /// Block until the named service's sliding-window rate limiter admits
    /// the next call. Callers invoke this themselves before [`Self::call`]
    /// when the rate limit is meant to gate the *whole* retry loop's first
    /// attempt only (matching the scheduler's "wait on the limiter, then
    /// invoke through the retry façade" two-step).
    pub async fn throttle(&self, service_key: &str) {
        self.limiters.acquire(service_key).await;
    }

    /// Run `operation` under `profile`, consulting the circuit breaker keyed
    /// by `circuit_key` (if any) before every attempt and classifying each
    /// failure to decide whether to retry.
    pub async fn call<T, E, F, Fut>(
        &self,
        circuit_key: Option<&str>,
        profile: &RetryProfile,
        operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + std::fmt::Display,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;

            if let Some(key) = circuit_key {
                if !self.breakers.allow(key) {
                    return Err(RetryError::CircuitOpen {
                        service: key.to_string(),
                    });
                }
            }

            match operation().await {
                Ok(value) => {
                    if let Some(key) = circuit_key {
                        self.breakers.record_success(key);
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if let Some(key) = circuit_key {
                        self.breakers.record_failure(key);
                    }

                    let retryable = matches!(err.error_class(), ErrorClass::Retryable);
                    if !retryable || attempt >= profile.max_attempts {
                        return Err(RetryError::Exhausted {
                            last: err,
                            attempts: attempt,
                            profile: profile.name,
                        });
                    }

                    let delay = profile.delay_for_attempt(attempt);
                    warn!(
                        profile = profile.name,
                        attempt, ?delay, %err, "retrying after failure"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    pub fn is_circuit_open(&self, key: &str) -> bool {
        self.breakers.is_open(key)
    }
}

impl Default for RetryRateCore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError(&'static str);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl Classify for TestError {
        fn error_class(&self) -> ErrorClass {
            if self.0 == "fatal" {
                ErrorClass::NonRetryable
            } else {
                ErrorClass::Retryable
            }
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry_on_first_try() {
        let core = RetryRateCore::new();
        let calls = AtomicU32::new(0);
        let result: Result<u32, RetryError<TestError>> = core
            .call(None, &RetryProfile { max_attempts: 3, ..crate::backoff::DEFAULT }, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(42) }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_retryable_errors_until_exhausted() {
        let core = RetryRateCore::new();
        let profile = RetryProfile {
            max_attempts: 3,
            base: Duration::from_millis(1),
            cap: Duration::from_millis(5),
            ..crate::backoff::DEFAULT
        };
        let calls = AtomicU32::new(0);
        let result: Result<(), RetryError<TestError>> = core
            .call(None, &profile, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError("transient")) }
            })
            .await;
        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 3, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_after_one_attempt() {
        let core = RetryRateCore::new();
        let calls = AtomicU32::new(0);
        let result: Result<(), RetryError<TestError>> = core
            .call(None, &crate::backoff::DEFAULT, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError("fatal")) }
            })
            .await;
        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 1, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn open_circuit_fails_fast_without_invoking_operation() {
        let core = RetryRateCore::new();
        let fast = RetryProfile {
            max_attempts: 1,
            base: Duration::from_millis(1),
            cap: Duration::from_millis(2),
            ..crate::backoff::DEFAULT
        };
        let calls = AtomicU32::new(0);
        for _ in 0..5 {
            let _: Result<(), RetryError<TestError>> = core
                .call(Some("model"), &fast, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(TestError("transient")) }
                })
                .await;
        }
        assert!(core.is_circuit_open("model"));

        let calls_before = calls.load(Ordering::SeqCst);
        let result: Result<(), RetryError<TestError>> = core
            .call(Some("model"), &fast, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;
        assert!(matches!(result, Err(RetryError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), calls_before);
    }
}
