//! Retry, rate-limiting, and circuit-breaker façade shared by every port
//! (`subgen-media`, `subgen-storage`, `subgen-model-client`). A single
//! [`RetryRateCore`] instance is constructed once per process and threaded
//! through the orchestrator by reference — not a global static — so its
//! circuit-breaker and rate-limiter tables are correctly process-wide
//! across jobs in the same `batch` invocation without resorting to ambient
//! singletons.

pub mod backoff;
pub mod circuit_breaker;
pub mod core;
pub mod error;
pub mod rate_limiter;

pub use backoff::{by_name, RetryProfile, AI, DEFAULT, NETWORK, QUOTA, STORAGE};
pub use core::{Classify, RetryRateCore};
pub use error::RetryError;
