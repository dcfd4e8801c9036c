//! Sliding 60-second-window rate limiter, per service key, seeded from the
//! original `retry_handler.py::RateLimiter.acquire()`. Deliberately
//! hand-rolled over a `Mutex<VecDeque<Instant>>` rather than a token-bucket
//! crate, because the spec's "admit if fewer than Q calls in the trailing
//! 60s, else block for `60 - (now - oldest) + 0.1s`" semantics don't match
//! token-bucket refill semantics exactly.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);
const BUFFER: Duration = Duration::from_millis(100);

struct Window {
    calls: VecDeque<Instant>,
    quota: u32,
}

/// Process-wide sliding-window rate limiters, one per service key.
pub struct RateLimiters {
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiters {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Block the caller until a call against `service_key` is admitted.
    /// Re-checks the window after every sleep, since other concurrent
    /// callers may have consumed the slot that prompted the wait.
    pub async fn acquire(&self, service_key: &str) {
        loop {
            let wait = self.try_reserve(service_key);
            match wait {
                None => return,
                Some(delay) => tokio::time::sleep(delay).await,
            }
        }
    }

    fn try_reserve(&self, service_key: &str) -> Option<Duration> {
        let mut windows = self.windows.lock().unwrap();
        let window = windows
            .entry(service_key.to_string())
            .or_insert_with(|| Window {
                calls: VecDeque::new(),
                quota: default_quota(service_key),
            });

        let now = Instant::now();
        while let Some(&front) = window.calls.front() {
            if now.duration_since(front) >= WINDOW {
                window.calls.pop_front();
            } else {
                break;
            }
        }

        if (window.calls.len() as u32) < window.quota {
            window.calls.push_back(now);
            None
        } else {
            let oldest = *window.calls.front().expect("quota > 0 implies a recorded call");
            let elapsed = now.duration_since(oldest);
            Some(WINDOW.saturating_sub(elapsed) + BUFFER)
        }
    }
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::new()
    }
}

/// Default per-minute quotas, matching the original's
/// `rate_limiters = {'vertex_ai': 30, 'storage': 100, 'default': 60}`.
fn default_quota(service_key: &str) -> u32 {
    match service_key {
        "model" => 30,
        "store" => 100,
        _ => 60,
    }
}
