//! Named exponential-backoff profiles, matching the original
//! `retry_handler.py::RetryHandler.retry_configs` table.

use std::time::Duration;

use rand::Rng;

/// One named retry profile: attempt budget, base/cap delay, and growth factor.
///
/// `delay(n) = min(base * factor^(n-1), cap) * (1 + U[0, 0.1])`.
#[derive(Debug, Clone, Copy)]
pub struct RetryProfile {
    pub name: &'static str,
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
    pub factor: f64,
}

impl RetryProfile {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = self.factor.powi(attempt.saturating_sub(1) as i32);
        let raw = self.base.as_secs_f64() * exponent;
        let capped = raw.min(self.cap.as_secs_f64());
        let jitter = rand::rng().random_range(0.0..0.1);
        Duration::from_secs_f64(capped * (1.0 + jitter))
    }
}

pub const DEFAULT: RetryProfile = RetryProfile {
    name: "default",
    max_attempts: 3,
    base: Duration::from_secs(1),
    cap: Duration::from_secs(60),
    factor: 2.0,
};

pub const NETWORK: RetryProfile = RetryProfile {
    name: "network",
    max_attempts: 5,
    base: Duration::from_secs(2),
    cap: Duration::from_secs(120),
    factor: 2.0,
};

pub const STORAGE: RetryProfile = RetryProfile {
    name: "storage",
    max_attempts: 4,
    base: Duration::from_millis(1500),
    cap: Duration::from_secs(90),
    factor: 2.0,
};

pub const AI: RetryProfile = RetryProfile {
    name: "ai",
    max_attempts: 3,
    base: Duration::from_secs(3),
    cap: Duration::from_secs(180),
    factor: 2.0,
};

pub const QUOTA: RetryProfile = RetryProfile {
    name: "quota",
    max_attempts: 2,
    base: Duration::from_secs(60),
    cap: Duration::from_secs(300),
    factor: 2.0,
};

/// Look a profile up by name, falling back to [`DEFAULT`] for an unknown key
/// rather than failing — profile selection is a call-site literal, not
/// operator-controlled config.
pub fn by_name(name: &str) -> RetryProfile {
    match name {
        "network" => NETWORK,
        "storage" => STORAGE,
        "ai" => AI,
        "quota" => QUOTA,
        _ => DEFAULT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_until_cap() {
        let profile = RetryProfile {
            name: "test",
            max_attempts: 6,
            base: Duration::from_secs(1),
            cap: Duration::from_secs(10),
            factor: 2.0,
        };
        let d1 = profile.delay_for_attempt(1).as_secs_f64();
        let d2 = profile.delay_for_attempt(2).as_secs_f64();
        let d5 = profile.delay_for_attempt(5).as_secs_f64();
        assert!((0.9..=1.1).contains(&d1));
        assert!((1.8..=2.2).contains(&d2));
        // attempt 5 would be 16s uncapped; capped at 10s, plus up to 10% jitter.
        assert!(d5 <= 11.0);
    }

    #[test]
    fn named_profiles_match_the_spec_table() {
        assert_eq!(DEFAULT.max_attempts, 3);
        assert_eq!(NETWORK.max_attempts, 5);
        assert_eq!(STORAGE.max_attempts, 4);
        assert_eq!(AI.max_attempts, 3);
        assert_eq!(QUOTA.max_attempts, 2);
        assert_eq!(QUOTA.base, Duration::from_secs(60));
    }

    #[test]
    fn unknown_name_falls_back_to_default() {
        assert_eq!(by_name("bogus").name, "default");
        assert_eq!(by_name("ai").name, "ai");
    }
}
