use thiserror::Error;

/// The outcome of a [`crate::core::RetryRateCore::call`] invocation that did
/// not return `Ok`: either the circuit was open before the first attempt, or
/// every permitted attempt was spent.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("circuit open for service '{service}'")]
    CircuitOpen { service: String },

    #[error("exhausted {attempts} attempt(s) under profile '{profile}': {last}")]
    Exhausted {
        last: E,
        attempts: u32,
        profile: &'static str,
    },
}

impl<E> RetryError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, RetryError::CircuitOpen { .. })
    }
}
