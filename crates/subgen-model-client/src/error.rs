use subgen_models::{classify_by_message, ErrorClass};
use subgen_retry::Classify;
use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model auth error: {0}")]
    AuthError(String),

    #[error("model quota exceeded: {0}")]
    QuotaError(String),

    #[error("generation blocked by safety filter: {0}")]
    SafetyBlocked(String),

    #[error("transient model error: {0}")]
    TransientModelError(String),

    #[error("model rejected the request: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Network(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Classify for ModelError {
    fn error_class(&self) -> ErrorClass {
        match self {
            ModelError::AuthError(_) | ModelError::SafetyBlocked(_) | ModelError::ValidationError(_) => {
                ErrorClass::NonRetryable
            }
            // The model endpoint's own quota errors are the one quota case
            // the retry core treats as retryable — the `quota` backoff
            // profile exists specifically for this path.
            ModelError::QuotaError(_) => ErrorClass::Retryable,
            ModelError::TransientModelError(message) => classify_by_message(message),
            ModelError::Network(err) => {
                if err.is_timeout() || err.is_connect() {
                    ErrorClass::Retryable
                } else {
                    classify_by_message(&err.to_string())
                }
            }
            ModelError::Json(_) => ErrorClass::NonRetryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_errors_are_retryable() {
        assert!(matches!(
            ModelError::QuotaError("rate limit".into()).error_class(),
            ErrorClass::Retryable
        ));
    }

    #[test]
    fn safety_blocked_is_never_retried() {
        assert!(matches!(
            ModelError::SafetyBlocked("blocked".into()).error_class(),
            ErrorClass::NonRetryable
        ));
    }
}
