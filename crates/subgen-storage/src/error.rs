use subgen_models::{classify_by_message, ErrorClass};
use subgen_retry::Classify;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("auth error: {0}")]
    Auth(String),

    #[error("bucket or blob not found: {0}")]
    NotFound(String),

    #[error("bucket already exists: {0}")]
    BucketExists(String),

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("rate limited by storage backend")]
    RateLimited,

    #[error(transparent)]
    Network(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn auth(msg: impl Into<String>) -> Self {
        StoreError::Auth(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        StoreError::NotFound(what.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        StoreError::RequestFailed(msg.into())
    }

    /// Non-authoritative convenience check, used outside the retry façade
    /// (e.g. by `cleanup`, which never invokes `call` and just wants to know
    /// whether to log-and-continue or log-and-abort).
    pub fn is_retryable(&self) -> bool {
        matches!(self.error_class(), ErrorClass::Retryable)
    }
}

impl Classify for StoreError {
    fn error_class(&self) -> ErrorClass {
        match self {
            StoreError::Auth(_) | StoreError::BucketExists(_) => ErrorClass::NonRetryable,
            StoreError::NotFound(_) => ErrorClass::NonRetryable,
            StoreError::RateLimited => ErrorClass::Retryable,
            StoreError::RequestFailed(message) => classify_by_message(message),
            StoreError::Network(err) => {
                if err.is_timeout() || err.is_connect() {
                    ErrorClass::Retryable
                } else {
                    classify_by_message(&err.to_string())
                }
            }
            StoreError::Json(_) => ErrorClass::NonRetryable,
        }
    }
}
