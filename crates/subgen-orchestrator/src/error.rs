use subgen_media::error::MediaError;
use subgen_model_client::ModelError;
use subgen_retry::RetryError;
use subgen_state::JobStateError;
use subgen_storage::StoreError;
use thiserror::Error;

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("media port: {0}")]
    Media(#[from] RetryError<MediaError>),

    #[error("object-store port: {0}")]
    Store(#[from] RetryError<StoreError>),

    #[error("model port: {0}")]
    Model(#[from] RetryError<ModelError>),

    #[error("job-state store: {0}")]
    State(#[from] JobStateError),

    #[error("job {job_id} not found")]
    JobNotFound { job_id: String },

    #[error("stage {stage} precondition unmet: missing metadata key '{key}'")]
    PreconditionUnmet { stage: String, key: String },

    #[error(
        "stage {stage} success rate {rate:.2} fell below the configured threshold {threshold:.2}"
    )]
    InsufficientSuccessRate { stage: String, rate: f64, threshold: f64 },

    #[error("merge of group '{group}' failed: {reason}")]
    MergeFailed { group: String, reason: String },

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
