use thiserror::Error;

pub type JobStateResult<T> = Result<T, JobStateError>;

#[derive(Debug, Error)]
pub enum JobStateError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The job file exists but could not be parsed as JSON — distinct from
    /// "not found" so callers never silently treat corrupt data as absent.
    #[error("job record {job_id} is corrupt: {source}")]
    Corrupt {
        job_id: String,
        #[source]
        source: serde_json::Error,
    },
}
