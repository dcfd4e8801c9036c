use std::path::PathBuf;

use subgen_models::{classify_by_message, ErrorClass};
use subgen_retry::Classify;
use thiserror::Error;

pub type MediaResult<T> = Result<T, MediaError>;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("ffmpeg not found on PATH")]
    FfmpegNotFound,

    #[error("ffprobe not found on PATH")]
    FfprobeNotFound,

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("no video stream found in {0}")]
    NoVideoStream(PathBuf),

    #[error("video has non-positive duration: {0}s")]
    NonPositiveDuration(f64),

    #[error("ffprobe failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("ffmpeg failed (exit {exit_code:?}): {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("probe timed out after {0}s")]
    Timeout(u64),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    pub fn ffmpeg_failed(message: impl Into<String>, stderr: Option<String>, exit_code: Option<i32>) -> Self {
        MediaError::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }
}

impl Classify for MediaError {
    fn error_class(&self) -> ErrorClass {
        match self {
            // A missing binary, an absent file, no video stream, or a
            // non-positive duration will never resolve on retry.
            MediaError::FfmpegNotFound
            | MediaError::FfprobeNotFound
            | MediaError::FileNotFound(_)
            | MediaError::NoVideoStream(_)
            | MediaError::NonPositiveDuration(_) => ErrorClass::NonRetryable,
            MediaError::Timeout(_) => ErrorClass::Retryable,
            MediaError::FfprobeFailed { message, .. } | MediaError::FfmpegFailed { message, .. } => {
                classify_by_message(message)
            }
            MediaError::Io(_) => ErrorClass::Retryable,
            MediaError::JsonParse(_) => ErrorClass::NonRetryable,
        }
    }
}
