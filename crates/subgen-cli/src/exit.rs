//! Maps failures back onto the process exit codes the spec's CLI surface
//! promises: `0` success, `1` configuration error, `2` validation error,
//! `3` system error, `4` job failed, `130` cancelled.

use subgen_config::ConfigurationError;
use subgen_media::MediaError;
use subgen_orchestrator::OrchestratorError;
use subgen_retry::RetryError;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_CONFIGURATION_ERROR: i32 = 1;
pub const EXIT_VALIDATION_ERROR: i32 = 2;
pub const EXIT_SYSTEM_ERROR: i32 = 3;
pub const EXIT_JOB_FAILED: i32 = 4;
pub const EXIT_CANCELLED: i32 = 130;

pub fn for_configuration_error(_err: &ConfigurationError) -> i32 {
    EXIT_CONFIGURATION_ERROR
}

/// Classifies a failed `process`/`resume`/`batch` run. The coarse rule:
/// bad input or an unresolvable job-id is a validation error; a missing
/// dependency, exhausted retries against infrastructure, or a corrupt
/// state file is a system error; everything else (insufficient success
/// rate, a merge invariant violation) is a job failure that ran to
/// completion of its attempt but did not produce output.
pub fn for_orchestrator_error(err: &OrchestratorError) -> i32 {
    match err {
        OrchestratorError::ValidationFailed(_) => EXIT_VALIDATION_ERROR,
        OrchestratorError::JobNotFound { .. } => EXIT_VALIDATION_ERROR,
        OrchestratorError::Media(retry_err) => media_retry_exit_code(retry_err),
        OrchestratorError::Store(_) => EXIT_SYSTEM_ERROR,
        OrchestratorError::Model(_) => EXIT_SYSTEM_ERROR,
        OrchestratorError::State(_) => EXIT_SYSTEM_ERROR,
        OrchestratorError::Io(_) => EXIT_SYSTEM_ERROR,
        OrchestratorError::PreconditionUnmet { .. } => EXIT_SYSTEM_ERROR,
        OrchestratorError::InsufficientSuccessRate { .. } => EXIT_JOB_FAILED,
        OrchestratorError::MergeFailed { .. } => EXIT_JOB_FAILED,
    }
}

fn media_retry_exit_code(err: &RetryError<MediaError>) -> i32 {
    match err {
        RetryError::CircuitOpen { .. } => EXIT_SYSTEM_ERROR,
        RetryError::Exhausted { last, .. } => match last {
            MediaError::FfmpegNotFound | MediaError::FfprobeNotFound => EXIT_SYSTEM_ERROR,
            MediaError::FileNotFound(_)
            | MediaError::NoVideoStream(_)
            | MediaError::NonPositiveDuration(_) => EXIT_VALIDATION_ERROR,
            MediaError::Timeout(_)
            | MediaError::FfprobeFailed { .. }
            | MediaError::FfmpegFailed { .. }
            | MediaError::Io(_)
            | MediaError::JsonParse(_) => EXIT_SYSTEM_ERROR,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_failure_maps_to_exit_2() {
        let err = OrchestratorError::ValidationFailed("bad file".to_string());
        assert_eq!(for_orchestrator_error(&err), EXIT_VALIDATION_ERROR);
    }

    #[test]
    fn insufficient_success_rate_maps_to_exit_4() {
        let err = OrchestratorError::InsufficientSuccessRate {
            stage: "generating".to_string(),
            rate: 0.1,
            threshold: 0.3,
        };
        assert_eq!(for_orchestrator_error(&err), EXIT_JOB_FAILED);
    }

    #[test]
    fn missing_ffmpeg_binary_maps_to_exit_3() {
        let err = OrchestratorError::Media(RetryError::Exhausted {
            last: MediaError::FfmpegNotFound,
            attempts: 1,
            profile: "network",
        });
        assert_eq!(for_orchestrator_error(&err), EXIT_SYSTEM_ERROR);
    }

    #[test]
    fn no_video_stream_maps_to_exit_2() {
        let err = OrchestratorError::Media(RetryError::Exhausted {
            last: MediaError::NoVideoStream(std::path::PathBuf::from("in.mp4")),
            attempts: 1,
            profile: "network",
        });
        assert_eq!(for_orchestrator_error(&err), EXIT_VALIDATION_ERROR);
    }
}
