//! Job identity, pipeline stage, and the durable job record.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::language::LanguageCode;

/// Unique identifier for a job, shaped `job_<unix_seconds>_<hex6>` to match
/// the on-disk naming the original state manager used, so job directories
/// sort naturally by creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let hex6 = &Uuid::new_v4().simple().to_string()[..6];
        Self(format!("job_{now}_{hex6}"))
    }

    pub fn from_string(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The linear 10-stage state machine, bracketed by `Created` and
/// `Completed`, with `Failed` reachable as a sink from any stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Created,
    Validating,
    Analyzing,
    Chunking,
    ConnectingStore,
    Uploading,
    InitModel,
    Generating,
    Downloading,
    Merging,
    Finalizing,
    Completed,
    Failed,
}

impl Stage {
    /// The stage immediately following this one on the happy path, or `None`
    /// once `Completed` (or `Failed`) has been reached.
    pub fn next(self) -> Option<Stage> {
        use Stage::*;
        match self {
            Created => Some(Validating),
            Validating => Some(Analyzing),
            Analyzing => Some(Chunking),
            Chunking => Some(ConnectingStore),
            ConnectingStore => Some(Uploading),
            Uploading => Some(InitModel),
            InitModel => Some(Generating),
            Generating => Some(Downloading),
            Downloading => Some(Merging),
            Merging => Some(Finalizing),
            Finalizing => Some(Completed),
            Completed | Failed => None,
        }
    }

    /// Ordinal position in the stage chain, used by the orchestrator to
    /// decide which stages a resumed job should skip.
    pub fn index(self) -> u8 {
        use Stage::*;
        match self {
            Created => 0,
            Validating => 1,
            Analyzing => 2,
            Chunking => 3,
            ConnectingStore => 4,
            Uploading => 5,
            InitModel => 6,
            Generating => 7,
            Downloading => 8,
            Merging => 9,
            Finalizing => 10,
            Completed => 11,
            Failed => u8::MAX,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

    pub fn as_str(self) -> &'static str {
        use Stage::*;
        match self {
            Created => "created",
            Validating => "validating",
            Analyzing => "analyzing",
            Chunking => "chunking",
            ConnectingStore => "connecting_store",
            Uploading => "uploading",
            InitModel => "init_model",
            Generating => "generating",
            Downloading => "downloading",
            Merging => "merging",
            Finalizing => "finalizing",
            Completed => "completed",
            Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Flags controlling optional behavior requested for a job, mirroring the
/// CLI/API surface (`--sdh`, `--dry-run`, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobFlags {
    /// Generate subtitles-for-the-deaf-and-hard-of-hearing variants.
    #[serde(default)]
    pub sdh: bool,
    /// Run analysis/validation only, without producing output files.
    #[serde(default)]
    pub dry_run: bool,
    /// Skip cleanup of intermediate chunk/upload artifacts on success.
    #[serde(default)]
    pub keep_intermediates: bool,
}

/// A captured failure, retained on the job record so `status`/`resume` can
/// report why a job stopped advancing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub stage: Stage,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
    /// Number of retry attempts already spent on this stage before giving up.
    pub attempts: u32,
}

/// The full durable record for one job, persisted as JSON by the state store
/// and reloaded across process restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub video_path: PathBuf,
    pub languages: Vec<LanguageCode>,
    pub flags: JobFlags,
    pub stage: Stage,
    pub output_dir: PathBuf,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set iff `stage == Completed` (§3); `None` at every other stage,
    /// including `Failed`.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<ErrorRecord>,
    /// Free-form bag for stage-local bookkeeping (chunk counts, upload URIs)
    /// that doesn't warrant its own typed field.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Job {
    pub fn new(
        video_path: PathBuf,
        languages: Vec<LanguageCode>,
        flags: JobFlags,
        output_dir: PathBuf,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            video_path,
            languages,
            flags,
            stage: Stage::Created,
            output_dir,
            created_at: now,
            updated_at: now,
            completed_at: None,
            error: None,
            metadata: HashMap::new(),
        }
    }

    /// Advance to `stage`, clearing any prior error and bumping `updated_at`.
    /// Sets `completed_at` iff `stage` is `Completed`.
    pub fn advance_to(&mut self, stage: Stage) {
        self.stage = stage;
        self.error = None;
        let now = Utc::now();
        self.updated_at = now;
        self.completed_at = if stage == Stage::Completed { Some(now) } else { None };
    }

    pub fn mark_failed(&mut self, at_stage: Stage, message: impl Into<String>, attempts: u32) {
        self.stage = Stage::Failed;
        self.completed_at = None;
        self.error = Some(ErrorRecord {
            stage: at_stage,
            message: message.into(),
            occurred_at: Utc::now(),
            attempts,
        });
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_has_expected_shape() {
        let id = JobId::new();
        let parts: Vec<&str> = id.as_str().split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "job");
        assert_eq!(parts[2].len(), 6);
    }

    #[test]
    fn stage_advances_linearly_to_completed() {
        let mut stage = Stage::Created;
        let mut count = 0;
        while let Some(next) = stage.next() {
            stage = next;
            count += 1;
            assert!(count <= 11, "stage chain did not terminate");
        }
        assert_eq!(stage, Stage::Completed);
        assert!(stage.is_terminal());
    }

    #[test]
    fn stage_index_is_monotonic_along_the_happy_path() {
        let mut stage = Stage::Created;
        while let Some(next) = stage.next() {
            assert!(next.index() > stage.index());
            stage = next;
        }
    }

    #[test]
    fn mark_failed_sets_error_record_and_stage() {
        let mut job = Job::new(
            PathBuf::from("in.mp4"),
            vec![LanguageCode::parse("eng").unwrap()],
            JobFlags::default(),
            PathBuf::from("out"),
        );
        job.mark_failed(Stage::Chunking, "ffmpeg exited with code 1", 3);
        assert_eq!(job.stage, Stage::Failed);
        let err = job.error.expect("error record set");
        assert_eq!(err.stage, Stage::Chunking);
        assert_eq!(err.attempts, 3);
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn completed_at_is_set_only_on_reaching_completed() {
        let mut job = Job::new(
            PathBuf::from("in.mp4"),
            vec![LanguageCode::parse("eng").unwrap()],
            JobFlags::default(),
            PathBuf::from("out"),
        );
        assert!(job.completed_at.is_none());
        job.advance_to(Stage::Validating);
        assert!(job.completed_at.is_none());
        job.advance_to(Stage::Completed);
        assert!(job.completed_at.is_some());
    }
}
