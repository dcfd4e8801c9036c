//! The pipeline driver (C7): a `match` over [`Stage`] that calls each
//! stage's handler and applies its failure policy, persisting the job after
//! every transition so a crash can resume from the last saved stage.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use subgen_models::{Job, JobFlags, JobId, LanguageCode, Stage};
use subgen_retry::RetryRateCore;
use subgen_state::JobStateStore;
use subgen_storage::BucketMode;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::handlers::{self, GeneratingOutcome};
use crate::ports::{MediaPort, ModelPort, StorePort};

/// Static, job-independent settings threaded into every stage handler.
/// Constructed once from [`subgen_config::Config`] and reused across every
/// job an orchestrator instance drives (including every job in a `batch`
/// run).
#[derive(Clone)]
pub struct PipelineSettings {
    pub chunk_duration_sec: f64,
    pub success_rate_threshold: f64,
    pub probe_timeout_sec: u64,
    pub worker_count: usize,
    pub project_id: String,
    pub region: String,
    pub bucket_prefix: String,
    pub existing_bucket_name: Option<String>,
    pub output_root: PathBuf,
    pub work_root: PathBuf,
    pub keep_cloud: bool,
    pub strict_validation: bool,
}

impl PipelineSettings {
    pub fn bucket_mode_for(&self, job_id: &str) -> BucketMode {
        match &self.existing_bucket_name {
            Some(bucket_name) => BucketMode::UseExisting { bucket_name: bucket_name.clone() },
            None => BucketMode::CreateNew {
                prefix: format!("{}-{job_id}", self.bucket_prefix),
                project_id: self.project_id.clone(),
                location: self.region.clone(),
            },
        }
    }
}

pub struct PipelineContext {
    pub media: Arc<dyn MediaPort>,
    pub store: Arc<dyn StorePort>,
    pub model: Arc<dyn ModelPort>,
    pub retry: RetryRateCore,
    pub settings: PipelineSettings,
    /// Job cancellation signal (§5): the Generating stage's scheduler polls
    /// this before dispatching each new work item and stops fanning out
    /// once it flips to `true`, letting in-flight items finish naturally.
    /// A context built with [`inert_cancel_receiver`] never cancels.
    pub cancel: watch::Receiver<bool>,
}

/// A cancellation receiver whose sender is immediately dropped — `borrow()`
/// keeps returning `false` forever, so a context built with this never
/// observes cancellation. Used by callers (tests, one-shot scripts) that
/// have no cancellation source of their own.
pub fn inert_cancel_receiver() -> watch::Receiver<bool> {
    let (_tx, rx) = watch::channel(false);
    rx
}

/// Drives jobs through the 10-stage pipeline and persists state after every
/// transition. One instance is constructed per process and shared across
/// every job in a `batch` run, so the retry core's circuit-breaker and
/// rate-limiter tables stay correctly process-wide (§5).
pub struct Orchestrator {
    ctx: PipelineContext,
    state: JobStateStore,
}

impl Orchestrator {
    pub fn new(ctx: PipelineContext, state: JobStateStore) -> Self {
        Self { ctx, state }
    }

    /// Create and run a brand-new job for `video_path`.
    pub async fn process(
        &self,
        video_path: PathBuf,
        languages: Vec<LanguageCode>,
        flags: JobFlags,
    ) -> OrchestratorResult<Job> {
        let output_dir = self.ctx.settings.output_root.clone();
        let mut job = Job::new(video_path, languages, flags, output_dir);
        self.state.save(&mut job).await?;
        self.drive(&mut job).await?;
        Ok(job)
    }

    /// Resume a previously-saved job from its persisted stage.
    pub async fn resume(&self, job_id: &JobId) -> OrchestratorResult<Job> {
        let mut job = self
            .state
            .load(job_id)
            .await?
            .ok_or_else(|| OrchestratorError::JobNotFound { job_id: job_id.as_str().to_string() })?;
        self.drive(&mut job).await?;
        Ok(job)
    }

    /// Runs `job` forward from its current stage to `Completed` or `Failed`,
    /// persisting after every transition. Also checked between stages (§5):
    /// if cancellation was signalled while the previous stage ran, the job
    /// is left at its current (already-persisted) stage rather than
    /// advancing into the next one — a later `resume` simply continues.
    async fn drive(&self, job: &mut Job) -> OrchestratorResult<()> {
        loop {
            if job.stage.is_terminal() {
                return Ok(());
            }

            if *self.ctx.cancel.borrow() {
                info!(job_id = %job.id, stage = %job.stage, "cancellation observed before next stage, stopping");
                return Ok(());
            }

            let Some(target) = job.stage.next() else {
                return Ok(());
            };

            info!(job_id = %job.id, from = %job.stage, to = %target, "advancing stage");

            let result = self.run_stage(target, job).await;

            match result {
                Ok(true) => {
                    job.advance_to(target);
                    self.state.save(job).await?;
                }
                Ok(false) => {
                    info!(job_id = %job.id, stage = %target, "stage cancelled mid-run, not advancing");
                    self.state.save(job).await?;
                    return Ok(());
                }
                Err(err) => {
                    error!(job_id = %job.id, stage = %target, %err, "stage failed");
                    job.mark_failed(target, err.to_string(), 1);
                    self.state.save(job).await?;
                    return Err(err);
                }
            }
        }
    }

    /// Dispatches to the handler for `stage`, applying Generating's
    /// partial-ok and cancellation policy inline (every other stage is
    /// fail-fast: a handler's `Err` propagates straight out of
    /// [`Self::drive`]). Returns `Ok(false)` only for a cancelled Generating
    /// stage, meaning "persist what we have, but don't advance".
    async fn run_stage(&self, stage: Stage, job: &mut Job) -> OrchestratorResult<bool> {
        match stage {
            Stage::Created => Ok(true),
            Stage::Validating => handlers::validating(&self.ctx, job).await.map(|()| true),
            Stage::Analyzing => handlers::analyzing(&self.ctx, job).await.map(|()| true),
            Stage::Chunking => handlers::chunking(&self.ctx, job).await.map(|()| true),
            Stage::ConnectingStore => handlers::connecting_store(&self.ctx, job).await.map(|()| true),
            Stage::Uploading => handlers::uploading(&self.ctx, job).await.map(|()| true),
            Stage::InitModel => handlers::init_model(&self.ctx, job).await.map(|()| true),
            Stage::Generating => match handlers::generating(&self.ctx, job).await? {
                GeneratingOutcome::Done => Ok(true),
                GeneratingOutcome::Cancelled => Ok(false),
                GeneratingOutcome::Partial { ok, failed, rate } => {
                    if rate >= self.ctx.settings.success_rate_threshold {
                        info!(ok, failed, rate, "generating accepted as partial success");
                        Ok(true)
                    } else {
                        Err(OrchestratorError::InsufficientSuccessRate {
                            stage: stage.as_str().to_string(),
                            rate,
                            threshold: self.ctx.settings.success_rate_threshold,
                        })
                    }
                }
            },
            Stage::Downloading => handlers::downloading(&self.ctx, job).await.map(|()| true),
            Stage::Merging => handlers::merging(&self.ctx, job).await.map(|()| true),
            Stage::Finalizing => handlers::finalizing(&self.ctx, job).await.map(|()| true),
            Stage::Completed | Stage::Failed => Ok(true),
        }
    }

    pub fn job_state_store(&self) -> &JobStateStore {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mock::{FixedModelPort, MockMediaPort, MockStorePort};
    use std::sync::Mutex;

    fn settings(output_root: PathBuf, work_root: PathBuf) -> PipelineSettings {
        PipelineSettings {
            chunk_duration_sec: 60.0,
            success_rate_threshold: 0.3,
            probe_timeout_sec: 30,
            worker_count: 4,
            project_id: "test-project".to_string(),
            region: "us-central1".to_string(),
            bucket_prefix: "subgen".to_string(),
            existing_bucket_name: Some("test-bucket".to_string()),
            output_root,
            work_root,
            keep_cloud: true,
            strict_validation: false,
        }
    }

    const FIXED_SRT: &str = "1\n00:00:00,000 --> 00:00:02,000\nHello there\n\n";

    #[tokio::test]
    async fn end_to_end_run_with_mocked_ports_produces_output_files() {
        let tmp = tempfile::tempdir().unwrap();
        let video_path = tmp.path().join("input.mp4");
        tokio::fs::write(&video_path, vec![0u8; 200 * 1024]).await.unwrap();

        let ctx = PipelineContext {
            media: Arc::new(MockMediaPort { duration_sec: 125.0, fail_probe: false }),
            store: Arc::new(MockStorePort { blobs: Mutex::new(Default::default()) }),
            model: Arc::new(FixedModelPort { srt: FIXED_SRT.to_string(), fail_languages: vec![] }),
            retry: RetryRateCore::new(),
            settings: settings(tmp.path().join("output"), tmp.path().join("work")),
            cancel: inert_cancel_receiver(),
        };
        let state = JobStateStore::new(tmp.path().join("jobs")).await.unwrap();
        let orchestrator = Orchestrator::new(ctx, state);

        let job = orchestrator
            .process(video_path, vec![LanguageCode::parse("eng").unwrap()], JobFlags::default())
            .await
            .unwrap();

        assert_eq!(job.stage, Stage::Completed);
        let merged_files = job.metadata.get("merged_files").unwrap().as_array().unwrap();
        assert!(merged_files.iter().any(|v| v.as_str().unwrap().ends_with(".srt")));
        for file in merged_files {
            let path = file.as_str().unwrap();
            assert!(std::path::Path::new(path).is_file(), "missing output file {path}");
        }
    }

    #[tokio::test]
    async fn partial_success_meeting_threshold_still_completes() {
        let tmp = tempfile::tempdir().unwrap();
        let video_path = tmp.path().join("input.mp4");
        tokio::fs::write(&video_path, vec![0u8; 200 * 1024]).await.unwrap();

        let mut job_settings = settings(tmp.path().join("output"), tmp.path().join("work"));
        job_settings.chunk_duration_sec = 60.0;
        job_settings.success_rate_threshold = 0.3;

        let ctx = PipelineContext {
            media: Arc::new(MockMediaPort { duration_sec: 600.0, fail_probe: false }),
            store: Arc::new(MockStorePort { blobs: Mutex::new(Default::default()) }),
            model: Arc::new(FixedModelPort { srt: FIXED_SRT.to_string(), fail_languages: vec![] }),
            retry: RetryRateCore::new(),
            settings: job_settings,
            cancel: inert_cancel_receiver(),
        };
        let state = JobStateStore::new(tmp.path().join("jobs")).await.unwrap();
        let orchestrator = Orchestrator::new(ctx, state);

        let job = orchestrator
            .process(video_path, vec![LanguageCode::parse("eng").unwrap()], JobFlags::default())
            .await
            .unwrap();

        assert_eq!(job.stage, Stage::Completed);
    }

    #[tokio::test]
    async fn unreadable_video_fails_at_validating_without_advancing() {
        let tmp = tempfile::tempdir().unwrap();
        let video_path = tmp.path().join("missing.mp4");

        let ctx = PipelineContext {
            media: Arc::new(MockMediaPort { duration_sec: 60.0, fail_probe: false }),
            store: Arc::new(MockStorePort { blobs: Mutex::new(Default::default()) }),
            model: Arc::new(FixedModelPort { srt: FIXED_SRT.to_string(), fail_languages: vec![] }),
            retry: RetryRateCore::new(),
            settings: settings(tmp.path().join("output"), tmp.path().join("work")),
            cancel: inert_cancel_receiver(),
        };
        let state = JobStateStore::new(tmp.path().join("jobs")).await.unwrap();
        let orchestrator = Orchestrator::new(ctx, state);

        let result = orchestrator
            .process(video_path, vec![LanguageCode::parse("eng").unwrap()], JobFlags::default())
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn resume_continues_from_persisted_stage() {
        let tmp = tempfile::tempdir().unwrap();
        let video_path = tmp.path().join("input.mp4");
        tokio::fs::write(&video_path, vec![0u8; 200 * 1024]).await.unwrap();

        let ctx = PipelineContext {
            media: Arc::new(MockMediaPort { duration_sec: 125.0, fail_probe: false }),
            store: Arc::new(MockStorePort { blobs: Mutex::new(Default::default()) }),
            model: Arc::new(FixedModelPort { srt: FIXED_SRT.to_string(), fail_languages: vec![] }),
            retry: RetryRateCore::new(),
            settings: settings(tmp.path().join("output"), tmp.path().join("work")),
            cancel: inert_cancel_receiver(),
        };
        let state = JobStateStore::new(tmp.path().join("jobs")).await.unwrap();
        let orchestrator = Orchestrator::new(ctx, state);

        // Simulates a crash after Analyzing: the job already knows the probe
        // result and chunk count, but chunking/uploading/generating have
        // never run, so resume must execute them for real rather than skip
        // them.
        let mut job = Job::new(
            video_path,
            vec![LanguageCode::parse("eng").unwrap()],
            JobFlags::default(),
            tmp.path().join("output"),
        );
        job.metadata.insert(
            "video_info".to_string(),
            serde_json::json!({
                "duration_sec": 125.0, "width": 1920, "height": 1080, "fps": 30.0,
                "video_codec": "h264", "audio_codec": "aac", "size_bytes": 10_000_000u64
            }),
        );
        job.metadata.insert("chunk_count".to_string(), serde_json::json!(3));
        job.metadata.insert("chunk_duration_sec".to_string(), serde_json::json!(60.0));
        job.advance_to(Stage::Analyzing);
        orchestrator.job_state_store().save(&mut job).await.unwrap();

        let resumed = orchestrator.resume(&job.id).await.unwrap();
        assert_eq!(resumed.stage, Stage::Completed);
    }

    /// Seed scenario 6 (§8): cancellation fired mid-Generating leaves the
    /// job at its last completed stage (`drive` never advances `job.stage`
    /// to `Generating` itself on a cancelled run — only the fragments
    /// produced so far are persisted in metadata), and a later `resume`
    /// re-enters Generating, skips the already-done items, and finishes
    /// the rest.
    #[tokio::test]
    async fn cancellation_mid_generate_leaves_job_resumable() {
        use crate::ports::mock::CancellingModelPort;

        let tmp = tempfile::tempdir().unwrap();
        let video_path = tmp.path().join("input.mp4");
        tokio::fs::write(&video_path, vec![0u8; 200 * 1024]).await.unwrap();

        let (cancel_tx, cancel_rx) = watch::channel(false);

        let mut job_settings = settings(tmp.path().join("output"), tmp.path().join("work"));
        job_settings.worker_count = 1;
        job_settings.chunk_duration_sec = 60.0;

        let ctx = PipelineContext {
            media: Arc::new(MockMediaPort { duration_sec: 600.0, fail_probe: false }),
            store: Arc::new(MockStorePort { blobs: Mutex::new(Default::default()) }),
            model: Arc::new(CancellingModelPort {
                srt: FIXED_SRT.to_string(),
                threshold: 3,
                completed: Mutex::new(0),
                cancel_tx,
            }),
            retry: RetryRateCore::new(),
            settings: job_settings,
            cancel: cancel_rx,
        };
        let state = JobStateStore::new(tmp.path().join("jobs")).await.unwrap();
        let orchestrator = Orchestrator::new(ctx, state);

        let job = orchestrator
            .process(video_path.clone(), vec![LanguageCode::parse("eng").unwrap()], JobFlags::default())
            .await
            .unwrap();

        assert_eq!(job.stage, Stage::InitModel, "cancellation must not advance the persisted stage");
        let fragments = job.metadata.get("fragments").unwrap().as_array().unwrap();
        assert!(!fragments.is_empty(), "fragments completed before cancellation must be persisted");
        assert!(fragments.len() < 10, "not every chunk should have been dispatched");

        // Resume with a context whose port no longer cancels: the remaining
        // items complete and the job reaches Completed.
        let resume_ctx = PipelineContext {
            media: Arc::new(MockMediaPort { duration_sec: 600.0, fail_probe: false }),
            store: Arc::new(MockStorePort { blobs: Mutex::new(Default::default()) }),
            model: Arc::new(FixedModelPort { srt: FIXED_SRT.to_string(), fail_languages: vec![] }),
            retry: RetryRateCore::new(),
            settings: settings(tmp.path().join("output"), tmp.path().join("work")),
            cancel: inert_cancel_receiver(),
        };
        let resume_state = JobStateStore::new(tmp.path().join("jobs")).await.unwrap();
        let resume_orchestrator = Orchestrator::new(resume_ctx, resume_state);

        let resumed = resume_orchestrator.resume(&job.id).await.unwrap();
        assert_eq!(resumed.stage, Stage::Completed);
    }
}
