//! Wires a loaded [`subgen_config::Config`] plus CLI overrides into the
//! concrete [`PipelineContext`] the orchestrator drives stages through:
//! real `ffmpeg`/`ffprobe` media port, real GCS store, real model client.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;

use subgen_config::Config;
use subgen_model_client::ModelClient;
use subgen_orchestrator::ports::FfmpegMediaPort;
use subgen_orchestrator::{PipelineContext, PipelineSettings};
use subgen_retry::RetryRateCore;
use subgen_state::JobStateStore;
use subgen_storage::GcsClient;

const MODEL_API_KEY_ENV: &str = "SUBGEN_MODEL_API_KEY";

/// Flags common to `process`, `batch`, and `resume` that shape
/// [`PipelineSettings`] beyond what the config file carries.
pub struct RunOverrides {
    pub output_dir: Option<PathBuf>,
    pub strict: bool,
    pub keep_intermediates: bool,
}

pub async fn build_context(
    config: &Config,
    overrides: &RunOverrides,
    cancel: watch::Receiver<bool>,
) -> Result<PipelineContext> {
    let media = Arc::new(FfmpegMediaPort);

    let store = Arc::new(
        GcsClient::new(config.project_id.clone())
            .await
            .context("failed to initialize the GCS object-store port")?,
    );

    let api_key = std::env::var(MODEL_API_KEY_ENV)
        .with_context(|| format!("{MODEL_API_KEY_ENV} must be set to call the model port"))?;
    let model = Arc::new(ModelClient::new(api_key));

    let output_root = overrides
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output.output_dir));

    let settings = PipelineSettings {
        chunk_duration_sec: config.processing.chunk_duration_sec,
        success_rate_threshold: config.processing.success_rate_threshold,
        probe_timeout_sec: config.processing.probe_timeout_sec,
        worker_count: config.processing.worker_count,
        project_id: config.project_id.clone(),
        region: config.gcp.region.clone(),
        bucket_prefix: config.gcp.bucket_prefix.clone(),
        existing_bucket_name: config.gcp.bucket_name.clone(),
        output_root,
        work_root: PathBuf::from(&config.output.work_dir),
        keep_cloud: overrides.keep_intermediates,
        strict_validation: overrides.strict,
    };

    Ok(PipelineContext {
        media,
        store,
        model,
        retry: RetryRateCore::new(),
        settings,
        cancel,
    })
}

pub async fn open_job_state_store(config: &Config) -> Result<JobStateStore> {
    JobStateStore::new(&config.output.jobs_dir)
        .await
        .context("failed to open the job-state store")
}
