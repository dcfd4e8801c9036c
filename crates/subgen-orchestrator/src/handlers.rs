//! One handler function per pipeline stage (C7 §4.7), each taking the
//! shared [`crate::orchestrator::PipelineContext`] and the job being driven.
//! Handlers read/write `job.metadata` for everything that doesn't warrant a
//! typed `Job` field and are written to be safely re-run on resume: every
//! side effect checks "does the expected artifact already exist" first.

use std::path::{Path, PathBuf};

use serde_json::json;
use tracing::{info, warn};

use subgen_model_client::GenerationMethod;
use subgen_models::{Chunk, Fragment, GenerationFlags, LanguageCode};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::orchestrator::PipelineContext;
use crate::scheduler::{self, WorkItem};
use crate::{merge, validate};

const MIN_FILE_SIZE_BYTES: u64 = 100 * 1024;
const MAX_FILE_SIZE_BYTES: u64 = 50 * 1024 * 1024 * 1024;
const MAX_DURATION_SEC: f64 = 12.0 * 3600.0;

const ALLOWED_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm", "flv", "wmv"];

const MEDIA_CIRCUIT_KEY: &str = "media";
const STORE_CIRCUIT_KEY: &str = "store";

fn media_profile() -> subgen_retry::RetryProfile {
    subgen_retry::by_name("network")
}

fn storage_profile() -> subgen_retry::RetryProfile {
    subgen_retry::by_name("storage")
}

fn metadata_str(job: &subgen_models::Job, key: &str) -> OrchestratorResult<String> {
    job.metadata
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| OrchestratorError::PreconditionUnmet {
            stage: job.stage.as_str().to_string(),
            key: key.to_string(),
        })
}

fn metadata_value<'a>(job: &'a subgen_models::Job, key: &str) -> OrchestratorResult<&'a serde_json::Value> {
    job.metadata.get(key).ok_or_else(|| OrchestratorError::PreconditionUnmet {
        stage: job.stage.as_str().to_string(),
        key: key.to_string(),
    })
}

pub async fn validating(ctx: &PipelineContext, job: &mut subgen_models::Job) -> OrchestratorResult<()> {
    let path = &job.video_path;

    if !path.is_file() {
        return Err(OrchestratorError::ValidationFailed(format!(
            "{} is not a file",
            path.display()
        )));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(OrchestratorError::ValidationFailed(format!(
            "unsupported extension '.{extension}', expected one of {ALLOWED_EXTENSIONS:?}"
        )));
    }

    let size_bytes = std::fs::metadata(path).map_err(OrchestratorError::Io)?.len();
    if !(MIN_FILE_SIZE_BYTES..=MAX_FILE_SIZE_BYTES).contains(&size_bytes) {
        return Err(OrchestratorError::ValidationFailed(format!(
            "file size {size_bytes} bytes is outside the allowed [{MIN_FILE_SIZE_BYTES}, {MAX_FILE_SIZE_BYTES}] range"
        )));
    }

    let probe = ctx
        .retry
        .call(Some(MEDIA_CIRCUIT_KEY), &media_profile(), || {
            ctx.media.probe(path, ctx.settings.probe_timeout_sec)
        })
        .await?;

    if probe.duration_sec > MAX_DURATION_SEC {
        return Err(OrchestratorError::ValidationFailed(format!(
            "video duration {:.0}s exceeds the {MAX_DURATION_SEC:.0}s maximum",
            probe.duration_sec
        )));
    }

    job.metadata.insert("video_info".to_string(), serde_json::to_value(&probe).expect("VideoInfo serializes"));
    Ok(())
}

pub async fn analyzing(ctx: &PipelineContext, job: &mut subgen_models::Job) -> OrchestratorResult<()> {
    let video_info = metadata_value(job, "video_info")?.clone();
    let duration_sec = video_info["duration_sec"].as_f64().unwrap_or(0.0);

    let chunk_count = Chunk::count_for(duration_sec, ctx.settings.chunk_duration_sec);
    job.metadata.insert("chunk_count".to_string(), json!(chunk_count));
    job.metadata.insert("chunk_duration_sec".to_string(), json!(ctx.settings.chunk_duration_sec));
    Ok(())
}

fn work_dir(ctx: &PipelineContext, job: &subgen_models::Job) -> PathBuf {
    ctx.settings.work_root.join(job.id.as_str())
}

pub async fn chunking(ctx: &PipelineContext, job: &mut subgen_models::Job) -> OrchestratorResult<()> {
    let chunk_count = metadata_value(job, "chunk_count")?.as_u64().unwrap_or(0) as u32;
    let video_info = metadata_value(job, "video_info")?.clone();
    let duration_sec = video_info["duration_sec"].as_f64().unwrap_or(0.0);

    let dir = work_dir(ctx, job).join("chunks");
    tokio::fs::create_dir_all(&dir).await.map_err(OrchestratorError::Io)?;

    let mut chunks = Vec::with_capacity(chunk_count as usize);
    for index in 0..chunk_count {
        let start_sec = index as f64 * ctx.settings.chunk_duration_sec;
        let chunk_duration =
            Chunk::duration_for_index(index, chunk_count, duration_sec, ctx.settings.chunk_duration_sec);
        let out_path = dir.join(format!("chunk_{index:03}.mp4"));

        let already_present = tokio::fs::metadata(&out_path)
            .await
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        if !already_present {
            let input = job.video_path.clone();
            let cut_out_path = out_path.clone();
            ctx.retry
                .call(Some(MEDIA_CIRCUIT_KEY), &media_profile(), || {
                    ctx.media.cut(&input, start_sec, chunk_duration, &cut_out_path)
                })
                .await?;
        }

        chunks.push(Chunk::new(index, start_sec, chunk_duration, out_path));
    }

    job.metadata.insert("chunks".to_string(), serde_json::to_value(&chunks).expect("chunks serialize"));
    Ok(())
}

pub async fn connecting_store(ctx: &PipelineContext, job: &mut subgen_models::Job) -> OrchestratorResult<()> {
    let mode = ctx.settings.bucket_mode_for(job.id.as_str());
    let bucket = ctx
        .retry
        .call(Some(STORE_CIRCUIT_KEY), &storage_profile(), || ctx.store.ensure_bucket(&mode))
        .await?;

    job.metadata.insert("bucket".to_string(), json!(bucket));
    Ok(())
}

pub async fn uploading(ctx: &PipelineContext, job: &mut subgen_models::Job) -> OrchestratorResult<()> {
    let bucket = metadata_str(job, "bucket")?;
    let chunks_value = metadata_value(job, "chunks")?.clone();
    let mut chunks: Vec<Chunk> = serde_json::from_value(chunks_value).map_err(|err| {
        OrchestratorError::ValidationFailed(format!("corrupt chunk metadata: {err}"))
    })?;

    for chunk in &mut chunks {
        let blob_name = format!("chunks/{}/chunk_{:03}.mp4", job.id.as_str(), chunk.index);

        let exists = ctx
            .retry
            .call(Some(STORE_CIRCUIT_KEY), &storage_profile(), || ctx.store.exists(&bucket, &blob_name))
            .await?;

        if !exists {
            let bytes = tokio::fs::read(&chunk.local_path).await.map_err(OrchestratorError::Io)?;
            ctx.retry
                .call(Some(STORE_CIRCUIT_KEY), &storage_profile(), || ctx.store.upload(bytes.clone(), &bucket, &blob_name))
                .await?;
        }

        chunk.remote_uri = Some(format!("gs://{bucket}/{blob_name}"));
        chunk.size_bytes = chunk.size_bytes.or_else(|| std::fs::metadata(&chunk.local_path).ok().map(|m| m.len()));
    }

    job.metadata.insert("chunks".to_string(), serde_json::to_value(&chunks).expect("chunks serialize"));
    Ok(())
}

/// A no-op placeholder on the concrete [`crate::ports::ModelPort`] adapters
/// (the Gemini-style endpoint needs no per-job handshake); kept as its own
/// stage because a future model port might.
pub async fn init_model(_ctx: &PipelineContext, job: &mut subgen_models::Job) -> OrchestratorResult<()> {
    job.metadata.insert("model_initialized".to_string(), json!(true));
    Ok(())
}

/// Whether the Generating stage met the configured success-rate threshold,
/// or was cut short by a cancellation signal before every item had a
/// chance to run.
pub enum GeneratingOutcome {
    Done,
    Partial { ok: usize, failed: usize, rate: f64 },
    /// Cancellation was observed before every work item was dispatched.
    /// Already-produced fragments are persisted to `job.metadata` exactly
    /// like a normal run, but the orchestrator must not advance past
    /// Generating — a later `resume` re-enters this handler, which skips
    /// every (chunk, language, method) triple already fulfilled.
    Cancelled,
}

/// Key identifying one unit of generation work, used to tell which items a
/// prior (possibly cancelled) attempt already produced a fragment for.
fn item_key(chunk_index: u32, language: LanguageCode, method: GenerationMethod) -> (u32, String, &'static str) {
    (chunk_index, language.as_str().to_string(), method.as_str())
}

pub async fn generating(ctx: &PipelineContext, job: &mut subgen_models::Job) -> OrchestratorResult<GeneratingOutcome> {
    let chunks_value = metadata_value(job, "chunks")?.clone();
    let chunks: Vec<Chunk> = serde_json::from_value(chunks_value).map_err(|err| {
        OrchestratorError::ValidationFailed(format!("corrupt chunk metadata: {err}"))
    })?;
    let bucket = metadata_str(job, "bucket")?;

    let existing_fragments: Vec<Fragment> = job
        .metadata
        .get("fragments")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|err| OrchestratorError::ValidationFailed(format!("corrupt fragment metadata: {err}")))?
        .unwrap_or_default();

    let done: std::collections::HashSet<(u32, String, &'static str)> = existing_fragments
        .iter()
        .map(|f| {
            let method = f.method.as_deref().unwrap_or(GenerationMethod::Direct.as_str());
            let method = if method == GenerationMethod::Translate.as_str() {
                GenerationMethod::Translate
            } else {
                GenerationMethod::Direct
            };
            item_key(f.chunk_index, f.language, method)
        })
        .collect();

    let mut all_items = Vec::new();
    for chunk in &chunks {
        let chunk_remote_uri = chunk.remote_uri.clone().ok_or_else(|| OrchestratorError::PreconditionUnmet {
            stage: job.stage.as_str().to_string(),
            key: "chunk.remote_uri".to_string(),
        })?;

        for &language in &job.languages {
            let flags = GenerationFlags { sdh: job.flags.sdh };
            let methods: &[GenerationMethod] = if language.as_str() == "hin" {
                &[GenerationMethod::Direct, GenerationMethod::Translate]
            } else {
                &[GenerationMethod::Direct]
            };
            for &method in methods {
                all_items.push(WorkItem {
                    chunk_index: chunk.index,
                    chunk_remote_uri: chunk_remote_uri.clone(),
                    language,
                    flags,
                    method,
                });
            }
        }
    }

    let total = all_items.len();
    let pending: Vec<WorkItem> = all_items
        .into_iter()
        .filter(|item| !done.contains(&item_key(item.chunk_index, item.language, item.method)))
        .collect();

    if pending.is_empty() {
        let ok = existing_fragments.len();
        let rate = if total == 0 { 1.0 } else { ok as f64 / total as f64 };
        job.metadata.insert("generation_rate".to_string(), json!(rate));
        info!(total, ok, rate, "generating stage already fully satisfied by a prior attempt");
        return Ok(if rate >= ctx.settings.success_rate_threshold {
            GeneratingOutcome::Done
        } else {
            GeneratingOutcome::Partial { ok, failed: total - ok, rate }
        });
    }

    let outcome = scheduler::run(
        pending,
        ctx.model.clone(),
        ctx.store.clone(),
        ctx.retry.clone(),
        bucket,
        format!("subtitles/{}", job.id.as_str()),
        ctx.settings.worker_count,
        ctx.cancel.clone(),
    )
    .await;

    for failure in &outcome.failures {
        warn!(
            chunk_index = failure.item.chunk_index,
            language = %failure.item.language,
            message = %failure.message,
            "generation item failed"
        );
    }

    let mut combined_fragments = existing_fragments;
    combined_fragments.extend(outcome.fragments);
    let ok = combined_fragments.len();

    job.metadata.insert(
        "fragments".to_string(),
        serde_json::to_value(&combined_fragments).expect("fragments serialize"),
    );

    if outcome.cancelled {
        info!(
            total,
            ok,
            skipped = outcome.skipped,
            "generating stage cancelled, leaving remaining items for a future resume"
        );
        return Ok(GeneratingOutcome::Cancelled);
    }

    let rate = if total == 0 { 1.0 } else { ok as f64 / total as f64 };
    job.metadata.insert("generation_rate".to_string(), json!(rate));

    info!(total, ok, failed = outcome.failed, rate, "generating stage complete");

    if rate >= ctx.settings.success_rate_threshold {
        Ok(GeneratingOutcome::Done)
    } else {
        Ok(GeneratingOutcome::Partial { ok, failed: total - ok, rate })
    }
}

pub async fn downloading(ctx: &PipelineContext, job: &mut subgen_models::Job) -> OrchestratorResult<()> {
    let bucket = metadata_str(job, "bucket")?;
    let fragments_value = metadata_value(job, "fragments")?.clone();
    let mut fragments: Vec<Fragment> = serde_json::from_value(fragments_value).map_err(|err| {
        OrchestratorError::ValidationFailed(format!("corrupt fragment metadata: {err}"))
    })?;

    for fragment in &mut fragments {
        if fragment.content.is_some() {
            continue;
        }
        let Some(blob_name) = fragment.remote_uri.clone() else {
            continue;
        };
        let bytes = ctx
            .retry
            .call(Some(STORE_CIRCUIT_KEY), &storage_profile(), || ctx.store.download(&bucket, &blob_name))
            .await?;
        fragment.content = Some(String::from_utf8_lossy(&bytes).into_owned());
    }

    job.metadata.insert("fragments".to_string(), serde_json::to_value(&fragments).expect("fragments serialize"));
    Ok(())
}

pub async fn merging(ctx: &PipelineContext, job: &mut subgen_models::Job) -> OrchestratorResult<()> {
    let fragments_value = metadata_value(job, "fragments")?.clone();
    let fragments: Vec<Fragment> = serde_json::from_value(fragments_value).map_err(|err| {
        OrchestratorError::ValidationFailed(format!("corrupt fragment metadata: {err}"))
    })?;

    let mut by_group: std::collections::HashMap<String, Vec<Fragment>> = std::collections::HashMap::new();
    for fragment in fragments {
        by_group.entry(fragment.group_key()).or_default().push(fragment);
    }

    let video_stem = job
        .video_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string();

    let mut produced_files = Vec::new();
    let mut validation_reports = serde_json::Map::new();

    for (group_key, group_fragments) in by_group {
        let selected = merge::select_method(group_fragments);
        let track = merge::merge_group(&group_key, &selected, ctx.settings.chunk_duration_sec).map_err(|err| {
            OrchestratorError::MergeFailed { group: group_key.clone(), reason: err.to_string() }
        })?;

        let files = merge::write_group_outputs(&ctx.settings.output_root, &video_stem, &track)
            .await
            .map_err(|err| OrchestratorError::MergeFailed { group: group_key.clone(), reason: err.to_string() })?;

        let language_code = group_key.split('_').next().unwrap_or(&group_key);
        if let Ok(language) = LanguageCode::parse(language_code) {
            let srt_text = merge::serialize_srt(&track);
            let report = validate::validate_srt(&srt_text, language);
            if !report.production_ready && ctx.settings.strict_validation {
                return Err(OrchestratorError::ValidationFailed(format!(
                    "group '{group_key}' failed strict validation: {:?}",
                    report.critical_errors
                )));
            }
            if !report.production_ready {
                warn!(group = %group_key, critical_errors = ?report.critical_errors, "merged track is not production-ready");
            }
            validation_reports.insert(group_key.clone(), serde_json::to_value(&report).expect("report serializes"));
        }

        produced_files.push(files.srt_path.display().to_string());
        produced_files.push(files.vtt_path.display().to_string());
    }

    let summary_path = merge::write_summary_file(
        &ctx.settings.output_root,
        &video_stem,
        &produced_files.iter().map(PathBuf::from).collect::<Vec<_>>(),
    )
    .await
    .map_err(|err| OrchestratorError::MergeFailed { group: "summary".to_string(), reason: err.to_string() })?;
    produced_files.push(summary_path.display().to_string());

    job.metadata.insert("merged_files".to_string(), json!(produced_files));
    job.metadata.insert("validation_reports".to_string(), serde_json::Value::Object(validation_reports));
    job.output_dir = ctx.settings.output_root.join(&video_stem);
    Ok(())
}

pub async fn finalizing(ctx: &PipelineContext, job: &mut subgen_models::Job) -> OrchestratorResult<()> {
    let merged_files = metadata_value(job, "merged_files")?.clone();
    let paths: Vec<String> = serde_json::from_value(merged_files).unwrap_or_default();
    for path in &paths {
        if !Path::new(path).is_file() {
            return Err(OrchestratorError::ValidationFailed(format!(
                "expected output file '{path}' is missing"
            )));
        }
    }

    if !job.flags.keep_intermediates {
        let dir = work_dir(ctx, job);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    if !ctx.settings.keep_cloud {
        if let Ok(bucket) = metadata_str(job, "bucket") {
            let prefixes = vec![
                format!("chunks/{}/", job.id.as_str()),
                format!("subtitles/{}/", job.id.as_str()),
            ];
            let report = ctx.store.cleanup(&bucket, &prefixes).await;
            job.metadata.insert("cleanup_report".to_string(), serde_json::to_value(&report).expect("report serializes"));
        }
    }

    Ok(())
}
