//! Chunk-work scheduler (C8): a fixed-size semaphore-gated worker pool that
//! fans out over (chunk, language, flag-variant) work items, modeled on
//! `vclip-worker::executor::JobExecutor`'s permit-per-spawn loop.

use std::sync::Arc;

use tokio::sync::{watch, Semaphore};
use tracing::{info, warn};

use subgen_model_client::GenerationMethod;
use subgen_models::{Fragment, GenerationFlags, LanguageCode};
use subgen_retry::RetryRateCore;

use crate::ports::{ModelPort, StorePort};

/// One unit of generation work. `hin`'s dual-method special case (§4.8)
/// produces two items per chunk — one `Direct`, one `Translate` — that are
/// otherwise scheduled identically to every other language's single item.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub chunk_index: u32,
    pub chunk_remote_uri: String,
    pub language: LanguageCode,
    pub flags: GenerationFlags,
    pub method: GenerationMethod,
}

#[derive(Debug)]
pub struct ItemFailure {
    pub item: WorkItem,
    pub message: String,
}

/// Outcome of running a batch of work items to completion (or until
/// cancelled). `rate` is `ok / (ok + failed)` over the items this call
/// actually dispatched — callers computing a job-level success rate across
/// resumed attempts should use `ok`/`failed`/`skipped` against their own
/// notion of the total, not this field, once more than one batch has run.
#[derive(Debug)]
pub struct SchedulerOutcome {
    pub fragments: Vec<Fragment>,
    pub failures: Vec<ItemFailure>,
    pub ok: usize,
    pub failed: usize,
    pub rate: f64,
    /// Items that were never dispatched because cancellation was observed
    /// before the worker pool got to them.
    pub skipped: usize,
    /// Whether cancellation was observed at all during this run.
    pub cancelled: bool,
}

const MODEL_CIRCUIT_KEY: &str = "model";
const STORE_CIRCUIT_KEY: &str = "store";
const AI_PROFILE_NAME: &str = "ai";
const STORAGE_PROFILE_NAME: &str = "storage";

/// Drives `items` through the model and store ports with bounded
/// concurrency. `bucket` is the destination for uploaded fragment bytes;
/// `blob_prefix` namespaces the job's fragments within it.
pub async fn run(
    items: Vec<WorkItem>,
    model: Arc<dyn ModelPort>,
    store: Arc<dyn StorePort>,
    retry: RetryRateCore,
    bucket: String,
    blob_prefix: String,
    worker_count: usize,
    cancel: watch::Receiver<bool>,
) -> SchedulerOutcome {
    let total = items.len();
    if total == 0 {
        return SchedulerOutcome {
            fragments: Vec::new(),
            failures: Vec::new(),
            ok: 0,
            failed: 0,
            rate: 1.0,
            skipped: 0,
            cancelled: false,
        };
    }

    let semaphore = Arc::new(Semaphore::new(worker_count.max(1)));
    let mut handles = Vec::with_capacity(total);
    let mut items = items.into_iter();
    let mut skipped = 0usize;
    let mut cancelled = false;

    while let Some(item) = items.next() {
        if *cancel.borrow() {
            cancelled = true;
            skipped += 1 + items.len();
            break;
        }

        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                cancelled = true;
                skipped += 1 + items.len();
                break;
            }
        };
        let model = Arc::clone(&model);
        let store = Arc::clone(&store);
        let retry = retry.clone();
        let bucket = bucket.clone();
        let blob_prefix = blob_prefix.clone();

        handles.push(tokio::spawn(async move {
            let _permit = permit;
            let result = run_one(&item, model.as_ref(), store.as_ref(), &retry, &bucket, &blob_prefix).await;
            (item, result)
        }));
    }

    let mut fragments = Vec::new();
    let mut failures = Vec::new();

    for handle in handles {
        match handle.await {
            Ok((item, Ok(fragment))) => fragments.push((item, fragment)),
            Ok((item, Err(message))) => {
                warn!(chunk_index = item.chunk_index, language = %item.language, method = item.method.as_str(), %message, "work item failed");
                failures.push(ItemFailure { item, message });
            }
            Err(join_err) => {
                warn!(%join_err, "work item task panicked or was cancelled");
            }
        }
    }

    let ok = fragments.len();
    let failed = failures.len();
    let rate = if ok + failed == 0 { 1.0 } else { ok as f64 / (ok + failed) as f64 };

    info!(total, ok, failed, skipped, cancelled, rate, "chunk-work batch complete");

    SchedulerOutcome {
        fragments: fragments.into_iter().map(|(_, f)| f).collect(),
        failures,
        ok,
        failed,
        rate,
        skipped,
        cancelled,
    }
}

async fn run_one(
    item: &WorkItem,
    model: &dyn ModelPort,
    store: &dyn StorePort,
    retry: &RetryRateCore,
    bucket: &str,
    blob_prefix: &str,
) -> Result<Fragment, String> {
    retry.throttle(MODEL_CIRCUIT_KEY).await;

    let profile = subgen_retry::by_name(AI_PROFILE_NAME);
    let srt = retry
        .call(Some(MODEL_CIRCUIT_KEY), &profile, || {
            model.generate(&item.chunk_remote_uri, item.language, item.flags, item.method)
        })
        .await
        .map_err(|err| err.to_string())?;

    let blob_name = format!(
        "{blob_prefix}/{:03}_{}{}_{}.srt",
        item.chunk_index,
        item.language.as_str(),
        item.flags.variant_suffix(),
        item.method.as_str()
    );

    let storage_profile = subgen_retry::by_name(STORAGE_PROFILE_NAME);
    let bytes = srt.clone().into_bytes();
    retry
        .call(Some(STORE_CIRCUIT_KEY), &storage_profile, || store.upload(bytes.clone(), bucket, &blob_name))
        .await
        .map_err(|err| err.to_string())?;

    let mut fragment = Fragment::new(item.chunk_index, item.language, item.flags);
    fragment.remote_uri = Some(blob_name);
    fragment.content = Some(srt);
    fragment.method = Some(item.method.as_str().to_string());
    Ok(fragment)
}
