//! CLI entry point for the subtitle pipeline orchestrator: `process`,
//! `batch`, `resume`, `status`, `cleanup`.

mod context;
mod exit;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use subgen_config::Config;
use subgen_models::{JobFlags, JobId, LanguageCode};
use subgen_orchestrator::{Orchestrator, OrchestratorError};

use context::RunOverrides;
use exit::{
    for_configuration_error, for_orchestrator_error, EXIT_CANCELLED, EXIT_SUCCESS,
    EXIT_SYSTEM_ERROR, EXIT_VALIDATION_ERROR,
};

#[derive(Parser, Debug)]
#[command(name = "subgen")]
#[command(author, version, about = "Video-to-subtitle pipeline orchestrator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline for one video.
    Process(ProcessArgs),
    /// Iterate every video file in a directory, one job per file.
    Batch(BatchArgs),
    /// Continue a previously-saved job from its persisted stage.
    Resume(ResumeArgs),
    /// Print the persisted job record as JSON.
    Status(StatusArgs),
    /// Purge job records and temp directories older than `--days`.
    Cleanup(CleanupArgs),
}

#[derive(Parser, Debug)]
struct CommonRunArgs {
    /// Target language (repeatable). Defaults to the config file's
    /// `languages` list, or `eng` if that is also empty.
    #[arg(short = 'l', long = "language")]
    language: Vec<String>,

    /// Enable the SDH/descriptive ("extended") subtitle variant.
    #[arg(long)]
    extended: bool,

    /// Output directory override.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Config file path.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Local config override file, deep-merged on top of `--config`.
    #[arg(long)]
    config_local: Option<PathBuf>,

    /// Enforce the validator's `production_ready` verdict as fatal.
    #[arg(long)]
    strict: bool,

    /// Skip cleanup of intermediate chunk/upload artifacts on success.
    #[arg(long)]
    keep_intermediates: bool,
}

#[derive(Parser, Debug)]
struct ProcessArgs {
    /// Path to the source video file.
    video: PathBuf,

    #[command(flatten)]
    common: CommonRunArgs,
}

#[derive(Parser, Debug)]
struct BatchArgs {
    /// Directory to scan for video files.
    dir: PathBuf,

    #[command(flatten)]
    common: CommonRunArgs,
}

#[derive(Parser, Debug)]
struct ResumeArgs {
    /// Job id to resume, e.g. `job_1700000000_ab12cd`.
    job_id: String,

    /// Advisory/diagnostic only: the orchestrator always derives the
    /// resume point from the job's persisted stage. A mismatch is logged
    /// as a warning, not treated as an error.
    #[arg(long)]
    stage: Option<u8>,

    #[command(flatten)]
    common: CommonRunArgs,
}

#[derive(Parser, Debug)]
struct StatusArgs {
    job_id: String,

    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[arg(long)]
    config_local: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct CleanupArgs {
    #[arg(long, default_value_t = 7)]
    days: i64,

    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[arg(long)]
    config_local: Option<PathBuf>,
}

const ALLOWED_VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm", "flv", "wmv"];

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    // §5 cancellation contract: firing the token does not interrupt
    // in-flight work — it only stops the scheduler from dispatching new
    // items and the orchestrator from advancing to the next stage. The
    // signal handler runs concurrently and just flips `cancel_tx`; `run`
    // observes it via `cancel_rx` and returns its own graceful outcome
    // once the current stage/item settles.
    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
    let signal_task = tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        warn!("received interrupt signal, finishing in-flight work before exiting");
        let _ = cancel_tx.send(true);
    });

    let code = run(cli.command, cancel_rx).await;

    signal_task.abort();
    ExitCode::from(code as u8)
}

fn init_tracing() {
    use std::io::IsTerminal;

    let filter = EnvFilter::from_default_env().add_directive("subgen=info".parse().unwrap());
    let registry = tracing_subscriber::registry().with(filter);

    if std::io::stdout().is_terminal() {
        registry.with(fmt::layer().with_ansi(true)).init();
    } else {
        registry.with(fmt::layer().json()).init();
    }
}

async fn run(command: Command, cancel: tokio::sync::watch::Receiver<bool>) -> i32 {
    match command {
        Command::Process(args) => run_process(args, cancel).await,
        Command::Batch(args) => run_batch(args, cancel).await,
        Command::Resume(args) => run_resume(args, cancel).await,
        Command::Status(args) => run_status(args).await,
        Command::Cleanup(args) => run_cleanup(args).await,
    }
}

fn load_config(path: &PathBuf, local: &Option<PathBuf>) -> Result<Config, i32> {
    Config::load(path, local.as_ref()).map_err(|err| {
        error!(%err, "configuration error");
        for_configuration_error(&err)
    })
}

fn resolve_languages(cli_languages: &[String], config: &Config) -> Result<Vec<LanguageCode>, i32> {
    let raw: Vec<&String> = if cli_languages.is_empty() {
        config.languages.iter().collect()
    } else {
        cli_languages.iter().collect()
    };

    let mut codes = Vec::with_capacity(raw.len());
    for lang in raw {
        match LanguageCode::parse(lang) {
            Ok(code) => codes.push(code),
            Err(err) => {
                error!(%err, language = %lang, "unsupported target language code");
                return Err(EXIT_VALIDATION_ERROR);
            }
        }
    }
    if codes.is_empty() {
        codes.push(LanguageCode::parse("eng").expect("'eng' is always a known language"));
    }
    Ok(codes)
}

/// A job run that returns `Ok` without reaching `Completed` was stopped by
/// cancellation (§5: the orchestrator never errors on cancellation, it
/// just stops advancing) — report exit code 130 rather than 0 for that case.
fn exit_code_for_finished_job(job: &subgen_models::Job) -> i32 {
    if job.stage == subgen_models::Stage::Completed {
        EXIT_SUCCESS
    } else {
        EXIT_CANCELLED
    }
}

async fn run_process(args: ProcessArgs, cancel: tokio::sync::watch::Receiver<bool>) -> i32 {
    let config = match load_config(&args.common.config, &args.common.config_local) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let languages = match resolve_languages(&args.common.language, &config) {
        Ok(l) => l,
        Err(code) => return code,
    };

    let overrides = RunOverrides {
        output_dir: args.common.output.clone(),
        strict: args.common.strict,
        keep_intermediates: args.common.keep_intermediates,
    };

    let ctx = match context::build_context(&config, &overrides, cancel).await {
        Ok(ctx) => ctx,
        Err(err) => {
            error!(%err, "failed to initialize pipeline ports");
            return EXIT_SYSTEM_ERROR;
        }
    };
    let state = match context::open_job_state_store(&config).await {
        Ok(s) => s,
        Err(err) => {
            error!(%err, "failed to open job-state store");
            return EXIT_SYSTEM_ERROR;
        }
    };

    let flags = JobFlags {
        sdh: args.common.extended,
        dry_run: false,
        keep_intermediates: args.common.keep_intermediates,
    };

    let orchestrator = Orchestrator::new(ctx, state);
    match orchestrator.process(args.video, languages, flags).await {
        Ok(job) => {
            info!(job_id = %job.id, stage = %job.stage, "job run finished");
            println!("{}", serde_json::to_string_pretty(&job).unwrap());
            exit_code_for_finished_job(&job)
        }
        Err(err) => {
            error!(%err, "job failed");
            for_orchestrator_error(&err)
        }
    }
}

async fn run_batch(args: BatchArgs, cancel: tokio::sync::watch::Receiver<bool>) -> i32 {
    let config = match load_config(&args.common.config, &args.common.config_local) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let languages = match resolve_languages(&args.common.language, &config) {
        Ok(l) => l,
        Err(code) => return code,
    };

    let entries = match std::fs::read_dir(&args.dir) {
        Ok(entries) => entries,
        Err(err) => {
            error!(%err, dir = %args.dir.display(), "cannot read batch directory");
            return EXIT_VALIDATION_ERROR;
        }
    };

    let mut videos: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| ALLOWED_VIDEO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    videos.sort();

    if videos.is_empty() {
        warn!(dir = %args.dir.display(), "no video files found");
        return EXIT_SUCCESS;
    }

    let overrides = RunOverrides {
        output_dir: args.common.output.clone(),
        strict: args.common.strict,
        keep_intermediates: args.common.keep_intermediates,
    };

    let ctx = match context::build_context(&config, &overrides, cancel.clone()).await {
        Ok(ctx) => ctx,
        Err(err) => {
            error!(%err, "failed to initialize pipeline ports");
            return EXIT_SYSTEM_ERROR;
        }
    };
    let state = match context::open_job_state_store(&config).await {
        Ok(s) => s,
        Err(err) => {
            error!(%err, "failed to open job-state store");
            return EXIT_SYSTEM_ERROR;
        }
    };

    // Every job in a batch run shares this one orchestrator instance so the
    // retry core's process-wide rate-limiter/circuit-breaker tables carry
    // over between videos (§5).
    let orchestrator = Orchestrator::new(ctx, state);

    let mut worst_code = EXIT_SUCCESS;
    for video in videos {
        if *cancel.borrow() {
            warn!("cancellation observed, not starting further batch jobs");
            worst_code = worst_code.max(EXIT_CANCELLED);
            break;
        }
        let flags = JobFlags {
            sdh: args.common.extended,
            dry_run: false,
            keep_intermediates: args.common.keep_intermediates,
        };
        info!(video = %video.display(), "starting batch job");
        match orchestrator.process(video.clone(), languages.clone(), flags).await {
            Ok(job) => {
                info!(job_id = %job.id, video = %video.display(), stage = %job.stage, "batch job finished");
                worst_code = worst_code.max(exit_code_for_finished_job(&job));
            }
            Err(err) => {
                error!(%err, video = %video.display(), "batch job failed, continuing with remaining videos");
                worst_code = worst_code.max(for_orchestrator_error(&err));
            }
        }
    }
    worst_code
}

async fn run_resume(args: ResumeArgs, cancel: tokio::sync::watch::Receiver<bool>) -> i32 {
    let config = match load_config(&args.common.config, &args.common.config_local) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let overrides = RunOverrides {
        output_dir: args.common.output.clone(),
        strict: args.common.strict,
        keep_intermediates: args.common.keep_intermediates,
    };

    let ctx = match context::build_context(&config, &overrides, cancel).await {
        Ok(ctx) => ctx,
        Err(err) => {
            error!(%err, "failed to initialize pipeline ports");
            return EXIT_SYSTEM_ERROR;
        }
    };
    let state = match context::open_job_state_store(&config).await {
        Ok(s) => s,
        Err(err) => {
            error!(%err, "failed to open job-state store");
            return EXIT_SYSTEM_ERROR;
        }
    };

    let job_id = JobId::from_string(args.job_id.clone());

    if let Some(expected) = args.stage {
        if let Some(job) = match state.load(&job_id).await {
            Ok(job) => job,
            Err(err) => {
                error!(%err, job_id = %args.job_id, "failed to load job record");
                return EXIT_SYSTEM_ERROR;
            }
        } {
            if job.stage.index() != expected {
                warn!(
                    job_id = %args.job_id,
                    persisted_stage = %job.stage,
                    persisted_index = job.stage.index(),
                    requested_index = expected,
                    "--stage disagrees with the job's persisted stage; resuming from the persisted stage anyway"
                );
            }
        }
    }

    let orchestrator = Orchestrator::new(ctx, state);
    match orchestrator.resume(&job_id).await {
        Ok(job) => {
            info!(job_id = %job.id, stage = %job.stage, "job run finished");
            println!("{}", serde_json::to_string_pretty(&job).unwrap());
            exit_code_for_finished_job(&job)
        }
        Err(OrchestratorError::JobNotFound { job_id }) => {
            error!(job_id, "no such job");
            EXIT_VALIDATION_ERROR
        }
        Err(err) => {
            error!(%err, "job failed");
            for_orchestrator_error(&err)
        }
    }
}

async fn run_status(args: StatusArgs) -> i32 {
    let config = match load_config(&args.config, &args.config_local) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let state = match context::open_job_state_store(&config).await {
        Ok(s) => s,
        Err(err) => {
            error!(%err, "failed to open job-state store");
            return EXIT_SYSTEM_ERROR;
        }
    };

    let job_id = JobId::from_string(args.job_id.clone());
    match state.load(&job_id).await {
        Ok(Some(job)) => {
            println!("{}", serde_json::to_string_pretty(&job).unwrap());
            EXIT_SUCCESS
        }
        Ok(None) => {
            error!(job_id = %args.job_id, "no such job");
            EXIT_VALIDATION_ERROR
        }
        Err(err) => {
            error!(%err, job_id = %args.job_id, "failed to load job record");
            EXIT_SYSTEM_ERROR
        }
    }
}

async fn run_cleanup(args: CleanupArgs) -> i32 {
    let config = match load_config(&args.config, &args.config_local) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let state = match context::open_job_state_store(&config).await {
        Ok(s) => s,
        Err(err) => {
            error!(%err, "failed to open job-state store");
            return EXIT_SYSTEM_ERROR;
        }
    };

    let removed = match state.purge(args.days).await {
        Ok(n) => n,
        Err(err) => {
            error!(%err, "job-record purge failed");
            return EXIT_SYSTEM_ERROR;
        }
    };
    info!(removed, days = args.days, "purged stale job records");

    let work_dir = PathBuf::from(&config.output.work_dir);
    let mut swept = 0u32;
    if let Ok(entries) = std::fs::read_dir(&work_dir) {
        let cutoff = std::time::SystemTime::now()
            - std::time::Duration::from_secs((args.days.max(0) as u64) * 24 * 60 * 60);
        for entry in entries.filter_map(|e| e.ok()) {
            let is_stale = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(|modified| modified < cutoff)
                .unwrap_or(false);
            if is_stale && std::fs::remove_dir_all(entry.path()).is_ok() {
                swept += 1;
            }
        }
    }
    info!(swept, "swept stale job-scoped temp directories");

    println!("removed {removed} job record(s), swept {swept} temp directory(ies)");
    EXIT_SUCCESS
}
