//! Per-job JSON persistence, grounded on the original `StateManager`'s
//! rename-to-`.bak`-then-write-then-unlink atomic save and on the teacher's
//! `fs_utils::move_file` pattern of never leaving a half-written destination
//! behind. Single-writer (the orchestrator) — no file locking.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tracing::warn;

use subgen_models::{Job, JobId};

use crate::error::{JobStateError, JobStateResult};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

pub struct JobStateStore {
    dir: PathBuf,
}

impl JobStateStore {
    pub async fn new(dir: impl Into<PathBuf>) -> JobStateResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn job_path(&self, id: &JobId) -> PathBuf {
        self.dir.join(format!("{}.json", id.as_str()))
    }

    fn backup_path(&self, id: &JobId) -> PathBuf {
        self.dir.join(format!("{}.json.bak", id.as_str()))
    }

    /// Atomically persist `job`, bumping `updated_at` on every call. If a
    /// prior record exists it is renamed aside first; the backup is removed
    /// on success and restored if the write fails, so a crash mid-save never
    /// destroys the last-known-good record.
    pub async fn save(&self, job: &mut Job) -> JobStateResult<()> {
        job.updated_at = Utc::now();

        let path = self.job_path(&job.id);
        let backup = self.backup_path(&job.id);

        let had_backup = if fs::try_exists(&path).await.unwrap_or(false) {
            fs::rename(&path, &backup).await?;
            true
        } else {
            false
        };

        let body = serde_json::to_vec_pretty(job).expect("Job serialization is infallible");

        match fs::write(&path, &body).await {
            Ok(()) => {
                if had_backup {
                    let _ = fs::remove_file(&backup).await;
                }
                Ok(())
            }
            Err(err) => {
                if had_backup {
                    if let Err(restore_err) = fs::rename(&backup, &path).await {
                        warn!(job_id = %job.id, %restore_err, "failed to restore backup after save failure");
                    }
                }
                Err(JobStateError::Io(err))
            }
        }
    }

    /// `Ok(None)` when the job file is simply absent; `Err(Corrupt)` when it
    /// exists but doesn't parse — the two must never be conflated.
    pub async fn load(&self, id: &JobId) -> JobStateResult<Option<Job>> {
        let path = self.job_path(id);

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }

        let body = fs::read(&path).await?;
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|source| JobStateError::Corrupt {
                job_id: id.as_str().to_string(),
                source,
            })
    }

    /// All parseable job records under the store, ordered by `created_at`
    /// descending. Files that fail to parse or aren't `job_*.json` (e.g. the
    /// `.bak` siblings) are skipped rather than surfaced.
    pub async fn list(&self) -> JobStateResult<Vec<Job>> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut jobs = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_job_record(&path) {
                continue;
            }

            match fs::read(&path).await {
                Ok(body) => match serde_json::from_slice::<Job>(&body) {
                    Ok(job) => jobs.push(job),
                    Err(err) => {
                        warn!(path = %path.display(), %err, "skipping unparseable job record during list");
                    }
                },
                Err(err) => {
                    warn!(path = %path.display(), %err, "skipping unreadable job record during list");
                }
            }
        }

        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    pub async fn delete(&self, id: &JobId) -> JobStateResult<bool> {
        let path = self.job_path(id);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(false);
        }
        fs::remove_file(&path).await?;
        let backup = self.backup_path(id);
        if fs::try_exists(&backup).await.unwrap_or(false) {
            let _ = fs::remove_file(&backup).await;
        }
        Ok(true)
    }

    pub async fn get_by_video(&self, video_path: &Path) -> JobStateResult<Option<Job>> {
        let jobs = self.list().await?;
        Ok(jobs.into_iter().find(|job| job.video_path == video_path))
    }

    /// Delete job records whose `created_at` is older than `retention_days`.
    /// Returns the number removed.
    pub async fn purge(&self, retention_days: i64) -> JobStateResult<u32> {
        let cutoff = Utc::now() - chrono::Duration::seconds(retention_days * SECONDS_PER_DAY);
        let jobs = self.list().await?;

        let mut removed = 0;
        for job in jobs {
            if job.created_at < cutoff && self.delete(&job.id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn is_job_record(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.starts_with("job_") && name.ends_with(".json") && !name.ends_with(".json.bak")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use subgen_models::{JobFlags, LanguageCode};
    use tempfile::tempdir;

    fn sample_job(video: &str) -> Job {
        Job::new(
            PathBuf::from(video),
            vec![LanguageCode::parse("eng").unwrap()],
            JobFlags::default(),
            PathBuf::from("out"),
        )
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = JobStateStore::new(dir.path()).await.unwrap();
        let mut job = sample_job("a.mp4");
        let id = job.id.clone();

        store.save(&mut job).await.unwrap();
        let loaded = store.load(&id).await.unwrap().expect("job present");
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.video_path, PathBuf::from("a.mp4"));
    }

    #[tokio::test]
    async fn load_missing_job_returns_ok_none() {
        let dir = tempdir().unwrap();
        let store = JobStateStore::new(dir.path()).await.unwrap();
        let missing = JobId::from_string("job_1_abcdef");
        assert!(store.load(&missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn load_corrupt_file_is_a_distinct_error_from_missing() {
        let dir = tempdir().unwrap();
        let store = JobStateStore::new(dir.path()).await.unwrap();
        let id = JobId::from_string("job_1_abcdef");
        tokio::fs::write(dir.path().join("job_1_abcdef.json"), b"{not json")
            .await
            .unwrap();

        let err = store.load(&id).await.unwrap_err();
        assert!(matches!(err, JobStateError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn save_bumps_updated_at_and_leaves_no_backup_on_success() {
        let dir = tempdir().unwrap();
        let store = JobStateStore::new(dir.path()).await.unwrap();
        let mut job = sample_job("a.mp4");
        let id = job.id.clone();

        store.save(&mut job).await.unwrap();
        let first_updated = job.updated_at;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.save(&mut job).await.unwrap();
        assert!(job.updated_at >= first_updated);
        assert!(!dir.path().join(format!("{}.json.bak", id.as_str())).exists());
    }

    #[tokio::test]
    async fn list_orders_by_created_at_descending_and_skips_backups() {
        let dir = tempdir().unwrap();
        let store = JobStateStore::new(dir.path()).await.unwrap();

        let mut first = sample_job("a.mp4");
        store.save(&mut first).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let mut second = sample_job("b.mp4");
        store.save(&mut second).await.unwrap();

        tokio::fs::write(dir.path().join("job_1_abcdef.json.bak"), b"stale")
            .await
            .unwrap();

        let jobs = store.list().await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, second.id);
        assert_eq!(jobs[1].id, first.id);
    }

    #[tokio::test]
    async fn delete_removes_job_and_backup() {
        let dir = tempdir().unwrap();
        let store = JobStateStore::new(dir.path()).await.unwrap();
        let mut job = sample_job("a.mp4");
        let id = job.id.clone();
        store.save(&mut job).await.unwrap();

        assert!(store.delete(&id).await.unwrap());
        assert!(store.load(&id).await.unwrap().is_none());
        assert!(!store.delete(&id).await.unwrap());
    }

    #[tokio::test]
    async fn get_by_video_finds_matching_job() {
        let dir = tempdir().unwrap();
        let store = JobStateStore::new(dir.path()).await.unwrap();
        let mut job = sample_job("needle.mp4");
        store.save(&mut job).await.unwrap();

        let found = store.get_by_video(Path::new("needle.mp4")).await.unwrap();
        assert!(found.is_some());
        assert!(store.get_by_video(Path::new("missing.mp4")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_removes_only_jobs_older_than_retention() {
        let dir = tempdir().unwrap();
        let store = JobStateStore::new(dir.path()).await.unwrap();

        let mut recent = sample_job("recent.mp4");
        store.save(&mut recent).await.unwrap();

        let mut old = sample_job("old.mp4");
        old.created_at = Utc::now() - chrono::Duration::days(400);
        store.save(&mut old).await.unwrap();

        let removed = store.purge(30).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.load(&old.id).await.unwrap().is_none());
        assert!(store.load(&recent.id).await.unwrap().is_some());
    }
}
