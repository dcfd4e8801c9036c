//! GCS JSON REST API client, following `vclip-firestore::client`'s shape:
//! a `reqwest::Client` plus a `gcp_auth` token provider behind a cheap
//! `Clone`, one method per operation, status codes matched explicitly.

use std::sync::Arc;
use std::time::Duration;

use gcp_auth::TokenProvider;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::types::{
    BlobInfo, BucketInsertRequest, BucketResource, CleanupReport, Lifecycle, LifecycleAction,
    LifecycleCondition, LifecycleRule, ObjectListResponse,
};

const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";
const LIFECYCLE_DELETE_AGE_DAYS: u32 = 7;

fn scratch_bucket_name(prefix: &str, project_id: &str, unix_seconds: u64) -> String {
    format!("{prefix}-{project_id}-{unix_seconds}")
}

/// Whether a job's storage stage should create a fresh scratch bucket or
/// attach to one the operator already provisioned.
#[derive(Debug, Clone)]
pub enum BucketMode {
    CreateNew { prefix: String, project_id: String, location: String },
    UseExisting { bucket_name: String },
}

pub struct GcsClient {
    http: Client,
    auth: Arc<dyn TokenProvider>,
    project_id: String,
}

impl Clone for GcsClient {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            auth: Arc::clone(&self.auth),
            project_id: self.project_id.clone(),
        }
    }
}

impl GcsClient {
    pub async fn new(project_id: impl Into<String>) -> StoreResult<Self> {
        let auth = gcp_auth::provider()
            .await
            .map_err(|e| StoreError::auth(e.to_string()))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            http,
            auth,
            project_id: project_id.into(),
        })
    }

    async fn token(&self) -> StoreResult<String> {
        let token = self
            .auth
            .token(&[STORAGE_SCOPE])
            .await
            .map_err(|e| StoreError::auth(e.to_string()))?;
        Ok(token.as_str().to_string())
    }

    /// Create-or-attach per the configured [`BucketMode`], returning the
    /// bucket name the rest of the job should address.
    pub async fn ensure_bucket(&self, mode: &BucketMode) -> StoreResult<String> {
        match mode {
            BucketMode::CreateNew { prefix, project_id, location } => {
                let name = scratch_bucket_name(prefix, project_id, crate::clock::unix_seconds());
                self.create_bucket(&name, location).await?;
                Ok(name)
            }
            BucketMode::UseExisting { bucket_name } => {
                self.verify_bucket_exists(bucket_name).await?;
                Ok(bucket_name.clone())
            }
        }
    }

    async fn create_bucket(&self, name: &str, location: &str) -> StoreResult<()> {
        let url = format!("https://storage.googleapis.com/storage/v1/b?project={}", self.project_id);
        let token = self.token().await?;

        let body = BucketInsertRequest {
            name: name.to_string(),
            location: location.to_string(),
            lifecycle: Lifecycle {
                rule: vec![LifecycleRule {
                    action: LifecycleAction { kind: "Delete".to_string() },
                    condition: LifecycleCondition { age: LIFECYCLE_DELETE_AGE_DAYS },
                }],
            },
        };

        let response = self.http.post(&url).bearer_auth(&token).json(&body).send().await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(()),
            StatusCode::CONFLICT => Err(StoreError::BucketExists(name.to_string())),
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(StoreError::request_failed(format!("create bucket {name} failed with {status}: {text}")))
            }
        }
    }

    async fn verify_bucket_exists(&self, name: &str) -> StoreResult<()> {
        let url = format!("https://storage.googleapis.com/storage/v1/b/{name}");
        let token = self.token().await?;

        let response = self.http.get(&url).bearer_auth(&token).send().await?;

        match response.status() {
            StatusCode::OK => {
                let _: BucketResource = response.json().await?;
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(StoreError::not_found(format!("bucket {name}"))),
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(StoreError::request_failed(format!("get bucket {name} failed with {status}: {text}")))
            }
        }
    }

    pub async fn upload(&self, bytes: Vec<u8>, bucket: &str, blob_name: &str) -> StoreResult<()> {
        let url = format!(
            "https://storage.googleapis.com/upload/storage/v1/b/{bucket}/o?uploadType=media&name={}",
            urlencoding::encode(blob_name)
        );
        let token = self.token().await?;

        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status if status == StatusCode::TOO_MANY_REQUESTS => Err(StoreError::RateLimited),
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(StoreError::request_failed(format!(
                    "upload {bucket}/{blob_name} failed with {status}: {text}"
                )))
            }
        }
    }

    pub async fn download(&self, bucket: &str, blob_name: &str) -> StoreResult<Vec<u8>> {
        let url = format!(
            "https://storage.googleapis.com/storage/v1/b/{bucket}/o/{}?alt=media",
            urlencoding::encode(blob_name)
        );
        let token = self.token().await?;

        let response = self.http.get(&url).bearer_auth(&token).send().await?;

        match response.status() {
            StatusCode::OK => Ok(response.bytes().await?.to_vec()),
            StatusCode::NOT_FOUND => Err(StoreError::not_found(format!("{bucket}/{blob_name}"))),
            status if status == StatusCode::TOO_MANY_REQUESTS => Err(StoreError::RateLimited),
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(StoreError::request_failed(format!(
                    "download {bucket}/{blob_name} failed with {status}: {text}"
                )))
            }
        }
    }

    /// True if the object already exists at the expected key — lets stage
    /// handlers skip re-uploading on resume without downloading the body.
    pub async fn exists(&self, bucket: &str, blob_name: &str) -> StoreResult<bool> {
        let url = format!(
            "https://storage.googleapis.com/storage/v1/b/{bucket}/o/{}",
            urlencoding::encode(blob_name)
        );
        let token = self.token().await?;

        let response = self.http.get(&url).bearer_auth(&token).send().await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(StoreError::request_failed(format!(
                    "stat {bucket}/{blob_name} failed with {status}: {text}"
                )))
            }
        }
    }

    pub async fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<BlobInfo>> {
        let token = self.token().await?;
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = format!(
                "https://storage.googleapis.com/storage/v1/b/{bucket}/o?prefix={}",
                urlencoding::encode(prefix)
            );
            if let Some(pt) = &page_token {
                url.push_str(&format!("&pageToken={}", urlencoding::encode(pt)));
            }

            let response = self.http.get(&url).bearer_auth(&token).send().await?;
            let status = response.status();
            if status != StatusCode::OK {
                let text = response.text().await.unwrap_or_default();
                return Err(StoreError::request_failed(format!(
                    "list {bucket}/{prefix} failed with {status}: {text}"
                )));
            }

            let page: ObjectListResponse = response.json().await?;
            out.extend(page.items.into_iter().map(|o| BlobInfo {
                name: o.name,
                size_bytes: o.size,
                updated: o.updated,
            }));

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(out)
    }

    pub async fn delete(&self, bucket: &str, blob_name: &str) -> StoreResult<()> {
        let url = format!(
            "https://storage.googleapis.com/storage/v1/b/{bucket}/o/{}",
            urlencoding::encode(blob_name)
        );
        let token = self.token().await?;

        let response = self.http.delete(&url).bearer_auth(&token).send().await?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            StatusCode::NOT_FOUND => {
                debug!(bucket, blob_name, "blob already absent on delete");
                Ok(())
            }
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(StoreError::request_failed(format!(
                    "delete {bucket}/{blob_name} failed with {status}: {text}"
                )))
            }
        }
    }

    /// Best-effort recursive delete under every prefix. Never propagates an
    /// error — failures are counted and logged, matching the finalize
    /// stage's "don't fail the job over cloud cleanup" contract.
    pub async fn cleanup(&self, bucket: &str, prefixes: &[String]) -> CleanupReport {
        let mut report = CleanupReport::default();

        for prefix in prefixes {
            let blobs = match self.list(bucket, prefix).await {
                Ok(blobs) => blobs,
                Err(err) => {
                    warn!(bucket, prefix, %err, "cleanup: listing failed, skipping prefix");
                    report.failed += 1;
                    continue;
                }
            };

            for blob in blobs {
                match self.delete(bucket, &blob.name).await {
                    Ok(()) => report.deleted += 1,
                    Err(err) => {
                        warn!(bucket, blob = %blob.name, %err, "cleanup: delete failed");
                        report.failed += 1;
                    }
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_bucket_name_matches_the_prefix_project_timestamp_scheme() {
        let name = scratch_bucket_name("subgen", "my-project", 1_732_000_000);
        assert_eq!(name, "subgen-my-project-1732000000");
    }

    #[test]
    fn blob_name_encoding_escapes_path_separators() {
        let encoded = urlencoding::encode("chunks/job_1/001.mp4");
        assert_eq!(encoded, "chunks%2Fjob_1%2F001.mp4");
    }
}
