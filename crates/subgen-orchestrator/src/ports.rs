//! Trait-abstracted views over C2-C4 (media, object-store, model), so the
//! orchestrator and scheduler can be driven against mocked ports in tests
//! without touching a subprocess, GCS, or a real model endpoint — the
//! concrete adapters below just forward to the existing `subgen-media`,
//! `subgen-storage`, and `subgen-model-client` clients.

use std::path::Path;

use async_trait::async_trait;

use subgen_media::{MediaError, VideoInfo};
use subgen_model_client::{GenerationMethod, ModelClient, ModelError};
use subgen_models::{GenerationFlags, LanguageCode};
use subgen_storage::{BlobInfo, BucketMode, CleanupReport, GcsClient, StoreError};

#[async_trait]
pub trait MediaPort: Send + Sync {
    async fn probe(&self, path: &Path, timeout_sec: u64) -> Result<VideoInfo, MediaError>;
    async fn cut(
        &self,
        input: &Path,
        start_sec: f64,
        duration_sec: f64,
        out_path: &Path,
    ) -> Result<(), MediaError>;
}

pub struct FfmpegMediaPort;

#[async_trait]
impl MediaPort for FfmpegMediaPort {
    async fn probe(&self, path: &Path, timeout_sec: u64) -> Result<VideoInfo, MediaError> {
        subgen_media::probe(path, timeout_sec).await
    }

    async fn cut(
        &self,
        input: &Path,
        start_sec: f64,
        duration_sec: f64,
        out_path: &Path,
    ) -> Result<(), MediaError> {
        subgen_media::cut(input, start_sec, duration_sec, out_path).await
    }
}

#[async_trait]
pub trait StorePort: Send + Sync {
    async fn ensure_bucket(&self, mode: &BucketMode) -> Result<String, StoreError>;
    async fn upload(&self, bytes: Vec<u8>, bucket: &str, blob_name: &str) -> Result<(), StoreError>;
    async fn exists(&self, bucket: &str, blob_name: &str) -> Result<bool, StoreError>;
    async fn download(&self, bucket: &str, blob_name: &str) -> Result<Vec<u8>, StoreError>;
    #[allow(dead_code)]
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<BlobInfo>, StoreError>;
    async fn delete(&self, bucket: &str, blob_name: &str) -> Result<(), StoreError>;
    async fn cleanup(&self, bucket: &str, prefixes: &[String]) -> CleanupReport;
}

#[async_trait]
impl StorePort for GcsClient {
    async fn ensure_bucket(&self, mode: &BucketMode) -> Result<String, StoreError> {
        GcsClient::ensure_bucket(self, mode).await
    }

    async fn upload(&self, bytes: Vec<u8>, bucket: &str, blob_name: &str) -> Result<(), StoreError> {
        GcsClient::upload(self, bytes, bucket, blob_name).await
    }

    async fn exists(&self, bucket: &str, blob_name: &str) -> Result<bool, StoreError> {
        GcsClient::exists(self, bucket, blob_name).await
    }

    async fn download(&self, bucket: &str, blob_name: &str) -> Result<Vec<u8>, StoreError> {
        GcsClient::download(self, bucket, blob_name).await
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<BlobInfo>, StoreError> {
        GcsClient::list(self, bucket, prefix).await
    }

    async fn delete(&self, bucket: &str, blob_name: &str) -> Result<(), StoreError> {
        GcsClient::delete(self, bucket, blob_name).await
    }

    async fn cleanup(&self, bucket: &str, prefixes: &[String]) -> CleanupReport {
        GcsClient::cleanup(self, bucket, prefixes).await
    }
}

#[async_trait]
pub trait ModelPort: Send + Sync {
    async fn generate(
        &self,
        chunk_remote_uri: &str,
        language: LanguageCode,
        flags: GenerationFlags,
        method: GenerationMethod,
    ) -> Result<String, ModelError>;
}

#[async_trait]
impl ModelPort for ModelClient {
    async fn generate(
        &self,
        chunk_remote_uri: &str,
        language: LanguageCode,
        flags: GenerationFlags,
        method: GenerationMethod,
    ) -> Result<String, ModelError> {
        ModelClient::generate(self, chunk_remote_uri, language, flags, method).await
    }
}
