use serde::{Deserialize, Serialize};

/// Metadata for one listed blob, as returned by [`crate::client::GcsClient::list`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobInfo {
    pub name: String,
    pub size_bytes: u64,
    pub updated: Option<String>,
}

/// Outcome of a best-effort [`crate::client::GcsClient::cleanup`] sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub deleted: u32,
    pub failed: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct BucketInsertRequest {
    pub name: String,
    pub location: String,
    pub lifecycle: Lifecycle,
}

#[derive(Debug, Serialize)]
pub(crate) struct Lifecycle {
    pub rule: Vec<LifecycleRule>,
}

#[derive(Debug, Serialize)]
pub(crate) struct LifecycleRule {
    pub action: LifecycleAction,
    pub condition: LifecycleCondition,
}

#[derive(Debug, Serialize)]
pub(crate) struct LifecycleAction {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct LifecycleCondition {
    pub age: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BucketResource {
    #[allow(dead_code)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ObjectResource {
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_size")]
    pub size: u64,
    pub updated: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ObjectListResponse {
    #[serde(default)]
    pub items: Vec<ObjectResource>,
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

/// GCS reports object `size` as a JSON string, not a number.
fn deserialize_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_resource_parses_gcs_string_encoded_size() {
        let json = r#"{"name": "chunks/job_1/000.mp4", "size": "4096", "updated": "2026-01-01T00:00:00Z"}"#;
        let parsed: ObjectResource = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.size, 4096);
        assert_eq!(parsed.name, "chunks/job_1/000.mp4");
    }
}
