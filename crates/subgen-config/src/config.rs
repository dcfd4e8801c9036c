//! Core configuration structures and loading logic.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use subgen_models::language::KNOWN_LANGUAGES;

/// GCP allow-list; extending it is a deliberate, reviewed change, matching
/// the closed language-code allow-list in `subgen-models`.
pub const ALLOWED_REGIONS: &[&str] = &[
    "us-central1",
    "us-east1",
    "us-west1",
    "europe-west1",
    "europe-west4",
    "asia-south1",
    "asia-southeast1",
];

pub const ALLOWED_AUTH_METHODS: &[&str] = &["service_account", "default_credentials"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GcpConfig {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_auth_method")]
    pub auth_method: String,
    #[serde(default)]
    pub credential_path: Option<String>,
    #[serde(default)]
    pub bucket_name: Option<String>,
    #[serde(default = "default_bucket_prefix")]
    pub bucket_prefix: String,
}

fn default_region() -> String {
    "us-central1".to_string()
}

fn default_auth_method() -> String {
    "default_credentials".to_string()
}

fn default_bucket_prefix() -> String {
    "subgen".to_string()
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            auth_method: default_auth_method(),
            credential_path: None,
            bucket_name: None,
            bucket_prefix: default_bucket_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingConfig {
    #[serde(default = "default_chunk_duration_sec")]
    pub chunk_duration_sec: f64,
    /// Fraction of chunk×language work items that must succeed during
    /// Generating for the stage to be considered successful.
    #[serde(default = "default_success_rate_threshold")]
    pub success_rate_threshold: f64,
    #[serde(default = "default_probe_timeout_sec")]
    pub probe_timeout_sec: u64,
    /// Size of the chunk-work scheduler's worker pool.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
}

fn default_chunk_duration_sec() -> f64 {
    60.0
}

fn default_success_rate_threshold() -> f64 {
    0.3
}

fn default_probe_timeout_sec() -> u64 {
    30
}

fn default_worker_count() -> usize {
    4
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            chunk_duration_sec: default_chunk_duration_sec(),
            success_rate_threshold: default_success_rate_threshold(),
            probe_timeout_sec: default_probe_timeout_sec(),
            worker_count: default_worker_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_jobs_dir")]
    pub jobs_dir: String,
    /// Job-scoped scratch directory for chunk files, released on every exit
    /// path (success, failure, cancellation) unless `--keep-intermediates`.
    #[serde(default = "default_work_dir")]
    pub work_dir: String,
}

fn default_output_dir() -> String {
    "./output".to_string()
}

fn default_jobs_dir() -> String {
    "./jobs".to_string()
}

fn default_work_dir() -> String {
    "./work".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            jobs_dir: default_jobs_dir(),
            work_dir: default_work_dir(),
        }
    }
}

/// Top-level configuration, loaded from a base TOML file with an optional
/// local override deep-merged on top (override wins key-by-key).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub gcp: GcpConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    /// Default target languages when the CLI caller specifies none.
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_languages() -> Vec<String> {
    vec!["eng".to_string()]
}

impl Config {
    /// Load the base file, deep-merge an optional override file on top,
    /// apply environment overrides, then validate.
    pub fn load(
        base_path: impl AsRef<Path>,
        override_path: Option<impl AsRef<Path>>,
    ) -> Result<Self, ConfigurationError> {
        let base_path = base_path.as_ref();
        let base_content = fs::read_to_string(base_path).map_err(|source| ConfigurationError::Io {
            path: base_path.display().to_string(),
            source,
        })?;
        let mut merged: toml::Value =
            toml::from_str(&base_content).map_err(|source| ConfigurationError::Parse {
                path: base_path.display().to_string(),
                source,
            })?;

        if let Some(override_path) = override_path {
            let override_path = override_path.as_ref();
            if override_path.exists() {
                let override_content =
                    fs::read_to_string(override_path).map_err(|source| ConfigurationError::Io {
                        path: override_path.display().to_string(),
                        source,
                    })?;
                let override_value: toml::Value = toml::from_str(&override_content)
                    .map_err(|source| ConfigurationError::Parse {
                        path: override_path.display().to_string(),
                        source,
                    })?;
                merge_tables(&mut merged, override_value);
            }
        }

        let mut config: Config = merged.clone().try_into().map_err(|source| ConfigurationError::Parse {
            path: base_path.display().to_string(),
            source,
        })?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration directly from a TOML string, skipping file I/O —
    /// used by tests and by `--config -` style inline loading.
    pub fn parse_toml(content: &str) -> Result<Self, ConfigurationError> {
        toml::from_str(content).map_err(|source| ConfigurationError::Parse {
            path: "<inline>".to_string(),
            source,
        })
    }

    /// Environment variables override `project_id`, `gcp.credential_path`,
    /// `gcp.bucket_name`, and `gcp.region` — env always wins over the file,
    /// matching the original `ConfigManager`'s override layer.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("SUBGEN_PROJECT_ID") {
            self.project_id = val;
        }
        if let Ok(val) = env::var("SUBGEN_CREDENTIAL_PATH") {
            self.gcp.credential_path = Some(val);
        }
        if let Ok(val) = env::var("SUBGEN_BUCKET_NAME") {
            self.gcp.bucket_name = Some(val);
        }
        if let Ok(val) = env::var("SUBGEN_REGION") {
            self.gcp.region = val;
        }
    }

    /// Validates closed allow-lists, directory creatability, and the
    /// service-account credential file's presence.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for lang in &self.languages {
            if !KNOWN_LANGUAGES.contains(&lang.as_str()) {
                return Err(ConfigurationError::InvalidValue {
                    key: "languages".to_string(),
                    value: lang.clone(),
                    allowed: KNOWN_LANGUAGES.iter().map(|s| s.to_string()).collect(),
                });
            }
        }

        if !ALLOWED_REGIONS.contains(&self.gcp.region.as_str()) {
            return Err(ConfigurationError::InvalidValue {
                key: "gcp.region".to_string(),
                value: self.gcp.region.clone(),
                allowed: ALLOWED_REGIONS.iter().map(|s| s.to_string()).collect(),
            });
        }

        if !ALLOWED_AUTH_METHODS.contains(&self.gcp.auth_method.as_str()) {
            return Err(ConfigurationError::InvalidValue {
                key: "gcp.auth_method".to_string(),
                value: self.gcp.auth_method.clone(),
                allowed: ALLOWED_AUTH_METHODS.iter().map(|s| s.to_string()).collect(),
            });
        }

        if self.gcp.auth_method == "service_account" {
            match &self.gcp.credential_path {
                Some(path) if Path::new(path).exists() => {}
                Some(path) => {
                    return Err(ConfigurationError::InvalidValue {
                        key: "gcp.credential_path".to_string(),
                        value: path.clone(),
                        allowed: vec!["<an existing file path>".to_string()],
                    })
                }
                None => return Err(ConfigurationError::MissingKey {
                    key: "gcp.credential_path".to_string(),
                }),
            }
        }

        ensure_creatable("output.output_dir", &self.output.output_dir)?;
        ensure_creatable("output.jobs_dir", &self.output.jobs_dir)?;
        ensure_creatable("output.work_dir", &self.output.work_dir)?;

        Ok(())
    }

    /// Look up a value by dot-path (`"processing.chunk_duration_sec"`),
    /// failing with [`ConfigurationError::MissingKey`] when absent.
    pub fn require(&self, path: &str) -> Result<toml::Value, ConfigurationError> {
        self.get(path)
            .ok_or_else(|| ConfigurationError::MissingKey {
                key: path.to_string(),
            })
    }

    /// Look up a value by dot-path, returning `None` when any segment is
    /// absent instead of failing.
    pub fn get(&self, path: &str) -> Option<toml::Value> {
        let value = toml::Value::try_from(self).ok()?;
        let mut current = &value;
        for segment in path.split('.') {
            current = current.as_table()?.get(segment)?;
        }
        Some(current.clone())
    }
}

fn ensure_creatable(key: &str, dir: &str) -> Result<(), ConfigurationError> {
    let path = Path::new(dir);
    if path.exists() {
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|_| ConfigurationError::DirectoryNotCreatable {
        key: key.to_string(),
        path: dir.to_string(),
    })?;
    Ok(())
}

/// Recursively merges `override_value` into `base`, table-by-table, with
/// the override winning on each leaf key. Non-table values are replaced
/// wholesale rather than merged.
fn merge_tables(base: &mut toml::Value, override_value: toml::Value) {
    match (base, override_value) {
        (toml::Value::Table(base_table), toml::Value::Table(override_table)) => {
            let mut merged: BTreeMap<String, toml::Value> = BTreeMap::new();
            for (k, v) in base_table.iter() {
                merged.insert(k.clone(), v.clone());
            }
            for (key, override_val) in override_table {
                match merged.get_mut(&key) {
                    Some(existing) if existing.is_table() && override_val.is_table() => {
                        merge_tables(existing, override_val);
                    }
                    _ => {
                        merged.insert(key, override_val);
                    }
                }
            }
            base_table.clear();
            for (k, v) in merged {
                base_table.insert(k, v);
            }
        }
        (base_slot, override_value) => {
            *base_slot = override_value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env_vars() {
        env::remove_var("SUBGEN_PROJECT_ID");
        env::remove_var("SUBGEN_CREDENTIAL_PATH");
        env::remove_var("SUBGEN_BUCKET_NAME");
        env::remove_var("SUBGEN_REGION");
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::parse_toml("").expect("empty TOML should parse");
        assert_eq!(config.gcp.region, "us-central1");
        assert_eq!(config.gcp.auth_method, "default_credentials");
        assert!((config.processing.success_rate_threshold - 0.3).abs() < 1e-9);
        assert_eq!(config.languages, vec!["eng".to_string()]);
    }

    #[test]
    fn override_file_wins_key_by_key() {
        let mut base: toml::Value = toml::from_str(
            r#"
            project_id = "base-project"
            [gcp]
            region = "us-central1"
            bucket_prefix = "base-prefix"
            "#,
        )
        .unwrap();
        let override_value: toml::Value = toml::from_str(
            r#"
            [gcp]
            region = "europe-west1"
            "#,
        )
        .unwrap();
        merge_tables(&mut base, override_value);
        let config: Config = base.try_into().unwrap();
        assert_eq!(config.gcp.region, "europe-west1");
        assert_eq!(config.gcp.bucket_prefix, "base-prefix");
        assert_eq!(config.project_id, "base-project");
    }

    #[test]
    fn rejects_unknown_language() {
        let config = Config::parse_toml(r#"languages = ["xyz"]"#).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { key, .. } if key == "languages"));
    }

    #[test]
    fn rejects_unknown_region() {
        let config = Config::parse_toml(
            r#"
            [gcp]
            region = "mars-central1"
            "#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { key, .. } if key == "gcp.region"));
    }

    #[test]
    fn service_account_requires_existing_credential_file() {
        let config = Config::parse_toml(
            r#"
            [gcp]
            auth_method = "service_account"
            "#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingKey { key } if key == "gcp.credential_path"));
    }

    #[test]
    fn dot_path_lookup_resolves_nested_keys() {
        let config = Config::parse_toml(
            r#"
            [processing]
            chunk_duration_sec = 45.0
            "#,
        )
        .unwrap();
        let value = config.require("processing.chunk_duration_sec").unwrap();
        assert_eq!(value.as_float(), Some(45.0));
        assert!(config.get("processing.nonexistent").is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_env_override_wins_for_region(
            base_region in proptest::sample::select(ALLOWED_REGIONS),
            override_region in proptest::sample::select(ALLOWED_REGIONS),
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!("[gcp]\nregion = \"{}\"\n", base_region);
            let mut config = Config::parse_toml(&toml_str).unwrap();

            env::set_var("SUBGEN_REGION", override_region);
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.gcp.region, override_region);
        }
    }
}
