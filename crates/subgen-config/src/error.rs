use thiserror::Error;

/// A configuration-loading or -validation failure. Every validation failure
/// names the offending key and, where applicable, the allowed set so the
/// operator can fix the config file without consulting source code.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing required config key: {key}")]
    MissingKey { key: String },

    #[error("invalid value for {key}: {value} (allowed: {allowed:?})")]
    InvalidValue {
        key: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("directory for {key} is not creatable: {path}")]
    DirectoryNotCreatable { key: String, path: String },
}
