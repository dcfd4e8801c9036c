//! Static configuration loading and validation: base + local-override TOML
//! files deep-merged, environment-variable overrides, and the closed
//! allow-lists (languages, GCP regions, auth methods) the orchestrator
//! relies on before it ever touches a port.

pub mod config;
pub mod error;

pub use config::{Config, GcpConfig, OutputConfig, ProcessingConfig, ALLOWED_AUTH_METHODS, ALLOWED_REGIONS};
pub use error::ConfigurationError;
