//! Shared error taxonomy. Leaf crates (`subgen-media`, `subgen-storage`,
//! `subgen-model-client`, `subgen-state`, `subgen-retry`) define their own
//! `thiserror` enums for port-specific detail; this module holds only the
//! cross-cutting vocabulary the orchestrator needs to reason about an error
//! without depending on every leaf crate's concrete type.

use serde::{Deserialize, Serialize};

use crate::job::Stage;

/// Whether the retry core should retry an error or give up immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    NonRetryable,
}

/// Substrings recognized case-insensitively as retryable when a port error
/// carries no explicit [`ErrorClass`], matching the original
/// `retry_handler.py::_is_retryable_error` fallback.
pub const RETRYABLE_SUBSTRINGS: &[&str] = &[
    "timeout",
    "connection",
    "temporary",
    "rate limit",
    "throttle",
    "busy",
    "unavailable",
    "502",
    "503",
    "504",
];

/// Classify an error by message when the caller has no structured tag.
pub fn classify_by_message(message: &str) -> ErrorClass {
    let lower = message.to_ascii_lowercase();
    if RETRYABLE_SUBSTRINGS.iter().any(|s| lower.contains(s)) {
        ErrorClass::Retryable
    } else {
        ErrorClass::NonRetryable
    }
}

/// A captured failure record attached to a job on fatal failure: timestamp,
/// kind, message, stage, offending identifier, and retry count — as
/// required by the error-handling design.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub stage: Stage,
    pub kind: String,
    pub message: String,
    /// Chunk index, language code, or file path the failure is attributed to.
    pub offending_id: Option<String>,
    pub attempts: u32,
    pub occurred_at: chrono::DateTime<chrono::Utc>,
}

impl FailureRecord {
    pub fn new(stage: Stage, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind: kind.into(),
            message: message.into(),
            offending_id: None,
            attempts: 0,
            occurred_at: chrono::Utc::now(),
        }
    }

    pub fn with_offending_id(mut self, id: impl Into<String>) -> Self {
        self.offending_id = Some(id.into());
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}
