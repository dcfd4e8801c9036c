//! Gemini-style multimodal model port: a single `generate` operation that
//! turns a remote video chunk plus a target language into opaque SRT text.

pub mod client;
pub mod error;

pub use client::{GenerationMethod, ModelClient};
pub use error::{ModelError, ModelResult};
