//! GCS object-store port: bucket lifecycle plus blob upload/download/list/delete,
//! speaking the GCS JSON REST API directly (there is no first-party Rust GCS
//! SDK) using the same `gcp_auth` + `reqwest` pattern as the Firestore client.

mod clock;

pub mod client;
pub mod error;
pub mod types;

pub use client::{BucketMode, GcsClient};
pub use error::{StoreError, StoreResult};
pub use types::{BlobInfo, CleanupReport};
