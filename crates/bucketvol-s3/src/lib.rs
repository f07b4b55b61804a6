#![cfg_attr(not(test), forbid(unsafe_code))]
#![cfg_attr(test, deny(unsafe_code))]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]
#![allow(clippy::result_large_err)]

// Tracing target constants for consistent logging
pub const TRACING_TARGET_CLIENT: &str = "bucketvol_s3::client";
pub const TRACING_TARGET_CREDENTIALS: &str = "bucketvol_s3::credentials";
pub const TRACING_TARGET_BUCKETS: &str = "bucketvol_s3::buckets";
pub const TRACING_TARGET_EVICTION: &str = "bucketvol_s3::eviction";
pub const TRACING_TARGET_METADATA: &str = "bucketvol_s3::metadata";

pub mod client;
mod error;
pub mod federation;
pub mod operations;
pub mod store;
pub mod types;

// Re-export for convenience
pub use crate::client::{S3Client, S3Config, S3Credentials, SecretBundle};
pub use crate::error::{Error, ErrorSeverity, Result};
pub use crate::federation::{
    CredentialResolver, FederationError, StsFederation, TemporaryCredentials,
    WebIdentityFederation,
};
pub use crate::operations::{BucketOperations, EvictionOperations, MetadataOperations};
pub use crate::store::{DeleteFailure, MinioStore, ObjectStore};
pub use crate::types::{DeletionUnit, EvictionReport, VolumeMeta};
