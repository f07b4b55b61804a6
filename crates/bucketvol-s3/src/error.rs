//! Error types for the S3 volume backend.

use crate::federation::FederationError;

/// Specialized [`Result`] type for S3 volume backend operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error type for S3 volume backend operations.
#[derive(Debug, thiserror::Error)]
#[must_use = "errors should be handled appropriately"]
pub enum Error {
    /// Configuration error.
    ///
    /// Unparseable endpoints, missing environment bindings required for
    /// federation, malformed secret bundles and invalid credential shapes.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Exchanging an identity token for temporary credentials failed.
    #[error("Federation error: {0}")]
    Federation(#[from] FederationError),

    /// The bulk delete call reported per-object failures.
    #[error("Failed to remove {failed} objects of {bucket}/{scope} with bulk delete")]
    BulkDelete {
        /// Bucket being evicted.
        bucket: String,
        /// Key scope being evicted (empty for the whole bucket).
        scope: String,
        /// Number of per-object failures reported.
        failed: usize,
    },

    /// The per-object fallback could not delete every object.
    #[error("Failed to remove {failed} objects out of total {total} of {bucket}/{scope}")]
    PartialEviction {
        /// Bucket being evicted.
        bucket: String,
        /// Key scope being evicted (empty for the whole bucket).
        scope: String,
        /// Number of objects whose deletion failed.
        failed: usize,
        /// Number of objects that were listed and attempted.
        total: usize,
    },

    /// Both eviction paths failed.
    ///
    /// Displays as the bulk path error; the per-object pass error stays
    /// reachable as the source.
    #[error("{primary}")]
    Eviction {
        /// Error of the bulk delete pass.
        primary: Box<Error>,
        /// Error of the per-object fallback pass.
        #[source]
        fallback: Box<Error>,
    },

    /// The operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// Storage backend error not produced by the MinIO SDK.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Underlying MinIO client error.
    #[error("MinIO client error: {0}")]
    Client(#[from] minio::s3::error::Error),
}

impl Error {
    /// Creates a storage backend error from any displayable value.
    pub fn backend(message: impl std::fmt::Display) -> Self {
        Self::Backend(message.to_string())
    }

    /// Returns the error of the per-object fallback pass, if both eviction
    /// paths failed.
    pub fn fallback(&self) -> Option<&Error> {
        match self {
            Error::Eviction { fallback, .. } => Some(fallback.as_ref()),
            _ => None,
        }
    }

    /// Returns whether this error indicates a configuration issue.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Returns whether this error was caused by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Returns whether retrying the whole operation may succeed.
    ///
    /// This crate never retries on its own; the flag is a hint for callers.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Federation(e) => e.is_retryable(),
            Error::BulkDelete { .. } => true,
            Error::PartialEviction { .. } => true,
            Error::Eviction { primary, .. } => primary.is_retryable(),
            Error::Backend(_) => true,
            Error::Io(_) => true,
            Error::Client(_) => true,
            Error::Config(_) => false,
            Error::Cancelled => false,
            Error::Serialization(_) => false,
        }
    }

    /// Returns the severity level of this error for logging purposes.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Error::Config(_) => ErrorSeverity::Critical,
            Error::Federation(_) => ErrorSeverity::High,
            Error::PartialEviction { .. } => ErrorSeverity::High,
            Error::Eviction { .. } => ErrorSeverity::High,
            Error::BulkDelete { .. } => ErrorSeverity::Medium,
            Error::Serialization(_) => ErrorSeverity::Medium,
            Error::Client(_) => ErrorSeverity::Medium,
            Error::Backend(_) => ErrorSeverity::Medium,
            Error::Io(_) => ErrorSeverity::Low,
            Error::Cancelled => ErrorSeverity::Low,
        }
    }
}

/// Error severity levels for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical errors that require immediate attention.
    Critical,
    /// High-priority errors that should be investigated quickly.
    High,
    /// Medium-priority errors that should be monitored.
    Medium,
    /// Low-priority errors that are expected during normal operation.
    Low,
}
