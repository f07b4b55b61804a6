//! Storage protocol seam.
//!
//! [`ObjectStore`] names the handful of S3 calls the client needs. The
//! production implementation wraps the MinIO SDK; [`MemoryStore`] keeps
//! objects in memory and can inject failures for tests.

use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use futures::stream::BoxStream;

use crate::Result;
use crate::types::DeletionUnit;

#[cfg(any(test, feature = "test-utils"))]
mod memory_store;
mod minio_store;

#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
pub use memory_store::{BulkBehavior, MemoryStore, StoreCounters};
pub use minio_store::MinioStore;

/// Stream of listed objects; an `Err` item ends the enumeration.
pub type ListStream = BoxStream<'static, Result<DeletionUnit>>;

/// Stream of objects handed to a bulk delete.
///
/// `Sync` because the SDK's streaming multi-delete requires it.
pub type UnitStream = Pin<Box<dyn Stream<Item = DeletionUnit> + Send + Sync + 'static>>;

/// Stream of failures reported while a bulk delete runs.
pub type FailureStream = BoxStream<'static, DeleteFailure>;

/// A failure reported by a bulk delete.
#[derive(Debug)]
pub enum DeleteFailure {
    /// The backend refused to delete one object.
    Object {
        /// Object that was not deleted.
        unit: DeletionUnit,
        /// Backend diagnostic message.
        message: String,
    },
    /// A whole delete request failed, for instance because the backend does
    /// not implement multi-object delete.
    Request(crate::Error),
}

impl std::fmt::Display for DeleteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Object { unit, message } => write!(f, "{unit}: {message}"),
            Self::Request(error) => write!(f, "request failed: {error}"),
        }
    }
}

/// Object storage calls used by the client.
///
/// Implementations must be safe to call from many tasks at once.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Returns whether `bucket` exists.
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    /// Creates `bucket` in `region`.
    async fn make_bucket(&self, bucket: &str, region: &str) -> Result<()>;

    /// Writes `data` at `key`, replacing any existing object.
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<()>;

    /// Reads the object at `key`.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes>;

    /// Recursively lists every object version whose key starts with `prefix`.
    ///
    /// On a versioned bucket every unit carries its version ID, and delete
    /// markers are listed as units of their own. Results are streamed as
    /// pages arrive.
    fn list_objects(&self, bucket: &str, prefix: &str) -> ListStream;

    /// Deletes every unit read from `units` in as few requests as possible.
    ///
    /// The returned stream drives the deletion: it pulls from `units`,
    /// yields every failure, and ends once `units` is exhausted.
    fn remove_objects(&self, bucket: &str, units: UnitStream, bypass_governance: bool)
    -> FailureStream;

    /// Deletes exactly the version named by `unit`.
    async fn remove_object(&self, bucket: &str, unit: &DeletionUnit) -> Result<()>;

    /// Deletes `bucket`, which must be empty.
    async fn remove_bucket(&self, bucket: &str) -> Result<()>;
}
