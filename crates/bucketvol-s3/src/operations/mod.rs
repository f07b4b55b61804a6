//! Bucket lifecycle, content eviction and volume metadata operations.
//!
//! Each operations type wraps a clone of an [`S3Client`](crate::S3Client)
//! and honours its cancellation token.

mod bucket_operations;
mod eviction;
mod metadata_operations;

pub use bucket_operations::BucketOperations;
pub use eviction::EvictionOperations;
pub use metadata_operations::MetadataOperations;
