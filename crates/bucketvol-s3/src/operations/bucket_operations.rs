//! Bucket and prefix lifecycle.

use bytes::Bytes;
use tracing::{debug, error, info, instrument};

use crate::types::{normalize_prefix, prefix_marker};
use crate::{Result, S3Client, TRACING_TARGET_BUCKETS};

/// Existence checks and creation of buckets and prefixes.
#[derive(Debug, Clone)]
pub struct BucketOperations {
    client: S3Client,
}

impl BucketOperations {
    /// Creates new BucketOperations with an S3 client.
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }

    /// Returns whether a bucket exists.
    ///
    /// # Errors
    ///
    /// Backend errors are returned unchanged.
    #[instrument(skip(self), target = TRACING_TARGET_BUCKETS, fields(bucket = %bucket_name))]
    pub async fn exists(&self, bucket_name: &str) -> Result<bool> {
        let exists = self
            .client
            .run_cancellable(self.client.store().bucket_exists(bucket_name))
            .await?;

        debug!(
            target: TRACING_TARGET_BUCKETS,
            bucket = %bucket_name,
            exists = exists,
            "Checked bucket existence"
        );
        Ok(exists)
    }

    /// Creates a bucket in the configured region.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket creation fails, including when the
    /// bucket already exists.
    #[instrument(skip(self), target = TRACING_TARGET_BUCKETS, fields(bucket = %bucket_name))]
    pub async fn create_bucket(&self, bucket_name: &str) -> Result<()> {
        let region = &self.client.config().region;
        debug!(
            target: TRACING_TARGET_BUCKETS,
            bucket = %bucket_name,
            region = %region,
            "Creating bucket"
        );

        let start = std::time::Instant::now();
        let result = self
            .client
            .run_cancellable(self.client.store().make_bucket(bucket_name, region))
            .await;
        let elapsed = start.elapsed();

        match result {
            Ok(()) => {
                info!(
                    target: TRACING_TARGET_BUCKETS,
                    bucket = %bucket_name,
                    elapsed = ?elapsed,
                    "Bucket created successfully"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    target: TRACING_TARGET_BUCKETS,
                    bucket = %bucket_name,
                    error = %e,
                    elapsed = ?elapsed,
                    "Failed to create bucket"
                );
                Err(e)
            }
        }
    }

    /// Creates the zero-length marker object of a prefix.
    ///
    /// Does nothing for an empty prefix.
    #[instrument(skip(self), target = TRACING_TARGET_BUCKETS, fields(bucket = %bucket_name))]
    pub async fn create_prefix(&self, bucket_name: &str, prefix: &str) -> Result<()> {
        if normalize_prefix(prefix).is_empty() {
            return Ok(());
        }

        let marker = prefix_marker(prefix);
        let result = self
            .client
            .run_cancellable(
                self.client
                    .store()
                    .put_object(bucket_name, &marker, Bytes::new()),
            )
            .await;

        match result {
            Ok(()) => {
                info!(
                    target: TRACING_TARGET_BUCKETS,
                    bucket = %bucket_name,
                    marker = %marker,
                    "Prefix created"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    target: TRACING_TARGET_BUCKETS,
                    bucket = %bucket_name,
                    marker = %marker,
                    error = %e,
                    "Failed to create prefix"
                );
                Err(e)
            }
        }
    }
}
