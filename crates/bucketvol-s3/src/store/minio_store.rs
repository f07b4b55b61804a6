//! [`ObjectStore`] backed by the MinIO SDK.

use bytes::Bytes;
use futures::StreamExt;
use minio::s3::Client;
use minio::s3::builders::{ObjectToDelete, ObjectsStream};
use minio::s3::creds::StaticProvider;
use minio::s3::http::BaseUrl;
use minio::s3::response::DeleteResult;
use minio::s3::segmented_bytes::SegmentedBytes;
use minio::s3::types::{S3Api, ToStream};
use tracing::{debug, error};

use super::{DeleteFailure, FailureStream, ListStream, ObjectStore, UnitStream};
use crate::types::DeletionUnit;
use crate::{Error, Result, S3Config, TRACING_TARGET_CLIENT};

/// Object store speaking the S3 protocol through a single MinIO handle.
///
/// Cloning is cheap and clones share the underlying HTTP client.
#[derive(Clone)]
pub struct MinioStore {
    inner: Client,
}

impl MinioStore {
    /// Builds a handle for the endpoint and credentials in `config`.
    ///
    /// No request is sent; connectivity is only exercised by the first
    /// real operation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the endpoint is invalid or the SDK
    /// refuses to build a client.
    pub fn new(config: &S3Config) -> Result<Self> {
        let scheme = if config.is_secure()? { "https" } else { "http" };
        let host = config.endpoint_host()?;

        let mut base_url: BaseUrl = format!("{scheme}://{host}").parse().map_err(|e| {
            error!(target: TRACING_TARGET_CLIENT, error = %e, "Invalid endpoint URL");
            Error::Config(format!("Invalid endpoint URL: {}", e))
        })?;
        if !config.region.is_empty() {
            base_url.region = config.region.clone();
        }

        let provider = Box::new(StaticProvider::from(config.credentials()));
        let inner = Client::new(base_url, Some(provider), None, None).map_err(|e| {
            error!(target: TRACING_TARGET_CLIENT, error = %e, "Failed to create MinIO client");
            Error::Config(format!("Failed to build MinIO client: {}", e))
        })?;

        debug!(
            target: TRACING_TARGET_CLIENT,
            host = %host,
            secure = scheme == "https",
            "MinIO handle created"
        );

        Ok(Self { inner })
    }
}

impl std::fmt::Debug for MinioStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MinioStore").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl ObjectStore for MinioStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let response = self.inner.bucket_exists(bucket).send().await?;
        Ok(response.exists)
    }

    async fn make_bucket(&self, bucket: &str, region: &str) -> Result<()> {
        let region = (!region.is_empty()).then(|| region.to_string());
        self.inner.create_bucket(bucket).region(region).send().await?;
        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        let segmented_data = SegmentedBytes::from(data);
        self.inner
            .put_object(bucket, key, segmented_data)
            .send()
            .await?;
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let response = self.inner.get_object(bucket, key).send().await?;
        let segmented = response.content.to_segmented_bytes().await?;
        Ok(segmented.to_bytes())
    }

    fn list_objects(&self, bucket: &str, prefix: &str) -> ListStream {
        let client = self.inner.clone();
        let bucket = bucket.to_string();
        let prefix = (!prefix.is_empty()).then(|| prefix.to_string());

        Box::pin(async_stream::try_stream! {
            let mut pages = client
                .list_objects(&bucket)
                .recursive(true)
                .include_versions(true)
                .prefix(prefix)
                .to_stream()
                .await;

            while let Some(page) = pages.next().await {
                let page = page.map_err(Error::Client)?;
                for entry in page.contents {
                    if entry.is_prefix {
                        continue;
                    }
                    yield DeletionUnit::with_version(entry.name, entry.version_id);
                }
            }
        })
    }

    fn remove_objects(
        &self,
        bucket: &str,
        units: UnitStream,
        bypass_governance: bool,
    ) -> FailureStream {
        let client = self.inner.clone();
        let bucket = bucket.to_string();

        Box::pin(async_stream::stream! {
            let objects = ObjectsStream::from_stream(units.map(|unit| {
                ObjectToDelete::from((unit.key.as_str(), unit.version_id()))
            }));

            let mut responses = client
                .delete_objects_streaming(bucket.as_str(), objects)
                .bypass_governance_mode(bypass_governance)
                .to_stream()
                .await;

            while let Some(response) = responses.next().await {
                match response {
                    Ok(response) => {
                        for result in response.result {
                            if let DeleteResult::Error(e) = result {
                                yield DeleteFailure::Object {
                                    unit: DeletionUnit::with_version(e.object_name, e.version_id),
                                    message: format!("{}: {}", e.code, e.message),
                                };
                            }
                        }
                    }
                    Err(e) => yield DeleteFailure::Request(Error::Client(e)),
                }
            }
        })
    }

    async fn remove_object(&self, bucket: &str, unit: &DeletionUnit) -> Result<()> {
        let object = ObjectToDelete::from((unit.key.as_str(), unit.version_id()));
        self.inner.delete_object(bucket, object).send().await?;
        Ok(())
    }

    async fn remove_bucket(&self, bucket: &str) -> Result<()> {
        self.inner.delete_bucket(bucket).send().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::S3Credentials;

    #[test]
    fn test_store_creation_is_offline() {
        let config = S3Config::new(
            S3Credentials::new("minioadmin", "minioadmin"),
            "us-east-1",
            "http://127.0.0.1:1",
        );
        assert!(MinioStore::new(&config).is_ok());
    }

    #[test]
    fn test_store_rejects_bad_endpoint() {
        let config = S3Config::new(S3Credentials::new("a", "b"), "", "::not-a-url::");
        assert!(matches!(MinioStore::new(&config), Err(Error::Config(_))));
    }
}
