//! High-level S3 client for volume backends.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::federation::{CredentialResolver, StsFederation};
use crate::operations::{BucketOperations, EvictionOperations, MetadataOperations};
use crate::store::{MinioStore, ObjectStore};
use crate::types::VolumeMeta;
use crate::{Error, Result, S3Config, SecretBundle, TRACING_TARGET_CLIENT};

/// Client bound to one endpoint, one region and one set of credentials.
///
/// Cloning is cheap: clones share the storage handle, the configuration
/// and the cancellation token.
#[derive(Clone)]
pub struct S3Client {
    store: Arc<dyn ObjectStore>,
    config: Arc<S3Config>,
    cancellation: CancellationToken,
}

impl S3Client {
    /// Creates a client talking to the endpoint in `config`.
    ///
    /// No request is sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bucketvol_s3::{S3Client, S3Config, S3Credentials};
    ///
    /// let credentials = S3Credentials::new("access_key", "secret_key");
    /// let config = S3Config::new(credentials, "us-east-1", "http://localhost:9000");
    /// let client = S3Client::new(config).unwrap();
    /// ```
    #[instrument(skip(config), target = TRACING_TARGET_CLIENT, fields(endpoint = %config.endpoint_masked()))]
    pub fn new(config: S3Config) -> Result<Self> {
        config.validate().map_err(|e| {
            error!(target: TRACING_TARGET_CLIENT, error = %e, "Configuration validation failed");
            e
        })?;

        let store = MinioStore::new(&config)?;
        let client = Self::from_parts(config, Arc::new(store));

        info!(
            target: TRACING_TARGET_CLIENT,
            endpoint = %client.config.endpoint_masked(),
            region = %client.config.region,
            access_key = %client.config.credentials().access_key_masked(),
            temporary = client.config.credentials().is_temporary(),
            "S3 client initialized"
        );

        Ok(client)
    }

    /// Creates a client over an existing storage handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn with_store(config: S3Config, store: Arc<dyn ObjectStore>) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_parts(config, store))
    }

    /// Resolves `bundle` and creates a client from the result.
    ///
    /// Roles are assumed through the token service, with the identity token
    /// read from the file named by `AWS_WEB_IDENTITY_TOKEN_FILE`.
    pub async fn from_secret(bundle: &SecretBundle) -> Result<Self> {
        let resolver = CredentialResolver::from_env(Arc::new(StsFederation::new()));
        let config = resolver.resolve(bundle).await?;
        Self::new(config)
    }

    fn from_parts(config: S3Config, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            config: Arc::new(config),
            cancellation: CancellationToken::new(),
        }
    }

    /// Replaces the cancellation token.
    ///
    /// Passing a child of an application-wide token ties this client's work
    /// to the application's shutdown.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Returns the token cancelling this client's operations.
    #[inline]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Cancels every in-flight and future operation of this client and its clones.
    pub fn cancel(&self) {
        warn!(target: TRACING_TARGET_CLIENT, "Cancelling S3 client operations");
        self.cancellation.cancel();
    }

    /// Returns the configuration.
    #[inline]
    pub fn config(&self) -> &S3Config {
        &self.config
    }

    #[inline]
    pub(crate) fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Runs `operation` unless the client is cancelled first.
    pub(crate) async fn run_cancellable<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(Error::Cancelled),
            result = operation => result,
        }
    }

    /// Creates a new BucketOperations instance.
    pub fn bucket_operations(&self) -> BucketOperations {
        BucketOperations::new(self.clone())
    }

    /// Creates a new EvictionOperations instance.
    pub fn eviction(&self) -> EvictionOperations {
        EvictionOperations::new(self.clone())
    }

    /// Creates a new MetadataOperations instance.
    pub fn metadata(&self) -> MetadataOperations {
        MetadataOperations::new(self.clone())
    }

    /// Creates a descriptor for a volume stored under `bucket`/`prefix`,
    /// mounted by the configured mounter.
    pub fn volume_meta(&self, bucket: &str, prefix: &str, capacity_bytes: i64) -> VolumeMeta {
        VolumeMeta::new(bucket, prefix, &self.config.mounter, capacity_bytes)
    }

    /// Returns whether `bucket` exists.
    pub async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        self.bucket_operations().exists(bucket).await
    }

    /// Creates `bucket` in the configured region.
    pub async fn create_bucket(&self, bucket: &str) -> Result<()> {
        self.bucket_operations().create_bucket(bucket).await
    }

    /// Creates the marker object of `prefix` in `bucket`.
    pub async fn create_prefix(&self, bucket: &str, prefix: &str) -> Result<()> {
        self.bucket_operations().create_prefix(bucket, prefix).await
    }

    /// Deletes every object under `prefix`, then its marker.
    pub async fn remove_prefix(&self, bucket: &str, prefix: &str) -> Result<()> {
        self.eviction().remove_prefix(bucket, prefix).await
    }

    /// Deletes every object in `bucket`, then the bucket.
    pub async fn remove_bucket(&self, bucket: &str) -> Result<()> {
        self.eviction().remove_bucket(bucket).await
    }

    /// Writes the descriptor of a volume next to its data.
    pub async fn set_volume_meta(&self, meta: &VolumeMeta) -> Result<()> {
        self.metadata().set_volume_meta(meta).await
    }

    /// Reads the descriptor of the volume under `bucket`/`prefix`.
    pub async fn get_volume_meta(&self, bucket: &str, prefix: &str) -> Result<VolumeMeta> {
        self.metadata().get_volume_meta(bucket, prefix).await
    }
}

impl std::fmt::Debug for S3Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Client")
            .field("endpoint", &self.config.endpoint_masked())
            .field("region", &self.config.region)
            .field("access_key", &self.config.credentials().access_key_masked())
            .field("delete_parallelism", &self.config.delete_parallelism)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::S3Credentials;
    use crate::store::MemoryStore;

    fn create_test_config() -> S3Config {
        let credentials = S3Credentials::new("minioadmin", "minioadmin");
        S3Config::new(credentials, "us-east-1", "https://localhost:9000")
    }

    #[test]
    fn test_client_creation() {
        let client = S3Client::new(create_test_config());
        assert!(client.is_ok());
    }

    #[test]
    fn test_client_invalid_config() {
        let config = S3Config::new(S3Credentials::new("", ""), "", "https://localhost:9000");
        assert!(matches!(S3Client::new(config), Err(Error::Config(_))));

        let config = S3Config::new(S3Credentials::new("a", "b"), "", "localhost");
        assert!(matches!(S3Client::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_client_debug() {
        let client = S3Client::new(create_test_config()).unwrap();
        let debug_str = format!("{:?}", client);

        assert!(debug_str.contains("S3Client"));
        assert!(debug_str.contains("localhost:9000"));
        assert!(!debug_str.contains("minioadmin"));
    }

    #[test]
    fn test_volume_meta_uses_mounter() {
        let config = create_test_config().with_mounter("geesefs");
        let client = S3Client::with_store(config, Arc::new(MemoryStore::new())).unwrap();

        let meta = client.volume_meta("b", "p", 1 << 30);
        assert_eq!(meta.mounter, "geesefs");
        assert_eq!(meta.capacity_bytes, 1 << 30);
    }

    #[tokio::test]
    async fn test_cancelled_client_rejects_work() {
        let store = MemoryStore::new().with_objects("b", ["k"]);
        let client = S3Client::with_store(create_test_config(), Arc::new(store.clone())).unwrap();

        client.cancel();

        assert!(matches!(client.bucket_exists("b").await, Err(Error::Cancelled)));
        assert!(matches!(client.remove_bucket("b").await, Err(Error::Cancelled)));
        assert!(store.has_bucket("b"));
    }

    #[tokio::test]
    async fn test_from_secret_without_role() {
        let bundle = SecretBundle::new("AKIA", "secret", "us-east-1", "http://127.0.0.1:9000");
        let client = S3Client::from_secret(&bundle).await.unwrap();

        assert!(!client.config().credentials().is_temporary());
        assert_eq!(client.config().region, "us-east-1");
    }
}
