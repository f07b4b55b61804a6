//! Volume descriptor persistence.

use bytes::Bytes;
use tracing::{debug, error, instrument};

use crate::types::VolumeMeta;
use crate::{Result, S3Client, TRACING_TARGET_METADATA};

/// Reads and writes [`VolumeMeta`] records.
#[derive(Debug, Clone)]
pub struct MetadataOperations {
    client: S3Client,
}

impl MetadataOperations {
    /// Creates new MetadataOperations with an S3 client.
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }

    /// Writes `meta` as JSON under its own bucket and prefix.
    #[instrument(
        skip(self, meta),
        target = TRACING_TARGET_METADATA,
        fields(bucket = %meta.bucket_name, prefix = %meta.prefix)
    )]
    pub async fn set_volume_meta(&self, meta: &VolumeMeta) -> Result<()> {
        let key = meta.object_key();
        let data = Bytes::from(serde_json::to_vec(meta)?);

        self.client
            .run_cancellable(
                self.client
                    .store()
                    .put_object(&meta.bucket_name, &key, data),
            )
            .await
            .map_err(|e| {
                error!(target: TRACING_TARGET_METADATA, key = %key, error = %e, "Failed to write volume metadata");
                e
            })?;

        debug!(target: TRACING_TARGET_METADATA, key = %key, "Volume metadata written");
        Ok(())
    }

    /// Reads the descriptor of the volume rooted at `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`](crate::Error::Serialization) if the
    /// stored record does not decode.
    #[instrument(skip(self), target = TRACING_TARGET_METADATA)]
    pub async fn get_volume_meta(&self, bucket: &str, prefix: &str) -> Result<VolumeMeta> {
        let key = VolumeMeta::object_key_for(prefix);
        let data = self
            .client
            .run_cancellable(self.client.store().get_object(bucket, &key))
            .await?;

        let meta = serde_json::from_slice(&data).map_err(|e| {
            error!(target: TRACING_TARGET_METADATA, key = %key, error = %e, "Malformed volume metadata");
            e
        })?;
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::MemoryStore;
    use crate::{Error, ObjectStore, S3Config, S3Credentials};

    fn client(store: &MemoryStore) -> S3Client {
        let config = S3Config::new(S3Credentials::new("a", "s"), "", "http://minio:9000");
        S3Client::with_store(config, Arc::new(store.clone())).unwrap()
    }

    #[tokio::test]
    async fn test_volume_meta_round_trip() {
        let store = MemoryStore::new().with_objects("b", Vec::<String>::new());
        let client = client(&store);
        let meta = VolumeMeta::new("b", "p", "m", 1024).with_mount_options(["--opt1"]);

        client.set_volume_meta(&meta).await.unwrap();
        assert!(store.object("b", "p/.metadata.json").is_some());

        let loaded = client.get_volume_meta("b", "p").await.unwrap();
        assert_eq!(loaded, meta);
    }

    #[tokio::test]
    async fn test_bucket_root_descriptor() {
        let store = MemoryStore::new().with_objects("b", Vec::<String>::new());
        let client = client(&store);

        client
            .set_volume_meta(&VolumeMeta::new("b", "", "s3fs", 1))
            .await
            .unwrap();
        assert_eq!(store.keys("b"), vec![".metadata.json".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_descriptor() {
        let store = MemoryStore::new().with_objects("b", Vec::<String>::new());
        store
            .put_object("b", "p/.metadata.json", Bytes::from_static(b"{not json"))
            .await
            .unwrap();

        let result = client(&store).get_volume_meta("b", "p").await;
        assert!(matches!(result, Err(Error::Serialization(_))));
    }
}
