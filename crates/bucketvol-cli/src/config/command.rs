//! Subcommands and their execution.

use anyhow::Context;
use bucketvol_s3::S3Client;
use clap::Subcommand;

use crate::TRACING_TARGET_COMMAND;

/// Operation run against the object store.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Check whether a bucket exists
    Exists {
        /// Bucket name
        bucket: String,
    },

    /// Provision a volume: create the bucket if missing, the prefix marker
    /// and the volume metadata
    Create {
        /// Bucket name
        bucket: String,
        /// Prefix inside the bucket; empty for a whole-bucket volume
        #[arg(long, default_value = "")]
        prefix: String,
        /// Requested capacity in bytes
        #[arg(long, default_value_t = 0)]
        capacity_bytes: i64,
        /// Mount option passed to the mounter; repeatable
        #[arg(long = "mount-option")]
        mount_options: Vec<String>,
    },

    /// Delete every object of a prefix and the prefix, or of a bucket and
    /// the bucket when no prefix is given
    Delete {
        /// Bucket name
        bucket: String,
        /// Prefix inside the bucket
        #[arg(long, default_value = "")]
        prefix: String,
    },

    /// Print the metadata of a volume as JSON
    Describe {
        /// Bucket name
        bucket: String,
        /// Prefix inside the bucket
        #[arg(long, default_value = "")]
        prefix: String,
    },
}

impl Command {
    /// Returns the subcommand name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Exists { .. } => "exists",
            Self::Create { .. } => "create",
            Self::Delete { .. } => "delete",
            Self::Describe { .. } => "describe",
        }
    }

    /// Runs the command with `client`.
    pub async fn execute(self, client: &S3Client) -> anyhow::Result<()> {
        match self {
            Self::Exists { bucket } => {
                let exists = client
                    .bucket_exists(&bucket)
                    .await
                    .with_context(|| format!("failed to check bucket '{bucket}'"))?;
                println!("{exists}");
            }
            Self::Create {
                bucket,
                prefix,
                capacity_bytes,
                mount_options,
            } => {
                let exists = client
                    .bucket_exists(&bucket)
                    .await
                    .with_context(|| format!("failed to check bucket '{bucket}'"))?;
                if !exists {
                    client
                        .create_bucket(&bucket)
                        .await
                        .with_context(|| format!("failed to create bucket '{bucket}'"))?;
                }

                client
                    .create_prefix(&bucket, &prefix)
                    .await
                    .with_context(|| format!("failed to create prefix '{prefix}'"))?;

                let meta = client
                    .volume_meta(&bucket, &prefix, capacity_bytes)
                    .with_mount_options(mount_options);
                client
                    .set_volume_meta(&meta)
                    .await
                    .context("failed to write volume metadata")?;

                tracing::info!(
                    target: TRACING_TARGET_COMMAND,
                    bucket = %bucket,
                    prefix = %prefix,
                    created_bucket = !exists,
                    "Volume provisioned"
                );
            }
            Self::Delete { bucket, prefix } if prefix.is_empty() => {
                client
                    .remove_bucket(&bucket)
                    .await
                    .with_context(|| format!("failed to remove bucket '{bucket}'"))?;
            }
            Self::Delete { bucket, prefix } => {
                client
                    .remove_prefix(&bucket, &prefix)
                    .await
                    .with_context(|| format!("failed to remove '{bucket}/{prefix}'"))?;
            }
            Self::Describe { bucket, prefix } => {
                let meta = client
                    .get_volume_meta(&bucket, &prefix)
                    .await
                    .context("failed to read volume metadata")?;
                println!("{}", serde_json::to_string_pretty(&meta)?);
            }
        }

        Ok(())
    }
}
