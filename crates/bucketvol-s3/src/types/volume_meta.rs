//! Volume storage descriptor persisted next to a volume's data.
//!
//! The record is shared with the provisioning layer, so its JSON field
//! names are fixed and must not change.

use serde::{Deserialize, Deserializer, Serialize};

/// File name of the descriptor object inside a volume's prefix.
pub const METADATA_FILE_NAME: &str = ".metadata.json";

/// Describes where a provisioned volume's files live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMeta {
    /// Bucket holding the volume.
    #[serde(rename = "Name")]
    pub bucket_name: String,

    /// Prefix of the volume inside the bucket (empty for a whole bucket).
    #[serde(rename = "Prefix")]
    pub prefix: String,

    /// Mounter identifier, opaque to this crate.
    #[serde(rename = "Mounter")]
    pub mounter: String,

    /// Mount options in the order they are passed to the mounter.
    #[serde(rename = "MountOptions", default, deserialize_with = "null_as_empty")]
    pub mount_options: Vec<String>,

    /// Requested capacity in bytes.
    #[serde(rename = "CapacityBytes")]
    pub capacity_bytes: i64,
}

impl VolumeMeta {
    /// Creates a descriptor without mount options.
    pub fn new(
        bucket_name: impl Into<String>,
        prefix: impl Into<String>,
        mounter: impl Into<String>,
        capacity_bytes: i64,
    ) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            prefix: prefix.into(),
            mounter: mounter.into(),
            mount_options: Vec::new(),
            capacity_bytes,
        }
    }

    /// Sets the mount options.
    #[must_use]
    pub fn with_mount_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mount_options = options.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the object key the descriptor is stored at.
    pub fn object_key(&self) -> String {
        Self::object_key_for(&self.prefix)
    }

    /// Returns the descriptor object key for a volume rooted at `prefix`.
    pub fn object_key_for(prefix: &str) -> String {
        let prefix = super::normalize_prefix(prefix);
        if prefix.is_empty() {
            METADATA_FILE_NAME.to_string()
        } else {
            format!("{prefix}/{METADATA_FILE_NAME}")
        }
    }
}

/// Writers that never set mount options emit `null` instead of `[]`.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
