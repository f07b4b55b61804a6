//! Object identities handed from listing to deletion.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An object key plus its version identifier, fixed at list time.
///
/// On version-enabled buckets a single key may be listed several times,
/// once per version; deleting a unit removes exactly that version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeletionUnit {
    /// Object key.
    pub key: String,
    /// Version identifier, absent on unversioned buckets.
    pub version_id: Option<String>,
}

impl DeletionUnit {
    /// Creates a unit for the latest (or only) version of `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version_id: None,
        }
    }

    /// Creates a unit for a specific version of `key`.
    pub fn with_version(key: impl Into<String>, version_id: Option<String>) -> Self {
        Self {
            key: key.into(),
            version_id,
        }
    }

    /// Returns the version identifier, if any.
    #[inline]
    pub fn version_id(&self) -> Option<&str> {
        self.version_id.as_deref()
    }
}

impl fmt::Display for DeletionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version_id {
            Some(version) => write!(f, "{}?versionId={}", self.key, version),
            None => f.write_str(&self.key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(DeletionUnit::new("a/b").to_string(), "a/b");
        assert_eq!(
            DeletionUnit::with_version("a/b", Some("v2".into())).to_string(),
            "a/b?versionId=v2"
        );
    }
}
