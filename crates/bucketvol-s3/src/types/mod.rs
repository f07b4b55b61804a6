//! Data types shared by the client, the storage protocol and the operations.

mod deletion_unit;
mod eviction_report;
mod volume_meta;

pub use deletion_unit::DeletionUnit;
pub use eviction_report::EvictionReport;
pub use volume_meta::{METADATA_FILE_NAME, VolumeMeta};

/// Returns `prefix` without trailing slashes.
///
/// `"vol"` and `"vol/"` name the same prefix. A prefix made only of slashes
/// names the bucket root.
#[inline]
pub fn normalize_prefix(prefix: &str) -> &str {
    prefix.trim_end_matches('/')
}

/// Returns the key of the directory marker object for `prefix`.
#[inline]
pub fn prefix_marker(prefix: &str) -> String {
    format!("{}/", normalize_prefix(prefix))
}

/// Returns the key scope that an eviction of `prefix` lists and deletes.
///
/// The whole bucket for an empty prefix; everything below the prefix
/// directory (marker included) otherwise.
pub fn eviction_scope(prefix: &str) -> String {
    if normalize_prefix(prefix).is_empty() {
        String::new()
    } else {
        prefix_marker(prefix)
    }
}
