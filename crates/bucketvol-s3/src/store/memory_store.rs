//! In-memory [`ObjectStore`] with fault injection.
//!
//! Only available in tests or with the `test-utils` feature.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;

use super::{DeleteFailure, FailureStream, ListStream, ObjectStore, UnitStream};
use crate::types::DeletionUnit;
use crate::{Error, Result};

/// Objects per multi-object delete request, as on S3.
const BULK_BATCH_SIZE: usize = 1000;

/// Listed objects between two cooperative yields.
const LIST_PAGE_SIZE: usize = 100;

/// How the store answers multi-object delete requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BulkBehavior {
    /// Deletes objects like S3 does.
    #[default]
    Supported,
    /// Every request fails as a whole and deletes nothing.
    Unsupported,
    /// Every object is rejected individually and nothing is deleted.
    RejectAll,
}

/// Snapshot of the calls a [`MemoryStore`] received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounters {
    /// `list_objects` calls.
    pub list_calls: usize,
    /// Multi-object delete requests.
    pub bulk_requests: usize,
    /// `remove_object` calls.
    pub remove_object_calls: usize,
    /// `remove_bucket` calls.
    pub remove_bucket_calls: usize,
    /// Highest number of `remove_object` calls in flight at once.
    pub max_in_flight: usize,
}

#[derive(Debug, Default)]
struct Bucket {
    region: String,
    versioned: bool,
    objects: BTreeMap<String, Vec<Version>>,
}

#[derive(Debug, Clone)]
struct Version {
    id: Option<String>,
    /// `None` for a delete marker.
    data: Option<Bytes>,
}

#[derive(Debug, Default)]
struct Faults {
    bulk: BulkBehavior,
    failing_keys: HashSet<String>,
    failing_listings: usize,
    list_fail_after: usize,
    remove_delay: Duration,
}

#[derive(Debug, Default)]
struct Counters {
    list_calls: AtomicUsize,
    bulk_requests: AtomicUsize,
    remove_object_calls: AtomicUsize,
    remove_bucket_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    next_version: AtomicUsize,
}

#[derive(Debug, Default)]
struct Inner {
    buckets: Mutex<HashMap<String, Bucket>>,
    faults: Mutex<Faults>,
    counters: Counters,
}

/// Thread-safe in-memory object store.
///
/// Clones share state, so a test can keep one clone for assertions while a
/// client owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `bucket` with object versioning enabled.
    pub fn with_versioned_bucket(self, bucket: &str) -> Self {
        locked(&self.inner.buckets).insert(
            bucket.to_string(),
            Bucket {
                versioned: true,
                ..Bucket::default()
            },
        );
        self
    }

    /// Creates `bucket` holding one empty object per key.
    pub fn with_objects<I, S>(self, bucket: &str, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut buckets = locked(&self.inner.buckets);
            let entry = buckets.entry(bucket.to_string()).or_default();
            for key in keys {
                let id = entry.versioned.then(|| self.next_version_id());
                entry.objects.insert(
                    key.into(),
                    vec![Version {
                        id,
                        data: Some(Bytes::new()),
                    }],
                );
            }
        }
        self
    }

    /// Sets how multi-object deletes behave.
    pub fn with_bulk_behavior(self, behavior: BulkBehavior) -> Self {
        locked(&self.inner.faults).bulk = behavior;
        self
    }

    /// Makes every delete of `key` fail, bulk or single.
    pub fn with_failing_key(self, key: impl Into<String>) -> Self {
        locked(&self.inner.faults).failing_keys.insert(key.into());
        self
    }

    /// Makes the next `count` listings fail after yielding `after` objects.
    pub fn with_failing_listings(self, count: usize, after: usize) -> Self {
        {
            let mut faults = locked(&self.inner.faults);
            faults.failing_listings = count;
            faults.list_fail_after = after;
        }
        self
    }

    /// Delays every single-object delete by `delay`.
    pub fn with_remove_delay(self, delay: Duration) -> Self {
        locked(&self.inner.faults).remove_delay = delay;
        self
    }

    /// Returns a snapshot of the call counters.
    pub fn counters(&self) -> StoreCounters {
        let c = &self.inner.counters;
        StoreCounters {
            list_calls: c.list_calls.load(Ordering::SeqCst),
            bulk_requests: c.bulk_requests.load(Ordering::SeqCst),
            remove_object_calls: c.remove_object_calls.load(Ordering::SeqCst),
            remove_bucket_calls: c.remove_bucket_calls.load(Ordering::SeqCst),
            max_in_flight: c.max_in_flight.load(Ordering::SeqCst),
        }
    }

    /// Returns whether `bucket` exists.
    pub fn has_bucket(&self, bucket: &str) -> bool {
        locked(&self.inner.buckets).contains_key(bucket)
    }

    /// Returns the region `bucket` was created in.
    pub fn bucket_region(&self, bucket: &str) -> Option<String> {
        locked(&self.inner.buckets)
            .get(bucket)
            .map(|b| b.region.clone())
    }

    /// Returns the keys stored in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        locked(&self.inner.buckets)
            .get(bucket)
            .map(|b| b.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the number of object versions stored in `bucket`, delete
    /// markers included.
    pub fn version_count(&self, bucket: &str) -> usize {
        locked(&self.inner.buckets)
            .get(bucket)
            .map(|b| b.objects.values().map(Vec::len).sum())
            .unwrap_or_default()
    }

    /// Returns the number of delete markers stored in `bucket`.
    pub fn delete_marker_count(&self, bucket: &str) -> usize {
        locked(&self.inner.buckets)
            .get(bucket)
            .map(|b| {
                b.objects
                    .values()
                    .flatten()
                    .filter(|v| v.data.is_none())
                    .count()
            })
            .unwrap_or_default()
    }

    /// Returns the current object stored at `key`, if any.
    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        locked(&self.inner.buckets)
            .get(bucket)
            .and_then(|b| b.objects.get(key))
            .and_then(|versions| versions.last())
            .and_then(|version| version.data.clone())
    }

    fn next_version_id(&self) -> String {
        let n = self.inner.counters.next_version.fetch_add(1, Ordering::SeqCst);
        format!("v{n}")
    }

    fn is_failing_key(&self, key: &str) -> bool {
        locked(&self.inner.faults).failing_keys.contains(key)
    }

    fn delete_unit(&self, bucket: &str, unit: &DeletionUnit) -> Result<()> {
        if self.is_failing_key(&unit.key) {
            return Err(Error::backend(format!("AccessDenied: {}", unit.key)));
        }

        let mut buckets = locked(&self.inner.buckets);
        let bucket = buckets
            .get_mut(bucket)
            .ok_or_else(|| Error::backend(format!("NoSuchBucket: {bucket}")))?;

        if bucket.versioned && unit.version_id().is_none() {
            let id = Some(self.next_version_id());
            let versions = bucket.objects.entry(unit.key.clone()).or_default();
            versions.push(Version { id, data: None });
            return Ok(());
        }

        let Some(versions) = bucket.objects.get_mut(&unit.key) else {
            return Ok(());
        };
        match unit.version_id() {
            Some(version) => versions.retain(|v| v.id.as_deref() != Some(version)),
            None => versions.clear(),
        }
        if versions.is_empty() {
            bucket.objects.remove(&unit.key);
        }

        Ok(())
    }

    fn snapshot(&self, bucket: &str, prefix: &str) -> Result<Vec<DeletionUnit>> {
        let buckets = locked(&self.inner.buckets);
        let bucket = buckets
            .get(bucket)
            .ok_or_else(|| Error::backend(format!("NoSuchBucket: {bucket}")))?;

        Ok(bucket
            .objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .flat_map(|(key, versions)| {
                versions
                    .iter()
                    .map(|version| DeletionUnit::with_version(key.clone(), version.id.clone()))
            })
            .collect())
    }

    /// Returns `Some(n)` when this listing must fail after `n` objects.
    fn take_listing_fault(&self) -> Option<usize> {
        let mut faults = locked(&self.inner.faults);
        if faults.failing_listings == 0 {
            return None;
        }
        faults.failing_listings -= 1;
        Some(faults.list_fail_after)
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.has_bucket(bucket))
    }

    async fn make_bucket(&self, bucket: &str, region: &str) -> Result<()> {
        let mut buckets = locked(&self.inner.buckets);
        if buckets.contains_key(bucket) {
            return Err(Error::backend(format!("BucketAlreadyOwnedByYou: {bucket}")));
        }
        buckets.insert(
            bucket.to_string(),
            Bucket {
                region: region.to_string(),
                ..Bucket::default()
            },
        );
        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        let mut buckets = locked(&self.inner.buckets);
        let bucket = buckets
            .get_mut(bucket)
            .ok_or_else(|| Error::backend(format!("NoSuchBucket: {bucket}")))?;

        let id = bucket.versioned.then(|| self.next_version_id());
        let versions = bucket.objects.entry(key.to_string()).or_default();
        let version = Version {
            id,
            data: Some(data),
        };
        if bucket.versioned {
            versions.push(version);
        } else {
            *versions = vec![version];
        }
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.object(bucket, key)
            .ok_or_else(|| Error::backend(format!("NoSuchKey: {bucket}/{key}")))
    }

    fn list_objects(&self, bucket: &str, prefix: &str) -> ListStream {
        self.inner.counters.list_calls.fetch_add(1, Ordering::SeqCst);

        let store = self.clone();
        let bucket = bucket.to_string();
        let prefix = prefix.to_string();

        Box::pin(async_stream::try_stream! {
            let fail_after = store.take_listing_fault();
            let units = store.snapshot(&bucket, &prefix)?;

            for (i, unit) in units.into_iter().enumerate() {
                if fail_after == Some(i) {
                    Err::<(), _>(Error::backend("InternalError: listing interrupted"))?;
                }
                if i > 0 && i % LIST_PAGE_SIZE == 0 {
                    tokio::task::yield_now().await;
                }
                yield unit;
            }

            if fail_after.is_some() {
                Err::<(), _>(Error::backend("InternalError: listing interrupted"))?;
            }
        })
    }

    fn remove_objects(
        &self,
        bucket: &str,
        units: UnitStream,
        _bypass_governance: bool,
    ) -> FailureStream {
        let store = self.clone();
        let bucket = bucket.to_string();

        Box::pin(async_stream::stream! {
            let behavior = locked(&store.inner.faults).bulk;
            let mut batches = units.ready_chunks(BULK_BATCH_SIZE);

            while let Some(batch) = batches.next().await {
                store.inner.counters.bulk_requests.fetch_add(1, Ordering::SeqCst);

                match behavior {
                    BulkBehavior::Unsupported => {
                        yield DeleteFailure::Request(Error::backend("NotImplemented: DeleteObjects"));
                    }
                    BulkBehavior::RejectAll => {
                        for unit in batch {
                            yield DeleteFailure::Object { unit, message: "AccessDenied".to_string() };
                        }
                    }
                    BulkBehavior::Supported => {
                        for unit in batch {
                            if let Err(e) = store.delete_unit(&bucket, &unit) {
                                yield DeleteFailure::Object { unit, message: e.to_string() };
                            }
                        }
                    }
                }
            }
        })
    }

    async fn remove_object(&self, bucket: &str, unit: &DeletionUnit) -> Result<()> {
        let counters = &self.inner.counters;
        counters.remove_object_calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let delay = locked(&self.inner.faults).remove_delay;
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }

        let result = self.delete_unit(bucket, unit);
        counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn remove_bucket(&self, bucket: &str) -> Result<()> {
        self.inner
            .counters
            .remove_bucket_calls
            .fetch_add(1, Ordering::SeqCst);

        let mut buckets = locked(&self.inner.buckets);
        match buckets.get(bucket) {
            None => Err(Error::backend(format!("NoSuchBucket: {bucket}"))),
            Some(b) if !b.objects.is_empty() => {
                Err(Error::backend(format!("BucketNotEmpty: {bucket}")))
            }
            Some(_) => {
                buckets.remove(bucket);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;

    use super::*;

    #[tokio::test]
    async fn test_listing_is_prefix_scoped() {
        let store = MemoryStore::new().with_objects("b", ["a/1", "a/2", "ab/1", "c"]);

        let units: Vec<DeletionUnit> = store.list_objects("b", "a/").try_collect().await.unwrap();
        let keys: Vec<&str> = units.iter().map(|u| u.key.as_str()).collect();

        assert_eq!(keys, vec!["a/1", "a/2"]);
    }

    #[tokio::test]
    async fn test_versioned_put_keeps_versions() {
        let store = MemoryStore::new().with_versioned_bucket("b");
        store.put_object("b", "k", Bytes::from("1")).await.unwrap();
        store.put_object("b", "k", Bytes::from("2")).await.unwrap();

        let units: Vec<DeletionUnit> = store.list_objects("b", "").try_collect().await.unwrap();
        assert_eq!(units.len(), 2);
        assert!(units.iter().all(|u| u.version_id.is_some()));
        assert_eq!(store.object("b", "k"), Some(Bytes::from("2")));
    }

    #[tokio::test]
    async fn test_versioned_delete_without_version_adds_marker() {
        let store = MemoryStore::new().with_versioned_bucket("b");
        store.put_object("b", "k", Bytes::from("1")).await.unwrap();

        store.remove_object("b", &DeletionUnit::new("k")).await.unwrap();
        assert_eq!(store.object("b", "k"), None);
        assert_eq!(store.version_count("b"), 2);
        assert_eq!(store.delete_marker_count("b"), 1);
        assert!(store.remove_bucket("b").await.is_err());

        let units: Vec<DeletionUnit> = store.list_objects("b", "").try_collect().await.unwrap();
        assert_eq!(units.len(), 2);
        for unit in &units {
            store.remove_object("b", unit).await.unwrap();
        }
        store.remove_bucket("b").await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_listing() {
        let store = MemoryStore::new()
            .with_objects("b", ["1", "2", "3"])
            .with_failing_listings(1, 2);

        let first: Result<Vec<DeletionUnit>> = store.list_objects("b", "").try_collect().await;
        assert!(first.is_err());

        let second: Vec<DeletionUnit> = store.list_objects("b", "").try_collect().await.unwrap();
        assert_eq!(second.len(), 3);
    }

    #[tokio::test]
    async fn test_remove_bucket_requires_empty() {
        let store = MemoryStore::new().with_objects("b", ["k"]);
        assert!(store.remove_bucket("b").await.is_err());

        store.remove_object("b", &DeletionUnit::new("k")).await.unwrap();
        store.remove_bucket("b").await.unwrap();
        assert!(!store.has_bucket("b"));
    }
}
