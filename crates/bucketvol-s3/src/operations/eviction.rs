//! Content eviction.
//!
//! Emptying a bucket or prefix runs in up to two passes. The bulk pass
//! streams a listing straight into multi-object delete requests. When that
//! pass reports any failure, a second pass lists the scope again and deletes
//! objects one by one with bounded parallelism. The prefix marker is held
//! back from both passes; it and the bucket are only removed after a pass
//! that deleted everything.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::StreamExt;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::store::{DeleteFailure, UnitStream};
use crate::types::{
    DeletionUnit, EvictionReport, eviction_scope, normalize_prefix, prefix_marker,
};
use crate::{Error, Result, S3Client, TRACING_TARGET_EVICTION};

/// Result of the bulk delete pass.
#[derive(Debug)]
enum BulkOutcome {
    /// Every listed object was deleted. `held` are the listed versions of
    /// the held-back marker.
    Completed {
        deleted: usize,
        held: Vec<DeletionUnit>,
    },
    /// The listing broke off, so objects may have been left unlisted.
    ListingFailed(Error),
    /// The backend refused to delete some objects.
    ObjectsFailed { failed: usize },
    /// A delete request failed as a whole.
    RequestFailed(Error),
}

/// Deletes every object of a bucket or prefix, then the bucket or prefix.
#[derive(Debug, Clone)]
pub struct EvictionOperations {
    client: S3Client,
}

impl EvictionOperations {
    /// Creates new EvictionOperations with an S3 client.
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }

    /// Deletes every object under `prefix`, then the prefix marker.
    ///
    /// Trailing slashes on `prefix` are ignored. An empty prefix evicts the
    /// whole bucket and leaves the bucket in place.
    ///
    /// # Errors
    ///
    /// Returns the bulk pass error when both passes fail, wrapped in
    /// [`Error::Eviction`] together with the per-object pass error. The marker
    /// is kept in that case.
    #[instrument(skip(self), target = TRACING_TARGET_EVICTION, fields(bucket = %bucket))]
    pub async fn remove_prefix(&self, bucket: &str, prefix: &str) -> Result<()> {
        self.client
            .run_cancellable(async {
                let marker =
                    (!normalize_prefix(prefix).is_empty()).then(|| prefix_marker(prefix));
                let held = self
                    .evict(bucket, &eviction_scope(prefix), marker.as_deref())
                    .await?;

                // Exact versions only; a plain delete leaves a delete marker
                // on versioned buckets.
                for unit in &held {
                    self.client.store().remove_object(bucket, unit).await?;
                }

                if marker.is_some() {
                    info!(
                        target: TRACING_TARGET_EVICTION,
                        bucket = %bucket,
                        prefix = %prefix,
                        "Prefix removed"
                    );
                }
                Ok(())
            })
            .await
    }

    /// Deletes every object in `bucket`, then the bucket.
    ///
    /// # Errors
    ///
    /// See [`remove_prefix`](Self::remove_prefix).
    #[instrument(skip(self), target = TRACING_TARGET_EVICTION)]
    pub async fn remove_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .run_cancellable(async {
                self.evict(bucket, "", None).await?;
                self.client.store().remove_bucket(bucket).await?;
                info!(target: TRACING_TARGET_EVICTION, bucket = %bucket, "Bucket removed");
                Ok(())
            })
            .await
    }

    /// Runs the bulk pass and, if it fails, the per-object pass.
    ///
    /// Objects keyed `marker` are left alone; the versions listed by the
    /// successful pass are returned.
    async fn evict(
        &self,
        bucket: &str,
        scope: &str,
        marker: Option<&str>,
    ) -> Result<Vec<DeletionUnit>> {
        let start = std::time::Instant::now();

        let primary = match self.bulk_delete(bucket, scope, marker).await {
            BulkOutcome::Completed { deleted, held } => {
                info!(
                    target: TRACING_TARGET_EVICTION,
                    bucket = %bucket,
                    scope = %scope,
                    deleted = deleted,
                    elapsed = ?start.elapsed(),
                    "Evicted with bulk delete"
                );
                return Ok(held);
            }
            BulkOutcome::ListingFailed(e) | BulkOutcome::RequestFailed(e) => e,
            BulkOutcome::ObjectsFailed { failed } => Error::BulkDelete {
                bucket: bucket.to_string(),
                scope: scope.to_string(),
                failed,
            },
        };

        warn!(
            target: TRACING_TARGET_EVICTION,
            bucket = %bucket,
            scope = %scope,
            error = %primary,
            "Bulk delete failed, deleting objects one by one"
        );

        let fallback = match self.parallel_delete(bucket, scope, marker).await {
            Ok((report, held)) if report.is_complete() => {
                info!(
                    target: TRACING_TARGET_EVICTION,
                    bucket = %bucket,
                    scope = %scope,
                    deleted = report.deleted(),
                    elapsed = ?start.elapsed(),
                    "Evicted one by one"
                );
                return Ok(held);
            }
            Ok((report, _)) => Error::PartialEviction {
                bucket: bucket.to_string(),
                scope: scope.to_string(),
                failed: report.failed,
                total: report.attempted,
            },
            Err(e) => e,
        };

        error!(
            target: TRACING_TARGET_EVICTION,
            bucket = %bucket,
            scope = %scope,
            error = %primary,
            fallback_error = %fallback,
            elapsed = ?start.elapsed(),
            "Eviction failed"
        );

        Err(Error::Eviction {
            primary: Box::new(primary),
            fallback: Box::new(fallback),
        })
    }

    /// Streams a listing of `scope` into one multi-object delete.
    async fn bulk_delete(
        &self,
        bucket: &str,
        scope: &str,
        marker: Option<&str>,
    ) -> BulkOutcome {
        let store = self.client.store();

        let (unit_tx, mut unit_rx) = mpsc::unbounded_channel::<Result<DeletionUnit>>();
        let mut listing = store.list_objects(bucket, scope);
        let marker = marker.map(str::to_string);
        let producer = AbortOnDropHandle::new(tokio::spawn(async move {
            let mut held = Vec::new();
            while let Some(item) = listing.next().await {
                match item {
                    Ok(unit) if marker.as_deref() == Some(unit.key.as_str()) => held.push(unit),
                    item => {
                        let stop = item.is_err();
                        if unit_tx.send(item).is_err() || stop {
                            break;
                        }
                    }
                }
            }
            held
        }));

        let (listing_error_tx, mut listing_error_rx) = oneshot::channel::<Error>();
        let listed = Arc::new(AtomicUsize::new(0));
        let units: UnitStream = {
            let listed = listed.clone();
            let mut listing_error_tx = Some(listing_error_tx);
            Box::pin(async_stream::stream! {
                while let Some(item) = unit_rx.recv().await {
                    match item {
                        Ok(unit) => {
                            listed.fetch_add(1, Ordering::Relaxed);
                            yield unit;
                        }
                        Err(e) => {
                            if let Some(tx) = listing_error_tx.take() {
                                let _ = tx.send(e);
                            }
                            break;
                        }
                    }
                }
            })
        };

        let mut failures = store.remove_objects(bucket, units, true);
        let mut failed = 0;
        let mut request_error = None;
        while let Some(failure) = failures.next().await {
            match failure {
                DeleteFailure::Object { unit, message } => {
                    failed += 1;
                    warn!(
                        target: TRACING_TARGET_EVICTION,
                        bucket = %bucket,
                        object = %unit,
                        error = %message,
                        "Failed to remove object"
                    );
                }
                DeleteFailure::Request(e) => {
                    warn!(
                        target: TRACING_TARGET_EVICTION,
                        bucket = %bucket,
                        error = %e,
                        "Bulk delete request failed"
                    );
                    request_error.get_or_insert(e);
                }
            }
        }
        drop(failures);

        if let Ok(e) = listing_error_rx.try_recv() {
            return BulkOutcome::ListingFailed(e);
        }
        if let Some(e) = request_error {
            return BulkOutcome::RequestFailed(e);
        }
        if failed > 0 {
            return BulkOutcome::ObjectsFailed { failed };
        }

        match producer.await {
            Ok(held) => BulkOutcome::Completed {
                deleted: listed.load(Ordering::Relaxed),
                held,
            },
            Err(e) => {
                BulkOutcome::ListingFailed(Error::backend(format!("listing task failed: {e}")))
            }
        }
    }

    /// Lists `scope` afresh and deletes each object on its own, keeping at
    /// most `delete_parallelism` deletes in flight.
    ///
    /// Every dispatched delete is awaited before this returns, including
    /// when the listing fails. Units keyed `marker` are returned instead of
    /// deleted.
    async fn parallel_delete(
        &self,
        bucket: &str,
        scope: &str,
        marker: Option<&str>,
    ) -> Result<(EvictionReport, Vec<DeletionUnit>)> {
        let store = self.client.store();
        let parallelism = self.client.config().delete_parallelism;
        let semaphore = Arc::new(Semaphore::new(parallelism));
        let attempted = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let mut workers = JoinSet::new();

        debug!(
            target: TRACING_TARGET_EVICTION,
            bucket = %bucket,
            scope = %scope,
            parallelism = parallelism,
            "Starting per-object eviction"
        );

        let mut listing = store.list_objects(bucket, scope);
        let mut listing_error = None;
        let mut held = Vec::new();
        while let Some(item) = listing.next().await {
            let unit = match item {
                Ok(unit) if marker == Some(unit.key.as_str()) => {
                    held.push(unit);
                    continue;
                }
                Ok(unit) => unit,
                Err(e) => {
                    listing_error = Some(e);
                    break;
                }
            };

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            attempted.fetch_add(1, Ordering::Relaxed);

            let store = store.clone();
            let bucket = bucket.to_string();
            let worker_failed = failed.clone();
            workers.spawn(async move {
                let _permit = permit;
                if let Err(e) = store.remove_object(&bucket, &unit).await {
                    worker_failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        target: TRACING_TARGET_EVICTION,
                        bucket = %bucket,
                        object = %unit,
                        error = %e,
                        "Failed to remove object"
                    );
                }
            });

            while let Some(joined) = workers.try_join_next() {
                if let Err(e) = joined {
                    failed.fetch_add(1, Ordering::Relaxed);
                    error!(target: TRACING_TARGET_EVICTION, error = %e, "Delete worker died");
                }
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                failed.fetch_add(1, Ordering::Relaxed);
                error!(target: TRACING_TARGET_EVICTION, error = %e, "Delete worker died");
            }
        }

        if let Some(e) = listing_error {
            error!(
                target: TRACING_TARGET_EVICTION,
                bucket = %bucket,
                scope = %scope,
                error = %e,
                "Error listing objects"
            );
            return Err(e);
        }

        let report = EvictionReport {
            attempted: attempted.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
        };
        Ok((report, held))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::{BulkBehavior, MemoryStore};
    use crate::{ObjectStore, S3Config, S3Credentials};

    fn client(store: &MemoryStore) -> S3Client {
        client_with_parallelism(store, crate::client::DEFAULT_DELETE_PARALLELISM)
    }

    fn client_with_parallelism(store: &MemoryStore, parallelism: usize) -> S3Client {
        let config = S3Config::new(S3Credentials::new("a", "s"), "", "http://minio:9000")
            .with_delete_parallelism(parallelism);
        S3Client::with_store(config, Arc::new(store.clone())).unwrap()
    }

    fn volume(prefix: &str, count: usize) -> Vec<String> {
        std::iter::once(format!("{prefix}/"))
            .chain((0..count).map(|i| format!("{prefix}/data/{i:05}")))
            .collect()
    }

    #[tokio::test]
    async fn test_empty_scope_succeeds_without_fallback() {
        let store = MemoryStore::new().with_objects("b", Vec::<String>::new());
        client(&store).remove_prefix("b", "vol").await.unwrap();

        let counters = store.counters();
        assert_eq!(counters.list_calls, 1);
        assert_eq!(counters.remove_object_calls, 0);
        assert!(store.has_bucket("b"));
    }

    #[tokio::test]
    async fn test_bulk_success_removes_marker_once() {
        let store = MemoryStore::new().with_objects("b", volume("vol", 250));
        client(&store).remove_prefix("b", "vol").await.unwrap();

        let counters = store.counters();
        assert_eq!(counters.list_calls, 1);
        assert!(counters.bulk_requests >= 1);
        assert_eq!(counters.remove_object_calls, 1);
        assert!(store.keys("b").is_empty());
    }

    #[tokio::test]
    async fn test_trailing_slash_prefix() {
        let store = MemoryStore::new().with_objects("b", ["vol/", "vol/f1", "vol/f2", "volume"]);
        client(&store).remove_prefix("b", "vol/").await.unwrap();

        assert_eq!(store.keys("b"), vec!["volume".to_string()]);
        assert_eq!(store.counters().list_calls, 1);
        assert_eq!(store.counters().remove_object_calls, 1);
    }

    #[tokio::test]
    async fn test_versioned_prefix_eviction_leaves_no_delete_marker() {
        let store = MemoryStore::new().with_versioned_bucket("b");
        let client = client(&store);
        client.create_prefix("b", "vol").await.unwrap();
        for _ in 0..2 {
            store
                .put_object("b", "vol/file", bytes::Bytes::from_static(b"x"))
                .await
                .unwrap();
        }
        assert_eq!(store.version_count("b"), 3);

        client.remove_prefix("b", "vol").await.unwrap();

        assert_eq!(store.version_count("b"), 0);
        assert_eq!(store.delete_marker_count("b"), 0);
        client.remove_bucket("b").await.unwrap();
        assert!(!store.has_bucket("b"));
    }

    #[tokio::test]
    async fn test_bucket_removed_after_bulk_success() {
        let store = MemoryStore::new().with_objects("b", ["x", "y/z"]);
        client(&store).remove_bucket("b").await.unwrap();

        assert!(!store.has_bucket("b"));
        assert_eq!(store.counters().remove_bucket_calls, 1);
        assert_eq!(store.counters().remove_object_calls, 0);
    }

    #[tokio::test]
    async fn test_fallback_on_unsupported_bulk_delete() {
        let store = MemoryStore::new()
            .with_objects("b", volume("vol", 40))
            .with_bulk_behavior(BulkBehavior::Unsupported);
        client(&store).remove_prefix("b", "vol").await.unwrap();

        let counters = store.counters();
        assert_eq!(counters.list_calls, 2);
        // 40 objects, then the marker.
        assert_eq!(counters.remove_object_calls, 41);
        assert!(store.keys("b").is_empty());
    }

    #[tokio::test]
    async fn test_fallback_on_rejected_objects() {
        let store = MemoryStore::new()
            .with_objects("b", ["a", "b", "c"])
            .with_bulk_behavior(BulkBehavior::RejectAll);
        client(&store).remove_bucket("b").await.unwrap();

        assert_eq!(store.counters().remove_object_calls, 3);
        assert!(!store.has_bucket("b"));
    }

    #[tokio::test]
    async fn test_fallback_on_listing_failure() {
        let store = MemoryStore::new()
            .with_objects("b", volume("vol", 20))
            .with_failing_listings(1, 5);
        client(&store).remove_prefix("b", "vol").await.unwrap();

        let counters = store.counters();
        assert_eq!(counters.list_calls, 2);
        assert!(store.keys("b").is_empty());
    }

    #[tokio::test]
    async fn test_one_failure_reports_exact_counts() {
        let store = MemoryStore::new()
            .with_objects("b", volume("vol", 9))
            .with_bulk_behavior(BulkBehavior::Unsupported)
            .with_failing_key("vol/data/00004");
        let result = client(&store).remove_prefix("b", "vol").await;

        let error = result.unwrap_err();
        assert!(matches!(
            error,
            Error::Eviction { ref primary, .. } if matches!(**primary, Error::Backend(_))
        ));
        match error.fallback() {
            Some(Error::PartialEviction {
                failed,
                total,
                scope,
                ..
            }) => {
                assert_eq!(*failed, 1);
                assert_eq!(*total, 9);
                assert_eq!(scope, "vol/");
            }
            other => panic!("unexpected fallback error: {other:?}"),
        }

        // The marker stays with the survivor.
        assert_eq!(
            store.keys("b"),
            vec!["vol/".to_string(), "vol/data/00004".to_string()]
        );
        assert_eq!(store.counters().remove_object_calls, 9);
    }

    #[tokio::test]
    async fn test_bulk_object_failure_is_retried_one_by_one() {
        let store = MemoryStore::new()
            .with_objects("b", volume("vol", 9))
            .with_failing_key("vol/data/00004");
        let error = client(&store).remove_prefix("b", "vol").await.unwrap_err();

        assert!(matches!(
            error,
            Error::Eviction { ref primary, .. }
                if matches!(**primary, Error::BulkDelete { failed: 1, .. })
        ));
        // Only the survivor of the bulk pass is retried.
        assert!(matches!(
            error.fallback(),
            Some(Error::PartialEviction { failed: 1, total: 1, .. })
        ));
        assert_eq!(store.counters().list_calls, 2);
    }

    #[tokio::test]
    async fn test_bucket_kept_when_objects_remain() {
        let store = MemoryStore::new()
            .with_objects("b", ["keep", "other"])
            .with_failing_key("keep");
        let result = client(&store).remove_bucket("b").await;

        assert!(result.is_err());
        assert!(store.has_bucket("b"));
        assert_eq!(store.counters().remove_bucket_calls, 0);
    }

    #[tokio::test]
    async fn test_sibling_prefix_is_untouched() {
        let mut keys = volume("vol-a", 3);
        keys.extend(volume("vol-ab", 2));
        keys.push("vol-a.txt".to_string());
        let store = MemoryStore::new().with_objects("b", keys);

        let client = client(&store);
        client.remove_prefix("b", "vol-a").await.unwrap();

        assert!(client.bucket_exists("b").await.unwrap());
        assert_eq!(
            store.keys("b"),
            vec![
                "vol-a.txt".to_string(),
                "vol-ab/".to_string(),
                "vol-ab/data/00000".to_string(),
                "vol-ab/data/00001".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_versioned_bucket_deletes_every_version() {
        let store = MemoryStore::new().with_versioned_bucket("b");
        let client = client(&store);
        for _ in 0..3 {
            store
                .put_object("b", "vol/file", bytes::Bytes::from_static(b"x"))
                .await
                .unwrap();
        }
        assert_eq!(store.version_count("b"), 3);

        client.remove_prefix("b", "vol").await.unwrap();
        assert_eq!(store.version_count("b"), 0);
    }

    #[tokio::test]
    async fn test_versioned_fallback_deletes_exact_versions() {
        let store = MemoryStore::new()
            .with_versioned_bucket("b")
            .with_bulk_behavior(BulkBehavior::Unsupported);
        for _ in 0..4 {
            store
                .put_object("b", "k", bytes::Bytes::new())
                .await
                .unwrap();
        }

        client(&store).remove_bucket("b").await.unwrap();
        assert!(!store.has_bucket("b"));
        assert_eq!(store.counters().remove_object_calls, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallelism_ceiling() {
        let store = MemoryStore::new()
            .with_objects("b", volume("vol", 120))
            .with_bulk_behavior(BulkBehavior::Unsupported)
            .with_failing_key("vol/data/00007")
            .with_failing_key("vol/data/00077")
            .with_remove_delay(Duration::from_millis(2));

        let result = client_with_parallelism(&store, 8)
            .remove_prefix("b", "vol")
            .await;

        match result.as_ref().map_err(Error::fallback) {
            Err(Some(Error::PartialEviction { failed, total, .. })) => {
                assert_eq!(*failed, 2);
                assert_eq!(*total, 120);
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let counters = store.counters();
        assert!(counters.max_in_flight <= 8);
        assert!(counters.max_in_flight > 1);
        assert_eq!(counters.remove_object_calls, 120);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_ten_thousand_objects_fallback() {
        let keys: Vec<String> = (0..10_000).map(|i| format!("obj-{i:05}")).collect();
        let store = MemoryStore::new()
            .with_objects("b", keys)
            .with_bulk_behavior(BulkBehavior::Unsupported);

        client(&store).remove_bucket("b").await.unwrap();

        let counters = store.counters();
        assert_eq!(counters.remove_object_calls, 10_000);
        assert!(counters.max_in_flight <= crate::client::DEFAULT_DELETE_PARALLELISM);
        assert_eq!(counters.remove_bucket_calls, 1);
        assert!(!store.has_bucket("b"));
    }

    #[tokio::test]
    async fn test_bulk_batches_large_scopes() {
        let keys: Vec<String> = (0..2_500).map(|i| format!("obj-{i:05}")).collect();
        let store = MemoryStore::new().with_objects("b", keys);

        client(&store).remove_bucket("b").await.unwrap();

        let counters = store.counters();
        assert!(counters.bulk_requests >= 3);
        assert_eq!(counters.remove_object_calls, 0);
        assert!(!store.has_bucket("b"));
    }

    #[tokio::test]
    async fn test_cancellation_stops_eviction() {
        let store = MemoryStore::new()
            .with_objects("b", volume("vol", 200))
            .with_bulk_behavior(BulkBehavior::Unsupported)
            .with_remove_delay(Duration::from_millis(50));
        let client = client_with_parallelism(&store, 2);

        let token = client.cancellation_token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let result = client.remove_prefix("b", "vol").await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(store.has_bucket("b"));
        assert!(!store.keys("b").is_empty());
    }
}
