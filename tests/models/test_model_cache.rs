// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! ModelCache tests: capacity, LRU order, load sharing and failure handling

use async_trait::async_trait;
use futures::future::join_all;
use imbeddings::config::{Device, DeviceConfig};
use imbeddings::models::{
    CacheError, InferenceBundle, ModelCache, ModelId, ModelLoadError, ModelRegistry,
    ModelSource, StubModelSource,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const MODELS: &str = "m1\nm2\nm3\nm4\nm5\nm6\n";

fn setup(capacity: usize, delay: Duration) -> (ModelCache, Arc<StubModelSource>) {
    let registry = Arc::new(ModelRegistry::parse(MODELS).unwrap());
    let source = Arc::new(StubModelSource::new(8, 5).with_load_delay(delay));
    let cache = ModelCache::new(registry, source.clone(), DeviceConfig::cpu(), capacity).unwrap();
    (cache, source)
}

#[tokio::test]
async fn test_capacity_plus_one_evicts_least_recently_used() {
    let (cache, source) = setup(2, Duration::ZERO);
    let m1 = cache.resolve("m1").unwrap();
    let m2 = cache.resolve("m2").unwrap();
    let m3 = cache.resolve("m3").unwrap();

    cache.get_or_load(&m1).await.unwrap();
    cache.get_or_load(&m2).await.unwrap();
    cache.get_or_load(&m3).await.unwrap();

    let stats = cache.stats().await;
    assert_eq!(stats.resident, 2);
    assert_eq!(stats.evictions, 1);
    assert_eq!(source.load_count(), 3);
    assert_eq!(cache.resident_models().await, vec![m3, m2]);
    assert!(!cache.is_resident(&m1).await);
}

#[tokio::test]
async fn test_evicted_model_reloads_on_next_request() {
    let (cache, source) = setup(1, Duration::ZERO);
    let m1 = cache.resolve("m1").unwrap();
    let m2 = cache.resolve("m2").unwrap();

    cache.get_or_load(&m1).await.unwrap();
    cache.get_or_load(&m2).await.unwrap();
    cache.get_or_load(&m1).await.unwrap();

    assert_eq!(source.load_count(), 3);
    assert_eq!(cache.resident_models().await, vec![m1]);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_load() {
    let (cache, source) = setup(1, Duration::from_millis(100));
    let m1 = cache.resolve("m1").unwrap();

    let results = join_all((0..10).map(|_| {
        let cache = cache.clone();
        let id = m1.clone();
        tokio::spawn(async move { cache.get_or_load(&id).await })
    }))
    .await;

    let bundles: Vec<_> = results
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    assert_eq!(source.load_count(), 1);
    assert!(bundles.iter().all(|b| Arc::ptr_eq(b, &bundles[0])));
    assert_eq!(cache.stats().await.loads, 1);
}

#[tokio::test]
async fn test_resident_count_never_exceeds_capacity() {
    let (cache, source) = setup(2, Duration::from_millis(20));
    let ids: Vec<_> = ["m1", "m2", "m3", "m4", "m5", "m6"]
        .iter()
        .map(|name| cache.resolve(name).unwrap())
        .collect();

    let results = join_all(ids.into_iter().map(|id| {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get_or_load(&id).await })
    }))
    .await;
    assert!(results.into_iter().all(|r| r.unwrap().is_ok()));

    let stats = cache.stats().await;
    assert_eq!(source.load_count(), 6);
    assert_eq!(stats.resident, 2);
    assert_eq!(stats.evictions, 4);
    assert_eq!(cache.resident_models().await.len(), 2);
}

#[tokio::test]
async fn test_abandoned_request_does_not_cancel_load() {
    let (cache, source) = setup(1, Duration::from_millis(200));
    let m1 = cache.resolve("m1").unwrap();

    let abandoned = tokio::time::timeout(Duration::from_millis(20), cache.get_or_load(&m1)).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(cache.is_resident(&m1).await);

    cache.get_or_load(&m1).await.unwrap();
    assert_eq!(source.load_count(), 1);
}

#[tokio::test]
async fn test_failed_load_leaves_no_entry() {
    let (cache, source) = setup(1, Duration::ZERO);
    let m1 = cache.resolve("m1").unwrap();

    source.set_failure(Some(ModelLoadError::Unreachable("offline".to_string())));
    let err = cache.get_or_load(&m1).await.unwrap_err();
    assert_eq!(
        err,
        CacheError::Unavailable(ModelLoadError::Unreachable("offline".to_string()))
    );

    let stats = cache.stats().await;
    assert_eq!(stats.resident, 0);
    assert_eq!(stats.failed_loads, 1);
    assert!(cache.resident_models().await.is_empty());

    // The failure is not cached; the next request retries
    source.set_failure(None);
    cache.get_or_load(&m1).await.unwrap();
    assert_eq!(source.load_count(), 2);
    assert!(cache.is_resident(&m1).await);
}

#[tokio::test]
async fn test_waiters_share_the_same_failure() {
    let (cache, source) = setup(1, Duration::from_millis(50));
    source.set_failure(Some(ModelLoadError::MissingCredentials));
    let m1 = cache.resolve("m1").unwrap();

    let results = join_all((0..4).map(|_| cache.get_or_load(&m1))).await;

    assert_eq!(source.load_count(), 1);
    for result in results {
        assert_eq!(
            result.unwrap_err(),
            CacheError::Unavailable(ModelLoadError::MissingCredentials)
        );
    }
}

#[tokio::test]
async fn test_failed_load_keeps_existing_entries() {
    let (cache, source) = setup(1, Duration::ZERO);
    let m1 = cache.resolve("m1").unwrap();
    let m2 = cache.resolve("m2").unwrap();

    cache.get_or_load(&m1).await.unwrap();
    source.set_failure(Some(ModelLoadError::NotFound("m2".to_string())));
    assert!(cache.get_or_load(&m2).await.is_err());

    assert_eq!(cache.resident_models().await, vec![m1]);
    assert_eq!(cache.stats().await.evictions, 0);
}

#[tokio::test]
async fn test_unsupported_identifier_is_rejected_before_loading() {
    let (cache, source) = setup(1, Duration::ZERO);
    assert!(cache.resolve("not-listed").is_err());
    assert!(cache.resolve("m").is_err());
    assert_eq!(source.load_count(), 0);
}

/// Panics on its first load, then delegates to a stub source
struct PanicOnceSource {
    calls: AtomicUsize,
    inner: StubModelSource,
}

#[async_trait]
impl ModelSource for PanicOnceSource {
    async fn load(
        &self,
        model_id: &ModelId,
        device: Device,
    ) -> Result<InferenceBundle, ModelLoadError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("weights corrupted");
        }
        self.inner.load(model_id, device).await
    }
}

#[tokio::test]
async fn test_panicking_load_does_not_block_retry() {
    let registry = Arc::new(ModelRegistry::parse(MODELS).unwrap());
    let source = Arc::new(PanicOnceSource {
        calls: AtomicUsize::new(0),
        inner: StubModelSource::new(8, 5),
    });
    let cache = ModelCache::new(registry, source.clone(), DeviceConfig::cpu(), 1).unwrap();
    let m1 = cache.resolve("m1").unwrap();

    match cache.get_or_load(&m1).await {
        Err(CacheError::Unavailable(ModelLoadError::Other(message))) => {
            assert!(message.contains("weights corrupted"), "{}", message);
        }
        other => panic!("expected load failure, got {:?}", other.map(|_| ())),
    }
    assert_eq!(cache.stats().await.failed_loads, 1);

    cache.get_or_load(&m1).await.unwrap();
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    assert!(cache.is_resident(&m1).await);
}
