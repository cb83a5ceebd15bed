//! Cache coordination under concurrent and cancelled reads

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use bytes::Bytes;
use s3layer::cache::{CacheConfig, CacheKey, EntryState, ObjectCache};
use s3layer::storage::MemoryBackend;
use s3layer::{Error, ObjectLayer, ObjectStore};
use tokio::sync::Barrier;

use common::{payload, StallingWriter, MIB};

async fn cached_memory_store(len: usize) -> (Arc<ObjectStore>, Arc<MemoryBackend>, Vec<u8>) {
    let backend = Arc::new(MemoryBackend::with_chunk_size(16 * 1024));
    let cache = ObjectCache::new(CacheConfig::with_capacity(64 * MIB as u64)).unwrap();
    let store = Arc::new(ObjectStore::with_cache(backend.clone(), Arc::new(cache)));

    let data = payload(len);
    store.make_bucket("bucket").await.unwrap();
    store
        .put_object("bucket", "object", Bytes::from(data.clone()))
        .await
        .unwrap();
    (store, backend, data)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cold_reads_open_backend_once() {
    const READERS: usize = 16;
    let (store, backend, data) = cached_memory_store(4 * MIB).await;
    let data = Arc::new(data);
    let barrier = Arc::new(Barrier::new(READERS));

    let tasks: Vec<_> = (0..READERS)
        .map(|_| {
            let store = store.clone();
            let barrier = barrier.clone();
            let size = data.len() as i64;
            tokio::spawn(async move {
                barrier.wait().await;
                let mut sink = Vec::new();
                store
                    .get_object("bucket", "object", 0, size, Some(&mut sink))
                    .await
                    .map(|_| sink)
            })
        })
        .collect();

    for task in tasks {
        let out = task.await.unwrap().unwrap();
        assert!(out == *data);
    }

    assert_eq!(backend.open_count(), 1);
    let stats = store.cache_stats().unwrap();
    assert_eq!(stats.fills_started, 1);
    assert_eq!(stats.fills_completed, 1);
    assert_eq!(stats.hits + stats.fills_started, READERS as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mixed_reads_are_exact() {
    let (store, _backend, data) = cached_memory_store(2 * MIB).await;
    let data = Arc::new(data);
    let size = data.len() as i64;

    let windows: Vec<(i64, i64)> = vec![
        (0, size),
        (10, 1000),
        (0, size),
        (MIB as i64, MIB as i64),
        (size - 1, 1),
        (0, size),
        (12_345, 54_321),
    ];

    let tasks: Vec<_> = windows
        .into_iter()
        .map(|(offset, length)| {
            let store = store.clone();
            let data = data.clone();
            tokio::spawn(async move {
                let mut sink = Vec::new();
                store
                    .get_object("bucket", "object", offset, length, Some(&mut sink))
                    .await
                    .unwrap();
                let (start, end) = (offset as usize, (offset + length) as usize);
                assert!(sink == data[start..end], "window {}+{}", offset, length);
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn test_cancelled_read_purges_fill() {
    let (store, backend, data) = cached_memory_store(MIB).await;
    let size = data.len() as i64;
    let key = CacheKey::new("bucket", "object");

    let mut sink = StallingWriter::new(64 * 1024);
    let read = store.get_object("bucket", "object", 0, size, Some(&mut sink));
    assert!(tokio::time::timeout(Duration::from_millis(50), read)
        .await
        .is_err());
    assert_eq!(sink.written, 64 * 1024);

    let cache = store.cache().unwrap();
    assert_eq!(cache.state(&key), None);
    assert_eq!(cache.stats().fills_purged, 1);

    let mut sink = Vec::new();
    store
        .get_object("bucket", "object", 0, size, Some(&mut sink))
        .await
        .unwrap();
    assert!(sink == data);
    assert_eq!(cache.state(&key), Some(EntryState::Ready));
    assert_eq!(backend.open_count(), 2);
}

#[tokio::test]
async fn test_reader_waits_for_stalled_fill_then_takes_over() {
    let (store, backend, data) = cached_memory_store(MIB).await;
    let size = data.len() as i64;

    let stalled = {
        let store = store.clone();
        tokio::spawn(async move {
            let mut sink = StallingWriter::new(1024);
            let _ = store
                .get_object("bucket", "object", 0, size, Some(&mut sink))
                .await;
        })
    };

    let cache = store.cache().unwrap().clone();
    let key = CacheKey::new("bucket", "object");
    while cache.state(&key) != Some(EntryState::Filling) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let waiter = {
        let store = store.clone();
        tokio::spawn(async move {
            let mut sink = Vec::new();
            store
                .get_object("bucket", "object", 0, size, Some(&mut sink))
                .await
                .map(|_| sink)
        })
    };

    while cache.stats().waits == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(backend.open_count(), 1);

    // Abandoning the stalled reader releases the slot to the waiter
    stalled.abort();
    let out = waiter.await.unwrap().unwrap();
    assert!(out == data);
    assert_eq!(backend.open_count(), 2);
    assert_eq!(cache.stats().fills_purged, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stalled_client_does_not_block_other_readers() {
    let backend = Arc::new(MemoryBackend::with_chunk_size(16 * 1024));
    let config = CacheConfig::with_capacity(64 * MIB as u64)
        .with_fill_write_timeout(Duration::from_millis(200));
    let cache = Arc::new(ObjectCache::new(config).unwrap());
    let store = Arc::new(ObjectStore::with_cache(backend.clone(), cache.clone()));

    let data = payload(MIB);
    let size = data.len() as i64;
    store.make_bucket("bucket").await.unwrap();
    store
        .put_object("bucket", "object", Bytes::from(data.clone()))
        .await
        .unwrap();

    let stalled = {
        let store = store.clone();
        tokio::spawn(async move {
            let mut sink = StallingWriter::new(1024);
            store
                .get_object("bucket", "object", 0, size, Some(&mut sink))
                .await
        })
    };

    let key = CacheKey::new("bucket", "object");
    while cache.state(&key) != Some(EntryState::Filling) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let mut sink = Vec::new();
    let read = store.get_object("bucket", "object", 0, size, Some(&mut sink));
    tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .expect("second reader stayed blocked behind the stalled one")
        .unwrap();
    assert!(sink == data);

    let err = stalled.await.unwrap().unwrap_err();
    assert_matches!(err, Error::Io(ref e) if e.kind() == std::io::ErrorKind::TimedOut);
    assert_eq!(cache.stats().fills_purged, 1);
    assert_eq!(cache.state(&key), Some(EntryState::Ready));
    assert_eq!(backend.open_count(), 2);
}
