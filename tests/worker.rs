mod common;

use common::{memory_fs, sequences, TestStore};
use onesec_core::{Error, Recorder, RecorderHandle, WindowSpec, WorkerConfig};
use std::sync::Arc;

const ROOT: &str = "/worker-store";

#[tokio::test]
async fn test_appends_apply_in_submission_order() {
    let (handle, created) =
        RecorderHandle::auto_open_store(memory_fs(), WorkerConfig::default(), ROOT, 10, &WindowSpec::defaults())
            .await
            .unwrap();
    assert!(created);

    let pending: Vec<_> = (0..50).map(|i| handle.append(f64::from(i) * 0.125)).collect();
    let mut assigned = Vec::new();
    for append in pending {
        assigned.push(append.await.unwrap());
    }
    assert_eq!(assigned, (0..50).collect::<Vec<u64>>());

    let samples = handle.samples().await.unwrap();
    assert_eq!(sequences(&samples), (0..50).collect::<Vec<u64>>());
    assert_eq!(samples[7].value(), 0.875);

    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_are_serialized() {
    let fs = memory_fs();
    let handle = RecorderHandle::create_store(fs.clone(), WorkerConfig::default(), ROOT, 8, &WindowSpec::defaults())
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for caller in 0..4 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..25 {
                handle.append(f64::from(caller * 100 + i)).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let samples = handle.samples().await.unwrap();
    assert_eq!(sequences(&samples), (0..100).collect::<Vec<u64>>());

    // each caller's own values arrive in the order it sent them
    for caller in 0..4 {
        let own: Vec<f64> = samples
            .iter()
            .map(|s| s.value())
            .filter(|v| (*v as i64) / 100 == i64::from(caller))
            .collect();
        let expected: Vec<f64> = (0..25).map(|i| (caller * 100 + i) as f64).collect();
        assert_eq!(own, expected);
    }

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_statistics_are_published_after_each_append() {
    let handle = RecorderHandle::create_store(memory_fs(), WorkerConfig::default(), ROOT, 10, &WindowSpec::defaults())
        .await
        .unwrap();
    assert_eq!(handle.statistics().total, 0);

    for value in [1.0, 2.0, 3.0] {
        handle.append(value).await.unwrap();
    }
    let stats = handle.statistics();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.window("mo3").unwrap().current, Some(2.0));

    handle.append_dnf().await.unwrap();
    assert_eq!(handle.statistics().valid, 3);
    // the old snapshot is untouched
    assert_eq!(stats.total, 3);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_reload_through_worker() {
    let store = TestStore::new();
    let fs = store.fs.clone();
    let handle = RecorderHandle::create_store(fs.clone(), WorkerConfig::default(), store.root(), 5, &WindowSpec::defaults())
        .await
        .unwrap();
    for i in 0..12 {
        handle.append(f64::from(i) * 0.25).await.unwrap();
    }
    let before = handle.statistics();
    handle.shutdown().await.unwrap();

    let handle = RecorderHandle::load_store(fs, WorkerConfig::default(), store.root()).await.unwrap();
    assert_eq!(handle.statistics(), before);
    assert_eq!(handle.append(0.5).await.unwrap(), 12);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_create_errors_are_returned() {
    let fs = memory_fs();
    let handle = RecorderHandle::create_store(fs.clone(), WorkerConfig::default(), ROOT, 10, &[])
        .await
        .unwrap();

    let again = handle.create(ROOT, 10, &[]).await;
    assert!(matches!(again, Err(Error::StoreAlreadyExists(_))));

    let missing = handle.load("/nowhere").await;
    assert!(matches!(missing, Err(Error::StoreFormat(_))));

    // the open store survives failed requests
    assert_eq!(handle.append(0.5).await.unwrap(), 0);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_delete_closes_store() {
    let fs = memory_fs();
    let handle = RecorderHandle::create_store(fs.clone(), WorkerConfig::default(), ROOT, 10, &[])
        .await
        .unwrap();
    handle.append(0.5).await.unwrap();

    assert!(handle.delete().await.unwrap());
    assert!(matches!(handle.append(0.5).await, Err(Error::NotOpen)));
    assert_eq!(handle.statistics().total, 0);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_delete_keeps_store_open() {
    let fs = memory_fs();
    let handle = RecorderHandle::create_store(fs.clone(), WorkerConfig::default(), ROOT, 10, &[])
        .await
        .unwrap();
    handle.append(0.5).await.unwrap();

    fs.fail_removes();
    assert!(matches!(handle.delete().await, Err(Error::Io(_))));
    assert_eq!(handle.append(0.25).await.unwrap(), 1);
    assert_eq!(handle.statistics().total, 2);
    assert_eq!(handle.samples().await.unwrap().len(), 2);

    fs.heal();
    assert!(handle.delete().await.unwrap());
    assert!(matches!(handle.samples().await, Err(Error::NotOpen)));
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_opening_another_store_flushes_the_open_one() {
    let fs = memory_fs();
    let handle = RecorderHandle::create_store(fs.clone(), WorkerConfig::default(), ROOT, 10, &[])
        .await
        .unwrap();
    handle.append(0.5).await.unwrap();

    // shard written, manifest not
    fs.fail_writes_to("manifest");
    assert!(handle.append(0.25).await.unwrap_err().is_not_durable());
    fs.heal();

    handle.create("/second-store", 10, &[]).await.unwrap();
    assert_eq!(handle.statistics().total, 0);
    handle.shutdown().await.unwrap();

    let first = Recorder::load(fs, ROOT).unwrap();
    assert_eq!(first.statistics().total, 2);
}

#[tokio::test]
async fn test_not_durable_append_then_sync() {
    let fs = memory_fs();
    let handle = RecorderHandle::create_store(fs.clone(), WorkerConfig::default(), ROOT, 10, &[])
        .await
        .unwrap();

    fs.fail_writes_to("manifest");
    let err = handle.append(0.5).await.unwrap_err();
    assert!(err.is_not_durable());
    assert!(matches!(handle.append(0.25).await, Err(Error::Io(_))));

    fs.heal();
    handle.sync().await.unwrap();
    assert_eq!(handle.append(0.25).await.unwrap(), 1);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_every_clone() {
    let handle = RecorderHandle::create_store(memory_fs(), WorkerConfig::default(), ROOT, 10, &[])
        .await
        .unwrap();
    let other = handle.clone();

    handle.shutdown().await.unwrap();
    assert!(matches!(other.append(0.5).await, Err(Error::WorkerStopped)));
    assert!(matches!(other.shutdown().await, Err(Error::WorkerStopped)));
}

#[tokio::test]
async fn test_requests_before_open_fail() {
    let config = WorkerConfig {
        queue_depth: 4,
        thread_name: "onesec-test".to_string(),
    };
    let handle = RecorderHandle::spawn(Arc::new(onesec_core::MemoryFileSystem::new()), config).unwrap();
    assert!(matches!(handle.samples().await, Err(Error::NotOpen)));
    handle.shutdown().await.unwrap();
}
