//! End-to-end shipping scenarios through the public `Processor` API
//!
//! Every test runs the upload consumer in a background task, drives entries
//! through `queue_entry`, then closes the processor and inspects what the
//! mock storage received.

use bytes::Bytes;
use logship::observability::Metrics;
use logship::storage::{MockStorage, ObjectStoreStorage};
use logship::uploader::Uploader;
use logship::{Key, Processor, ProcessorOptions, ShipError, Storage, UploadingOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

fn options(entry_limit: usize, shipment_limit: usize, interval: Duration) -> ProcessorOptions {
    ProcessorOptions {
        entry_limit,
        shipment_limit,
        shipment_interval: interval,
        global_limit: None,
        uploading: UploadingOptions {
            queue_limit: 100,
            retry_limit: 3,
            shutdown_timeout: Duration::from_secs(5),
            upload_timeout: Duration::from_secs(5),
        },
    }
}

fn start(processor: &Arc<Processor>) -> JoinHandle<logship::Result<()>> {
    let processor = Arc::clone(processor);
    tokio::spawn(async move { processor.run().await })
}

async fn shutdown(processor: &Arc<Processor>, consumer: JoinHandle<logship::Result<()>>) {
    processor.close().await.unwrap();
    consumer.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_entry_over_limit_is_too_large() {
    let processor = Processor::new(options(2 * 1024, 63 * 1024 * 1024, Duration::ZERO));
    let storage = Arc::new(MockStorage::new());
    let consumer = start(&processor);
    let key = Key::new("proj", "logs", "access/");

    let entry = "x".repeat(3 * 1024);
    let err = processor
        .queue_entry(storage.clone(), &key, entry.as_str())
        .await
        .unwrap_err();
    assert!(err.is_too_large());
    assert_eq!(processor.buffered_bytes(), 0);

    shutdown(&processor, consumer).await;
    // Only the empty terminal flush of the parcel reached storage.
    assert!(storage.shipped_bytes().await.is_empty());
}

#[tokio::test]
async fn test_entries_within_limit_are_accepted() {
    let processor = Processor::new(options(64, 1024, Duration::ZERO));
    let storage = Arc::new(MockStorage::new());
    let consumer = start(&processor);
    let key = Key::new("proj", "logs", "");

    // 63 bytes plus the separator sits exactly on the limit.
    for len in [1, 10, 32, 63] {
        let entry = "y".repeat(len);
        processor
            .queue_entry(storage.clone(), &key, entry.as_str())
            .await
            .unwrap();
    }

    shutdown(&processor, consumer).await;
    assert_eq!(processor.metrics().snapshot().entries_accepted, 4);
}

#[tokio::test]
async fn test_third_small_entry_ships_first_two() {
    let processor = Processor::new(options(64, 10, Duration::ZERO));
    let storage = Arc::new(MockStorage::new());
    let consumer = start(&processor);
    let key = Key::new("proj", "logs", "web/");

    // Each entry is 4 bytes once the separator is counted.
    for line in ["aaa", "bbb"] {
        processor.queue_entry(storage.clone(), &key, line).await.unwrap();
    }
    assert_eq!(processor.queue_depth(), 0);
    assert_eq!(processor.buffered_bytes(), 8);

    processor.queue_entry(storage.clone(), &key, "ccc").await.unwrap();
    assert_eq!(processor.buffered_bytes(), 4);

    shutdown(&processor, consumer).await;
    let puts = storage.puts().await;
    assert_eq!(puts.len(), 2);
    assert_eq!(&puts[0].body[..], b"aaa\nbbb\n");
    assert_eq!(&puts[1].body[..], b"ccc\n");
    assert!(puts.iter().all(|p| p.bucket == "logs" && p.key.starts_with("web/")));
}

#[tokio::test]
async fn test_bounded_queue_refuses_third_upload() {
    let uploader = Uploader::new(
        UploadingOptions {
            queue_limit: 2,
            retry_limit: 1,
            shutdown_timeout: Duration::from_secs(1),
            upload_timeout: Duration::from_secs(1),
        },
        1024,
        Arc::new(Metrics::new()),
    );
    let storage: Arc<dyn Storage> = Arc::new(MockStorage::new());

    for key in ["a", "b"] {
        uploader
            .queue_upload(storage.clone(), "bucket", key.into(), Bytes::from_static(b"x"))
            .await
            .unwrap();
    }

    let err = uploader
        .queue_upload(storage, "bucket", "c".into(), Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(err, ShipError::QueueLimit { limit: 2 }));
}

#[tokio::test]
async fn test_failing_backend_attempts_twice_then_drops() {
    let mut opts = options(64, 10, Duration::ZERO);
    opts.uploading.retry_limit = 1;
    let processor = Processor::new(opts);
    let storage = Arc::new(MockStorage::failing());
    let consumer = start(&processor);
    let key = Key::new("proj", "logs", "");

    for line in ["aaa", "bbb", "ccc"] {
        processor.queue_entry(storage.clone(), &key, line).await.unwrap();
    }

    tokio::time::timeout(Duration::from_secs(5), async {
        while processor.queue_depth() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(storage.attempts(), 2);
    assert_eq!(processor.metrics().snapshot().uploads_dropped, 1);

    // The terminal flush also fails twice; storage errors never reach close().
    shutdown(&processor, consumer).await;
    assert_eq!(storage.attempts(), 4);
    assert_eq!(processor.queue_depth(), 0);
    assert!(storage.puts().await.is_empty());
}

#[tokio::test]
async fn test_timed_flush_ships_once_before_close() {
    let processor = Processor::new(options(64, 1024, Duration::from_millis(50)));
    let storage = Arc::new(MockStorage::new());
    let consumer = start(&processor);
    let key = Key::new("proj", "logs", "timed/");

    processor.queue_entry(storage.clone(), &key, "hello").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!processor.contains_key(&key));
    assert_eq!(processor.parcel_count(), 0);

    shutdown(&processor, consumer).await;
    let puts = storage.puts().await;
    assert_eq!(puts.len(), 1);
    assert_eq!(&puts[0].body[..], b"hello\n");
}

#[tokio::test]
async fn test_close_twice_uploads_nothing_more() {
    let processor = Processor::new(options(64, 1024, Duration::ZERO));
    let storage = Arc::new(MockStorage::new());
    let consumer = start(&processor);
    let key = Key::new("proj", "logs", "");

    processor.queue_entry(storage.clone(), &key, "only").await.unwrap();
    shutdown(&processor, consumer).await;
    assert_eq!(storage.attempts(), 1);

    processor.close().await.unwrap();
    assert_eq!(storage.attempts(), 1);
}

#[tokio::test]
async fn test_shipped_plus_buffered_equals_accepted() {
    let processor = Processor::new(options(64, 100, Duration::ZERO));
    let storage = Arc::new(MockStorage::new());
    let consumer = start(&processor);
    let keys = [Key::new("a", "logs", "one/"), Key::new("b", "logs", "two/")];

    let mut expected = [Vec::new(), Vec::new()];
    for i in 0..200 {
        let which = i % 2;
        let line = format!("{} GET /item/{} 200", keys[which].project_id, i);
        processor
            .queue_entry(storage.clone(), &keys[which], line.as_str())
            .await
            .unwrap();
        expected[which].extend_from_slice(line.as_bytes());
        expected[which].push(b'\n');
    }

    shutdown(&processor, consumer).await;

    let puts = storage.puts().await;
    for (key, expected) in keys.iter().zip(expected.iter()) {
        let shipped: Vec<u8> = puts
            .iter()
            .filter(|p| p.key.starts_with(&key.prefix))
            .flat_map(|p| p.body.iter().copied())
            .collect();
        assert_eq!(&shipped, expected);
    }
    assert!(puts.iter().all(|p| p.body.len() < 100));
}

#[tokio::test]
async fn test_concurrent_producers_lose_nothing() {
    let processor = Processor::new(options(64, 256, Duration::from_millis(5)));
    let storage = Arc::new(MockStorage::new());
    let consumer = start(&processor);

    let mut producers = Vec::new();
    for worker in 0..8 {
        let processor = Arc::clone(&processor);
        let storage = Arc::clone(&storage);
        producers.push(tokio::spawn(async move {
            let key = Key::new("proj", "logs", format!("w{}/", worker % 2));
            for i in 0..100 {
                let line = format!("w{} entry {:03}", worker, i);
                processor
                    .queue_entry(storage.clone(), &key, line.as_str())
                    .await
                    .unwrap();
                if i % 10 == 0 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }

    shutdown(&processor, consumer).await;

    let shipped = storage.shipped_bytes().await;
    let lines = shipped.split(|b| *b == b'\n').filter(|l| !l.is_empty()).count();
    assert_eq!(lines, 800);
    assert_eq!(processor.buffered_bytes(), 0);
}

#[tokio::test]
async fn test_object_store_backend_receives_shipments() {
    let processor = Processor::new(options(64, 1024, Duration::ZERO));
    let store = Arc::new(ObjectStoreStorage::in_memory());
    let consumer = start(&processor);
    let key = Key::new("proj", "logs", "s3/");

    processor.queue_entry(store.clone(), &key, "first").await.unwrap();
    processor.queue_entry(store.clone(), &key, "second").await.unwrap();
    shutdown(&processor, consumer).await;

    assert_eq!(processor.metrics().snapshot().uploads_succeeded, 1);
    assert_eq!(processor.parcel_count(), 0);
}
