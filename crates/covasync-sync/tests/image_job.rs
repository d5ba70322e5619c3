//! Resumable image batches over the in-memory store.

mod common;

use covasync_core::SyncCheckpoint;
use covasync_sync::{BatchImageJob, IMAGES_JOB};
use serde_json::json;

use common::{product, MemoryStore, RecordingSink};

fn seeded_store(count: usize) -> MemoryStore {
    let store = MemoryStore::default();
    for i in 0..count {
        let id = format!("p-{i:02}");
        let mut p = product(&id, Some("SKU01"));
        p.raw = json!({
            "ProductId": id,
            "HeroShotUri": format!("https://images.example.test/{id}.jpg"),
        });
        store.insert_product(p);
    }
    store
}

#[tokio::test]
async fn job_resumes_from_saved_offset_and_completes() {
    let store = seeded_store(25);
    store.set_checkpoint(
        IMAGES_JOB,
        SyncCheckpoint {
            last_sync_at: None,
            batch_offset: 10,
        },
    );
    let sink = RecordingSink::default();
    let job = BatchImageJob::new(&store, &sink, 5);

    let first = job.run_batch().await.expect("batch 1");
    assert_eq!(first.offset, 15);
    assert_eq!(first.progress, 60);
    assert!(!first.complete);

    let second = job.run_batch().await.expect("batch 2");
    assert_eq!(second.offset, 20);
    assert_eq!(second.progress, 80);

    let third = job.run_batch().await.expect("batch 3");
    assert!(third.complete);
    assert_eq!(third.progress, 100);
    assert_eq!(third.offset, 0);

    let submitted = sink.submitted();
    assert_eq!(submitted.len(), 15);
    assert_eq!(submitted[0].product_id, "p-10");

    let checkpoint = store.checkpoint(IMAGES_JOB);
    assert_eq!(checkpoint.batch_offset, 0);
    assert!(checkpoint.last_sync_at.is_some());
    assert_eq!(store.processed(IMAGES_JOB).len(), 15);
}

#[tokio::test]
async fn processed_urls_are_not_submitted_twice() {
    let store = seeded_store(3);
    let sink = RecordingSink::default();
    let job = BatchImageJob::new(&store, &sink, 10);

    let first = job.run_batch().await.expect("first pass");
    assert_eq!(first.submitted, 3);
    assert!(first.complete);

    let second = job.run_batch().await.expect("second pass");
    assert_eq!(second.submitted, 0);
    assert_eq!(second.skipped, 3);
    assert_eq!(sink.submitted().len(), 3);
}

#[tokio::test]
async fn reset_clears_offset_and_processed_urls() {
    let store = seeded_store(6);
    let sink = RecordingSink::default();
    let job = BatchImageJob::new(&store, &sink, 4);

    job.run_batch().await.expect("batch");
    assert_eq!(store.checkpoint(IMAGES_JOB).batch_offset, 4);
    assert_eq!(store.processed(IMAGES_JOB).len(), 4);

    job.reset().await.expect("reset");
    assert_eq!(store.checkpoint(IMAGES_JOB), SyncCheckpoint::default());
    assert!(store.processed(IMAGES_JOB).is_empty());

    let again = job.run_batch().await.expect("batch after reset");
    assert_eq!(again.submitted, 4);
}

#[tokio::test]
async fn collaborator_failures_are_counted_and_retried_later() {
    let store = seeded_store(2);
    let mut sink = RecordingSink::default();
    sink.reject.insert("p-01".to_string());
    let job = BatchImageJob::new(&store, &sink, 5);

    let progress = job.run_batch().await.expect("batch");
    assert_eq!(progress.failed, 1);
    assert_eq!(progress.submitted, 1);
    assert!(!store
        .processed(IMAGES_JOB)
        .contains("https://images.example.test/p-01.jpg"));
}

#[tokio::test]
async fn archived_products_are_skipped() {
    let store = seeded_store(2);
    let mut archived = store.product("p-00").expect("seeded");
    archived.is_archived = true;
    store.insert_product(archived);

    let sink = RecordingSink::default();
    BatchImageJob::new(&store, &sink, 5)
        .run_batch()
        .await
        .expect("batch");
    let ids: Vec<String> = sink.submitted().into_iter().map(|s| s.product_id).collect();
    assert_eq!(ids, vec!["p-01".to_string()]);
}
