//! Crash-resume and recovery scenarios.
//!
//! Orchestration must be safe to re-run after an interruption: journaled
//! steps replay, chunk identities are stable once planned, completed work
//! is never redone, and orphaned chunks are resolved on startup.

use std::sync::Arc;
use std::time::Duration;

use cdrflow_core::application::recovery::RecoveryService;
use cdrflow_core::application::shutdown::shutdown_channel;
use cdrflow_core::application::{
    AggregationEngine, ChunkProcessor, ChunkSplitter, OrchestrationCoordinator, OrchestratorConfig,
    SubmitIngestion, SubmitService,
};
use cdrflow_core::domain::{BlobRef, JobState, JobStatus, CSV_HEADER};
use cdrflow_core::port::blob_store::mocks::MemoryBlobStore;
use cdrflow_core::port::id_provider::UuidProvider;
use cdrflow_core::port::notifier::mocks::MemoryNotifier;
use cdrflow_core::port::time_provider::mocks::FixedTimeProvider;
use cdrflow_core::port::time_provider::{SystemTimeProvider, TimeProvider};
use cdrflow_core::port::JobStatusStore;
use cdrflow_infra_sqlite::{
    create_pool, run_migrations, SqliteJobStatusStore, SqliteRecordSink, SqliteStepJournal,
};
use sqlx::SqlitePool;

fn valid_row(i: usize) -> String {
    format!(
        "441215598801,448000096481,16/08/2016,14:21:33,43,0.044,REFA{:04},GBP",
        i
    )
}

struct Harness {
    pool: SqlitePool,
    store: Arc<SqliteJobStatusStore>,
    blobs: Arc<MemoryBlobStore>,
    notifier: Arc<MemoryNotifier>,
    coordinator: Arc<OrchestrationCoordinator>,
    submit: SubmitService,
}

async fn harness(config: OrchestratorConfig) -> Harness {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();

    let time = Arc::new(SystemTimeProvider);
    let ids = Arc::new(UuidProvider);
    let store = Arc::new(SqliteJobStatusStore::new(pool.clone(), time.clone()));
    let blobs = Arc::new(MemoryBlobStore::new());
    let sink = Arc::new(SqliteRecordSink::new(pool.clone()));
    let journal = Arc::new(SqliteStepJournal::new(pool.clone(), time.clone()));
    let notifier = Arc::new(MemoryNotifier::new());

    let aggregation = Arc::new(AggregationEngine::new(store.clone(), notifier.clone()));
    let splitter = ChunkSplitter::new(blobs.clone(), ids.clone());
    let processor = Arc::new(ChunkProcessor::new(blobs.clone(), sink));
    let coordinator = Arc::new(OrchestrationCoordinator::new(
        store.clone(),
        blobs.clone(),
        journal,
        splitter,
        processor,
        aggregation,
        time.clone(),
        config,
    ));
    let submit = SubmitService::new(store.clone(), ids, time);

    Harness {
        pool,
        store,
        blobs,
        notifier,
        coordinator,
        submit,
    }
}

async fn record_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM cdr_records")
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn submit_csv(h: &Harness, name: &str, rows: usize) -> String {
    let blob = BlobRef::new("uploads", name);
    let mut content = String::from(CSV_HEADER);
    content.push('\n');
    for i in 0..rows {
        content.push_str(&valid_row(i));
        content.push('\n');
    }
    h.blobs.insert(&blob, content.into_bytes());

    h.submit
        .submit(SubmitIngestion {
            container: "uploads".to_string(),
            blob: name.to_string(),
            master_correlation_id: None,
        })
        .await
        .unwrap()
}

fn chunked_config() -> OrchestratorConfig {
    OrchestratorConfig {
        chunk_threshold_bytes: 1_000,
        chunk_target_bytes: 680,
        max_concurrent_chunks: 4,
        chunk_timeout: Duration::from_secs(30),
    }
}

/// An orchestration interrupted after planning resumes with the same
/// chunk identities and completes without duplicating records.
#[tokio::test]
async fn test_interrupted_orchestration_resumes() {
    let h = harness(chunked_config()).await;
    let master_id = submit_csv(&h, "calls.csv", 60).await;

    // First attempt: cancellation arrives before any chunk is dispatched.
    // The plan is journaled and the chunk rows exist, but nothing ran.
    let (tx, shutdown) = shutdown_channel();
    tx.shutdown();
    h.coordinator.run(&master_id, shutdown).await.unwrap();

    let status = h.store.get(&master_id).await.unwrap();
    assert_eq!(status.state, JobState::Processing);
    assert_eq!(status.total_chunks, Some(6));
    assert_eq!(status.processed_chunks, Some(0));
    assert_eq!(record_count(&h.pool).await, 0);

    let planned: Vec<String> = h
        .store
        .list_chunks(&master_id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(planned.len(), 6);

    // Second attempt (restart): same plan, this time to completion
    let (_tx, shutdown) = shutdown_channel();
    h.coordinator.run(&master_id, shutdown).await.unwrap();

    let resumed: Vec<String> = h
        .store
        .list_chunks(&master_id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(resumed, planned, "journal replay keeps chunk identities");

    let status = h.store.get(&master_id).await.unwrap();
    assert_eq!(status.state, JobState::Succeeded);
    assert_eq!(status.processed_chunks, Some(6));
    assert_eq!(status.processed_records, Some(60));
    assert_eq!(record_count(&h.pool).await, 60);
}

/// Re-delivering an orchestration for an already-terminal master is a
/// no-op: no new records, no counter drift, no duplicate notifications.
#[tokio::test]
async fn test_rerun_after_terminal_is_noop() {
    let h = harness(chunked_config()).await;
    let master_id = submit_csv(&h, "calls.csv", 60).await;

    let (_tx, shutdown) = shutdown_channel();
    h.coordinator.run(&master_id, shutdown.clone()).await.unwrap();

    let first = h.store.get(&master_id).await.unwrap();
    assert_eq!(first.state, JobState::Succeeded);
    let records_after_first = record_count(&h.pool).await;
    let notifications_after_first = h.notifier.count();

    h.coordinator.run(&master_id, shutdown).await.unwrap();

    let second = h.store.get(&master_id).await.unwrap();
    assert_eq!(second.state, JobState::Succeeded);
    assert_eq!(second.processed_chunks, first.processed_chunks);
    assert_eq!(second.processed_records, first.processed_records);
    assert_eq!(record_count(&h.pool).await, records_after_first);
    assert_eq!(h.notifier.count(), notifications_after_first);
}

/// Startup recovery: a chunk stuck in Processing past the recovery window
/// is forced to a Failed outcome and its master still finalizes.
#[tokio::test]
async fn test_recovery_resolves_orphaned_chunk() {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();

    let time = Arc::new(FixedTimeProvider::new(1_000));
    let store: Arc<SqliteJobStatusStore> =
        Arc::new(SqliteJobStatusStore::new(pool.clone(), time.clone()));
    let notifier = Arc::new(MemoryNotifier::new());
    let aggregation = Arc::new(AggregationEngine::new(store.clone(), notifier.clone()));

    // A master with a 2-chunk plan; one chunk finished, the other was
    // mid-processing when the previous daemon died
    let source = BlobRef::new("uploads", "calls.csv");
    let master = JobStatus::new_master("m1", time.now_millis(), source.clone());
    store.create(&master).await.unwrap();
    store
        .update_state(&"m1".to_string(), JobState::PendingQueue, None)
        .await
        .unwrap();
    store.set_chunk_plan(&"m1".to_string(), 2).await.unwrap();
    store
        .update_state(&"m1".to_string(), JobState::Processing, None)
        .await
        .unwrap();

    for id in ["c1", "c2"] {
        let chunk = JobStatus::new_chunk(id, "m1", time.now_millis(), source.clone());
        store.create(&chunk).await.unwrap();
    }
    store
        .complete_chunk(&"c1".to_string(), JobState::Succeeded, true, 30, 0, None)
        .await
        .unwrap();
    store
        .update_state(&"c2".to_string(), JobState::Processing, None)
        .await
        .unwrap();

    // Past the recovery window
    time.advance(10 * 60 * 1000);

    let recovery = RecoveryService::new(
        store.clone(),
        aggregation,
        time.clone(),
        Some(5 * 60 * 1000),
    );
    let recovered = recovery.recover_orphaned_jobs().await.unwrap();
    assert!(recovered >= 1);

    let c2 = store.get(&"c2".to_string()).await.unwrap();
    assert_eq!(c2.state, JobState::Failed);

    // The forced failure was the last outstanding chunk, so the master
    // finalized through the normal aggregation path
    let m1 = store.get(&"m1".to_string()).await.unwrap();
    assert_eq!(m1.state, JobState::PartiallySucceeded);
    assert_eq!(m1.processed_chunks, Some(2));
    assert_eq!(m1.successful_chunks, Some(1));
    assert_eq!(m1.failed_chunks, Some(1));
}

/// Startup recovery: a master stranded in Accepted (crash between create
/// and queue) is re-queued and becomes claimable.
#[tokio::test]
async fn test_recovery_requeues_stranded_accepted_master() {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();

    let time = Arc::new(FixedTimeProvider::new(1_000));
    let store: Arc<SqliteJobStatusStore> =
        Arc::new(SqliteJobStatusStore::new(pool.clone(), time.clone()));
    let notifier = Arc::new(MemoryNotifier::new());
    let aggregation = Arc::new(AggregationEngine::new(store.clone(), notifier));

    let master = JobStatus::new_master(
        "stranded",
        time.now_millis(),
        BlobRef::new("uploads", "calls.csv"),
    );
    store.create(&master).await.unwrap();

    // Not claimable while Accepted
    assert!(store.claim_next_pending(60_000).await.unwrap().is_none());

    time.advance(10 * 60 * 1000);

    let recovery = RecoveryService::new(store.clone(), aggregation, time.clone(), Some(5 * 60 * 1000));
    recovery.recover_orphaned_jobs().await.unwrap();

    let status = store.get(&"stranded".to_string()).await.unwrap();
    assert_eq!(status.state, JobState::PendingQueue);

    let claimed = store.claim_next_pending(60_000).await.unwrap();
    assert_eq!(claimed.unwrap().id, "stranded");
}
