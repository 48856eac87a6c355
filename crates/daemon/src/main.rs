//! CDRFlow - Main Entry Point
//! Bulk CDR ingestion daemon: orchestration workers + maintenance loop

mod notifier;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Import workspace crates
use cdrflow_core::application::maintenance::MaintenanceScheduler;
use cdrflow_core::application::recovery::RecoveryService;
use cdrflow_core::application::shutdown::shutdown_channel;
use cdrflow_core::application::worker::IngestWorker;
use cdrflow_core::application::{
    AggregationEngine, ChunkProcessor, ChunkSplitter, OrchestrationCoordinator, OrchestratorConfig,
};
use cdrflow_core::port::id_provider::UuidProvider;
use cdrflow_core::port::time_provider::SystemTimeProvider;
use cdrflow_core::port::MaintenanceConfig;
use cdrflow_infra_fs::FsBlobStore;
use cdrflow_infra_sqlite::{
    create_pool, run_migrations, SqliteJobStatusStore, SqliteMaintenance, SqliteRecordSink,
    SqliteStepJournal,
};
use notifier::LoggingNotifier;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_DB_PATH: &str = "~/.cdrflow/status.db";
const DEFAULT_DATA_DIR: &str = "~/.cdrflow/data";
const DEFAULT_WORKERS: usize = 2;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    let log_format = std::env::var("CDRFLOW_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("cdrflow=info"))
        .expect("Failed to create env filter");

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("CDRFlow v{} starting...", VERSION);

    // 2. Load configuration
    let db_path = std::env::var("CDRFLOW_DB_PATH")
        .unwrap_or_else(|_| shellexpand::tilde(DEFAULT_DB_PATH).into_owned());
    let data_dir = std::env::var("CDRFLOW_DATA_DIR")
        .unwrap_or_else(|_| shellexpand::tilde(DEFAULT_DATA_DIR).into_owned());

    let mut orchestrator_config = OrchestratorConfig::default();
    if let Some(threshold) = env_parse::<u64>("CDRFLOW_CHUNK_THRESHOLD_BYTES") {
        orchestrator_config.chunk_threshold_bytes = threshold;
    }
    if let Some(target) = env_parse::<u64>("CDRFLOW_CHUNK_TARGET_BYTES") {
        orchestrator_config.chunk_target_bytes = target;
    }
    let workers: usize = env_parse("CDRFLOW_WORKERS").unwrap_or(DEFAULT_WORKERS);

    info!(db_path = %db_path, data_dir = %data_dir, workers = workers, "Initializing database...");

    // 3. Initialize database
    let pool = create_pool(&db_path)
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 4. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(UuidProvider);
    let store = Arc::new(SqliteJobStatusStore::new(
        pool.clone(),
        time_provider.clone(),
    ));
    let blobs = Arc::new(FsBlobStore::new(&data_dir));
    let sink = Arc::new(SqliteRecordSink::new(pool.clone()));
    let journal = Arc::new(SqliteStepJournal::new(pool.clone(), time_provider.clone()));
    let status_notifier = Arc::new(LoggingNotifier);

    let aggregation = Arc::new(AggregationEngine::new(store.clone(), status_notifier));
    let splitter = ChunkSplitter::new(blobs.clone(), id_provider.clone());
    let processor = Arc::new(ChunkProcessor::new(blobs.clone(), sink));
    let coordinator = Arc::new(OrchestrationCoordinator::new(
        store.clone(),
        blobs,
        journal,
        splitter,
        processor,
        aggregation.clone(),
        time_provider.clone(),
        orchestrator_config,
    ));

    // 5. Run crash recovery
    info!("Running crash recovery...");
    let recovery_service = RecoveryService::new(
        store.clone(),
        aggregation,
        time_provider.clone(),
        None, // Use default recovery window
    );

    match recovery_service.recover_orphaned_jobs().await {
        Ok(count) => info!(recovered_jobs = count, "Crash recovery completed"),
        Err(e) => tracing::error!(error = ?e, "Crash recovery failed"),
    }

    // 6. Start ingest workers
    info!("Starting ingest workers...");
    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    let mut worker_handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let worker = IngestWorker::new(store.clone(), coordinator.clone());
        let shutdown = shutdown_rx.clone();
        worker_handles.push(tokio::spawn(async move {
            if let Err(e) = worker.run(shutdown).await {
                tracing::error!(error = ?e, "Ingest worker failed");
            }
        }));
    }

    // 7. Start maintenance scheduler
    info!("Starting maintenance scheduler...");
    let maintenance = Arc::new(SqliteMaintenance::new(pool.clone(), time_provider));
    let maintenance_scheduler = MaintenanceScheduler::new(
        maintenance,
        MaintenanceConfig::default(), // 7 days retention
        24,                           // Run every 24 hours
    );

    tokio::spawn(async move {
        maintenance_scheduler.run().await;
    });

    info!("System ready. Waiting for ingestion jobs...");
    info!("Press Ctrl+C to shutdown");

    // 8. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 9. Graceful shutdown
    shutdown_tx.shutdown();
    for handle in worker_handles {
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await;
    }

    info!("Shutdown complete.");

    Ok(())
}
