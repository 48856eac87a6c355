// Orchestration Coordinator - end-to-end ingestion workflow

use crate::application::aggregation::AggregationEngine;
use crate::application::constants::{
    DEFAULT_CHUNK_TARGET_BYTES, DEFAULT_CHUNK_THRESHOLD_BYTES, DEFAULT_CHUNK_TIMEOUT,
    DEFAULT_MAX_CONCURRENT_CHUNKS,
};
use crate::application::processor::ChunkProcessor;
use crate::application::shutdown::ShutdownToken;
use crate::application::splitter::{ChunkDescriptor, ChunkSplitter};
use crate::domain::{truncate_message, FileProcessingResult, JobId, JobState, JobStatus};
use crate::error::{AppError, Result};
use crate::port::{BlobStore, JobStatusStore, StepJournal, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Journaled step names, keyed per master
const STEP_METADATA: &str = "fetch-metadata";
const STEP_SPLIT: &str = "split";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Inputs larger than this are chunked
    pub chunk_threshold_bytes: u64,
    /// Target size of one chunk
    pub chunk_target_bytes: u64,
    /// Upper bound on concurrently processing chunks per master
    pub max_concurrent_chunks: usize,
    /// A chunk invocation exceeding this resolves to a Failed result
    pub chunk_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            chunk_threshold_bytes: DEFAULT_CHUNK_THRESHOLD_BYTES,
            chunk_target_bytes: DEFAULT_CHUNK_TARGET_BYTES,
            max_concurrent_chunks: DEFAULT_MAX_CONCURRENT_CHUNKS,
            chunk_timeout: DEFAULT_CHUNK_TIMEOUT,
        }
    }
}

/// Drives one master job from accepted input to terminal status: fetch
/// metadata, decide chunk vs. single-file, split, fan out chunk
/// processing, fan in on completion.
///
/// Resumable: step outcomes land in the journal before the next step is
/// attempted, chunk rows exist before dispatch, and terminal chunks are
/// skipped, so a re-run after a crash replays completed work without new
/// side effects.
pub struct OrchestrationCoordinator {
    store: Arc<dyn JobStatusStore>,
    blobs: Arc<dyn BlobStore>,
    journal: Arc<dyn StepJournal>,
    splitter: ChunkSplitter,
    processor: Arc<ChunkProcessor>,
    aggregation: Arc<AggregationEngine>,
    time: Arc<dyn TimeProvider>,
    config: OrchestratorConfig,
}

impl OrchestrationCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn JobStatusStore>,
        blobs: Arc<dyn BlobStore>,
        journal: Arc<dyn StepJournal>,
        splitter: ChunkSplitter,
        processor: Arc<ChunkProcessor>,
        aggregation: Arc<AggregationEngine>,
        time: Arc<dyn TimeProvider>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            blobs,
            journal,
            splitter,
            processor,
            aggregation,
            time,
            config,
        }
    }

    /// Run the orchestration for one master.
    ///
    /// Fail-safe: any unhandled orchestration-level error is caught,
    /// logged, and commits the master to Failed with a truncated message.
    pub async fn run(&self, master_id: &JobId, shutdown: ShutdownToken) -> Result<()> {
        if let Err(e) = self.run_inner(master_id, shutdown).await {
            error!(master_id = %master_id, error = %e, "Orchestration failed");
            let message = truncate_message(&format!("orchestration failed: {}", e));
            match self
                .store
                .update_state(master_id, JobState::Failed, Some(&message))
                .await
            {
                Ok(()) => {}
                // Already terminal: keep the recorded outcome
                Err(AppError::InvalidState(_)) => {}
                Err(store_err) => return Err(store_err),
            }
        }
        Ok(())
    }

    async fn run_inner(&self, master_id: &JobId, shutdown: ShutdownToken) -> Result<()> {
        let master = self.store.get(master_id).await?;
        if master.state.is_terminal() {
            debug!(master_id = %master_id, "Master already terminal, nothing to do");
            return Ok(());
        }

        let size = self.fetch_input_size(&master).await?;
        if size == 0 {
            return Err(AppError::Validation(format!(
                "input {} is empty",
                master.source
            )));
        }

        if size > self.config.chunk_threshold_bytes {
            self.run_chunked(&master, shutdown).await
        } else {
            self.run_single(&master, shutdown).await
        }
    }

    /// Journaled step: input size metadata. Replays the recorded value
    /// on resume instead of hitting storage again.
    async fn fetch_input_size(&self, master: &JobStatus) -> Result<u64> {
        if let Some(outcome) = self.journal.get(&master.id, STEP_METADATA).await? {
            let size = outcome
                .get("size_bytes")
                .and_then(|v| v.as_u64())
                .ok_or_else(|| {
                    AppError::Internal(format!(
                        "corrupt journal outcome for {}/{}",
                        master.id, STEP_METADATA
                    ))
                })?;
            return Ok(size);
        }

        let size = self.blobs.size(&master.source).await?;
        self.journal
            .record(
                &master.id,
                STEP_METADATA,
                &serde_json::json!({ "size_bytes": size }),
            )
            .await?;
        info!(master_id = %master.id, size_bytes = size, "Input metadata fetched");
        Ok(size)
    }

    /// Above-threshold path: split, create chunk statuses, fan out, fan in.
    async fn run_chunked(&self, master: &JobStatus, shutdown: ShutdownToken) -> Result<()> {
        let descriptors = self.plan_chunks(master).await?;
        self.store
            .set_chunk_plan(&master.id, descriptors.len() as i64)
            .await?;

        // Every chunk is observable before any work starts. Replays skip
        // rows that already exist.
        let now = self.time.now_millis();
        for descriptor in &descriptors {
            let chunk = JobStatus::new_chunk(
                descriptor.chunk_id.clone(),
                master.id.clone(),
                now,
                descriptor.blob.clone(),
            );
            match self.store.create(&chunk).await {
                Ok(()) => {}
                Err(AppError::Conflict(_)) => {
                    debug!(chunk_id = %descriptor.chunk_id, "Chunk status already exists, resuming")
                }
                Err(e) => return Err(e),
            }
        }

        self.advance(&master.id, JobState::QueuedForProcessing, None)
            .await?;
        self.advance(&master.id, JobState::Processing, None).await?;

        self.fan_out(&master.id, shutdown.clone()).await?;

        if !shutdown.is_shutdown() {
            // Close the gap where a crash landed between the last chunk
            // completion and the terminal commit.
            let current = self.store.get(&master.id).await?;
            self.aggregation.finalize_if_complete(&current).await?;
        }

        Ok(())
    }

    /// Journaled step: the chunk plan. A crash after the journal write
    /// resumes with the same chunk identities; a crash before it re-splits
    /// with fresh identities and orphans the partial chunks.
    async fn plan_chunks(&self, master: &JobStatus) -> Result<Vec<ChunkDescriptor>> {
        if let Some(outcome) = self.journal.get(&master.id, STEP_SPLIT).await? {
            let descriptors: Vec<ChunkDescriptor> = serde_json::from_value(outcome)?;
            debug!(
                master_id = %master.id,
                chunk_count = descriptors.len(),
                "Chunk plan replayed from journal"
            );
            return Ok(descriptors);
        }

        self.advance(&master.id, JobState::Chunking, None).await?;

        let descriptors = self
            .splitter
            .split(&master.source, self.config.chunk_target_bytes, &master.id)
            .await?;
        if descriptors.is_empty() {
            return Err(AppError::Validation(format!(
                "splitter produced no chunks for non-empty input {}",
                master.source
            )));
        }

        self.journal
            .record(&master.id, STEP_SPLIT, &serde_json::to_value(&descriptors)?)
            .await?;

        Ok(descriptors)
    }

    /// Dispatch one concurrent task per non-terminal chunk and suspend
    /// until every dispatched task reached a terminal outcome.
    ///
    /// Cancellation stops further dispatch but in-flight chunks still
    /// complete or report their own Failed result.
    async fn fan_out(&self, master_id: &JobId, shutdown: ShutdownToken) -> Result<()> {
        let chunks = self.store.list_chunks(master_id).await?;
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_chunks));
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();
        let mut dispatched = 0usize;

        for chunk in chunks.into_iter().filter(|c| !c.state.is_terminal()) {
            if shutdown.is_shutdown() {
                warn!(master_id = %master_id, "Cancellation requested, halting chunk dispatch");
                break;
            }

            let store = Arc::clone(&self.store);
            let processor = Arc::clone(&self.processor);
            let aggregation = Arc::clone(&self.aggregation);
            let semaphore = Arc::clone(&semaphore);
            let chunk_timeout = self.config.chunk_timeout;

            dispatched += 1;
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| AppError::Internal(format!("semaphore closed: {}", e)))?;

                // Only this invocation moves its own chunk forward
                advance_tolerant(store.as_ref(), &chunk.id, JobState::Processing, None).await?;

                let result =
                    match tokio::time::timeout(chunk_timeout, processor.process(&chunk.source))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => {
                            warn!(chunk_id = %chunk.id, "Chunk processing timed out");
                            FileProcessingResult::failed_entirely(format!(
                                "chunk processing exceeded {}s",
                                chunk_timeout.as_secs()
                            ))
                        }
                    };

                aggregation.record_chunk_completion(&chunk.id, &result).await
            });
        }

        info!(master_id = %master_id, dispatched = dispatched, "Chunk fan-out complete, waiting");

        // Fan-in: suspend until every dispatched task resolves
        let mut first_error: Option<AppError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(master_id = %master_id, error = %e, "Chunk task failed");
                    first_error.get_or_insert(e);
                }
                Err(join_err) => {
                    error!(master_id = %master_id, error = %join_err, "Chunk task panicked");
                    first_error
                        .get_or_insert(AppError::Internal(format!("chunk task: {}", join_err)));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Below-threshold path: the whole input is one virtual chunk,
    /// processed directly against the job itself.
    async fn run_single(&self, master: &JobStatus, _shutdown: ShutdownToken) -> Result<()> {
        self.store.decide_single_file(&master.id).await?;
        self.advance(&master.id, JobState::Processing, None).await?;

        info!(master_id = %master.id, "Processing input as a single virtual chunk");

        let result = match tokio::time::timeout(
            self.config.chunk_timeout,
            self.processor.process(&master.source),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(master_id = %master.id, "Single-file processing timed out");
                FileProcessingResult::failed_entirely(format!(
                    "processing exceeded {}s",
                    self.config.chunk_timeout.as_secs()
                ))
            }
        };

        self.aggregation
            .record_single_completion(&master.id, &result)
            .await
    }

    /// Forward state transition that tolerates having already happened
    /// (resume after crash re-walks the same path).
    async fn advance(&self, id: &JobId, state: JobState, message: Option<&str>) -> Result<()> {
        advance_tolerant(self.store.as_ref(), id, state, message).await
    }
}

async fn advance_tolerant(
    store: &dyn JobStatusStore,
    id: &JobId,
    state: JobState,
    message: Option<&str>,
) -> Result<()> {
    match store.update_state(id, state, message).await {
        Ok(()) => Ok(()),
        Err(AppError::InvalidState(_)) => {
            debug!(id = %id, state = %state, "State already advanced");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
