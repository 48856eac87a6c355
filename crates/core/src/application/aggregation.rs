// Aggregation Engine - atomic fan-in of chunk outcomes

use crate::domain::{terminal_status, FileProcessingResult, JobId, JobKind, JobStatus};
use crate::error::Result;
use crate::port::{JobStatusStore, MasterProgress, StatusChanged, StatusNotifier};
use std::sync::Arc;
use tracing::{debug, info};

/// Applies each chunk's completion atomically to its master's counters
/// and derives the master's terminal status once all chunks report in.
///
/// Safe under arbitrary concurrent calls for the same master: the
/// increment happens inside the store's single atomic operation, never
/// as a read-current-then-write-back in this layer.
pub struct AggregationEngine {
    store: Arc<dyn JobStatusStore>,
    notifier: Arc<dyn StatusNotifier>,
}

impl AggregationEngine {
    pub fn new(store: Arc<dyn JobStatusStore>, notifier: Arc<dyn StatusNotifier>) -> Self {
        Self { store, notifier }
    }

    /// Record one chunk's terminal outcome, exactly once.
    ///
    /// Replayed delivery is absorbed: if the chunk is already terminal
    /// the master is untouched. When the applied completion is the last
    /// one, the master's terminal status is committed (idempotently) and
    /// a notification published.
    pub async fn record_chunk_completion(
        &self,
        chunk_id: &JobId,
        result: &FileProcessingResult,
    ) -> Result<()> {
        let terminal = result.derive_state();
        let succeeded = result.succeeded();
        let message = result.summary_message();

        let progress = match self
            .store
            .complete_chunk(
                chunk_id,
                terminal,
                succeeded,
                result.processed_records,
                result.failed_records,
                message.as_deref(),
            )
            .await?
        {
            Some(progress) => progress,
            None => {
                debug!(chunk_id = %chunk_id, "Chunk completion replayed, ignoring");
                return Ok(());
            }
        };

        info!(
            chunk_id = %chunk_id,
            parent_id = %progress.parent_id,
            state = %terminal,
            processed_chunks = progress.processed_chunks,
            total_chunks = progress.total_chunks,
            "Chunk completion recorded"
        );

        self.notifier
            .publish(&StatusChanged {
                correlation_id: chunk_id.clone(),
                parent_correlation_id: Some(progress.parent_id.clone()),
                kind: JobKind::Chunk,
                final_state: terminal,
                processed_records: result.processed_records,
                failed_records: result.failed_records,
            })
            .await?;

        if progress.is_complete() {
            self.finalize(&progress).await?;
        }

        Ok(())
    }

    /// Record the outcome of a single-file job processed without
    /// chunking. Idempotent like chunk completion.
    pub async fn record_single_completion(
        &self,
        id: &JobId,
        result: &FileProcessingResult,
    ) -> Result<()> {
        let terminal = result.derive_state();
        let applied = self
            .store
            .complete_single(
                id,
                terminal,
                result.processed_records,
                result.failed_records,
                result.summary_message().as_deref(),
            )
            .await?;

        if !applied {
            debug!(id = %id, "Single-file completion replayed, ignoring");
            return Ok(());
        }

        info!(id = %id, state = %terminal, "Single-file job completed");

        self.notifier
            .publish(&StatusChanged {
                correlation_id: id.clone(),
                parent_correlation_id: None,
                kind: JobKind::SingleFile,
                final_state: terminal,
                processed_records: result.processed_records,
                failed_records: result.failed_records,
            })
            .await?;

        Ok(())
    }

    /// Finalize a master whose counters already show completion. Used by
    /// the coordinator after fan-in to close the gap where a crash landed
    /// between the last chunk completion and the terminal commit.
    pub async fn finalize_if_complete(&self, master: &JobStatus) -> Result<bool> {
        if master.state.is_terminal() {
            return Ok(false);
        }
        let (Some(total), Some(processed)) = (master.total_chunks, master.processed_chunks) else {
            return Ok(false);
        };
        if processed != total {
            return Ok(false);
        }

        let progress = MasterProgress {
            parent_id: master.id.clone(),
            total_chunks: total,
            processed_chunks: processed,
            successful_chunks: master.successful_chunks.unwrap_or(0),
            failed_chunks: master.failed_chunks.unwrap_or(0),
            processed_records: master.processed_records.unwrap_or(0),
            failed_records: master.failed_records.unwrap_or(0),
        };
        self.finalize(&progress).await
    }

    /// Commit the master's terminal status, a pure function of the chunk
    /// counters. The conditional store update makes a second invocation
    /// a no-op, and the notification is only published when the commit
    /// actually applied.
    async fn finalize(&self, progress: &MasterProgress) -> Result<bool> {
        let terminal = terminal_status(
            progress.successful_chunks,
            progress.failed_chunks,
            progress.total_chunks,
        );
        let message = format!(
            "{} of {} chunks succeeded, {} failed",
            progress.successful_chunks, progress.total_chunks, progress.failed_chunks
        );

        let applied = self
            .store
            .finalize_master(&progress.parent_id, terminal, Some(&message))
            .await?;

        if !applied {
            debug!(master_id = %progress.parent_id, "Master already finalized");
            return Ok(false);
        }

        info!(
            master_id = %progress.parent_id,
            state = %terminal,
            successful_chunks = progress.successful_chunks,
            failed_chunks = progress.failed_chunks,
            "Master finalized"
        );

        self.notifier
            .publish(&StatusChanged {
                correlation_id: progress.parent_id.clone(),
                parent_correlation_id: None,
                kind: JobKind::Master,
                final_state: terminal,
                processed_records: progress.processed_records,
                failed_records: progress.failed_records,
            })
            .await?;

        Ok(true)
    }
}
