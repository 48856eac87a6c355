// Crash recovery logic

use crate::application::aggregation::AggregationEngine;
use crate::application::constants::DEFAULT_RECOVERY_WINDOW_MS;
use crate::domain::{FileProcessingResult, JobKind, JobState};
use crate::error::Result;
use crate::port::{JobStatusStore, TimeProvider};
use std::sync::Arc;
use tracing::{info, warn};

/// Crash recovery service
///
/// On daemon startup, resolves work that was in flight when the process
/// died: chunks stuck in Processing get a forced Failed terminal result
/// (so their master's aggregation can still complete), masters stuck in
/// Accepted are queued, and interrupted orchestrations become claimable
/// again once their lease expires.
pub struct RecoveryService {
    store: Arc<dyn JobStatusStore>,
    aggregation: Arc<AggregationEngine>,
    time: Arc<dyn TimeProvider>,
    recovery_window_ms: i64,
}

impl RecoveryService {
    pub fn new(
        store: Arc<dyn JobStatusStore>,
        aggregation: Arc<AggregationEngine>,
        time: Arc<dyn TimeProvider>,
        recovery_window_ms: Option<i64>,
    ) -> Self {
        Self {
            store,
            aggregation,
            time,
            recovery_window_ms: recovery_window_ms.unwrap_or(DEFAULT_RECOVERY_WINDOW_MS),
        }
    }

    /// Recover orphaned work on startup.
    ///
    /// A chunk left in Processing past the recovery window would block
    /// its master's fan-in forever; forcing a Failed terminal result
    /// through the aggregation engine keeps the counters consistent and
    /// lets the master finalize. The completion path is the same
    /// exactly-once one the processors use, so racing with a live chunk
    /// is harmless.
    ///
    /// # Returns
    /// Number of jobs recovered
    pub async fn recover_orphaned_jobs(&self) -> Result<usize> {
        let now = self.time.now_millis();
        let cutoff = now - self.recovery_window_ms;

        info!(
            cutoff_time = %cutoff,
            recovery_window_ms = %self.recovery_window_ms,
            "Starting orphaned job recovery"
        );

        let mut recovered = 0usize;

        // Chunks stuck mid-processing
        let processing = self.store.find_by_states(&[JobState::Processing]).await?;
        for job in processing
            .iter()
            .filter(|j| j.kind == JobKind::Chunk && j.last_updated_at < cutoff)
        {
            warn!(
                chunk_id = %job.id,
                last_updated_at = job.last_updated_at,
                "Recovering chunk orphaned in Processing"
            );
            let result =
                FileProcessingResult::failed_entirely("chunk orphaned by process restart");
            self.aggregation
                .record_chunk_completion(&job.id, &result)
                .await?;
            recovered += 1;
        }

        // Masters stranded in Accepted (crash between create and queue)
        let accepted = self.store.find_by_states(&[JobState::Accepted]).await?;
        for job in accepted.iter().filter(|j| j.last_updated_at < cutoff) {
            info!(master_id = %job.id, "Queueing master stranded in Accepted");
            self.store
                .update_state(&job.id, JobState::PendingQueue, None)
                .await?;
            recovered += 1;
        }

        // Masters whose chunks all reported in but whose terminal commit
        // was lost in the crash
        let in_flight = self.store.find_by_states(&[JobState::Processing]).await?;
        for job in in_flight
            .iter()
            .filter(|j| j.kind == JobKind::Master && j.last_updated_at < cutoff)
        {
            if self.aggregation.finalize_if_complete(job).await? {
                info!(master_id = %job.id, "Finalized master left complete by crash");
                recovered += 1;
            }
        }

        info!(recovered_count = %recovered, "Orphaned job recovery complete");
        Ok(recovered)
    }
}
