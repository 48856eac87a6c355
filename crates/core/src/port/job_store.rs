// Job Status Store Port (Interface)
//
// The single source of truth for job lifecycle state and counters. All
// writes are atomic single-row operations; callers never read-modify-write
// counters through this interface.

use crate::domain::{JobId, JobState, JobStatus};
use crate::error::Result;
use async_trait::async_trait;

/// Master counters as observed immediately after one atomic chunk
/// completion was applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterProgress {
    pub parent_id: JobId,
    pub total_chunks: i64,
    pub processed_chunks: i64,
    pub successful_chunks: i64,
    pub failed_chunks: i64,
    pub processed_records: i64,
    pub failed_records: i64,
}

impl MasterProgress {
    /// All chunks have reported in; the master may finalize
    pub fn is_complete(&self) -> bool {
        self.processed_chunks == self.total_chunks
    }
}

/// Durable record of every job and its current lifecycle state
#[async_trait]
pub trait JobStatusStore: Send + Sync {
    /// Insert a new job. Fails with Conflict if the id already exists.
    async fn create(&self, job: &JobStatus) -> Result<()>;

    /// Fetch a job. Fails with NotFound if the id is unknown.
    async fn get(&self, id: &JobId) -> Result<JobStatus>;

    /// Advance a job's state with an optional message.
    ///
    /// A single conditional update: applies only when the new state's
    /// rank is strictly greater than the stored one (no terminal
    /// regression, no out-of-order transitions). Fails with NotFound for
    /// an unknown id and InvalidState when the guard rejects it.
    async fn update_state(&self, id: &JobId, state: JobState, message: Option<&str>)
        -> Result<()>;

    /// Commit the chunk plan on a master: sets TotalChunks, zeroes the
    /// other counters and moves the state to ChunksQueued. A no-op if the
    /// plan was already committed (resume).
    async fn set_chunk_plan(&self, id: &JobId, total_chunks: i64) -> Result<()>;

    /// Relabel a below-threshold master as SingleFile and queue it for
    /// direct processing. A no-op if already relabeled (resume).
    async fn decide_single_file(&self, id: &JobId) -> Result<()>;

    /// All chunks of a master, in creation order
    async fn list_chunks(&self, parent_id: &JobId) -> Result<Vec<JobStatus>>;

    /// Jobs currently in any of the given states (recovery scans)
    async fn find_by_states(&self, states: &[JobState]) -> Result<Vec<JobStatus>>;

    /// Atomically claim the next orchestratable master or single-file
    /// job whose lease is absent or expired. The claim itself is an
    /// UPDATE..RETURNING pop, so two workers can never take the same job.
    async fn claim_next_pending(&self, lease_ms: i64) -> Result<Option<JobStatus>>;

    /// Record one chunk's terminal outcome and advance the master's
    /// counters in a single atomic storage operation.
    ///
    /// The chunk's own terminal transition is the exactly-once gate:
    /// when the chunk is already terminal this returns Ok(None) and the
    /// master is untouched (replay-safe). Otherwise the master's
    /// ProcessedChunks / success buckets / record sums are incremented
    /// in the same transaction and the updated counters are returned.
    async fn complete_chunk(
        &self,
        chunk_id: &JobId,
        terminal: JobState,
        succeeded: bool,
        processed_records: i64,
        failed_records: i64,
        message: Option<&str>,
    ) -> Result<Option<MasterProgress>>;

    /// Record a single-file job's terminal outcome. Returns false when
    /// the job was already terminal (replay).
    async fn complete_single(
        &self,
        id: &JobId,
        terminal: JobState,
        processed_records: i64,
        failed_records: i64,
        message: Option<&str>,
    ) -> Result<bool>;

    /// Commit a master's terminal state. Conditional single-row update;
    /// returns false when the master was already terminal, which makes
    /// finalization idempotent under retried delivery.
    async fn finalize_master(
        &self,
        id: &JobId,
        terminal: JobState,
        message: Option<&str>,
    ) -> Result<bool>;
}
