// SQLite JobStatusStore Implementation

use async_trait::async_trait;
use cdrflow_core::domain::{BlobRef, JobId, JobKind, JobState, JobStatus};
use cdrflow_core::error::{AppError, Result};
use cdrflow_core::port::{JobStatusStore, MasterProgress, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;

// Helper to convert sqlx::Error to AppError with structured information
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            // Extract database-specific error code and message
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "2067" | "1555" => {
                        // UNIQUE constraint failed - surfaced as a conflict so
                        // callers can treat duplicate inserts as idempotent
                        AppError::Conflict(format!(
                            "Unique constraint violation: {} ({})",
                            db_err.message(),
                            code_str
                        ))
                    }
                    "787" | "3850" => {
                        // FOREIGN KEY constraint failed
                        AppError::Database(format!(
                            "Foreign key constraint violation: {} ({})",
                            db_err.message(),
                            code_str
                        ))
                    }
                    "5" => {
                        // SQLITE_BUSY - database is locked
                        AppError::Database(format!(
                            "Database locked (SQLITE_BUSY): {}",
                            db_err.message()
                        ))
                    }
                    "13" => {
                        // SQLITE_FULL - database or disk is full
                        AppError::Database(format!("Database full: {}", db_err.message()))
                    }
                    _ => {
                        // Other database errors
                        AppError::Database(format!(
                            "Database error [{}]: {}",
                            code_str,
                            db_err.message()
                        ))
                    }
                }
            } else {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        _ => {
            // Connection, pool, protocol errors
            AppError::Database(err.to_string())
        }
    }
}

pub struct SqliteJobStatusStore {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteJobStatusStore {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }
}

#[async_trait]
impl JobStatusStore for SqliteJobStatusStore {
    async fn create(&self, job: &JobStatus) -> Result<()> {
        job.validate()?;

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, kind, parent_id, state, state_rank,
                total_chunks, processed_chunks, successful_chunks, failed_chunks,
                processed_records, failed_records,
                message, source_container, source_blob,
                claimed_at, created_at, last_updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(job.kind.to_string())
        .bind(&job.parent_id)
        .bind(job.state.to_string())
        .bind(job.state.rank())
        .bind(job.total_chunks)
        .bind(job.processed_chunks)
        .bind(job.successful_chunks)
        .bind(job.failed_chunks)
        .bind(job.processed_records)
        .bind(job.failed_records)
        .bind(&job.message)
        .bind(&job.source.container)
        .bind(&job.source.name)
        .bind(None::<i64>)
        .bind(job.created_at)
        .bind(job.last_updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<JobStatus> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        match row {
            Some(r) => Ok(r.into_status()),
            None => Err(AppError::NotFound(format!("Job {} not found", id))),
        }
    }

    async fn update_state(
        &self,
        id: &JobId,
        state: JobState,
        message: Option<&str>,
    ) -> Result<()> {
        let now = self.time_provider.now_millis();

        // Conditional update: monotonic rank guard makes out-of-order and
        // post-terminal transitions lose without a read-modify-write cycle
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?, state_rank = ?, message = COALESCE(?, message), last_updated_at = ?
            WHERE id = ? AND state_rank < ?
            "#,
        )
        .bind(state.to_string())
        .bind(state.rank())
        .bind(message)
        .bind(now)
        .bind(id)
        .bind(state.rank())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            // Guard rejected the update or the job does not exist
            let exists: Option<String> = sqlx::query_scalar("SELECT state FROM jobs WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            match exists {
                None => Err(AppError::NotFound(format!("Job {} not found", id))),
                Some(current_state) => Err(AppError::InvalidState(format!(
                    "Cannot update job {} from {} to {}",
                    id, current_state, state
                ))),
            }
        } else {
            Ok(())
        }
    }

    async fn set_chunk_plan(&self, id: &JobId, total_chunks: i64) -> Result<()> {
        let now = self.time_provider.now_millis();
        let state = JobState::ChunksQueued;

        // Committed exactly once: a replayed orchestration sees the plan
        // already in place and the guard turns this into a no-op
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET total_chunks = ?,
                processed_chunks = 0, successful_chunks = 0, failed_chunks = 0,
                processed_records = 0, failed_records = 0,
                state = CASE WHEN state_rank < ? THEN ? ELSE state END,
                state_rank = MAX(state_rank, ?),
                last_updated_at = ?
            WHERE id = ? AND total_chunks IS NULL
            "#,
        )
        .bind(total_chunks)
        .bind(state.rank())
        .bind(state.to_string())
        .bind(state.rank())
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM jobs WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
            if exists.is_none() {
                return Err(AppError::NotFound(format!("Job {} not found", id)));
            }
            // Plan already committed (resume)
        }

        Ok(())
    }

    async fn decide_single_file(&self, id: &JobId) -> Result<()> {
        let now = self.time_provider.now_millis();
        let state = JobState::QueuedForProcessing;

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET kind = ?,
                state = ?, state_rank = ?,
                processed_records = COALESCE(processed_records, 0),
                failed_records = COALESCE(failed_records, 0),
                last_updated_at = ?
            WHERE id = ? AND kind = ? AND state_rank < ?
            "#,
        )
        .bind(JobKind::SingleFile.to_string())
        .bind(state.to_string())
        .bind(state.rank())
        .bind(now)
        .bind(id)
        .bind(JobKind::Master.to_string())
        .bind(state.rank())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            let row: Option<(String, String)> =
                sqlx::query_as("SELECT kind, state FROM jobs WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

            match row {
                None => return Err(AppError::NotFound(format!("Job {} not found", id))),
                Some((kind, _)) if kind == JobKind::SingleFile.to_string() => {
                    // Already relabeled (resume)
                }
                Some((kind, state)) => {
                    return Err(AppError::InvalidState(format!(
                        "Cannot relabel job {} ({} in {}) as single-file",
                        id, kind, state
                    )))
                }
            }
        }

        Ok(())
    }

    async fn list_chunks(&self, parent_id: &JobId) -> Result<Vec<JobStatus>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT * FROM jobs
            WHERE parent_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|row| row.into_status()).collect())
    }

    async fn find_by_states(&self, states: &[JobState]) -> Result<Vec<JobStatus>> {
        if states.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; states.len()].join(", ");
        let sql = format!(
            "SELECT * FROM jobs WHERE state IN ({}) ORDER BY created_at ASC",
            placeholders
        );

        let mut query = sqlx::query_as::<_, JobRow>(&sql);
        for state in states {
            query = query.bind(state.to_string());
        }

        let rows = query.fetch_all(&self.pool).await.map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|row| row.into_status()).collect())
    }

    async fn claim_next_pending(&self, lease_ms: i64) -> Result<Option<JobStatus>> {
        let now = self.time_provider.now_millis();
        let lease_cutoff = now - lease_ms;

        // Claim is an atomic UPDATE..RETURNING pop: two workers can never
        // take the same job. A stale claimed_at (crashed worker) makes the
        // job claimable again once the lease expires.
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET claimed_at = ?
            WHERE id = (
                SELECT j.id FROM jobs j
                WHERE j.kind IN (?, ?)
                  AND j.state IN (?, ?, ?, ?, ?)
                  AND (j.claimed_at IS NULL OR j.claimed_at < ?)
                ORDER BY j.created_at ASC, j.id ASC
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(JobKind::Master.to_string())
        .bind(JobKind::SingleFile.to_string())
        .bind(JobState::PendingQueue.to_string())
        .bind(JobState::Chunking.to_string())
        .bind(JobState::ChunksQueued.to_string())
        .bind(JobState::QueuedForProcessing.to_string())
        .bind(JobState::Processing.to_string())
        .bind(lease_cutoff)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|r| r.into_status()))
    }

    async fn complete_chunk(
        &self,
        chunk_id: &JobId,
        terminal: JobState,
        succeeded: bool,
        processed_records: i64,
        failed_records: i64,
        message: Option<&str>,
    ) -> Result<Option<MasterProgress>> {
        let now = self.time_provider.now_millis();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // The chunk's own terminal transition is the exactly-once gate: a
        // replayed completion finds the row already terminal and leaves
        // the master untouched. It is also the FIRST statement of the
        // transaction, so the write lock is taken up front and concurrent
        // completions serialize instead of both opening as readers and
        // deadlocking on the upgrade.
        let parent_id: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE jobs
            SET state = ?, state_rank = ?,
                processed_records = ?, failed_records = ?,
                message = COALESCE(?, message), last_updated_at = ?
            WHERE id = ? AND parent_id IS NOT NULL AND state_rank < ?
            RETURNING parent_id
            "#,
        )
        .bind(terminal.to_string())
        .bind(terminal.rank())
        .bind(processed_records)
        .bind(failed_records)
        .bind(message)
        .bind(now)
        .bind(chunk_id)
        .bind(terminal.rank())
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let Some(parent_id) = parent_id else {
            // Zero rows: not found, not a chunk, or already terminal.
            // Read-only from here on, so no lock upgrade can follow.
            let existing: Option<Option<String>> =
                sqlx::query_scalar("SELECT parent_id FROM jobs WHERE id = ?")
                    .bind(chunk_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(map_sqlx_error)?;

            return match existing {
                None => Err(AppError::NotFound(format!("Chunk {} not found", chunk_id))),
                Some(None) => Err(AppError::InvalidState(format!(
                    "Job {} is not a chunk",
                    chunk_id
                ))),
                // Already terminal (replay); nothing to aggregate
                Some(Some(_)) => Ok(None),
            };
        };

        let success_inc: i64 = if succeeded { 1 } else { 0 };
        let failure_inc: i64 = 1 - success_inc;

        let counters: Option<(i64, i64, i64, i64, i64, i64)> = sqlx::query_as(
            r#"
            UPDATE jobs
            SET processed_chunks = COALESCE(processed_chunks, 0) + 1,
                successful_chunks = COALESCE(successful_chunks, 0) + ?,
                failed_chunks = COALESCE(failed_chunks, 0) + ?,
                processed_records = COALESCE(processed_records, 0) + ?,
                failed_records = COALESCE(failed_records, 0) + ?,
                last_updated_at = ?
            WHERE id = ?
            RETURNING COALESCE(total_chunks, 0), processed_chunks, successful_chunks,
                      failed_chunks, processed_records, failed_records
            "#,
        )
        .bind(success_inc)
        .bind(failure_inc)
        .bind(processed_records)
        .bind(failed_records)
        .bind(now)
        .bind(&parent_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let Some((total, processed, successful, failed, record_sum, failed_sum)) = counters else {
            return Err(AppError::NotFound(format!(
                "Master {} not found for chunk {}",
                parent_id, chunk_id
            )));
        };

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(Some(MasterProgress {
            parent_id,
            total_chunks: total,
            processed_chunks: processed,
            successful_chunks: successful,
            failed_chunks: failed,
            processed_records: record_sum,
            failed_records: failed_sum,
        }))
    }

    async fn complete_single(
        &self,
        id: &JobId,
        terminal: JobState,
        processed_records: i64,
        failed_records: i64,
        message: Option<&str>,
    ) -> Result<bool> {
        let now = self.time_provider.now_millis();

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?, state_rank = ?,
                processed_records = ?, failed_records = ?,
                message = COALESCE(?, message), last_updated_at = ?, claimed_at = NULL
            WHERE id = ? AND state_rank < ?
            "#,
        )
        .bind(terminal.to_string())
        .bind(terminal.rank())
        .bind(processed_records)
        .bind(failed_records)
        .bind(message)
        .bind(now)
        .bind(id)
        .bind(terminal.rank())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM jobs WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
            if exists.is_none() {
                return Err(AppError::NotFound(format!("Job {} not found", id)));
            }
            // Already terminal (replay)
            Ok(false)
        } else {
            Ok(true)
        }
    }

    async fn finalize_master(
        &self,
        id: &JobId,
        terminal: JobState,
        message: Option<&str>,
    ) -> Result<bool> {
        let now = self.time_provider.now_millis();

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?, state_rank = ?,
                message = COALESCE(?, message), last_updated_at = ?, claimed_at = NULL
            WHERE id = ? AND state_rank < ?
            "#,
        )
        .bind(terminal.to_string())
        .bind(terminal.rank())
        .bind(message)
        .bind(now)
        .bind(id)
        .bind(terminal.rank())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM jobs WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
            if exists.is_none() {
                return Err(AppError::NotFound(format!("Job {} not found", id)));
            }
            // A concurrent finalizer already committed the terminal state
            Ok(false)
        } else {
            Ok(true)
        }
    }
}

/// SQLite row representation of a job status entry
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    kind: String,
    parent_id: Option<String>,
    state: String,
    #[allow(dead_code)]
    state_rank: i64,

    total_chunks: Option<i64>,
    processed_chunks: Option<i64>,
    successful_chunks: Option<i64>,
    failed_chunks: Option<i64>,

    processed_records: Option<i64>,
    failed_records: Option<i64>,

    message: Option<String>,

    source_container: String,
    source_blob: String,

    #[allow(dead_code)]
    claimed_at: Option<i64>,
    created_at: i64,
    last_updated_at: i64,
}

impl JobRow {
    fn into_status(self) -> JobStatus {
        // Default fallbacks mirror what an operator would want to see for
        // a corrupted row: a failed, standalone entry
        let kind = JobKind::parse(&self.kind).unwrap_or(JobKind::SingleFile);
        let state = JobState::parse(&self.state).unwrap_or(JobState::Failed);

        JobStatus {
            id: self.id,
            kind,
            parent_id: self.parent_id,
            state,
            total_chunks: self.total_chunks,
            processed_chunks: self.processed_chunks,
            successful_chunks: self.successful_chunks,
            failed_chunks: self.failed_chunks,
            processed_records: self.processed_records,
            failed_records: self.failed_records,
            message: self.message,
            created_at: self.created_at,
            last_updated_at: self.last_updated_at,
            source: BlobRef::new(self.source_container, self.source_blob),
        }
    }
}
