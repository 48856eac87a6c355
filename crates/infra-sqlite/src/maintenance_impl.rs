// SQLite Maintenance Implementation
use async_trait::async_trait;
use cdrflow_core::domain::JobState;
use cdrflow_core::error::{AppError, Result};
use cdrflow_core::port::{Maintenance, MaintenanceStats, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

/// SQLite maintenance implementation
pub struct SqliteMaintenance {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteMaintenance {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    /// Get DB file size in MB
    async fn get_db_size(&self) -> Result<f64> {
        // Query database page count and page size
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get page count: {}", e)))?;

        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get page size: {}", e)))?;

        let size_bytes = page_count * page_size;
        let size_mb = size_bytes as f64 / (1024.0 * 1024.0);

        Ok(size_mb)
    }
}

#[async_trait]
impl Maintenance for SqliteMaintenance {
    async fn vacuum(&self) -> Result<f64> {
        info!("Running VACUUM to optimize database...");

        // Get size before VACUUM
        let size_before = self.get_db_size().await?;

        // Run VACUUM (reclaims space and defragments)
        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("VACUUM failed: {}", e)))?;

        // Get size after VACUUM
        let size_after = self.get_db_size().await?;
        let reclaimed = (size_before - size_after).max(0.0);

        info!(
            size_before_mb = size_before,
            size_after_mb = size_after,
            reclaimed_mb = reclaimed,
            "VACUUM completed"
        );

        Ok(reclaimed)
    }

    async fn gc_terminal_jobs(&self, retention_days: i64) -> Result<i64> {
        let now = self.time_provider.now_millis();
        let retention_ms = retention_days * 24 * 60 * 60 * 1000;
        let cutoff_time = now - retention_ms;

        info!(
            retention_days = retention_days,
            cutoff_time = cutoff_time,
            "Running terminal job GC"
        );

        // Journal rows of GC'd masters go first so a re-submitted id never
        // replays a stale journal
        sqlx::query(
            r#"
            DELETE FROM orchestration_steps
            WHERE master_id IN (
                SELECT id FROM jobs
                WHERE state IN (?, ?, ?)
                AND last_updated_at < ?
            )
            "#,
        )
        .bind(JobState::Succeeded.to_string())
        .bind(JobState::PartiallySucceeded.to_string())
        .bind(JobState::Failed.to_string())
        .bind(cutoff_time)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Journal GC failed: {}", e)))?;

        // Chunks of a terminal master are terminal themselves, so a single
        // state filter covers both levels
        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE state IN (?, ?, ?)
            AND last_updated_at < ?
            "#,
        )
        .bind(JobState::Succeeded.to_string())
        .bind(JobState::PartiallySucceeded.to_string())
        .bind(JobState::Failed.to_string())
        .bind(cutoff_time)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Job GC failed: {}", e)))?;

        let deleted = result.rows_affected() as i64;

        info!(deleted_jobs = deleted, "Terminal job GC completed");

        Ok(deleted)
    }

    async fn purge_expired_idempotency_entries(&self) -> Result<i64> {
        let now = self.time_provider.now_millis();

        let result = sqlx::query("DELETE FROM idempotency_cache WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Idempotency purge failed: {}", e)))?;

        let purged = result.rows_affected() as i64;

        info!(purged_entries = purged, "Idempotency cache purge completed");

        Ok(purged)
    }

    async fn get_stats(&self) -> Result<MaintenanceStats> {
        let db_size_mb = self.get_db_size().await?;

        let job_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to count jobs: {}", e)))?;

        let terminal_job_count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM jobs
            WHERE state IN (?, ?, ?)
            "#,
        )
        .bind(JobState::Succeeded.to_string())
        .bind(JobState::PartiallySucceeded.to_string())
        .bind(JobState::Failed.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to count terminal jobs: {}", e)))?;

        let record_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cdr_records")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to count records: {}", e)))?;

        let idempotency_entry_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM idempotency_cache")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to count cache entries: {}", e)))?;

        Ok(MaintenanceStats {
            db_size_mb,
            job_count,
            terminal_job_count,
            record_count,
            idempotency_entry_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations, SqliteJobStatusStore};
    use cdrflow_core::domain::{BlobRef, JobStatus};
    use cdrflow_core::port::time_provider::mocks::FixedTimeProvider;
    use cdrflow_core::port::time_provider::SystemTimeProvider;
    use cdrflow_core::port::JobStatusStore;

    #[tokio::test]
    async fn test_maintenance_stats() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        let maintenance = SqliteMaintenance::new(pool, Arc::new(SystemTimeProvider));

        let stats = maintenance.get_stats().await.unwrap();

        assert!(stats.db_size_mb > 0.0);
        assert_eq!(stats.job_count, 0);
        assert_eq!(stats.terminal_job_count, 0);
        assert_eq!(stats.record_count, 0);
    }

    #[tokio::test]
    async fn test_vacuum() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        let maintenance = SqliteMaintenance::new(pool, Arc::new(SystemTimeProvider));

        // VACUUM should not error (even if no space is reclaimed in memory DB)
        let reclaimed = maintenance.vacuum().await.unwrap();
        assert!(reclaimed >= 0.0);
    }

    #[tokio::test]
    async fn test_gc_terminal_jobs() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        let ten_days_ms = 10 * 24 * 60 * 60 * 1000;
        let time = Arc::new(FixedTimeProvider::new(1_000));
        let store = SqliteJobStatusStore::new(pool.clone(), time.clone());
        let maintenance = SqliteMaintenance::new(pool, time.clone());

        // A job that reached Failed 10 days before "now"
        let job = JobStatus::new_master("old", 500, BlobRef::new("uploads", "old.csv"));
        store.create(&job).await.unwrap();
        store
            .update_state(&"old".to_string(), JobState::Failed, None)
            .await
            .unwrap();

        time.advance(ten_days_ms);

        // A fresh live job must survive
        let live = JobStatus::new_master("live", time.now_millis(), BlobRef::new("uploads", "live.csv"));
        store.create(&live).await.unwrap();

        let deleted = maintenance.gc_terminal_jobs(7).await.unwrap();
        assert_eq!(deleted, 1);

        assert!(store.get(&"old".to_string()).await.is_err());
        assert!(store.get(&"live".to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn test_purge_expired_idempotency_entries() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        let time = Arc::new(FixedTimeProvider::new(10_000));
        let maintenance = SqliteMaintenance::new(pool.clone(), time);

        sqlx::query(
            r#"
            INSERT INTO idempotency_cache
              (key, status_code, body, content_type, request_hash, created_at, expires_at)
            VALUES
              ('gone', 202, '{}', 'application/json', 'h1', 1000, 5000),
              ('kept', 202, '{}', 'application/json', 'h2', 1000, 50000)
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let purged = maintenance.purge_expired_idempotency_entries().await.unwrap();
        assert_eq!(purged, 1);

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM idempotency_cache")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 1);
    }
}
