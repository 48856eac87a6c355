// SQLite RecordSink Implementation

use crate::job_store::map_sqlx_error;
use async_trait::async_trait;
use cdrflow_core::domain::CallRecord;
use cdrflow_core::error::Result;
use cdrflow_core::port::RecordSink;
use sqlx::SqlitePool;

pub struct SqliteRecordSink {
    pool: SqlitePool,
}

impl SqliteRecordSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordSink for SqliteRecordSink {
    async fn add_batch(&self, records: &[CallRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        // One transaction per batch. ON CONFLICT DO NOTHING makes replays
        // after a crash (same chunk reprocessed) insert-idempotent on the
        // reference key.
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO cdr_records (
                    reference, caller_id, recipient, call_date, end_time,
                    duration_secs, cost, currency
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(reference) DO NOTHING
                "#,
            )
            .bind(&record.reference)
            .bind(&record.caller_id)
            .bind(&record.recipient)
            .bind(record.call_date)
            .bind(record.end_time)
            .bind(record.duration_secs)
            .bind(record.cost)
            .bind(&record.currency)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }
}
