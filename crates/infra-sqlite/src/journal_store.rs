// SQLite StepJournal Implementation

use crate::job_store::map_sqlx_error;
use async_trait::async_trait;
use cdrflow_core::domain::JobId;
use cdrflow_core::error::{AppError, Result};
use cdrflow_core::port::{StepJournal, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;

pub struct SqliteStepJournal {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteStepJournal {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }
}

#[async_trait]
impl StepJournal for SqliteStepJournal {
    async fn get(&self, master_id: &JobId, step: &str) -> Result<Option<serde_json::Value>> {
        let outcome: Option<String> = sqlx::query_scalar(
            "SELECT outcome FROM orchestration_steps WHERE master_id = ? AND step = ?",
        )
        .bind(master_id)
        .bind(step)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match outcome {
            None => Ok(None),
            Some(json) => {
                let value = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!(
                        "Corrupt journal outcome for {}/{}: {}",
                        master_id, step, e
                    ))
                })?;
                Ok(Some(value))
            }
        }
    }

    async fn record(
        &self,
        master_id: &JobId,
        step: &str,
        outcome: &serde_json::Value,
    ) -> Result<()> {
        let now = self.time_provider.now_millis();

        // First outcome wins; replays of the same step are ignored
        sqlx::query(
            r#"
            INSERT INTO orchestration_steps (master_id, step, outcome, recorded_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(master_id, step) DO NOTHING
            "#,
        )
        .bind(master_id)
        .bind(step)
        .bind(outcome.to_string())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use cdrflow_core::port::time_provider::SystemTimeProvider;
    use serde_json::json;

    async fn setup_journal() -> SqliteStepJournal {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteStepJournal::new(pool, Arc::new(SystemTimeProvider))
    }

    #[tokio::test]
    async fn test_record_and_get() {
        let journal = setup_journal().await;
        let id = "m1".to_string();

        assert!(journal.get(&id, "fetch-metadata").await.unwrap().is_none());

        journal
            .record(&id, "fetch-metadata", &json!({"size_bytes": 1024}))
            .await
            .unwrap();

        let outcome = journal.get(&id, "fetch-metadata").await.unwrap().unwrap();
        assert_eq!(outcome["size_bytes"], 1024);
    }

    #[tokio::test]
    async fn test_first_outcome_wins() {
        let journal = setup_journal().await;
        let id = "m1".to_string();

        journal
            .record(&id, "split", &json!({"chunks": 4}))
            .await
            .unwrap();
        journal
            .record(&id, "split", &json!({"chunks": 9}))
            .await
            .unwrap();

        let outcome = journal.get(&id, "split").await.unwrap().unwrap();
        assert_eq!(outcome["chunks"], 4);
    }
}
