// SQLite IdempotencyStore Implementation

use crate::job_store::map_sqlx_error;
use async_trait::async_trait;
use cdrflow_core::domain::IdempotencyRecord;
use cdrflow_core::error::Result;
use cdrflow_core::port::IdempotencyStore;
use sqlx::SqlitePool;

pub struct SqliteIdempotencyStore {
    pool: SqlitePool,
}

impl SqliteIdempotencyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyStore for SqliteIdempotencyStore {
    async fn lookup(&self, key: &str, now_millis: i64) -> Result<Option<IdempotencyRecord>> {
        let row: Option<EntryRow> = sqlx::query_as(
            r#"
            SELECT key, status_code, body, content_type, request_hash, created_at, expires_at
            FROM idempotency_cache
            WHERE key = ? AND expires_at > ?
            "#,
        )
        .bind(key)
        .bind(now_millis)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|r| r.into_record()))
    }

    async fn store(&self, record: &IdempotencyRecord) -> Result<()> {
        // First write wins; only an expired entry may be replaced. The
        // conditional DO UPDATE keeps concurrent duplicate stores from
        // clobbering the first cached response.
        sqlx::query(
            r#"
            INSERT INTO idempotency_cache (
                key, status_code, body, content_type, request_hash, created_at, expires_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                status_code = excluded.status_code,
                body = excluded.body,
                content_type = excluded.content_type,
                request_hash = excluded.request_hash,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
            WHERE idempotency_cache.expires_at <= excluded.created_at
            "#,
        )
        .bind(&record.key)
        .bind(record.status_code as i64)
        .bind(&record.body)
        .bind(&record.content_type)
        .bind(&record.request_hash)
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    key: String,
    status_code: i64,
    body: String,
    content_type: String,
    request_hash: String,
    created_at: i64,
    expires_at: i64,
}

impl EntryRow {
    fn into_record(self) -> IdempotencyRecord {
        IdempotencyRecord {
            key: self.key,
            status_code: self.status_code as u16,
            body: self.body,
            content_type: self.content_type,
            request_hash: self.request_hash,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}
