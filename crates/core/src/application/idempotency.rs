// Idempotency Service - duplicate-execution guard for write endpoints

use crate::application::constants::DEFAULT_IDEMPOTENCY_TTL_MS;
use crate::domain::IdempotencyRecord;
use crate::error::{AppError, Result};
use crate::port::{IdempotencyStore, TimeProvider};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

/// Response of the guarded operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResponse {
    pub status_code: u16,
    pub body: String,
    pub content_type: String,
}

impl OperationResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Response returned to the caller, flagged when served from the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status_code: u16,
    pub body: String,
    pub content_type: String,
    pub replayed: bool,
}

/// Hex SHA-256 of a raw request payload
pub fn request_hash(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    format!("{:x}", hasher.finalize())
}

/// Guards non-idempotent write operations against duplicate execution.
///
/// Policy: a missing key is rejected; a cached entry with a matching
/// payload hash is replayed verbatim; the same key with a different
/// payload is a client error (Conflict); only 2xx outcomes are cached.
pub struct IdempotencyService {
    store: Arc<dyn IdempotencyStore>,
    time: Arc<dyn TimeProvider>,
    ttl_ms: i64,
}

impl IdempotencyService {
    pub fn new(store: Arc<dyn IdempotencyStore>, time: Arc<dyn TimeProvider>) -> Self {
        Self::with_ttl(store, time, DEFAULT_IDEMPOTENCY_TTL_MS)
    }

    pub fn with_ttl(
        store: Arc<dyn IdempotencyStore>,
        time: Arc<dyn TimeProvider>,
        ttl_ms: i64,
    ) -> Self {
        Self {
            store,
            time,
            ttl_ms,
        }
    }

    /// Execute `op` at most once per (key, payload).
    pub async fn execute<F, Fut>(
        &self,
        key: Option<&str>,
        payload: &[u8],
        op: F,
    ) -> Result<CachedResponse>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<OperationResponse>>,
    {
        let key = match key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(k) => k,
            None => {
                return Err(AppError::Validation(
                    "Idempotency-Key header is required".to_string(),
                ))
            }
        };

        let hash = request_hash(payload);
        let now = self.time.now_millis();

        if let Some(entry) = self.store.lookup(key, now).await? {
            if entry.request_hash != hash {
                return Err(AppError::Conflict(format!(
                    "idempotency key '{}' was already used with a different payload",
                    key
                )));
            }
            debug!(key = %key, "Replaying cached response");
            return Ok(CachedResponse {
                status_code: entry.status_code,
                body: entry.body,
                content_type: entry.content_type,
                replayed: true,
            });
        }

        let response = op().await?;

        // Non-2xx outcomes are never cached: the client may retry the
        // same key after fixing the cause.
        if response.is_success() {
            self.store
                .store(&IdempotencyRecord {
                    key: key.to_string(),
                    status_code: response.status_code,
                    body: response.body.clone(),
                    content_type: response.content_type.clone(),
                    request_hash: hash,
                    created_at: now,
                    expires_at: now + self.ttl_ms,
                })
                .await?;
            info!(key = %key, status_code = response.status_code, "Response cached");
        }

        Ok(CachedResponse {
            status_code: response.status_code,
            body: response.body,
            content_type: response.content_type,
            replayed: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::idempotency_store::mocks::MemoryIdempotencyStore;
    use crate::port::time_provider::mocks::FixedTimeProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const JSON: &str = "application/json";

    fn service() -> (IdempotencyService, Arc<MemoryIdempotencyStore>, Arc<FixedTimeProvider>) {
        let store = Arc::new(MemoryIdempotencyStore::new());
        let time = Arc::new(FixedTimeProvider::new(1_000));
        let service = IdempotencyService::with_ttl(store.clone(), time.clone(), 10_000);
        (service, store, time)
    }

    fn ok_op(
        calls: Arc<AtomicUsize>,
    ) -> impl FnOnce() -> std::pin::Pin<Box<dyn Future<Output = Result<OperationResponse>> + Send>>
    {
        move || {
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(OperationResponse {
                    status_code: 201,
                    body: r#"{"id":"m1"}"#.to_string(),
                    content_type: JSON.to_string(),
                })
            })
        }
    }

    #[tokio::test]
    async fn test_missing_key_is_rejected() {
        let (service, _, _) = service();
        let calls = Arc::new(AtomicUsize::new(0));
        let err = service.execute(None, b"payload", ok_op(calls.clone())).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0, "operation must not run");
    }

    #[tokio::test]
    async fn test_replay_returns_identical_response_without_reexecution() {
        let (service, _, _) = service();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = service
            .execute(Some("key-1"), b"payload", ok_op(calls.clone()))
            .await
            .unwrap();
        assert!(!first.replayed);

        let second = service
            .execute(Some("key-1"), b"payload", ok_op(calls.clone()))
            .await
            .unwrap();
        assert!(second.replayed);
        assert_eq!(second.status_code, first.status_code);
        assert_eq!(second.body, first.body);
        assert_eq!(second.content_type, first.content_type);
        assert_eq!(calls.load(Ordering::SeqCst), 1, "operation ran exactly once");
    }

    #[tokio::test]
    async fn test_key_reuse_with_different_payload_conflicts() {
        let (service, _, _) = service();
        let calls = Arc::new(AtomicUsize::new(0));

        service
            .execute(Some("key-1"), b"payload-a", ok_op(calls.clone()))
            .await
            .unwrap();

        let err = service
            .execute(Some("key-1"), b"payload-b", ok_op(calls.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_2xx_is_not_cached() {
        let (service, store, _) = service();

        let response = service
            .execute(Some("key-1"), b"payload", || async {
                Ok(OperationResponse {
                    status_code: 422,
                    body: "invalid".to_string(),
                    content_type: JSON.to_string(),
                })
            })
            .await
            .unwrap();
        assert_eq!(response.status_code, 422);
        assert_eq!(store.entry_count(), 0);

        // The same key may then succeed
        let calls = Arc::new(AtomicUsize::new(0));
        let retry = service
            .execute(Some("key-1"), b"payload", ok_op(calls.clone()))
            .await
            .unwrap();
        assert_eq!(retry.status_code, 201);
        assert!(!retry.replayed);
    }

    #[tokio::test]
    async fn test_error_outcome_is_not_cached() {
        let (service, store, _) = service();

        let result = service
            .execute(Some("key-1"), b"payload", || async {
                Err(AppError::Database("down".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(store.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_entry_allows_reexecution() {
        let (service, _, time) = service();
        let calls = Arc::new(AtomicUsize::new(0));

        service
            .execute(Some("key-1"), b"payload", ok_op(calls.clone()))
            .await
            .unwrap();

        time.advance(60_000); // past the 10s TTL

        let second = service
            .execute(Some("key-1"), b"payload", ok_op(calls.clone()))
            .await
            .unwrap();
        assert!(!second.replayed);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_request_hash_is_stable_sha256() {
        assert_eq!(
            request_hash(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_ne!(request_hash(b"a"), request_hash(b"b"));
    }
}
