// Idempotency Cache Storage Port

use crate::domain::IdempotencyRecord;
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Cached entry for a key; expired entries are not returned
    async fn lookup(&self, key: &str, now_millis: i64) -> Result<Option<IdempotencyRecord>>;

    /// Store the first 2xx response for a key. A concurrent duplicate
    /// store for the same key keeps the first entry.
    async fn store(&self, record: &IdempotencyRecord) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryIdempotencyStore {
        entries: Mutex<HashMap<String, IdempotencyRecord>>,
    }

    impl MemoryIdempotencyStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn entry_count(&self) -> usize {
            self.entries.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl IdempotencyStore for MemoryIdempotencyStore {
        async fn lookup(&self, key: &str, now_millis: i64) -> Result<Option<IdempotencyRecord>> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .get(key)
                .filter(|r| !r.is_expired(now_millis))
                .cloned())
        }

        async fn store(&self, record: &IdempotencyRecord) -> Result<()> {
            let mut entries = self.entries.lock().unwrap();
            match entries.get(&record.key) {
                // First write wins; only an expired entry may be replaced
                Some(existing) if !existing.is_expired(record.created_at) => {}
                _ => {
                    entries.insert(record.key.clone(), record.clone());
                }
            }
            Ok(())
        }
    }
}
