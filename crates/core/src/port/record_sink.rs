// Record Persistence Port (relational store boundary)
//
// The chunk processor depends only on this batch-insert contract.

use crate::domain::CallRecord;
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Persist a batch of records.
    ///
    /// Implementations are idempotent on `reference`: replaying a batch
    /// after a crash must not duplicate rows. A record either persists
    /// whole or the batch fails.
    async fn add_batch(&self, records: &[CallRecord]) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory sink keyed by reference (idempotent like the real one)
    #[derive(Default)]
    pub struct MemoryRecordSink {
        records: Mutex<HashMap<String, CallRecord>>,
        batch_calls: Mutex<usize>,
    }

    impl MemoryRecordSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn record_count(&self) -> usize {
            self.records.lock().unwrap().len()
        }

        pub fn batch_calls(&self) -> usize {
            *self.batch_calls.lock().unwrap()
        }

        pub fn contains(&self, reference: &str) -> bool {
            self.records.lock().unwrap().contains_key(reference)
        }
    }

    #[async_trait]
    impl RecordSink for MemoryRecordSink {
        async fn add_batch(&self, records: &[CallRecord]) -> Result<()> {
            *self.batch_calls.lock().unwrap() += 1;
            let mut map = self.records.lock().unwrap();
            for record in records {
                map.entry(record.reference.clone())
                    .or_insert_with(|| record.clone());
            }
            Ok(())
        }
    }

    /// Sink that rejects every batch (persistence outage scenarios)
    #[derive(Default)]
    pub struct FailingRecordSink;

    #[async_trait]
    impl RecordSink for FailingRecordSink {
        async fn add_batch(&self, _records: &[CallRecord]) -> Result<()> {
            Err(AppError::Database("record store unavailable".to_string()))
        }
    }
}
