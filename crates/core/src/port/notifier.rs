// Status-change Notification Port (message queue boundary)
//
// One message is published after a terminal status is committed for any
// job. Delivery is at-least-once; downstream consumers deduplicate on
// (correlation_id, final_state).

use crate::domain::{JobId, JobKind, JobState};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChanged {
    pub correlation_id: JobId,
    pub parent_correlation_id: Option<JobId>,
    pub kind: JobKind,
    pub final_state: JobState,
    pub processed_records: i64,
    pub failed_records: i64,
}

#[async_trait]
pub trait StatusNotifier: Send + Sync {
    async fn publish(&self, message: &StatusChanged) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Collects published messages for assertions
    #[derive(Default)]
    pub struct MemoryNotifier {
        messages: Mutex<Vec<StatusChanged>>,
    }

    impl MemoryNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn messages(&self) -> Vec<StatusChanged> {
            self.messages.lock().unwrap().clone()
        }

        pub fn count(&self) -> usize {
            self.messages.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl StatusNotifier for MemoryNotifier {
        async fn publish(&self, message: &StatusChanged) -> Result<()> {
            self.messages.lock().unwrap().push(message.clone());
            Ok(())
        }
    }
}
