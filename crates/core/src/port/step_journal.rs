// Step Journal Port (durable execution log)
//
// Each orchestration step's outcome is recorded before the next step is
// attempted; replay after a crash skips steps with a recorded outcome.

use crate::domain::JobId;
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait StepJournal: Send + Sync {
    /// Recorded outcome of a step, if any
    async fn get(&self, master_id: &JobId, step: &str) -> Result<Option<serde_json::Value>>;

    /// Record a step's outcome. Recording the same step twice keeps the
    /// first outcome.
    async fn record(&self, master_id: &JobId, step: &str, outcome: &serde_json::Value)
        -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryStepJournal {
        steps: Mutex<HashMap<(String, String), serde_json::Value>>,
    }

    impl MemoryStepJournal {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn step_count(&self) -> usize {
            self.steps.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl StepJournal for MemoryStepJournal {
        async fn get(&self, master_id: &JobId, step: &str) -> Result<Option<serde_json::Value>> {
            Ok(self
                .steps
                .lock()
                .unwrap()
                .get(&(master_id.clone(), step.to_string()))
                .cloned())
        }

        async fn record(
            &self,
            master_id: &JobId,
            step: &str,
            outcome: &serde_json::Value,
        ) -> Result<()> {
            self.steps
                .lock()
                .unwrap()
                .entry((master_id.clone(), step.to_string()))
                .or_insert_with(|| outcome.clone());
            Ok(())
        }
    }
}
