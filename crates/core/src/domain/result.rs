// Chunk processing outcome

use crate::domain::job::JobState;
use serde::{Deserialize, Serialize};

/// Cap on sampled error messages carried in a result
pub const MAX_ERROR_SAMPLES: usize = 10;

/// Ephemeral summary returned by one chunk processor invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileProcessingResult {
    pub processed_records: i64,
    pub failed_records: i64,
    /// Sampled error messages, not exhaustive
    pub errors: Vec<String>,
}

impl FileProcessingResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Result for a chunk that failed entirely (unreadable input,
    /// timeout). Record counts are unknown at this point, so only the
    /// error sample marks the loss.
    pub fn failed_entirely(message: impl Into<String>) -> Self {
        Self {
            processed_records: 0,
            failed_records: 0,
            errors: vec![message.into()],
        }
    }

    pub fn record_success(&mut self) {
        self.processed_records += 1;
    }

    pub fn record_failure(&mut self, message: impl Into<String>) {
        self.failed_records += 1;
        if self.errors.len() < MAX_ERROR_SAMPLES {
            self.errors.push(message.into());
        }
    }

    /// Derive the terminal state of the processed unit.
    ///
    /// All-success (including a clean empty chunk) is Succeeded, a mix is
    /// PartiallySucceeded, and zero successes with any recorded failure
    /// or error is Failed.
    pub fn derive_state(&self) -> JobState {
        let has_failures = self.failed_records > 0 || !self.errors.is_empty();
        if !has_failures {
            JobState::Succeeded
        } else if self.processed_records > 0 {
            JobState::PartiallySucceeded
        } else {
            JobState::Failed
        }
    }

    /// Whether this outcome lands in the successful-chunks bucket
    pub fn succeeded(&self) -> bool {
        self.derive_state() != JobState::Failed
    }

    /// Joined error sample for the status message
    pub fn summary_message(&self) -> Option<String> {
        if self.errors.is_empty() {
            None
        } else {
            Some(crate::domain::job::truncate_message(
                &self.errors.join("; "),
            ))
        }
    }
}
