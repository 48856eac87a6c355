// Logging StatusNotifier
//
// The production transport for status-change messages is an external
// collaborator; this daemon logs the message it would publish so the
// terminal-status stream is observable end to end.

use async_trait::async_trait;
use cdrflow_core::error::Result;
use cdrflow_core::port::{StatusChanged, StatusNotifier};
use tracing::info;

pub struct LoggingNotifier;

#[async_trait]
impl StatusNotifier for LoggingNotifier {
    async fn publish(&self, message: &StatusChanged) -> Result<()> {
        info!(
            correlation_id = %message.correlation_id,
            parent_correlation_id = ?message.parent_correlation_id,
            kind = %message.kind,
            final_state = %message.final_state,
            processed_records = message.processed_records,
            failed_records = message.failed_records,
            "Status changed"
        );
        Ok(())
    }
}
