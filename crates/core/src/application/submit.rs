// Submit Use Case - accept an inbound ingestion command

use crate::domain::{BlobRef, JobId, JobStatus};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, JobStatusStore, TimeProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Inbound orchestrate-input command (submitted by the HTTP layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitIngestion {
    pub container: String,
    pub blob: String,
    /// Caller-supplied master correlation id; generated when absent
    #[serde(default)]
    pub master_correlation_id: Option<String>,
}

/// Accepts ingestion commands and exposes the pure status read.
pub struct SubmitService {
    store: Arc<dyn JobStatusStore>,
    ids: Arc<dyn IdProvider>,
    time: Arc<dyn TimeProvider>,
}

impl SubmitService {
    pub fn new(
        store: Arc<dyn JobStatusStore>,
        ids: Arc<dyn IdProvider>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        Self { store, ids, time }
    }

    /// Create the master job (Accepted) and queue it for orchestration.
    ///
    /// A duplicate correlation id fails with Conflict; retried requests
    /// are expected to come through the idempotency cache instead.
    pub async fn submit(&self, req: SubmitIngestion) -> Result<JobId> {
        if req.container.trim().is_empty() || req.blob.trim().is_empty() {
            return Err(AppError::Validation(
                "container and blob must be non-empty".to_string(),
            ));
        }

        let id = match req.master_correlation_id {
            Some(id) if !id.trim().is_empty() => id,
            _ => self.ids.generate_id(),
        };

        let now = self.time.now_millis();
        let master = JobStatus::new_master(
            id.clone(),
            now,
            BlobRef::new(req.container, req.blob),
        );

        self.store.create(&master).await?;
        self.store
            .update_state(&id, crate::domain::JobState::PendingQueue, None)
            .await?;

        info!(master_id = %id, source = %master.source, "Ingestion accepted");
        Ok(id)
    }

    /// Pure read of the job status store (the polling endpoint's view)
    pub async fn status(&self, id: &JobId) -> Result<JobStatus> {
        self.store.get(id).await
    }
}
