// Ingest Worker - claims pending masters and runs the orchestration

use crate::application::constants::{
    DEFAULT_CLAIM_LEASE_MS, ERROR_RECOVERY_SLEEP_DURATION, IDLE_SLEEP_DURATION,
};
use crate::application::orchestrator::OrchestrationCoordinator;
use crate::application::shutdown::ShutdownToken;
use crate::error::Result;
use crate::port::JobStatusStore;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{error, info};

/// Worker loop over the job status store's pending masters.
///
/// Claims are atomic leases, so multiple workers never orchestrate the
/// same master concurrently; an expired lease makes a crashed worker's
/// master claimable again.
pub struct IngestWorker {
    store: Arc<dyn JobStatusStore>,
    coordinator: Arc<OrchestrationCoordinator>,
    lease_ms: i64,
}

impl IngestWorker {
    pub fn new(store: Arc<dyn JobStatusStore>, coordinator: Arc<OrchestrationCoordinator>) -> Self {
        Self {
            store,
            coordinator,
            lease_ms: DEFAULT_CLAIM_LEASE_MS,
        }
    }

    pub fn with_lease(mut self, lease_ms: i64) -> Self {
        self.lease_ms = lease_ms;
        self
    }

    /// Run worker loop with graceful shutdown support
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!("Ingest worker started");
        loop {
            if shutdown.is_shutdown() {
                info!("Ingest worker shutting down");
                break;
            }
            match self.process_next_master(&shutdown).await {
                Ok(processed) => {
                    if !processed {
                        // No master pending, sleep briefly (or wait for shutdown)
                        tokio::select! {
                            _ = sleep(IDLE_SLEEP_DURATION) => {},
                            _ = shutdown.wait() => {
                                info!("Ingest worker interrupted during idle");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("Ingest worker error: {}", e);
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => {
                            info!("Ingest worker interrupted during error recovery");
                            break;
                        }
                    }
                }
            }
        }
        info!("Ingest worker stopped");
        Ok(())
    }

    /// Claim and orchestrate the next pending master (returns true if one
    /// was processed)
    pub async fn process_next_master(&self, shutdown: &ShutdownToken) -> Result<bool> {
        let master = match self.store.claim_next_pending(self.lease_ms).await? {
            Some(job) => job,
            None => return Ok(false),
        };

        info!(master_id = %master.id, source = %master.source, "Orchestrating master");
        self.coordinator.run(&master.id, shutdown.clone()).await?;
        Ok(true)
    }
}
