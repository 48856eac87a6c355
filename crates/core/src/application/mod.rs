pub mod aggregation;
pub mod constants;
pub mod idempotency;
pub mod maintenance;
pub mod orchestrator;
pub mod processor;
pub mod recovery;
pub mod shutdown;
pub mod splitter;
pub mod submit;
pub mod worker;

pub use aggregation::AggregationEngine;
pub use idempotency::{CachedResponse, IdempotencyService, OperationResponse};
pub use maintenance::MaintenanceScheduler;
pub use orchestrator::{OrchestrationCoordinator, OrchestratorConfig};
pub use processor::ChunkProcessor;
pub use recovery::RecoveryService;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use splitter::{ChunkDescriptor, ChunkSplitter};
pub use submit::{SubmitIngestion, SubmitService};
pub use worker::IngestWorker;
