// Port Layer - Interfaces for external dependencies

pub mod blob_store;
pub mod id_provider; // For deterministic testing
pub mod idempotency_store;
pub mod job_store;
pub mod maintenance;
pub mod notifier;
pub mod record_sink;
pub mod step_journal;
pub mod time_provider;

// Re-exports
pub use blob_store::{BlobReader, BlobStore};
pub use id_provider::IdProvider;
pub use idempotency_store::IdempotencyStore;
pub use job_store::{JobStatusStore, MasterProgress};
pub use maintenance::{Maintenance, MaintenanceConfig, MaintenanceStats};
pub use notifier::{StatusChanged, StatusNotifier};
pub use record_sink::RecordSink;
pub use step_journal::StepJournal;
pub use time_provider::TimeProvider;
