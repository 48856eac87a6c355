// CDRFlow Infrastructure - SQLite Adapter
// Implements: JobStatusStore, RecordSink, StepJournal, IdempotencyStore, Maintenance

mod connection;
mod idempotency_store;
mod job_store;
mod journal_store;
mod maintenance_impl;
mod migration;
mod record_sink;

pub use connection::create_pool;
pub use idempotency_store::SqliteIdempotencyStore;
pub use job_store::SqliteJobStatusStore;
pub use journal_store::SqliteStepJournal;
pub use maintenance_impl::SqliteMaintenance;
pub use migration::run_migrations;
pub use record_sink::SqliteRecordSink;

// Note: sqlx::Error conversion is handled by wrapping in helper functions
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
