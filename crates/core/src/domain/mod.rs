// Domain Layer - Pure business logic and entities

pub mod error;
pub mod idempotency;
pub mod job;
pub mod record;
pub mod result;

// Re-exports
pub use error::DomainError;
pub use idempotency::IdempotencyRecord;
pub use job::{
    terminal_status, truncate_message, BlobRef, JobId, JobKind, JobState, JobStatus,
    MAX_MESSAGE_LEN,
};
pub use record::{is_header, CallRecord, RecordParseError, CSV_HEADER};
pub use result::{FileProcessingResult, MAX_ERROR_SAMPLES};
