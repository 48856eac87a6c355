// Job Status Domain Model

use serde::{Deserialize, Serialize};

/// Correlation identity tying together all records and status entries
/// belonging to one ingestion or chunk (UUID v4 in production)
pub type JobId = String;

/// Maximum length of the free-text status message
pub const MAX_MESSAGE_LEN: usize = 2000;

/// Kind of trackable work unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    /// A whole file processed without chunking
    SingleFile,
    /// Top-level unit composed of one or more chunks
    Master,
    /// Independently processable partition of a large input
    Chunk,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::SingleFile => write!(f, "SINGLE_FILE"),
            JobKind::Master => write!(f, "MASTER"),
            JobKind::Chunk => write!(f, "CHUNK"),
        }
    }
}

impl JobKind {
    pub fn parse(s: &str) -> Option<JobKind> {
        match s {
            "SINGLE_FILE" => Some(JobKind::SingleFile),
            "MASTER" => Some(JobKind::Master),
            "CHUNK" => Some(JobKind::Chunk),
            _ => None,
        }
    }
}

/// Job lifecycle state
///
/// Transitions are monotonic: a job only moves to a state with a strictly
/// greater rank, and terminal states are absorbing. Chunking states are
/// skipped for inputs below the chunk threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Accepted,
    PendingQueue,
    Chunking,
    ChunksQueued,
    QueuedForProcessing,
    Processing,
    Succeeded,
    PartiallySucceeded,
    Failed,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Accepted => write!(f, "ACCEPTED"),
            JobState::PendingQueue => write!(f, "PENDING_QUEUE"),
            JobState::Chunking => write!(f, "CHUNKING"),
            JobState::ChunksQueued => write!(f, "CHUNKS_QUEUED"),
            JobState::QueuedForProcessing => write!(f, "QUEUED_FOR_PROCESSING"),
            JobState::Processing => write!(f, "PROCESSING"),
            JobState::Succeeded => write!(f, "SUCCEEDED"),
            JobState::PartiallySucceeded => write!(f, "PARTIALLY_SUCCEEDED"),
            JobState::Failed => write!(f, "FAILED"),
        }
    }
}

impl JobState {
    pub fn parse(s: &str) -> Option<JobState> {
        match s {
            "ACCEPTED" => Some(JobState::Accepted),
            "PENDING_QUEUE" => Some(JobState::PendingQueue),
            "CHUNKING" => Some(JobState::Chunking),
            "CHUNKS_QUEUED" => Some(JobState::ChunksQueued),
            "QUEUED_FOR_PROCESSING" => Some(JobState::QueuedForProcessing),
            "PROCESSING" => Some(JobState::Processing),
            "SUCCEEDED" => Some(JobState::Succeeded),
            "PARTIALLY_SUCCEEDED" => Some(JobState::PartiallySucceeded),
            "FAILED" => Some(JobState::Failed),
            _ => None,
        }
    }

    /// Position in the lifecycle; all terminal states share the top rank
    pub fn rank(&self) -> i32 {
        match self {
            JobState::Accepted => 0,
            JobState::PendingQueue => 1,
            JobState::Chunking => 2,
            JobState::ChunksQueued => 3,
            JobState::QueuedForProcessing => 4,
            JobState::Processing => 5,
            JobState::Succeeded | JobState::PartiallySucceeded | JobState::Failed => 6,
        }
    }

    /// No further transitions occur after reaching a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::PartiallySucceeded | JobState::Failed
        )
    }
}

/// Terminal status of a master as a pure function of its chunk counters
///
/// Precondition: all chunks have reported in (processed == total).
pub fn terminal_status(successful_chunks: i64, failed_chunks: i64, total_chunks: i64) -> JobState {
    if successful_chunks == total_chunks {
        JobState::Succeeded
    } else if successful_chunks == 0 {
        JobState::Failed
    } else {
        debug_assert!(failed_chunks > 0);
        JobState::PartiallySucceeded
    }
}

/// Container/blob-name pair locating an input or chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    pub container: String,
    pub name: String,
}

impl BlobRef {
    pub fn new(container: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for BlobRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.container, self.name)
    }
}

/// One unit of trackable work: a whole file, a master job, or one chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: JobId,
    pub kind: JobKind,
    /// Present iff kind == Chunk; references the owning master
    pub parent_id: Option<JobId>,
    pub state: JobState,

    // Master-only chunk counters, populated once chunking is decided
    pub total_chunks: Option<i64>,
    pub processed_chunks: Option<i64>,
    pub successful_chunks: Option<i64>,
    pub failed_chunks: Option<i64>,

    // Record-level counters. Meaningful for SingleFile/Chunk; a master
    // only carries sums aggregated from its children.
    pub processed_records: Option<i64>,
    pub failed_records: Option<i64>,

    /// Free-text status detail, truncated to MAX_MESSAGE_LEN
    pub message: Option<String>,

    pub created_at: i64, // epoch ms
    pub last_updated_at: i64,

    /// Location of the underlying input
    pub source: BlobRef,
}

impl JobStatus {
    /// Create a master job for an inbound large-input event
    pub fn new_master(id: impl Into<String>, created_at: i64, source: BlobRef) -> Self {
        Self {
            id: id.into(),
            kind: JobKind::Master,
            parent_id: None,
            state: JobState::Accepted,
            total_chunks: None,
            processed_chunks: None,
            successful_chunks: None,
            failed_chunks: None,
            processed_records: None,
            failed_records: None,
            message: None,
            created_at,
            last_updated_at: created_at,
            source,
        }
    }

    /// Create a chunk job owned by a master; chunks are observable
    /// before any processing starts
    pub fn new_chunk(
        id: impl Into<String>,
        parent_id: impl Into<String>,
        created_at: i64,
        source: BlobRef,
    ) -> Self {
        Self {
            id: id.into(),
            kind: JobKind::Chunk,
            parent_id: Some(parent_id.into()),
            state: JobState::QueuedForProcessing,
            total_chunks: None,
            processed_chunks: None,
            successful_chunks: None,
            failed_chunks: None,
            processed_records: Some(0),
            failed_records: Some(0),
            message: None,
            created_at,
            last_updated_at: created_at,
            source,
        }
    }

    /// Validate the kind/parent invariant
    pub fn validate(&self) -> crate::domain::error::Result<()> {
        match (self.kind, &self.parent_id) {
            (JobKind::Chunk, None) => Err(crate::domain::error::DomainError::ChunkWithoutParent(
                self.id.clone(),
            )),
            (JobKind::Master | JobKind::SingleFile, Some(_)) => {
                Err(crate::domain::error::DomainError::ValidationError(format!(
                    "{} job {} must not have a parent",
                    self.kind, self.id
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Truncate a status message to the bounded length
pub fn truncate_message(message: &str) -> String {
    if message.chars().count() <= MAX_MESSAGE_LEN {
        message.to_string()
    } else {
        message.chars().take(MAX_MESSAGE_LEN).collect()
    }
}
