// Application constants (no magic values)
use std::time::Duration;

/// Inputs larger than this are chunked (500 MiB)
pub const DEFAULT_CHUNK_THRESHOLD_BYTES: u64 = 500 * 1024 * 1024;

/// Target size of one chunk (200 MiB)
pub const DEFAULT_CHUNK_TARGET_BYTES: u64 = 200 * 1024 * 1024;

/// Records per batch insert into the record sink
pub const RECORD_BATCH_SIZE: usize = 500;

/// Upper bound on concurrently processing chunks per master
pub const DEFAULT_MAX_CONCURRENT_CHUNKS: usize = 8;

/// A chunk invocation exceeding this resolves to a Failed terminal
/// result instead of silently vanishing (15 minutes)
pub const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Sleep duration when no masters are pending (100ms)
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_millis(100);

/// Sleep duration after a worker error before retry (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Lease on a claimed master; an expired lease makes the job claimable
/// again after a crash (30 minutes)
pub const DEFAULT_CLAIM_LEASE_MS: i64 = 30 * 60 * 1000;

/// Chunks stuck in Processing longer than this are forced to a Failed
/// terminal result on startup (5 minutes)
pub const DEFAULT_RECOVERY_WINDOW_MS: i64 = 5 * 60 * 1000;

/// Idempotency cache entry lifetime (24 hours)
pub const DEFAULT_IDEMPOTENCY_TTL_MS: i64 = 24 * 60 * 60 * 1000;
