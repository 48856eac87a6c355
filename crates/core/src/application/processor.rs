// Chunk Processor - parse and persist one chunk's records

use crate::application::constants::RECORD_BATCH_SIZE;
use crate::domain::{is_header, BlobRef, CallRecord, FileProcessingResult};
use crate::error::Result;
use crate::port::{BlobStore, RecordSink};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tracing::{debug, warn};

/// Processes one chunk (or one whole single-file input), stateless with
/// respect to sibling chunks.
///
/// The boundary converts every failure into a terminal
/// `FileProcessingResult`, so the aggregation engine always receives
/// exactly one outcome per invocation and nothing propagates past it.
pub struct ChunkProcessor {
    blobs: Arc<dyn BlobStore>,
    sink: Arc<dyn RecordSink>,
}

impl ChunkProcessor {
    pub fn new(blobs: Arc<dyn BlobStore>, sink: Arc<dyn RecordSink>) -> Self {
        Self { blobs, sink }
    }

    /// Read, parse and persist one chunk's records.
    ///
    /// Per-record parse failures are counted and sampled; an unreadable
    /// chunk or a sink outage yields a zero-success result. Never
    /// returns an error.
    pub async fn process(&self, source: &BlobRef) -> FileProcessingResult {
        match self.process_inner(source).await {
            Ok(result) => result,
            Err(e) => {
                warn!(source = %source, error = %e, "Chunk unreadable, reporting total loss");
                FileProcessingResult::failed_entirely(format!("chunk {} unreadable: {}", source, e))
            }
        }
    }

    async fn process_inner(&self, source: &BlobRef) -> Result<FileProcessingResult> {
        let reader = self.blobs.read(source).await?;
        let mut lines = reader.lines();

        let mut result = FileProcessingResult::new();
        let mut batch: Vec<CallRecord> = Vec::with_capacity(RECORD_BATCH_SIZE);
        let mut line_no: u64 = 0;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() || is_header(&line) {
                continue;
            }

            match CallRecord::parse_line(&line) {
                Ok(record) => {
                    batch.push(record);
                    if batch.len() >= RECORD_BATCH_SIZE {
                        self.flush_batch(&mut batch, &mut result).await;
                    }
                }
                Err(e) => {
                    result.record_failure(format!("line {}: {}", line_no, e));
                }
            }
        }

        if !batch.is_empty() {
            self.flush_batch(&mut batch, &mut result).await;
        }

        debug!(
            source = %source,
            processed = result.processed_records,
            failed = result.failed_records,
            "Chunk processed"
        );

        Ok(result)
    }

    /// Persist one batch; a sink failure fails the whole batch (a record
    /// either persists whole or is counted as failed).
    async fn flush_batch(&self, batch: &mut Vec<CallRecord>, result: &mut FileProcessingResult) {
        let count = batch.len() as i64;
        match self.sink.add_batch(batch).await {
            Ok(()) => result.processed_records += count,
            Err(e) => {
                result.failed_records += count;
                warn!(batch_size = count, error = %e, "Batch insert failed");
                if result.errors.len() < crate::domain::MAX_ERROR_SAMPLES {
                    result.errors.push(format!("batch of {} failed: {}", count, e));
                }
            }
        }
        batch.clear();
    }
}
