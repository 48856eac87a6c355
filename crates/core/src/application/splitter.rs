// Chunk Splitter - record-boundary-aware partitioning of large inputs

use crate::domain::{is_header, BlobRef, JobId};
use crate::error::{AppError, Result};
use crate::port::{BlobStore, IdProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tracing::{debug, info};

/// An independently-addressable partition of a large input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    /// Fresh correlation identity, never reused across invocations
    pub chunk_id: JobId,
    /// 1-based position within the input
    pub sequence: u32,
    /// Materialized chunk data
    pub blob: BlobRef,
}

/// Splits a large input into named chunks, cutting only between records.
///
/// Every record lands in exactly one chunk; the chunk count is
/// deterministic for a given input and target size. Chunk identities are
/// fresh per invocation, so a retried split orphans the previous partial
/// chunks rather than reusing their names.
pub struct ChunkSplitter {
    blobs: Arc<dyn BlobStore>,
    ids: Arc<dyn IdProvider>,
}

impl ChunkSplitter {
    pub fn new(blobs: Arc<dyn BlobStore>, ids: Arc<dyn IdProvider>) -> Self {
        Self { blobs, ids }
    }

    /// Partition `source` into chunks of roughly `target_chunk_bytes`.
    ///
    /// The CSV header is copied into every chunk so each chunk parses
    /// independently. An input with no data rows yields an empty vec.
    pub async fn split(
        &self,
        source: &BlobRef,
        target_chunk_bytes: u64,
        parent_id: &JobId,
    ) -> Result<Vec<ChunkDescriptor>> {
        if target_chunk_bytes == 0 {
            return Err(AppError::Config(
                "target chunk size must be positive".to_string(),
            ));
        }

        let reader = self.blobs.read(source).await?;
        let mut lines = reader.lines();

        let mut header: Option<String> = None;
        let mut buffer = String::new();
        let mut descriptors: Vec<ChunkDescriptor> = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if header.is_none() && descriptors.is_empty() && buffer.is_empty() && is_header(&line) {
                header = Some(line);
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }

            // Cut only between records: a record is never split across
            // two chunks.
            buffer.push_str(&line);
            buffer.push('\n');

            if buffer.len() as u64 >= target_chunk_bytes {
                let descriptor = self
                    .flush_chunk(source, parent_id, header.as_deref(), &mut buffer, &descriptors)
                    .await?;
                descriptors.push(descriptor);
            }
        }

        if !buffer.is_empty() {
            let descriptor = self
                .flush_chunk(source, parent_id, header.as_deref(), &mut buffer, &descriptors)
                .await?;
            descriptors.push(descriptor);
        }

        info!(
            parent_id = %parent_id,
            source = %source,
            chunk_count = descriptors.len(),
            "Input split into chunks"
        );

        Ok(descriptors)
    }

    async fn flush_chunk(
        &self,
        source: &BlobRef,
        parent_id: &JobId,
        header: Option<&str>,
        buffer: &mut String,
        existing: &[ChunkDescriptor],
    ) -> Result<ChunkDescriptor> {
        let chunk_id = self.ids.generate_id();
        let sequence = existing.len() as u32 + 1;

        let blob = BlobRef::new(
            source.container.clone(),
            format!("{}/chunk-{:05}-{}.csv", parent_id, sequence, chunk_id),
        );

        let mut content = String::with_capacity(buffer.len() + 128);
        if let Some(h) = header {
            content.push_str(h);
            content.push('\n');
        }
        content.push_str(buffer);

        self.blobs.write(&blob, content.as_bytes()).await?;
        debug!(chunk_id = %chunk_id, sequence = sequence, bytes = content.len(), "Chunk written");

        buffer.clear();

        Ok(ChunkDescriptor {
            chunk_id,
            sequence,
            blob,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CSV_HEADER;
    use crate::port::blob_store::mocks::MemoryBlobStore;
    use crate::port::id_provider::mocks::SequentialIdProvider;

    fn data_line(i: usize) -> String {
        format!(
            "4412155988{:02},448000096481,16/08/2016,14:21:33,43,0,REF{:029},GBP",
            i % 100,
            i
        )
    }

    fn csv_input(rows: usize) -> String {
        let mut s = String::from(CSV_HEADER);
        s.push('\n');
        for i in 0..rows {
            s.push_str(&data_line(i));
            s.push('\n');
        }
        s
    }

    fn splitter_with(blob: &BlobRef, content: &str) -> (ChunkSplitter, Arc<MemoryBlobStore>) {
        let blobs = Arc::new(MemoryBlobStore::with_blob(blob, content.as_bytes().to_vec()));
        let splitter = ChunkSplitter::new(
            blobs.clone(),
            Arc::new(SequentialIdProvider::new("chunk")),
        );
        (splitter, blobs)
    }

    #[tokio::test]
    async fn test_split_reconstructs_record_set() {
        let source = BlobRef::new("uploads", "input.csv");
        let input = csv_input(50);
        let (splitter, blobs) = splitter_with(&source, &input);

        // Small target so the input spans several chunks
        let descriptors = splitter.split(&source, 400, &"master-1".to_string()).await.unwrap();
        assert!(descriptors.len() > 1);

        // Union of chunk data rows, in sequence order, is exactly the input
        let mut reassembled: Vec<String> = Vec::new();
        for d in &descriptors {
            let bytes = blobs.get(&d.blob).unwrap();
            let text = String::from_utf8(bytes).unwrap();
            let mut lines = text.lines();
            assert!(is_header(lines.next().unwrap()), "every chunk carries the header");
            reassembled.extend(lines.map(str::to_string));
        }
        let expected: Vec<String> = (0..50).map(data_line).collect();
        assert_eq!(reassembled, expected);

        // Sequences are 1-based and dense
        for (i, d) in descriptors.iter().enumerate() {
            assert_eq!(d.sequence, i as u32 + 1);
        }
    }

    #[tokio::test]
    async fn test_chunk_count_is_deterministic() {
        let source = BlobRef::new("uploads", "input.csv");
        let input = csv_input(200);

        let (first, _) = splitter_with(&source, &input);
        let count_a = first
            .split(&source, 1000, &"m1".to_string())
            .await
            .unwrap()
            .len();

        let (second, _) = splitter_with(&source, &input);
        let count_b = second
            .split(&source, 1000, &"m1".to_string())
            .await
            .unwrap()
            .len();

        assert_eq!(count_a, count_b);
    }

    #[tokio::test]
    async fn test_retry_produces_fresh_identities() {
        let source = BlobRef::new("uploads", "input.csv");
        let input = csv_input(30);
        let (splitter, _) = splitter_with(&source, &input);

        let first = splitter.split(&source, 500, &"m1".to_string()).await.unwrap();
        let second = splitter.split(&source, 500, &"m1".to_string()).await.unwrap();

        for (a, b) in first.iter().zip(second.iter()) {
            assert_ne!(a.chunk_id, b.chunk_id);
            assert_ne!(a.blob, b.blob);
        }
    }

    #[tokio::test]
    async fn test_empty_input_yields_zero_chunks() {
        let source = BlobRef::new("uploads", "empty.csv");

        // Header only
        let (splitter, _) = splitter_with(&source, &format!("{}\n", CSV_HEADER));
        let descriptors = splitter.split(&source, 1000, &"m1".to_string()).await.unwrap();
        assert!(descriptors.is_empty());

        // Truly empty
        let (splitter, _) = splitter_with(&source, "");
        let descriptors = splitter.split(&source, 1000, &"m1".to_string()).await.unwrap();
        assert!(descriptors.is_empty());
    }

    #[tokio::test]
    async fn test_headerless_input_is_still_split() {
        let source = BlobRef::new("uploads", "bare.csv");
        let mut input = String::new();
        for i in 0..10 {
            input.push_str(&data_line(i));
            input.push('\n');
        }
        let (splitter, blobs) = splitter_with(&source, &input);

        let descriptors = splitter.split(&source, 300, &"m1".to_string()).await.unwrap();
        assert!(!descriptors.is_empty());

        // No header to copy, chunks contain data rows only
        let bytes = blobs.get(&descriptors[0].blob).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(!is_header(text.lines().next().unwrap()));
    }
}
