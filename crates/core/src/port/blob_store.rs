// Input Source Port (blob/object storage boundary)
//
// The coordinator and splitter depend only on this narrow contract, not
// on any specific storage product.

use crate::domain::BlobRef;
use crate::error::Result;
use async_trait::async_trait;
use tokio::io::AsyncBufRead;

/// Buffered byte stream over one blob
pub type BlobReader = Box<dyn AsyncBufRead + Send + Unpin>;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Size of a blob in bytes. Fails with NotFound for a missing blob.
    async fn size(&self, blob: &BlobRef) -> Result<u64>;

    /// Open a blob for buffered reading
    async fn read(&self, blob: &BlobRef) -> Result<BlobReader>;

    /// Write a blob, replacing any existing content
    async fn write(&self, blob: &BlobRef, bytes: &[u8]) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::Mutex;

    /// In-memory blob store for tests
    #[derive(Default)]
    pub struct MemoryBlobStore {
        blobs: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl MemoryBlobStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_blob(blob: &BlobRef, bytes: impl Into<Vec<u8>>) -> Self {
            let store = Self::new();
            store
                .blobs
                .lock()
                .unwrap()
                .insert(blob.to_string(), bytes.into());
            store
        }

        pub fn insert(&self, blob: &BlobRef, bytes: impl Into<Vec<u8>>) {
            self.blobs
                .lock()
                .unwrap()
                .insert(blob.to_string(), bytes.into());
        }

        pub fn get(&self, blob: &BlobRef) -> Option<Vec<u8>> {
            self.blobs.lock().unwrap().get(&blob.to_string()).cloned()
        }

        pub fn blob_count(&self) -> usize {
            self.blobs.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl BlobStore for MemoryBlobStore {
        async fn size(&self, blob: &BlobRef) -> Result<u64> {
            self.blobs
                .lock()
                .unwrap()
                .get(&blob.to_string())
                .map(|b| b.len() as u64)
                .ok_or_else(|| AppError::NotFound(format!("Blob {} not found", blob)))
        }

        async fn read(&self, blob: &BlobRef) -> Result<BlobReader> {
            let bytes = self
                .blobs
                .lock()
                .unwrap()
                .get(&blob.to_string())
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("Blob {} not found", blob)))?;
            Ok(Box::new(Cursor::new(bytes)))
        }

        async fn write(&self, blob: &BlobRef, bytes: &[u8]) -> Result<()> {
            self.blobs
                .lock()
                .unwrap()
                .insert(blob.to_string(), bytes.to_vec());
            Ok(())
        }
    }
}
