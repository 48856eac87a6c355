// Filesystem BlobStore Implementation
//
// Containers are subdirectories of the data root; blob names may contain
// forward slashes (chunk blobs live under their master's prefix).

use async_trait::async_trait;
use cdrflow_core::domain::BlobRef;
use cdrflow_core::error::{AppError, Result};
use cdrflow_core::port::{BlobReader, BlobStore};
use std::path::{Component, Path, PathBuf};
use tokio::io::BufReader;
use tracing::debug;

pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a blob reference to a path under the data root.
    ///
    /// Rejects absolute paths and parent-directory components so a blob
    /// name can never escape the root.
    fn resolve(&self, blob: &BlobRef) -> Result<PathBuf> {
        if blob.container.is_empty() || blob.name.is_empty() {
            return Err(AppError::Validation(format!(
                "Invalid blob reference: {}",
                blob
            )));
        }

        let relative = Path::new(&blob.container).join(&blob.name);
        for component in relative.components() {
            if !matches!(component, Component::Normal(_)) {
                return Err(AppError::Validation(format!(
                    "Blob reference {} escapes the data root",
                    blob
                )));
            }
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn size(&self, blob: &BlobRef) -> Result<u64> {
        let path = self.resolve(blob)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("Blob {} not found", blob)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, blob: &BlobRef) -> Result<BlobReader> {
        let path = self.resolve(blob)?;
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("Blob {} not found", blob)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, blob: &BlobRef, bytes: &[u8]) -> Result<()> {
        let path = self.resolve(blob)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        debug!(blob = %blob, size_bytes = bytes.len(), "Wrote blob");
        Ok(())
    }
}
