// CDRFlow Infrastructure - Filesystem Adapter
// Implements: BlobStore over a local data directory

mod blob_store;

pub use blob_store::FsBlobStore;
