// ABOUTME: Persistence layer for snapvault, storing versioned payload snapshots on disk.
// ABOUTME: Provides codec selection, blob storage, the SQLite catalog, and the snapshot store.

pub mod blob;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod error;
pub mod pool;
pub mod store;

pub use blob::{BlobError, BlobStore};
pub use catalog::{Catalog, CatalogError};
pub use codec::{Codec, CodecError, CompressionPolicy};
pub use config::{ConfigError, StoreConfig};
pub use error::{ErrorKind, StoreError};
pub use pool::{WorkerError, WorkerPool};
pub use store::{
    CleanupReport, CreateOptions, CreateOutcome, CreateStatus, RollbackOptions, RollbackOutcome,
    SkippedBranch, SnapshotStore, VersionPage,
};
