// ABOUTME: Error taxonomy surfaced by the snapshot store to its collaborators.
// ABOUTME: Each error maps to a machine-readable ErrorKind alongside its human-readable message.

use serde::{Deserialize, Serialize};
use snapvault_core::PayloadError;
use thiserror::Error;

use crate::blob::BlobError;
use crate::catalog::CatalogError;
use crate::pool::WorkerError;

/// Errors returned by [`crate::SnapshotStore`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unsupported payload: {0}")]
    UnsupportedPayload(String),

    #[error("broken ancestry for {version_id}: ancestor {missing_ancestor} is missing or inactive")]
    BrokenAncestry {
        version_id: String,
        missing_ancestor: String,
    },

    #[error("version not found: {0}")]
    VersionNotFound(String),

    #[error("branch already exists: {0}")]
    BranchExists(String),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("blob error: {0}")]
    Blob(#[from] BlobError),

    #[error("stored data could not be decoded: {0}")]
    Encoding(String),

    #[error("worker error: {0}")]
    Worker(#[from] WorkerError),
}

impl From<PayloadError> for StoreError {
    fn from(e: PayloadError) -> Self {
        match e {
            PayloadError::Unsupported(msg) | PayloadError::Encode(msg) => {
                StoreError::UnsupportedPayload(msg)
            }
            PayloadError::Decode(msg) => StoreError::Encoding(msg),
        }
    }
}

/// Machine-readable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedPayload,
    BrokenAncestry,
    VersionNotFound,
    BranchExists,
    Storage,
    Corruption,
    Internal,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::UnsupportedPayload(_) => ErrorKind::UnsupportedPayload,
            StoreError::BrokenAncestry { .. } => ErrorKind::BrokenAncestry,
            StoreError::VersionNotFound(_) => ErrorKind::VersionNotFound,
            StoreError::BranchExists(_) => ErrorKind::BranchExists,
            StoreError::Catalog(_) | StoreError::Blob(_) => ErrorKind::Storage,
            StoreError::Encoding(_) => ErrorKind::Corruption,
            StoreError::Worker(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::VersionNotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_errors_map_to_kinds() {
        let unsupported: StoreError = PayloadError::Unsupported("nan".to_string()).into();
        assert_eq!(unsupported.kind(), ErrorKind::UnsupportedPayload);

        let corrupt: StoreError = PayloadError::Decode("eof".to_string()).into();
        assert_eq!(corrupt.kind(), ErrorKind::Corruption);
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::BrokenAncestry).unwrap();
        assert_eq!(json, "\"broken_ancestry\"");
        assert!(StoreError::VersionNotFound("x".to_string()).is_not_found());
    }
}
