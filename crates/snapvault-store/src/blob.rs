// ABOUTME: One-file-per-version blob storage keyed by version id.
// ABOUTME: Writes are atomic (tmp + fsync + rename) so a crash never leaves a torn blob.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use thiserror::Error;

const BLOB_EXTENSION: &str = "blob";

/// Errors that can occur during blob operations.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blob not found: {0}")]
    NotFound(String),
}

/// Directory of compressed version blobs.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Open a blob store rooted at `root`, creating the directory if needed.
    pub fn open(root: PathBuf) -> Result<Self, BlobError> {
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Storage location of the blob for `version_id`.
    pub fn location(&self, version_id: &str) -> PathBuf {
        self.root.join(format!("{version_id}.{BLOB_EXTENSION}"))
    }

    /// Write a blob atomically and return its location.
    pub fn write(&self, version_id: &str, bytes: &[u8]) -> Result<PathBuf, BlobError> {
        let final_path = self.location(version_id);
        let tmp_path = self.root.join(format!("{version_id}.tmp"));

        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, &final_path)?;

        if let Ok(dir) = File::open(&self.root) {
            let _ = dir.sync_all();
        }

        Ok(final_path)
    }

    pub fn read(&self, location: &Path) -> Result<Vec<u8>, BlobError> {
        match fs::read(location) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(location.display().to_string()))
            }
            Err(e) => Err(BlobError::Io(e)),
        }
    }

    /// Delete a blob. Returns false if it was already gone.
    pub fn delete(&self, location: &Path) -> Result<bool, BlobError> {
        match fs::remove_file(location) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BlobError::Io(e)),
        }
    }

    /// List blobs (and leftover temp files) last modified more than `grace` ago,
    /// as `(version_id, path)` pairs.
    pub fn list_older_than(&self, grace: Duration) -> Result<Vec<(String, PathBuf)>, BlobError> {
        let cutoff = SystemTime::now().checked_sub(grace).unwrap_or(SystemTime::UNIX_EPOCH);
        let mut results = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let is_blob = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some(BLOB_EXTENSION) | Some("tmp")
            );
            if !is_blob {
                tracing::warn!("skipping unexpected file in blob store: {}", path.display());
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            if modified <= cutoff {
                results.push((stem.to_string(), path.clone()));
            }
        }

        Ok(results)
    }
}
