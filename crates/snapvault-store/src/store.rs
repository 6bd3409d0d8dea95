// ABOUTME: The snapshot store: creates, reconstructs, compares, rolls back, and retires versions.
// ABOUTME: Orchestrates hashing, delta encoding, compression, blob writes, and catalog bookkeeping.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, SubsecRound, Utc};
use moka::sync::Cache;
use serde::Serialize;
use snapvault_core::payload::{from_cbor, to_cbor};
use snapvault_core::{
    Branch, Diff, Payload, Version, VersionComparison, VersionType, apply, content_hash, diff,
};
use ulid::Ulid;

use crate::blob::{BlobError, BlobStore};
use crate::catalog::{Catalog, CatalogError};
use crate::codec;
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::pool::WorkerPool;

/// Options for [`SnapshotStore::create_version`].
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Target branch; the configured default branch when unset.
    pub branch: Option<String>,
    /// Defaults to [`VersionType::Full`].
    pub version_type: Option<VersionType>,
    /// Parent to diff against and link to; the branch head when unset.
    pub parent_version: Option<String>,
    pub created_by: Option<String>,
    pub description: Option<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl CreateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn version_type(mut self, version_type: VersionType) -> Self {
        self.version_type = Some(version_type);
        self
    }

    pub fn incremental(self) -> Self {
        self.version_type(VersionType::Incremental)
    }

    pub fn parent(mut self, parent_version: impl Into<String>) -> Self {
        self.parent_version = Some(parent_version.into());
        self
    }

    pub fn created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Whether a create stored something new.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateStatus {
    Created,
    /// An active version on the branch already had this content.
    Duplicate,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOutcome {
    pub status: CreateStatus,
    pub version: Version,
}

/// Options for [`SnapshotStore::rollback_to_version`].
#[derive(Debug, Clone)]
pub struct RollbackOptions {
    /// Branch to append the rollback version to; the target's branch when unset.
    pub branch: Option<String>,
    pub created_by: String,
    pub reason: String,
    pub update_branch_head: bool,
}

impl Default for RollbackOptions {
    fn default() -> Self {
        Self {
            branch: None,
            created_by: "system".to_string(),
            reason: String::new(),
            update_branch_head: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackOutcome {
    pub rollback_version: Version,
    pub target_version_id: String,
    pub rolled_back_at: DateTime<Utc>,
}

/// One page of [`SnapshotStore::list_versions`].
#[derive(Debug, Clone, Serialize)]
pub struct VersionPage {
    pub versions: Vec<Version>,
    pub total_count: usize,
    pub limit: usize,
    pub offset: usize,
    pub branch: Option<String>,
}

/// A branch whose retention target could not be met without breaking a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedBranch {
    pub branch_name: String,
    pub excess: usize,
    pub evicted: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub evicted: Vec<String>,
    pub skipped_branches: Vec<SkippedBranch>,
    pub orphans_removed: usize,
}

/// In-process caches. Purely an optimization: every entry is re-derivable.
///
/// Each cache is bounded by the summed encoded size of its entries.
struct Caches {
    versions: Cache<String, CachedPayload>,
    diffs: Cache<(String, String), CachedComparison>,
}

#[derive(Clone)]
struct CachedPayload {
    payload: Arc<Payload>,
    weight: u32,
}

#[derive(Clone)]
struct CachedComparison {
    comparison: VersionComparison,
    weight: u32,
}

fn weight(encoded_len: u64) -> u32 {
    u32::try_from(encoded_len).unwrap_or(u32::MAX).max(1)
}

impl Caches {
    fn new(capacity: u64) -> Self {
        Self {
            versions: Cache::builder()
                .max_capacity(capacity)
                .weigher(|_, entry: &CachedPayload| entry.weight)
                .build(),
            diffs: Cache::builder()
                .max_capacity(capacity)
                .weigher(|_, entry: &CachedComparison| entry.weight)
                .build(),
        }
    }

    fn payload(&self, version_id: &str) -> Option<Arc<Payload>> {
        self.versions.get(version_id).map(|entry| entry.payload)
    }

    fn put_payload(&self, version_id: &str, payload: Arc<Payload>, encoded_len: u64) {
        self.versions.insert(
            version_id.to_string(),
            CachedPayload {
                payload,
                weight: weight(encoded_len),
            },
        );
    }

    fn comparison(&self, key: &(String, String)) -> Option<VersionComparison> {
        self.diffs.get(key).map(|entry| entry.comparison)
    }

    fn put_comparison(&self, key: (String, String), comparison: VersionComparison, encoded_len: u64) {
        self.diffs.insert(
            key,
            CachedComparison {
                comparison,
                weight: weight(encoded_len),
            },
        );
    }

    /// Drop everything that mentions one of `version_ids`.
    fn forget(&self, version_ids: &[String]) {
        let gone: HashSet<&str> = version_ids.iter().map(String::as_str).collect();
        for id in version_ids {
            self.versions.invalidate(id);
        }
        let stale: Vec<(String, String)> = self
            .diffs
            .iter()
            .filter(|(key, _)| gone.contains(key.0.as_str()) || gone.contains(key.1.as_str()))
            .map(|(key, _)| (*key).clone())
            .collect();
        for key in stale {
            self.diffs.invalidate(&key);
        }
    }

    fn clear(&self) {
        self.versions.invalidate_all();
        self.diffs.invalidate_all();
    }
}

/// What a blob decodes to.
enum Stored {
    Full(Payload),
    Diff(Diff),
}

/// Versioned snapshot store over one catalog and one blob directory.
///
/// Clones share the catalog, caches and worker pool. Concurrent creates on
/// the same branch may race on version numbering; callers needing strict
/// numbering must serialize them.
#[derive(Clone)]
pub struct SnapshotStore {
    config: Arc<StoreConfig>,
    catalog: Arc<Mutex<Catalog>>,
    blobs: BlobStore,
    pool: WorkerPool,
    caches: Arc<Caches>,
}

impl SnapshotStore {
    /// Open or create a store under `config.home`.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let blobs = BlobStore::open(config.blob_root())?;
        let catalog = Catalog::open(&config.catalog_path())?;
        tracing::info!("opened snapshot store at {}", config.home.display());

        Ok(Self {
            pool: WorkerPool::new(config.max_workers),
            caches: Arc::new(Caches::new(config.cache_capacity)),
            config: Arc::new(config),
            catalog: Arc::new(Mutex::new(catalog)),
            blobs,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Store `payload` as a new version, or return the existing active
    /// version on the branch with identical content.
    pub async fn create_version(
        &self,
        payload: Payload,
        options: CreateOptions,
    ) -> Result<CreateOutcome, StoreError> {
        self.create_inner(Arc::new(payload), options, true, true).await
    }

    async fn create_inner(
        &self,
        payload: Arc<Payload>,
        options: CreateOptions,
        dedup: bool,
        advance_head: bool,
    ) -> Result<CreateOutcome, StoreError> {
        let branch_name = options
            .branch
            .clone()
            .unwrap_or_else(|| self.config.default_branch.clone());

        let hashed = Arc::clone(&payload);
        let (hash, full_bytes) = self
            .pool
            .run(move || -> Result<(String, Vec<u8>), StoreError> {
                Ok((content_hash(&hashed)?, hashed.to_cbor()?))
            })
            .await??;

        if dedup {
            let (b, h) = (branch_name.clone(), hash.clone());
            if let Some(existing) = self
                .with_catalog(move |c| c.find_active_by_hash(&b, &h))
                .await?
            {
                tracing::info!(
                    "duplicate content on {}, returning version {}",
                    branch_name,
                    existing.version_id
                );
                return Ok(CreateOutcome {
                    status: CreateStatus::Duplicate,
                    version: existing,
                });
            }
        }

        let b = branch_name.clone();
        let branch = self.with_catalog(move |c| c.get_branch(&b)).await?;
        let head = branch.as_ref().and_then(|b| b.head_version.clone());

        let parent_version = match options.parent_version.clone() {
            Some(parent) => {
                self.require_active(&parent).await?;
                Some(parent)
            }
            None => head,
        };

        let requested = options.version_type.unwrap_or(VersionType::Full);
        let (version_type, stored_bytes) = match (&parent_version, requested.stores_diff()) {
            (Some(parent), true) => {
                let parent_payload = self.reconstruct(parent).await?;
                let delta = diff(&parent_payload, &payload);
                if apply(&parent_payload, &delta) == *payload {
                    (requested, to_cbor(&delta)?)
                } else {
                    tracing::warn!(
                        "diff against {} does not reproduce the payload, storing full snapshot",
                        parent
                    );
                    (VersionType::Full, full_bytes.clone())
                }
            }
            (None, true) => {
                tracing::debug!("no parent on {}, storing full snapshot", branch_name);
                (VersionType::Full, full_bytes.clone())
            }
            (_, false) => (requested, full_bytes.clone()),
        };

        let policy = self.config.compression;
        let level = self.config.compression_level;
        let blob = self
            .pool
            .run(move || codec::compress(&stored_bytes, policy, level))
            .await?;

        let version_id = Ulid::new().to_string();
        let location = self.write_blob(&version_id, blob.bytes.clone()).await?;

        let created_by = options.created_by.unwrap_or_else(|| "system".to_string());
        let b = branch_name.clone();
        let version_number = self.with_catalog(move |c| c.next_version_number(&b)).await?;

        let version = Version {
            version_id: version_id.clone(),
            version_number,
            version_type,
            parent_version,
            content_hash: hash,
            metadata: options.metadata,
            // Catalog timestamps carry microseconds.
            created_at: Utc::now().trunc_subsecs(6),
            created_by: created_by.clone(),
            description: options.description.unwrap_or_default(),
            is_active: true,
            storage_location: location.display().to_string(),
            original_size: full_bytes.len() as u64,
            compressed_size: blob.bytes.len() as u64,
            branch_name: branch_name.clone(),
        };

        // The blob is durable before the row that points at it is committed.
        // The parent is re-checked under the catalog lock so a concurrent
        // cleanup cannot retire it between reconstruction and insert.
        let row = version.clone();
        let required_parent = version
            .version_type
            .stores_diff()
            .then(|| version.parent_version.clone())
            .flatten();
        let check_parent = required_parent.clone();
        let inserted = self.with_catalog(move |c| {
            if let Some(parent) = &check_parent {
                if !c.is_active(parent)? {
                    return Ok(false);
                }
            }
            c.insert_version(&row)?;
            match branch {
                None => c.upsert_branch(&Branch {
                    branch_name: row.branch_name.clone(),
                    base_version: Some(row.version_id.clone()),
                    head_version: Some(row.version_id.clone()),
                    created_at: row.created_at,
                    created_by,
                    description: String::new(),
                    is_merged: false,
                }),
                Some(_) if advance_head => c.set_branch_head(&row.branch_name, &row.version_id),
                Some(_) => Ok(()),
            }?;
            Ok(true)
        })
        .await?;

        if !inserted {
            let blobs = self.blobs.clone();
            let _ = self.pool.run(move || blobs.delete(&location)).await;
            return Err(StoreError::BrokenAncestry {
                version_id,
                missing_ancestor: required_parent.unwrap_or_default(),
            });
        }

        self.caches
            .put_payload(&version_id, payload, version.original_size);

        tracing::info!(
            "created {} version {} ({}) on {}: {} -> {} bytes via {}",
            version.version_type,
            version.version_id,
            version.version_number,
            version.branch_name,
            version.original_size,
            version.compressed_size,
            blob.codec
        );

        if self.config.auto_cleanup {
            if let Err(e) = self.cleanup_old_versions(self.config.max_versions_per_branch).await {
                tracing::warn!("retention after create failed: {}", e);
            }
        }

        Ok(CreateOutcome {
            status: CreateStatus::Created,
            version,
        })
    }

    /// Catalog metadata for a version, active or not.
    pub async fn get_version(&self, version_id: &str) -> Result<Option<Version>, StoreError> {
        let id = version_id.to_string();
        self.with_catalog(move |c| c.get_version(&id)).await
    }

    /// Reconstruct the full payload of an active version.
    pub async fn get_version_data(&self, version_id: &str) -> Result<Payload, StoreError> {
        let payload = self.reconstruct(version_id).await?;
        Ok(Arc::unwrap_or_clone(payload))
    }

    async fn require_active(&self, version_id: &str) -> Result<Version, StoreError> {
        match self.get_version(version_id).await? {
            Some(version) if version.is_active => Ok(version),
            _ => Err(StoreError::VersionNotFound(version_id.to_string())),
        }
    }

    /// Walk back to the nearest full or cached ancestor, then apply diffs forward.
    async fn reconstruct(&self, version_id: &str) -> Result<Arc<Payload>, StoreError> {
        let target = self.require_active(version_id).await?;

        let mut chain = Vec::new();
        let mut base = None;
        let mut current = target;
        loop {
            if let Some(cached) = self.caches.payload(&current.version_id) {
                tracing::debug!("version cache hit for {}", current.version_id);
                base = Some(cached);
                break;
            }
            let needs_parent = current.version_type.stores_diff();
            let parent_id = current.parent_version.clone();
            chain.push(current);
            if !needs_parent {
                break;
            }
            let broken = |missing: String| StoreError::BrokenAncestry {
                version_id: version_id.to_string(),
                missing_ancestor: missing,
            };
            let parent_id = parent_id.ok_or_else(|| broken("<none>".to_string()))?;
            current = match self.get_version(&parent_id).await? {
                Some(parent) if parent.is_active => parent,
                _ => return Err(broken(parent_id)),
            };
        }

        let mut payload = base;
        for version in chain.into_iter().rev() {
            let stored = match self.load_blob(&version).await {
                Err(StoreError::Blob(BlobError::NotFound(_))) if version.version_id != version_id => {
                    return Err(StoreError::BrokenAncestry {
                        version_id: version_id.to_string(),
                        missing_ancestor: version.version_id,
                    });
                }
                other => other?,
            };
            let next = match (stored, &payload) {
                (Stored::Full(full), _) => full,
                (Stored::Diff(delta), Some(parent)) => apply(parent, &delta),
                (Stored::Diff(_), None) => {
                    return Err(StoreError::Encoding(format!(
                        "version {} stores a diff but has no base",
                        version.version_id
                    )));
                }
            };

            if version.version_id == version_id {
                let expected = version.content_hash.clone();
                let check = Arc::new(next);
                let hashed = Arc::clone(&check);
                let actual = self
                    .pool
                    .run(move || content_hash(&hashed))
                    .await??;
                if actual != expected {
                    return Err(StoreError::Encoding(format!(
                        "content hash mismatch for {version_id}: expected {expected}, got {actual}"
                    )));
                }
                payload = Some(check);
            } else {
                payload = Some(Arc::new(next));
            }

            if let Some(p) = &payload {
                self.caches
                    .put_payload(&version.version_id, Arc::clone(p), version.original_size);
            }
        }

        payload.ok_or_else(|| StoreError::VersionNotFound(version_id.to_string()))
    }

    async fn load_blob(&self, version: &Version) -> Result<Stored, StoreError> {
        let blobs = self.blobs.clone();
        let location = PathBuf::from(&version.storage_location);
        let stores_diff = version.version_type.stores_diff();
        self.pool
            .run(move || -> Result<Stored, StoreError> {
                let raw = blobs.read(&location)?;
                let bytes = codec::decompress(&raw);
                if stores_diff {
                    Ok(Stored::Diff(from_cbor(&bytes)?))
                } else {
                    Ok(Stored::Full(Payload::from_cbor(&bytes)?))
                }
            })
            .await?
    }

    async fn write_blob(&self, version_id: &str, bytes: Vec<u8>) -> Result<PathBuf, StoreError> {
        let blobs = self.blobs.clone();
        let id = version_id.to_string();
        let location = self
            .pool
            .run(move || {
                blobs.write(&id, &bytes).or_else(|e| {
                    tracing::warn!("blob write for {} failed, retrying once: {}", id, e);
                    blobs.write(&id, &bytes)
                })
            })
            .await??;
        Ok(location)
    }

    /// Append a new full version whose content equals `target_version_id`.
    /// History is never truncated; the rollback is itself a version.
    pub async fn rollback_to_version(
        &self,
        target_version_id: &str,
        options: RollbackOptions,
    ) -> Result<RollbackOutcome, StoreError> {
        let target = self.require_active(target_version_id).await?;
        let payload = self.reconstruct(target_version_id).await?;

        let create = CreateOptions {
            branch: Some(options.branch.unwrap_or_else(|| target.branch_name.clone())),
            version_type: Some(VersionType::Full),
            parent_version: None,
            created_by: Some(options.created_by),
            description: Some(format!("Rollback to version {target_version_id}")),
            metadata: BTreeMap::from([
                ("rollback_target".to_string(), serde_json::json!(target_version_id)),
                ("rollback_reason".to_string(), serde_json::json!(options.reason)),
                ("original_branch".to_string(), serde_json::json!(target.branch_name)),
            ]),
        };

        let outcome = self
            .create_inner(payload, create, false, options.update_branch_head)
            .await?;

        tracing::info!(
            "rolled back to {} as new version {}",
            target_version_id,
            outcome.version.version_id
        );

        Ok(RollbackOutcome {
            rollback_version: outcome.version,
            target_version_id: target_version_id.to_string(),
            rolled_back_at: Utc::now(),
        })
    }

    /// Structural difference from version `from` to version `to`.
    pub async fn compare_versions(
        &self,
        from: &str,
        to: &str,
    ) -> Result<VersionComparison, StoreError> {
        self.require_active(from).await?;
        self.require_active(to).await?;

        let key = (from.to_string(), to.to_string());
        if let Some(hit) = self.caches.comparison(&key) {
            tracing::debug!("diff cache hit for {} -> {}", from, to);
            return Ok(hit);
        }

        let (f, t) = key.clone();
        if let Some(encoded) = self.with_catalog(move |c| c.get_diff(&f, &t)).await? {
            match from_cbor::<VersionComparison>(&encoded) {
                Ok(comparison) => {
                    self.caches
                        .put_comparison(key, comparison.clone(), encoded.len() as u64);
                    return Ok(comparison);
                }
                Err(e) => tracing::warn!("discarding unreadable cached diff {} -> {}: {}", from, to, e),
            }
        }

        let old = self.reconstruct(from).await?;
        let new = self.reconstruct(to).await?;
        let comparison = VersionComparison::new(from.to_string(), to.to_string(), diff(&old, &new));

        let encoded = to_cbor(&comparison)?;
        let encoded_len = encoded.len() as u64;
        let (f, t) = key.clone();
        let diff_id = Ulid::new().to_string();
        if let Err(e) = self
            .with_catalog(move |c| c.put_diff(&diff_id, &f, &t, &encoded))
            .await
        {
            tracing::warn!("could not persist diff {} -> {}: {}", from, to, e);
        }

        self.caches.put_comparison(key, comparison.clone(), encoded_len);
        Ok(comparison)
    }

    /// Active versions newest-first. `None` lists every branch.
    pub async fn list_versions(
        &self,
        branch: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<VersionPage, StoreError> {
        let b = branch.map(str::to_string);
        let (versions, total_count) = self
            .with_catalog(move |c| {
                let versions = c.list_versions(b.as_deref(), limit, offset)?;
                let total = c.count_active(b.as_deref())?;
                Ok((versions, total))
            })
            .await?;

        Ok(VersionPage {
            versions,
            total_count,
            limit,
            offset,
            branch: branch.map(str::to_string),
        })
    }

    /// Fork a new branch whose head starts at `from_version`.
    pub async fn create_branch(
        &self,
        branch_name: &str,
        from_version: &str,
        created_by: &str,
        description: &str,
    ) -> Result<Branch, StoreError> {
        self.require_active(from_version).await?;

        let branch = Branch {
            branch_name: branch_name.to_string(),
            base_version: Some(from_version.to_string()),
            head_version: Some(from_version.to_string()),
            created_at: Utc::now(),
            created_by: created_by.to_string(),
            description: description.to_string(),
            is_merged: false,
        };

        let row = branch.clone();
        let created = self
            .with_catalog(move |c| {
                if c.get_branch(&row.branch_name)?.is_some() {
                    return Ok(false);
                }
                c.upsert_branch(&row)?;
                Ok(true)
            })
            .await?;
        if !created {
            return Err(StoreError::BranchExists(branch_name.to_string()));
        }

        tracing::info!("created branch {} from {}", branch_name, from_version);
        Ok(branch)
    }

    pub async fn get_branch(&self, branch_name: &str) -> Result<Option<Branch>, StoreError> {
        let name = branch_name.to_string();
        self.with_catalog(move |c| c.get_branch(&name)).await
    }

    pub async fn list_branches(&self) -> Result<Vec<Branch>, StoreError> {
        self.with_catalog(|c| c.list_branches()).await
    }

    /// Bound every branch to `max_versions_per_branch` active versions.
    ///
    /// Oldest versions go first, except branch heads and any version an
    /// active incremental chain still needs, which are never evicted. Also
    /// removes orphan blobs older than the configured grace period.
    pub async fn cleanup_old_versions(
        &self,
        max_versions_per_branch: usize,
    ) -> Result<CleanupReport, StoreError> {
        let (evictions, skipped) = self
            .with_catalog(move |c| select_evictions(c, max_versions_per_branch))
            .await?;

        let mut report = CleanupReport {
            skipped_branches: skipped,
            ..CleanupReport::default()
        };
        for skip in &report.skipped_branches {
            tracing::warn!(
                "cleanup skipped on {}: {} of {} excess versions still have live descendants",
                skip.branch_name,
                skip.excess - skip.evicted,
                skip.excess
            );
        }

        for version in evictions {
            let id = version.version_id.clone();
            // Row first: a crash afterwards leaves an orphan blob, never a dangling row.
            if !self.with_catalog(move |c| c.mark_inactive(&id)).await? {
                tracing::warn!(
                    "version {} became a head or gained a dependent, keeping it",
                    version.version_id
                );
                continue;
            }

            let blobs = self.blobs.clone();
            let location = PathBuf::from(&version.storage_location);
            if let Err(e) = self.pool.run(move || blobs.delete(&location)).await? {
                tracing::warn!("could not delete blob of {}: {}", version.version_id, e);
            }
            tracing::info!(
                "evicted version {} ({}) from {}",
                version.version_id,
                version.version_number,
                version.branch_name
            );
            report.evicted.push(version.version_id);
        }

        if !report.evicted.is_empty() {
            self.caches.forget(&report.evicted);
        }

        report.orphans_removed = self.sweep_orphans().await?;
        Ok(report)
    }

    /// Delete blobs with no active catalog row.
    async fn sweep_orphans(&self) -> Result<usize, StoreError> {
        let live: HashSet<String> = self
            .with_catalog(|c| {
                Ok(c.all_active_versions()?
                    .into_iter()
                    .map(|v| v.version_id)
                    .collect())
            })
            .await?;

        let blobs = self.blobs.clone();
        let grace = self.config.orphan_grace;
        let removed = self
            .pool
            .run(move || -> Result<usize, BlobError> {
                let mut removed = 0;
                for (id, path) in blobs.list_older_than(grace)? {
                    let is_blob = path.extension().is_some_and(|e| e == "blob");
                    if is_blob && live.contains(&id) {
                        continue;
                    }
                    if blobs.delete(&path)? {
                        tracing::warn!("removed orphan blob {}", path.display());
                        removed += 1;
                    }
                }
                Ok(removed)
            })
            .await??;
        Ok(removed)
    }

    /// Drop every cached payload and diff.
    pub fn clear_caches(&self) {
        self.caches.clear();
    }

    async fn with_catalog<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Catalog) -> Result<T, CatalogError> + Send + 'static,
        T: Send + 'static,
    {
        let catalog = Arc::clone(&self.catalog);
        let result = self
            .pool
            .run(move || {
                let guard = catalog.lock().unwrap_or_else(PoisonError::into_inner);
                f(&guard)
            })
            .await?;
        Ok(result?)
    }
}

/// Choose which versions retention may evict, oldest first per branch.
fn select_evictions(
    catalog: &Catalog,
    max_versions_per_branch: usize,
) -> Result<(Vec<Version>, Vec<SkippedBranch>), CatalogError> {
    let counts = catalog.active_counts_by_branch()?;
    if counts.values().all(|&n| n <= max_versions_per_branch) {
        return Ok((Vec::new(), Vec::new()));
    }

    let active: HashMap<String, Version> = catalog
        .all_active_versions()?
        .into_iter()
        .map(|v| (v.version_id.clone(), v))
        .collect();

    let mut protected: HashSet<String> = catalog
        .list_branches()?
        .into_iter()
        .filter_map(|b| b.head_version)
        .collect();
    for version in active.values() {
        let mut current = version;
        while current.version_type.stores_diff() {
            let Some(parent) = current
                .parent_version
                .as_ref()
                .and_then(|id| active.get(id))
            else {
                break;
            };
            protected.insert(parent.version_id.clone());
            current = parent;
        }
    }

    let mut evictions = Vec::new();
    let mut skipped = Vec::new();
    for (branch, count) in counts {
        if count <= max_versions_per_branch {
            continue;
        }
        let excess = count - max_versions_per_branch;
        let candidates: Vec<Version> = catalog
            .active_versions(&branch)?
            .into_iter()
            .filter(|v| !protected.contains(&v.version_id))
            .take(excess)
            .collect();
        if candidates.len() < excess {
            skipped.push(SkippedBranch {
                branch_name: branch,
                excess,
                evicted: candidates.len(),
            });
        }
        evictions.extend(candidates);
    }

    Ok((evictions, skipped))
}
