// ABOUTME: SQLite-backed version catalog recording versions, branches, and cached diffs.
// ABOUTME: Assigns version numbers, resolves versions by id or hash, and pages listings newest-first.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use snapvault_core::{Branch, Version, VersionNumber};
use thiserror::Error;

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("version numbers exhausted on branch {0}")]
    NumberingExhausted(String),
}

const VERSION_COLUMNS: &str = "version_id, version_number, version_type, parent_version, content_hash,
     metadata_json, created_at, created_by, description, is_active, blob_location,
     compressed_size, original_size, branch_name";

const BRANCH_COLUMNS: &str =
    "branch_name, base_version, head_version, created_at, created_by, description, is_merged";

/// Relational metadata store for versions, branches, and diffs.
///
/// The catalog never holds payload bytes; those live in the blob store.
/// Rows are never physically deleted, only marked inactive.
pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Open or create a catalog database at the given path.
    /// Runs migrations to ensure the schema is up to date.
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS versions (
                version_id TEXT PRIMARY KEY,
                version_number TEXT NOT NULL,
                version_type TEXT NOT NULL,
                parent_version TEXT,
                content_hash TEXT NOT NULL,
                metadata_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                created_by TEXT NOT NULL,
                description TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                blob_location TEXT NOT NULL,
                compressed_size INTEGER NOT NULL,
                original_size INTEGER NOT NULL,
                branch_name TEXT NOT NULL,
                FOREIGN KEY (parent_version) REFERENCES versions(version_id)
            );

            CREATE TABLE IF NOT EXISTS branches (
                branch_name TEXT PRIMARY KEY,
                base_version TEXT,
                head_version TEXT,
                created_at TEXT NOT NULL,
                created_by TEXT NOT NULL,
                description TEXT NOT NULL,
                is_merged INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (base_version) REFERENCES versions(version_id),
                FOREIGN KEY (head_version) REFERENCES versions(version_id)
            );

            CREATE TABLE IF NOT EXISTS diffs (
                diff_id TEXT PRIMARY KEY,
                from_version TEXT NOT NULL,
                to_version TEXT NOT NULL,
                diff_data BLOB NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (from_version) REFERENCES versions(version_id),
                FOREIGN KEY (to_version) REFERENCES versions(version_id)
            );

            CREATE INDEX IF NOT EXISTS idx_versions_branch ON versions (branch_name);
            CREATE INDEX IF NOT EXISTS idx_versions_hash ON versions (content_hash);
            CREATE INDEX IF NOT EXISTS idx_versions_created ON versions (created_at);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_diffs_pair ON diffs (from_version, to_version);",
        )?;

        Ok(Self { conn })
    }

    /// Insert a new version row. Versions are immutable, so this is never an update.
    pub fn insert_version(&self, version: &Version) -> Result<(), CatalogError> {
        self.conn.execute(
            "INSERT INTO versions (version_id, version_number, version_type, parent_version,
                content_hash, metadata_json, created_at, created_by, description, is_active,
                blob_location, compressed_size, original_size, branch_name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                version.version_id,
                version.version_number,
                version.version_type.as_str(),
                version.parent_version,
                version.content_hash,
                serde_json::to_string(&version.metadata)?,
                timestamp(&version.created_at),
                version.created_by,
                version.description,
                version.is_active,
                version.storage_location,
                version.compressed_size as i64,
                version.original_size as i64,
                version.branch_name,
            ],
        )?;
        Ok(())
    }

    /// Look up a version by id, active or not.
    pub fn get_version(&self, version_id: &str) -> Result<Option<Version>, CatalogError> {
        let sql = format!("SELECT {VERSION_COLUMNS} FROM versions WHERE version_id = ?1");
        let version = self
            .conn
            .query_row(&sql, params![version_id], version_from_row)
            .optional()?;
        Ok(version)
    }

    /// Most recent active version on `branch` with the given content hash.
    pub fn find_active_by_hash(
        &self,
        branch: &str,
        content_hash: &str,
    ) -> Result<Option<Version>, CatalogError> {
        let sql = format!(
            "SELECT {VERSION_COLUMNS} FROM versions
             WHERE content_hash = ?1 AND branch_name = ?2 AND is_active = 1
             ORDER BY created_at DESC, rowid DESC LIMIT 1"
        );
        let version = self
            .conn
            .query_row(&sql, params![content_hash, branch], version_from_row)
            .optional()?;
        Ok(version)
    }

    /// Active versions newest-first, optionally restricted to one branch.
    pub fn list_versions(
        &self,
        branch: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Version>, CatalogError> {
        let sql = format!(
            "SELECT {VERSION_COLUMNS} FROM versions
             WHERE is_active = 1 AND (?1 IS NULL OR branch_name = ?1)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2 OFFSET ?3"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![branch, limit as i64, offset as i64],
            version_from_row,
        )?;

        let mut versions = Vec::new();
        for row in rows {
            versions.push(row?);
        }
        Ok(versions)
    }

    /// Number of active versions, optionally restricted to one branch.
    pub fn count_active(&self, branch: Option<&str>) -> Result<usize, CatalogError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM versions WHERE is_active = 1 AND (?1 IS NULL OR branch_name = ?1)",
            params![branch],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Active versions on `branch`, oldest first.
    pub fn active_versions(&self, branch: &str) -> Result<Vec<Version>, CatalogError> {
        let sql = format!(
            "SELECT {VERSION_COLUMNS} FROM versions
             WHERE is_active = 1 AND branch_name = ?1
             ORDER BY created_at ASC, rowid ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![branch], version_from_row)?;

        let mut versions = Vec::new();
        for row in rows {
            versions.push(row?);
        }
        Ok(versions)
    }

    /// Every active version across all branches.
    pub fn all_active_versions(&self) -> Result<Vec<Version>, CatalogError> {
        let sql = format!("SELECT {VERSION_COLUMNS} FROM versions WHERE is_active = 1");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], version_from_row)?;

        let mut versions = Vec::new();
        for row in rows {
            versions.push(row?);
        }
        Ok(versions)
    }

    /// Ids of every version row ever written, active or not.
    pub fn all_version_ids(&self) -> Result<HashSet<String>, CatalogError> {
        let mut stmt = self.conn.prepare("SELECT version_id FROM versions")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut ids = HashSet::new();
        for row in rows {
            ids.insert(row?);
        }
        Ok(ids)
    }

    /// Active version counts per branch, for retention.
    pub fn active_counts_by_branch(&self) -> Result<BTreeMap<String, usize>, CatalogError> {
        let mut stmt = self.conn.prepare(
            "SELECT branch_name, COUNT(*) FROM versions WHERE is_active = 1 GROUP BY branch_name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (branch, count) = row?;
            counts.insert(branch, count as usize);
        }
        Ok(counts)
    }

    /// Next version number on `branch`: the highest number ever assigned there
    /// with its patch component incremented, or `v1.0.0` for a new branch.
    pub fn next_version_number(&self, branch: &str) -> Result<String, CatalogError> {
        let mut stmt = self
            .conn
            .prepare("SELECT version_number FROM versions WHERE branch_name = ?1")?;
        let rows = stmt.query_map(params![branch], |row| row.get::<_, String>(0))?;

        let mut highest: Option<VersionNumber> = None;
        for row in rows {
            let number = row?;
            match VersionNumber::parse(&number) {
                Some(parsed) => highest = highest.max(Some(parsed)),
                None => tracing::warn!("ignoring malformed version number {:?} on {}", number, branch),
            }
        }

        let next = match highest {
            None => VersionNumber::INITIAL,
            Some(number) => number
                .next_patch()
                .ok_or_else(|| CatalogError::NumberingExhausted(branch.to_string()))?,
        };
        Ok(next.to_string())
    }

    /// Soft-delete a version. Returns false if it was already inactive or absent,
    /// or if it is still a branch head or the parent of an active diff-stored version.
    pub fn mark_inactive(&self, version_id: &str) -> Result<bool, CatalogError> {
        let changed = self.conn.execute(
            "UPDATE versions SET is_active = 0
             WHERE version_id = ?1 AND is_active = 1
               AND NOT EXISTS (SELECT 1 FROM branches WHERE head_version = ?1)
               AND NOT EXISTS (
                   SELECT 1 FROM versions d
                   WHERE d.parent_version = ?1 AND d.is_active = 1
                     AND d.version_type IN ('incremental', 'delta'))",
            params![version_id],
        )?;
        Ok(changed > 0)
    }

    pub fn is_active(&self, version_id: &str) -> Result<bool, CatalogError> {
        let active = self
            .conn
            .query_row(
                "SELECT is_active FROM versions WHERE version_id = ?1",
                params![version_id],
                |row| row.get::<_, bool>(0),
            )
            .optional()?;
        Ok(active.unwrap_or(false))
    }

    /// Upsert a branch row.
    pub fn upsert_branch(&self, branch: &Branch) -> Result<(), CatalogError> {
        self.conn.execute(
            "INSERT INTO branches (branch_name, base_version, head_version, created_at,
                created_by, description, is_merged)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(branch_name) DO UPDATE SET
                base_version = excluded.base_version,
                head_version = excluded.head_version,
                description = excluded.description,
                is_merged = excluded.is_merged",
            params![
                branch.branch_name,
                branch.base_version,
                branch.head_version,
                timestamp(&branch.created_at),
                branch.created_by,
                branch.description,
                branch.is_merged,
            ],
        )?;
        Ok(())
    }

    pub fn get_branch(&self, branch_name: &str) -> Result<Option<Branch>, CatalogError> {
        let sql = format!("SELECT {BRANCH_COLUMNS} FROM branches WHERE branch_name = ?1");
        let branch = self
            .conn
            .query_row(&sql, params![branch_name], branch_from_row)
            .optional()?;
        Ok(branch)
    }

    pub fn list_branches(&self) -> Result<Vec<Branch>, CatalogError> {
        let sql = format!("SELECT {BRANCH_COLUMNS} FROM branches ORDER BY created_at ASC, rowid ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], branch_from_row)?;

        let mut branches = Vec::new();
        for row in rows {
            branches.push(row?);
        }
        Ok(branches)
    }

    /// Point a branch's head at `head_version`, filling in the base on first use.
    pub fn set_branch_head(&self, branch_name: &str, head_version: &str) -> Result<(), CatalogError> {
        self.conn.execute(
            "UPDATE branches SET head_version = ?1, base_version = COALESCE(base_version, ?1)
             WHERE branch_name = ?2",
            params![head_version, branch_name],
        )?;
        Ok(())
    }

    /// Cache an encoded diff between two versions.
    pub fn put_diff(
        &self,
        diff_id: &str,
        from_version: &str,
        to_version: &str,
        diff_data: &[u8],
    ) -> Result<(), CatalogError> {
        self.conn.execute(
            "INSERT INTO diffs (diff_id, from_version, to_version, diff_data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(from_version, to_version) DO UPDATE SET
                diff_data = excluded.diff_data,
                created_at = excluded.created_at",
            params![diff_id, from_version, to_version, diff_data, timestamp(&Utc::now())],
        )?;
        Ok(())
    }

    pub fn get_diff(&self, from_version: &str, to_version: &str) -> Result<Option<Vec<u8>>, CatalogError> {
        let data = self
            .conn
            .query_row(
                "SELECT diff_data FROM diffs WHERE from_version = ?1 AND to_version = ?2",
                params![from_version, to_version],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(data)
    }
}

/// Fixed-width RFC 3339 so lexical order matches chronological order.
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<Version> {
    let version_type: String = row.get(2)?;
    let metadata_json: String = row.get(5)?;
    let created_at: String = row.get(6)?;
    let compressed_size: i64 = row.get(11)?;
    let original_size: i64 = row.get(12)?;

    Ok(Version {
        version_id: row.get(0)?,
        version_number: row.get(1)?,
        version_type: version_type.parse().map_err(|e| conversion_error(2, e))?,
        parent_version: row.get(3)?,
        content_hash: row.get(4)?,
        metadata: serde_json::from_str(&metadata_json).map_err(|e| conversion_error(5, e))?,
        created_at: parse_timestamp(6, &created_at)?,
        created_by: row.get(7)?,
        description: row.get(8)?,
        is_active: row.get(9)?,
        storage_location: row.get(10)?,
        compressed_size: compressed_size as u64,
        original_size: original_size as u64,
        branch_name: row.get(13)?,
    })
}

fn branch_from_row(row: &Row<'_>) -> rusqlite::Result<Branch> {
    let created_at: String = row.get(3)?;
    Ok(Branch {
        branch_name: row.get(0)?,
        base_version: row.get(1)?,
        head_version: row.get(2)?,
        created_at: parse_timestamp(3, &created_at)?,
        created_by: row.get(4)?,
        description: row.get(5)?,
        is_merged: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapvault_core::VersionType;
    use tempfile::TempDir;

    fn open_catalog(dir: &TempDir) -> Catalog {
        Catalog::open(&dir.path().join("catalog.db")).unwrap()
    }

    fn make_version(id: &str, number: &str, branch: &str, parent: Option<&str>) -> Version {
        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), serde_json::json!("test"));
        Version {
            version_id: id.to_string(),
            version_number: number.to_string(),
            version_type: VersionType::Full,
            parent_version: parent.map(str::to_string),
            content_hash: format!("hash-{id}"),
            metadata,
            created_at: Utc::now(),
            created_by: "tester".to_string(),
            description: String::new(),
            is_active: true,
            storage_location: format!("/blobs/{id}.blob"),
            original_size: 10,
            compressed_size: 15,
            branch_name: branch.to_string(),
        }
    }

    #[test]
    fn catalog_insert_and_get_version() {
        let dir = TempDir::new().unwrap();
        let catalog = open_catalog(&dir);

        let version = make_version("a", "v1.0.0", "main", None);
        catalog.insert_version(&version).unwrap();

        let loaded = catalog.get_version("a").unwrap().unwrap();
        assert_eq!(loaded.version_number, "v1.0.0");
        assert_eq!(loaded.metadata["source"], serde_json::json!("test"));
        assert_eq!(timestamp(&loaded.created_at), timestamp(&version.created_at));
        assert!(catalog.get_version("missing").unwrap().is_none());
    }

    #[test]
    fn catalog_rejects_dangling_parent() {
        let dir = TempDir::new().unwrap();
        let catalog = open_catalog(&dir);

        let orphan = make_version("b", "v1.0.0", "main", Some("nope"));
        assert!(catalog.insert_version(&orphan).is_err());
    }

    #[test]
    fn catalog_version_numbers_increment_per_branch() {
        let dir = TempDir::new().unwrap();
        let catalog = open_catalog(&dir);

        assert_eq!(catalog.next_version_number("main").unwrap(), "v1.0.0");
        catalog.insert_version(&make_version("a", "v1.0.0", "main", None)).unwrap();
        catalog.insert_version(&make_version("b", "v1.0.9", "main", Some("a"))).unwrap();
        catalog.insert_version(&make_version("c", "v1.0.10", "main", Some("b"))).unwrap();

        assert_eq!(catalog.next_version_number("main").unwrap(), "v1.0.11");
        assert_eq!(catalog.next_version_number("feature").unwrap(), "v1.0.0");

        // Inactive rows still count: numbers are never reused.
        catalog.mark_inactive("c").unwrap();
        assert_eq!(catalog.next_version_number("main").unwrap(), "v1.0.11");
    }

    #[test]
    fn catalog_lists_newest_first_with_paging() {
        let dir = TempDir::new().unwrap();
        let catalog = open_catalog(&dir);

        catalog.insert_version(&make_version("a", "v1.0.0", "main", None)).unwrap();
        catalog.insert_version(&make_version("b", "v1.0.1", "main", Some("a"))).unwrap();
        catalog.insert_version(&make_version("c", "v1.0.2", "main", Some("b"))).unwrap();
        catalog.insert_version(&make_version("x", "v1.0.0", "other", None)).unwrap();

        let page: Vec<_> = catalog
            .list_versions(Some("main"), 2, 0)
            .unwrap()
            .into_iter()
            .map(|v| v.version_id)
            .collect();
        assert_eq!(page, vec!["c", "b"]);

        let page: Vec<_> = catalog
            .list_versions(Some("main"), 2, 2)
            .unwrap()
            .into_iter()
            .map(|v| v.version_id)
            .collect();
        assert_eq!(page, vec!["a"]);

        assert_eq!(catalog.count_active(Some("main")).unwrap(), 3);
        assert_eq!(catalog.count_active(None).unwrap(), 4);
        assert_eq!(catalog.list_versions(None, 10, 0).unwrap().len(), 4);

        catalog.mark_inactive("b").unwrap();
        assert_eq!(catalog.count_active(Some("main")).unwrap(), 2);
        assert!(!catalog.mark_inactive("b").unwrap());

        let counts = catalog.active_counts_by_branch().unwrap();
        assert_eq!(counts["main"], 2);
        assert_eq!(counts["other"], 1);
    }

    #[test]
    fn catalog_finds_active_version_by_hash() {
        let dir = TempDir::new().unwrap();
        let catalog = open_catalog(&dir);

        catalog.insert_version(&make_version("a", "v1.0.0", "main", None)).unwrap();

        let found = catalog.find_active_by_hash("main", "hash-a").unwrap().unwrap();
        assert_eq!(found.version_id, "a");
        assert!(catalog.find_active_by_hash("other", "hash-a").unwrap().is_none());

        catalog.mark_inactive("a").unwrap();
        assert!(catalog.find_active_by_hash("main", "hash-a").unwrap().is_none());
    }

    #[test]
    fn catalog_branch_upsert_and_head_update() {
        let dir = TempDir::new().unwrap();
        let catalog = open_catalog(&dir);

        catalog
            .upsert_branch(&Branch {
                branch_name: "main".to_string(),
                base_version: None,
                head_version: None,
                created_at: Utc::now(),
                created_by: "system".to_string(),
                description: "main branch".to_string(),
                is_merged: false,
            })
            .unwrap();

        catalog.insert_version(&make_version("a", "v1.0.0", "main", None)).unwrap();
        catalog.set_branch_head("main", "a").unwrap();
        catalog.insert_version(&make_version("b", "v1.0.1", "main", Some("a"))).unwrap();
        catalog.set_branch_head("main", "b").unwrap();

        let branch = catalog.get_branch("main").unwrap().unwrap();
        assert_eq!(branch.base_version.as_deref(), Some("a"));
        assert_eq!(branch.head_version.as_deref(), Some("b"));
        assert_eq!(catalog.list_branches().unwrap().len(), 1);
        assert!(catalog.get_branch("nope").unwrap().is_none());
    }

    #[test]
    fn catalog_diff_cache_upserts() {
        let dir = TempDir::new().unwrap();
        let catalog = open_catalog(&dir);
        catalog.insert_version(&make_version("a", "v1.0.0", "main", None)).unwrap();
        catalog.insert_version(&make_version("b", "v1.0.1", "main", Some("a"))).unwrap();

        assert!(catalog.get_diff("a", "b").unwrap().is_none());
        catalog.put_diff("d1", "a", "b", b"first").unwrap();
        catalog.put_diff("d2", "a", "b", b"second").unwrap();

        assert_eq!(catalog.get_diff("a", "b").unwrap().unwrap(), b"second".to_vec());
        assert!(catalog.get_diff("b", "a").unwrap().is_none());
    }

    #[test]
    fn catalog_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let catalog = open_catalog(&dir);
            catalog.insert_version(&make_version("a", "v1.0.0", "main", None)).unwrap();
        }
        let catalog = open_catalog(&dir);
        assert!(catalog.get_version("a").unwrap().is_some());
        assert_eq!(catalog.all_version_ids().unwrap().len(), 1);
        assert_eq!(catalog.all_active_versions().unwrap().len(), 1);
        assert_eq!(catalog.active_versions("main").unwrap().len(), 1);
    }

    #[test]
    fn catalog_refuses_to_deactivate_needed_versions() {
        let dir = TempDir::new().unwrap();
        let catalog = open_catalog(&dir);

        catalog.insert_version(&make_version("a", "v1.0.0", "main", None)).unwrap();
        let mut child = make_version("b", "v1.0.1", "main", Some("a"));
        child.version_type = VersionType::Incremental;
        catalog.insert_version(&child).unwrap();
        catalog.insert_version(&make_version("c", "v1.0.2", "main", Some("b"))).unwrap();
        catalog
            .upsert_branch(&Branch {
                branch_name: "main".to_string(),
                base_version: Some("a".to_string()),
                head_version: Some("c".to_string()),
                created_at: Utc::now(),
                created_by: "system".to_string(),
                description: String::new(),
                is_merged: false,
            })
            .unwrap();

        // "a" reconstructs "b"; "c" is the head.
        assert!(!catalog.mark_inactive("a").unwrap());
        assert!(!catalog.mark_inactive("c").unwrap());
        assert!(catalog.is_active("a").unwrap());

        // A full child does not pin its lineage parent.
        assert!(catalog.mark_inactive("b").unwrap());
        assert!(!catalog.is_active("b").unwrap());
        assert!(catalog.mark_inactive("a").unwrap());
        assert!(!catalog.is_active("missing").unwrap());
    }

    #[test]
    fn catalog_numbering_stops_at_patch_limit() {
        let dir = TempDir::new().unwrap();
        let catalog = open_catalog(&dir);

        catalog
            .insert_version(&make_version("a", "v1.0.4294967295", "main", None))
            .unwrap();
        let err = catalog.next_version_number("main").unwrap_err();
        assert!(matches!(err, CatalogError::NumberingExhausted(ref b) if b == "main"));
    }
}
