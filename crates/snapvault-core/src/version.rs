// ABOUTME: Version and branch records describing stored snapshots and their lineage.
// ABOUTME: Includes the vMAJOR.MINOR.PATCH version number type and version type enum.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a version's blob relates to its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionType {
    Full,
    Incremental,
    Delta,
    Branch,
    Tag,
}

impl VersionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionType::Full => "full",
            VersionType::Incremental => "incremental",
            VersionType::Delta => "delta",
            VersionType::Branch => "branch",
            VersionType::Tag => "tag",
        }
    }

    /// Whether the stored blob is a diff against the parent rather than a full payload.
    pub fn stores_diff(&self) -> bool {
        matches!(self, VersionType::Incremental | VersionType::Delta)
    }
}

impl fmt::Display for VersionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown version type: {0}")]
pub struct UnknownVersionType(pub String);

impl FromStr for VersionType {
    type Err = UnknownVersionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(VersionType::Full),
            "incremental" => Ok(VersionType::Incremental),
            "delta" => Ok(VersionType::Delta),
            "branch" => Ok(VersionType::Branch),
            "tag" => Ok(VersionType::Tag),
            other => Err(UnknownVersionType(other.to_string())),
        }
    }
}

/// Human-readable version number in `vMAJOR.MINOR.PATCH` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionNumber {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl VersionNumber {
    pub const INITIAL: VersionNumber = VersionNumber {
        major: 1,
        minor: 0,
        patch: 0,
    };

    /// The following patch number, or None once the patch component is exhausted.
    pub fn next_patch(self) -> Option<Self> {
        Some(Self {
            patch: self.patch.checked_add(1)?,
            ..self
        })
    }

    /// Parse `vMAJOR.MINOR.PATCH`. Returns None for anything else.
    pub fn parse(s: &str) -> Option<Self> {
        let rest = s.strip_prefix('v')?;
        let mut parts = rest.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            major,
            minor,
            patch,
        })
    }
}

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// One immutable stored snapshot or delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub version_id: String,
    pub version_number: String,
    pub version_type: VersionType,
    pub parent_version: Option<String>,
    /// Digest of the full logical payload, never of the stored diff.
    pub content_hash: String,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub description: String,
    pub is_active: bool,
    pub storage_location: String,
    pub original_size: u64,
    pub compressed_size: u64,
    pub branch_name: String,
}

impl Version {
    pub fn compression_ratio(&self) -> f64 {
        if self.original_size == 0 {
            0.0
        } else {
            self.compressed_size as f64 / self.original_size as f64
        }
    }
}

/// A named lineage of versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub branch_name: String,
    pub base_version: Option<String>,
    pub head_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub description: String,
    pub is_merged: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_number_parse_and_bump() {
        let n = VersionNumber::parse("v1.2.9").unwrap();
        assert_eq!(n.next_patch().unwrap().to_string(), "v1.2.10");

        let last = VersionNumber::parse("v1.0.4294967295").unwrap();
        assert!(last.next_patch().is_none());
        assert_eq!(VersionNumber::INITIAL.to_string(), "v1.0.0");
    }

    #[test]
    fn version_number_rejects_malformed() {
        assert!(VersionNumber::parse("1.0.0").is_none());
        assert!(VersionNumber::parse("v1.0").is_none());
        assert!(VersionNumber::parse("v1.0.0.1").is_none());
        assert!(VersionNumber::parse("rollback_v1").is_none());
    }

    #[test]
    fn version_number_orders_numerically() {
        let a = VersionNumber::parse("v1.0.9").unwrap();
        let b = VersionNumber::parse("v1.0.10").unwrap();
        assert!(b > a);
    }

    #[test]
    fn version_type_string_round_trip() {
        for vt in [
            VersionType::Full,
            VersionType::Incremental,
            VersionType::Delta,
            VersionType::Branch,
            VersionType::Tag,
        ] {
            assert_eq!(vt.as_str().parse::<VersionType>().unwrap(), vt);
        }
        assert!("snapshot".parse::<VersionType>().is_err());
        assert!(VersionType::Delta.stores_diff());
        assert!(!VersionType::Tag.stores_diff());
    }
}
