// ABOUTME: Configuration for a snapshot store instance: storage root, retention, codecs, workers.
// ABOUTME: Built explicitly with defaults or loaded from SNAPVAULT_* environment variables.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::codec::CompressionPolicy;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Configuration for one [`crate::SnapshotStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory holding `catalog.db` and `blobs/`.
    pub home: PathBuf,
    pub default_branch: String,
    pub max_versions_per_branch: usize,
    /// Run retention after every successful create.
    pub auto_cleanup: bool,
    pub compression: CompressionPolicy,
    pub compression_level: i32,
    /// Upper bound on concurrently running blocking jobs.
    pub max_workers: usize,
    /// Orphan blobs younger than this are left alone by cleanup.
    pub orphan_grace: Duration,
    /// Byte budget of each in-process cache, measured in encoded size.
    pub cache_capacity: u64,
}

impl StoreConfig {
    /// Defaults rooted at `home`.
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            default_branch: "main".to_string(),
            max_versions_per_branch: 100,
            auto_cleanup: true,
            compression: CompressionPolicy::Auto,
            compression_level: 6,
            max_workers: 4,
            orphan_grace: Duration::from_secs(3600),
            cache_capacity: 64 * 1024 * 1024,
        }
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.home.join("catalog.db")
    }

    pub fn blob_root(&self) -> PathBuf {
        self.home.join("blobs")
    }

    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - SNAPVAULT_HOME: data directory (default: ~/.snapvault)
    /// - SNAPVAULT_BRANCH: default branch name (default: main)
    /// - SNAPVAULT_MAX_VERSIONS: active versions kept per branch (default: 100)
    /// - SNAPVAULT_AUTO_CLEANUP: run retention after each create (default: true)
    /// - SNAPVAULT_COMPRESSION: auto, none, lz4, zstd or gzip (default: auto)
    /// - SNAPVAULT_COMPRESSION_LEVEL: codec level (default: 6)
    /// - SNAPVAULT_MAX_WORKERS: blocking worker limit (default: 4)
    /// - SNAPVAULT_CACHE_BYTES: byte budget per cache (default: 64 MiB)
    pub fn from_env() -> Result<Self, ConfigError> {
        let home = std::env::var("SNAPVAULT_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::var("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("/tmp"))
                    .join(".snapvault")
            });

        let mut config = Self::new(home);

        if let Some(branch) = non_empty_var("SNAPVAULT_BRANCH") {
            config.default_branch = branch;
        }

        if let Some(raw) = non_empty_var("SNAPVAULT_MAX_VERSIONS") {
            config.max_versions_per_branch = parse_positive("SNAPVAULT_MAX_VERSIONS", raw)?;
        }

        if let Some(raw) = non_empty_var("SNAPVAULT_AUTO_CLEANUP") {
            config.auto_cleanup = match raw.as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "SNAPVAULT_AUTO_CLEANUP",
                        value: raw,
                        reason: "expected true or false".to_string(),
                    });
                }
            };
        }

        if let Some(raw) = non_empty_var("SNAPVAULT_COMPRESSION") {
            config.compression = raw.parse().map_err(|reason| ConfigError::Invalid {
                name: "SNAPVAULT_COMPRESSION",
                value: raw.clone(),
                reason,
            })?;
        }

        if let Some(raw) = non_empty_var("SNAPVAULT_COMPRESSION_LEVEL") {
            config.compression_level = raw.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Invalid {
                    name: "SNAPVAULT_COMPRESSION_LEVEL",
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?;
        }

        if let Some(raw) = non_empty_var("SNAPVAULT_MAX_WORKERS") {
            config.max_workers = parse_positive("SNAPVAULT_MAX_WORKERS", raw)?;
        }

        if let Some(raw) = non_empty_var("SNAPVAULT_CACHE_BYTES") {
            config.cache_capacity = parse_positive("SNAPVAULT_CACHE_BYTES", raw)? as u64;
        }

        Ok(config)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_positive(name: &'static str, raw: String) -> Result<usize, ConfigError> {
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        Ok(_) => Err(ConfigError::Invalid {
            name,
            value: raw,
            reason: "must be at least 1".to_string(),
        }),
        Err(e) => Err(ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value: raw,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;

    const VARS: [&str; 8] = [
        "SNAPVAULT_HOME",
        "SNAPVAULT_BRANCH",
        "SNAPVAULT_MAX_VERSIONS",
        "SNAPVAULT_AUTO_CLEANUP",
        "SNAPVAULT_COMPRESSION",
        "SNAPVAULT_COMPRESSION_LEVEL",
        "SNAPVAULT_MAX_WORKERS",
        "SNAPVAULT_CACHE_BYTES",
    ];

    fn clear_env() {
        // SAFETY: test-only code; config tests run in one function to avoid env races
        unsafe {
            for var in VARS {
                std::env::remove_var(var);
            }
        }
    }

    #[test]
    fn config_from_env() {
        clear_env();
        let config = StoreConfig::from_env().unwrap();
        assert!(config.home.to_string_lossy().contains(".snapvault"));
        assert_eq!(config.default_branch, "main");
        assert_eq!(config.max_versions_per_branch, 100);
        assert!(config.auto_cleanup);
        assert_eq!(config.compression, CompressionPolicy::Auto);
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.cache_capacity, 64 * 1024 * 1024);

        // SAFETY: test-only code, see clear_env
        unsafe {
            std::env::set_var("SNAPVAULT_HOME", "/var/lib/snapvault");
            std::env::set_var("SNAPVAULT_MAX_VERSIONS", "5");
            std::env::set_var("SNAPVAULT_AUTO_CLEANUP", "no");
            std::env::set_var("SNAPVAULT_COMPRESSION", "zstd");
            std::env::set_var("SNAPVAULT_CACHE_BYTES", "65536");
        }
        let config = StoreConfig::from_env().unwrap();
        assert_eq!(config.home, PathBuf::from("/var/lib/snapvault"));
        assert_eq!(config.catalog_path(), PathBuf::from("/var/lib/snapvault/catalog.db"));
        assert_eq!(config.max_versions_per_branch, 5);
        assert!(!config.auto_cleanup);
        assert_eq!(config.compression, CompressionPolicy::Fixed(Codec::Zstd));
        assert_eq!(config.cache_capacity, 65536);

        // SAFETY: test-only code, see clear_env
        unsafe {
            std::env::set_var("SNAPVAULT_MAX_VERSIONS", "0");
        }
        let err = StoreConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("SNAPVAULT_MAX_VERSIONS"), "{err}");

        // SAFETY: test-only code, see clear_env
        unsafe {
            std::env::set_var("SNAPVAULT_MAX_VERSIONS", "3");
            std::env::set_var("SNAPVAULT_COMPRESSION", "brotli");
        }
        let err = StoreConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("brotli"), "{err}");

        clear_env();
    }
}
