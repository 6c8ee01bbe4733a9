//! Scan result cache.
//!
//! Re-walking every target on each scan is wasteful when nothing changed.
//! The cache keys each scanned root by its directory mtime; a hit reuses the
//! previous size and count without touching the subtree.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tidymac_core::{Result, TidyError};

/// Cached outcome for one scanned root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub path: PathBuf,
    /// Root directory mtime at scan time, seconds since the epoch.
    pub mtime_secs: u64,
    pub size_bytes: u64,
    pub file_count: u64,
}

/// Hit accounting, reported with scan results.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidated: u64,
}

/// Profile-keyed scan cache persisted as JSON in the state directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanCache {
    pub profile: String,
    pub updated_at: DateTime<Utc>,
    pub entries: HashMap<PathBuf, CacheEntry>,
    #[serde(default)]
    pub stats: CacheStats,
}

impl ScanCache {
    /// An empty cache for a profile.
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            updated_at: Utc::now(),
            entries: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Load from disk; `None` when missing, unparseable, or built for a
    /// different profile.
    pub fn load(path: &Path, profile: &str) -> Option<Self> {
        let contents = std::fs::read_to_string(path).ok()?;
        let cache: ScanCache = serde_json::from_str(&contents).ok()?;
        (cache.profile == profile).then_some(cache)
    }

    /// Persist to disk.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.updated_at = Utc::now();
        let json = serde_json::to_string(self).map_err(|e| TidyError::Other {
            message: format!("failed to serialize scan cache: {e}"),
        })?;
        std::fs::write(path, json).map_err(|e| TidyError::io(path, e))
    }

    /// Return the cached entry for `root` if its mtime is unchanged.
    pub fn check(&mut self, root: &Path) -> Option<CacheEntry> {
        let current = dir_mtime_secs(root)?;
        match self.entries.get(root) {
            Some(entry) if entry.mtime_secs == current => {
                self.stats.hits += 1;
                Some(entry.clone())
            }
            Some(_) => {
                self.stats.invalidated += 1;
                None
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Store a fresh outcome for `root`.
    pub fn store(&mut self, root: &Path, size_bytes: u64, file_count: u64) {
        let mtime_secs = dir_mtime_secs(root).unwrap_or(0);
        self.entries.insert(
            root.to_path_buf(),
            CacheEntry {
                path: root.to_path_buf(),
                mtime_secs,
                size_bytes,
                file_count,
            },
        );
    }

    /// Drop a root from the cache (after cleaning under it).
    pub fn invalidate(&mut self, root: &Path) {
        self.entries.remove(root);
    }
}

fn dir_mtime_secs(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .ok()?
        .modified()
        .ok()?
        .duration_since(SystemTime::UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}
