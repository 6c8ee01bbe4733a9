//! File records produced by the walker.

use std::path::PathBuf;
use std::time::SystemTime;

/// Type tag for a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Regular file.
    File,
    /// Directory (only emitted for aggregated subtrees).
    Directory,
    /// Symbolic link that was not followed.
    Symlink,
    /// Sockets, devices, and other special files.
    Other,
}

/// A single sized filesystem entry.
///
/// Ephemeral: produced by the walker, folded into the inventory, then
/// dropped.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Absolute path.
    pub path: PathBuf,
    /// Size in bytes (aggregate for directory records).
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
    /// Entry type.
    pub kind: RecordKind,
}

impl FileRecord {
    /// Create a file record.
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: SystemTime, kind: RecordKind) -> Self {
        Self {
            path: path.into(),
            size,
            modified,
            kind,
        }
    }

    /// Days elapsed since the last modification.
    pub fn staleness_days(&self, now: SystemTime) -> u64 {
        now.duration_since(self.modified)
            .map(|d| d.as_secs() / 86_400)
            .unwrap_or(0)
    }
}
