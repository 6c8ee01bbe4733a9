//! Keep-candidate selection within a duplicate group.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Which member of a group survives a cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeepPolicy {
    /// Earliest mtime wins; ties by shortest path, then lexicographic.
    Oldest,
    /// Shortest path wins; ties lexicographic.
    ShortestPath,
    /// An explicit caller choice; falls back to [`Oldest`](Self::Oldest)
    /// when the path is not in the group.
    Explicit(PathBuf),
}

impl Default for KeepPolicy {
    fn default() -> Self {
        Self::Oldest
    }
}

/// Select the member to keep from a group of paths.
///
/// Panics on an empty slice in debug builds only through indexing; callers
/// guarantee groups have at least two members.
pub fn pick_keep_candidate(paths: &[PathBuf], policy: &KeepPolicy) -> PathBuf {
    match policy {
        KeepPolicy::Explicit(choice) => {
            if paths.iter().any(|p| p == choice) {
                return choice.clone();
            }
            pick_keep_candidate(paths, &KeepPolicy::Oldest)
        }
        KeepPolicy::Oldest => paths
            .iter()
            .min_by(|a, b| {
                mtime(a)
                    .cmp(&mtime(b))
                    .then_with(|| path_len(a).cmp(&path_len(b)))
                    .then_with(|| a.cmp(b))
            })
            .cloned()
            .unwrap_or_default(),
        KeepPolicy::ShortestPath => paths
            .iter()
            .min_by(|a, b| path_len(a).cmp(&path_len(b)).then_with(|| a.cmp(b)))
            .cloned()
            .unwrap_or_default(),
    }
}

fn mtime(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

fn path_len(path: &Path) -> usize {
    path.as_os_str().len()
}
