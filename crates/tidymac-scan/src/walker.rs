//! Bounded-parallel directory traversal.
//!
//! Roots are walked in parallel on the rayon pool; within a root the
//! traversal is depth-first to bound memory. Symbolic links are followed
//! only when they resolve inside the same root's subtree, cycles are broken
//! by a per-walk (device, inode) set, and a per-target time budget halts a
//! runaway walk with a truncation warning.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use dashmap::DashSet;
use rayon::prelude::*;
use tracing::debug;
use walkdir::WalkDir;

use tidymac_core::{SafetyGuard, ScanWarning, WarningKind};

use crate::record::{FileRecord, RecordKind};

/// Default per-target walk budget.
pub const DEFAULT_WALK_BUDGET: Duration = Duration::from_secs(30);

/// Tracks (device, inode) pairs seen during one walk.
///
/// Serves two purposes: hardlinked files are counted once, and symlink
/// cycles cannot re-enter a directory that is already being traversed.
#[derive(Debug, Default)]
pub struct VisitedSet {
    seen: DashSet<(u64, u64)>,
}

impl VisitedSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pair. Returns `true` the first time it is seen.
    pub fn insert(&self, device: u64, inode: u64) -> bool {
        self.seen.insert((device, inode))
    }

    /// Number of unique pairs tracked.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether nothing has been tracked yet.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Options governing a walk.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Hard time budget per target root.
    pub budget: Duration,
    /// Only count files at least this large.
    pub min_size: Option<u64>,
    /// Only count files at least this stale.
    pub min_age_days: Option<u32>,
    /// Substring patterns excluded from the walk.
    pub exclude: Vec<String>,
    /// Cooperative cancellation flag, checked at entry boundaries.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            budget: DEFAULT_WALK_BUDGET,
            min_size: None,
            min_age_days: None,
            exclude: Vec::new(),
            cancel: None,
        }
    }
}

impl WalkOptions {
    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn excluded(&self, path: &Path) -> bool {
        if self.exclude.is_empty() {
            return false;
        }
        let s = path.to_string_lossy();
        self.exclude.iter().any(|p| s.contains(p.as_str()))
    }
}

/// Result of walking a single root.
#[derive(Debug)]
pub struct WalkOutcome {
    /// The root that was walked.
    pub root: PathBuf,
    /// Sized records for every counted file.
    pub records: Vec<FileRecord>,
    /// Sum of record sizes.
    pub bytes: u64,
    /// Number of file records.
    pub file_count: u64,
    /// Non-fatal errors encountered.
    pub warnings: Vec<ScanWarning>,
    /// Whether the time budget halted the walk early.
    pub truncated: bool,
}

impl WalkOutcome {
    fn empty(root: PathBuf) -> Self {
        Self {
            root,
            records: Vec::new(),
            bytes: 0,
            file_count: 0,
            warnings: Vec::new(),
            truncated: false,
        }
    }
}

/// Walk several roots in parallel.
pub fn walk_roots(roots: &[PathBuf], guard: &SafetyGuard, opts: &WalkOptions) -> Vec<WalkOutcome> {
    roots
        .par_iter()
        .map(|root| walk_root(root, guard, opts))
        .collect()
}

/// Walk one root depth-first.
pub fn walk_root(root: &Path, guard: &SafetyGuard, opts: &WalkOptions) -> WalkOutcome {
    let mut outcome = WalkOutcome::empty(root.to_path_buf());

    let canonical_root = match root.canonicalize() {
        Ok(p) => p,
        Err(e) => {
            outcome.warnings.push(ScanWarning::read_error(root, &e));
            return outcome;
        }
    };

    let start = Instant::now();
    let visited = VisitedSet::new();
    let now = SystemTime::now();

    // Roots discovered by following within-subtree symlinks are queued and
    // walked after the main tree.
    let mut queue: VecDeque<PathBuf> = VecDeque::new();
    queue.push_back(canonical_root.clone());

    'roots: while let Some(dir) = queue.pop_front() {
        let mut iter = WalkDir::new(&dir).follow_links(false).into_iter();
        loop {
            if start.elapsed() > opts.budget {
                outcome
                    .warnings
                    .push(ScanWarning::truncated(&dir, opts.budget.as_secs()));
                outcome.truncated = true;
                break 'roots;
            }
            if opts.cancelled() {
                outcome.warnings.push(ScanWarning::new(
                    &dir,
                    "walk cancelled",
                    WarningKind::Truncated,
                ));
                outcome.truncated = true;
                break 'roots;
            }

            let entry = match iter.next() {
                None => break,
                Some(Ok(entry)) => entry,
                Some(Err(err)) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    let warning = match err.io_error() {
                        Some(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
                            ScanWarning::permission_denied(path)
                        }
                        _ => ScanWarning::new(path, err.to_string(), WarningKind::ReadError),
                    };
                    outcome.warnings.push(warning);
                    continue;
                }
            };

            let path = entry.path();
            if opts.excluded(path) {
                if entry.file_type().is_dir() {
                    iter.skip_current_dir();
                }
                continue;
            }

            if entry.file_type().is_dir() {
                if entry.depth() == 0 {
                    // The walk root itself: queued roots were marked visited
                    // when their symlink was followed, so the visited check
                    // only applies below the root.
                    if let Ok(meta) = entry.metadata() {
                        visited.insert(get_dev(&meta), get_ino(&meta));
                    }
                    continue;
                }
                if guard.blocks_descent(path) {
                    debug!(path = %path.display(), "descent blocked by safety guard");
                    iter.skip_current_dir();
                    continue;
                }
                if let Ok(meta) = entry.metadata() {
                    // A directory reachable twice (a symlinked subtree that
                    // is queued or already walked) is not traversed again.
                    if !visited.insert(get_dev(&meta), get_ino(&meta)) {
                        iter.skip_current_dir();
                    }
                }
                continue;
            }

            if entry.file_type().is_symlink() {
                handle_symlink(entry.path(), &canonical_root, &visited, &mut queue, &mut outcome);
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    outcome.warnings.push(ScanWarning::new(
                        path,
                        e.to_string(),
                        WarningKind::MetadataError,
                    ));
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                outcome.records.push(FileRecord::new(
                    path,
                    0,
                    metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                    RecordKind::Other,
                ));
                continue;
            }

            // Count hardlinked content once per walk.
            if get_nlink(&metadata) > 1 && !visited.insert(get_dev(&metadata), get_ino(&metadata))
            {
                continue;
            }

            let size = metadata.len();
            if opts.min_size.is_some_and(|min| size < min) {
                continue;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if let Some(min_days) = opts.min_age_days {
                let age = now.duration_since(modified).unwrap_or_default();
                if age.as_secs() < u64::from(min_days) * 86_400 {
                    continue;
                }
            }

            outcome.bytes += size;
            outcome.file_count += 1;
            outcome
                .records
                .push(FileRecord::new(path, size, modified, RecordKind::File));
        }
    }

    outcome
}

/// Record or follow a symlink according to the subtree rule.
fn handle_symlink(
    path: &Path,
    canonical_root: &Path,
    visited: &VisitedSet,
    queue: &mut VecDeque<PathBuf>,
    outcome: &mut WalkOutcome,
) {
    match path.canonicalize() {
        Ok(resolved) if resolved.starts_with(canonical_root) => {
            if resolved.is_dir() {
                let follow = std::fs::metadata(&resolved)
                    .map(|m| visited.insert(get_dev(&m), get_ino(&m)))
                    .unwrap_or(false);
                if follow {
                    queue.push_back(resolved);
                }
            }
            // A within-root file symlink needs no record: the target file is
            // reached by the walk itself.
        }
        Ok(_) => {
            // Points outside the subtree: note it, do not follow.
            outcome.records.push(FileRecord::new(
                path,
                0,
                symlink_mtime(path),
                RecordKind::Symlink,
            ));
        }
        Err(_) => {
            let target = std::fs::read_link(path)
                .map(|t| t.to_string_lossy().into_owned())
                .unwrap_or_default();
            outcome.warnings.push(ScanWarning::new(
                path,
                format!("broken symlink -> {target}"),
                WarningKind::BrokenSymlink,
            ));
        }
    }
}

fn symlink_mtime(path: &Path) -> SystemTime {
    std::fs::symlink_metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Total size in bytes of all regular files under `path`.
pub fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

// Cross-platform metadata helpers.

#[cfg(unix)]
fn get_dev(metadata: &std::fs::Metadata) -> u64 {
    metadata.dev()
}

#[cfg(not(unix))]
fn get_dev(_metadata: &std::fs::Metadata) -> u64 {
    0
}

#[cfg(unix)]
fn get_ino(metadata: &std::fs::Metadata) -> u64 {
    metadata.ino()
}

#[cfg(not(unix))]
fn get_ino(_metadata: &std::fs::Metadata) -> u64 {
    0
}

#[cfg(unix)]
fn get_nlink(metadata: &std::fs::Metadata) -> u64 {
    metadata.nlink()
}

#[cfg(not(unix))]
fn get_nlink(_metadata: &std::fs::Metadata) -> u64 {
    1
}
