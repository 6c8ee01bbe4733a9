//! The cleaner orchestrator: applies a mode to a selected inventory subset.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{info, warn};

use tidymac_core::{CleanMode, Result, SafetyGuard, StateDir, TidyError, Verdict};
use tidymac_scan::{FileEntry, Inventory, InventoryItem};

use crate::lock::SessionLock;
use crate::manifest::{RemovalRecord, SessionManifest};
use crate::staging::StagingStore;

/// Minimum interval between progress events.
const PROGRESS_CADENCE: Duration = Duration::from_millis(100);

/// Progress snapshot emitted while a clean runs.
#[derive(Debug, Clone)]
pub struct CleanProgress {
    pub files_processed: u64,
    pub files_total: u64,
    pub bytes_processed: u64,
    pub current: PathBuf,
}

/// Outcome of a clean.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CleanReport {
    pub mode: CleanMode,
    pub files_removed: u64,
    pub bytes_freed: u64,
    /// Present for soft sessions; they can be undone by id.
    pub session_id: Option<String>,
    pub errors: Vec<String>,
}

/// One path scheduled for removal.
struct Work {
    path: PathBuf,
    size: u64,
    /// Modification time recorded at scan; used for the changed-file check.
    scanned_mtime: Option<SystemTime>,
    item_name: String,
}

/// The staged cleaner.
pub struct CleanEngine {
    state: StateDir,
    guard: SafetyGuard,
    verify: bool,
    force: bool,
    cancel: Option<Arc<AtomicBool>>,
    progress_tx: broadcast::Sender<CleanProgress>,
}

impl CleanEngine {
    /// Create an engine over a state directory.
    pub fn new(state: StateDir, guard: SafetyGuard) -> Self {
        let (progress_tx, _) = broadcast::channel(64);
        Self {
            state,
            guard,
            verify: false,
            force: false,
            cancel: None,
            progress_tx,
        }
    }

    /// Record content digests while staging and verify copy fallbacks.
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Remove files even when they changed since the scan.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Install a cooperative cancellation flag.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Subscribe to progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<CleanProgress> {
        self.progress_tx.subscribe()
    }

    /// Apply `mode` to the selected items of an inventory.
    pub fn clean(
        &self,
        inventory: &Inventory,
        selection: Option<&[String]>,
        mode: CleanMode,
        retention_days: u32,
    ) -> Result<CleanReport> {
        let items = inventory.select(selection);

        if mode == CleanMode::Preview {
            return Ok(CleanReport {
                mode,
                files_removed: items.iter().map(|i| i.file_count).sum(),
                bytes_freed: items.iter().map(|i| i.bytes).sum(),
                session_id: None,
                errors: Vec::new(),
            });
        }

        self.state.init()?;
        // One open session per state directory, enforced across processes.
        let _lock = SessionLock::acquire(&self.state.lock_path())?;

        let mut errors: Vec<String> = Vec::new();
        let work = self.build_work_list(&items, &mut errors);

        let mut manifest = SessionManifest::open(&inventory.profile, mode, retention_days);
        let staging = match mode {
            CleanMode::Soft => Some(StagingStore::create(
                &self.state.staging_dir(),
                &manifest.session_id,
                self.verify,
            )?),
            _ => None,
        };

        let files_total = work.len() as u64;
        let mut processed = 0u64;
        let mut bytes_processed = 0u64;
        let mut last_progress = Instant::now()
            .checked_sub(PROGRESS_CADENCE)
            .unwrap_or_else(Instant::now);

        for entry in work {
            if self.cancelled() {
                errors.push("clean cancelled; session closed early".to_string());
                break;
            }

            // Re-checked at delete time; the inventory alone is not trusted.
            match self.guard.is_deletable(&entry.path) {
                Verdict::Allow => {}
                Verdict::Deny { reason } => {
                    errors.push(format!("safety_refused: {}: {reason}", entry.path.display()));
                    continue;
                }
            }
            if let Some(message) = self.changed_since_scan(&entry) {
                errors.push(message);
                continue;
            }

            let removed_at = Utc::now();
            let mtime: DateTime<Utc> = fs::symlink_metadata(&entry.path)
                .and_then(|m| m.modified())
                .map(DateTime::from)
                .unwrap_or(removed_at);

            let record = match &staging {
                Some(store) => match store.stage(&entry.path) {
                    Ok(staged) => RemovalRecord {
                        original_path: entry.path.clone(),
                        staged_path: Some(staged.staged_path),
                        size_bytes: staged.size_bytes,
                        mtime,
                        content_sha256: staged.content_sha256,
                        item_name: entry.item_name.clone(),
                        removed_at,
                    },
                    Err(e @ TidyError::VerificationFailed { .. }) => {
                        // A copy that cannot be proven intact aborts the
                        // whole session; staged moves are reversed.
                        self.rollback(&manifest);
                        return Err(e);
                    }
                    Err(e) => {
                        errors.push(format!("{}: {e}", entry.path.display()));
                        continue;
                    }
                },
                None => match remove_path(&entry.path) {
                    Ok(()) => RemovalRecord {
                        original_path: entry.path.clone(),
                        staged_path: None,
                        size_bytes: entry.size,
                        mtime,
                        content_sha256: None,
                        item_name: entry.item_name.clone(),
                        removed_at,
                    },
                    Err(e) => {
                        errors.push(format!("{}: {e}", entry.path.display()));
                        continue;
                    }
                },
            };

            processed += 1;
            bytes_processed += record.size_bytes;
            manifest.push(record);

            if last_progress.elapsed() >= PROGRESS_CADENCE {
                last_progress = Instant::now();
                let _ = self.progress_tx.send(CleanProgress {
                    files_processed: processed,
                    files_total,
                    bytes_processed,
                    current: entry.path.clone(),
                });
            }
        }

        if let Err(e) = manifest.save(&self.state.sessions_dir()) {
            warn!(error = %e, "manifest write failed; reversing staged moves");
            self.rollback(&manifest);
            return Err(e);
        }

        let _ = self.progress_tx.send(CleanProgress {
            files_processed: processed,
            files_total,
            bytes_processed,
            current: PathBuf::new(),
        });
        info!(
            session_id = %manifest.session_id,
            mode = %mode,
            files = manifest.total_files,
            bytes = manifest.total_bytes,
            "clean complete"
        );

        Ok(CleanReport {
            mode,
            files_removed: manifest.total_files,
            bytes_freed: manifest.total_bytes,
            session_id: (mode == CleanMode::Soft).then(|| manifest.session_id.clone()),
            errors,
        })
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Flatten selected items into per-path work.
    ///
    /// Items carrying file lists are removed file-by-file. Whole-subtree
    /// items are removed as one node, except when the node is a cleanable
    /// prefix root, which is emptied child-by-child instead.
    fn build_work_list(&self, items: &[&InventoryItem], errors: &mut Vec<String>) -> Vec<Work> {
        let mut work = Vec::new();
        for item in items {
            if !item.files.is_empty() {
                for file in &item.files {
                    work.push(Work {
                        path: file.path.clone(),
                        size: file.size_bytes,
                        scanned_mtime: file.modified,
                        item_name: item.name.clone(),
                    });
                }
                continue;
            }

            if self.guard.is_deletable(&item.path).is_allow() {
                work.push(Work {
                    path: item.path.clone(),
                    size: item.bytes,
                    scanned_mtime: None,
                    item_name: item.name.clone(),
                });
            } else if self.guard.permits_children(&item.path) {
                match fs::read_dir(&item.path) {
                    Ok(entries) => {
                        for child in entries.filter_map(|e| e.ok()) {
                            let size = child.metadata().map(|m| m.len()).unwrap_or(0);
                            work.push(Work {
                                path: child.path(),
                                size,
                                scanned_mtime: None,
                                item_name: item.name.clone(),
                            });
                        }
                    }
                    Err(e) => errors.push(format!("{}: {e}", item.path.display())),
                }
            } else {
                errors.push(format!(
                    "safety_refused: {}: refused at clean time",
                    item.path.display()
                ));
            }
        }
        work
    }

    /// Skip files that changed between scan and clean, unless forced.
    fn changed_since_scan(&self, entry: &Work) -> Option<String> {
        if self.force {
            return None;
        }
        let Some(scanned) = entry.scanned_mtime else {
            return None;
        };
        let meta = fs::symlink_metadata(&entry.path).ok()?;
        let current_mtime = meta.modified().ok()?;
        if current_mtime != scanned || meta.len() != entry.size {
            return Some(format!(
                "skipped, changed since scan: {}",
                entry.path.display()
            ));
        }
        None
    }

    /// Best-effort reversal of already-staged moves, newest first.
    fn rollback(&self, manifest: &SessionManifest) {
        for record in manifest.items.iter().rev() {
            let Some(staged) = &record.staged_path else { continue };
            if let Some(parent) = record.original_path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            if let Err(e) = fs::rename(staged, &record.original_path) {
                warn!(
                    staged = %staged.display(),
                    error = %e,
                    "rollback failed; file remains staged"
                );
            }
        }
        let _ = fs::remove_dir_all(self.state.staging_dir().join(&manifest.session_id));
    }
}

/// Remove a file or directory permanently. Already-gone paths succeed.
fn remove_path(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(TidyError::io(path, e)),
    };
    if meta.is_dir() {
        fs::remove_dir_all(path).map_err(|e| TidyError::io(path, e))
    } else {
        fs::remove_file(path).map_err(|e| TidyError::io(path, e))
    }
}

/// Convenience: build a one-item inventory around ad-hoc paths (used by the
/// duplicate flow to feed confirmed groups back into the cleaner).
pub fn inventory_from_files(
    profile: &str,
    item_name: &str,
    files: Vec<FileEntry>,
) -> Inventory {
    let bytes = files.iter().map(|f| f.size_bytes).sum();
    let file_count = files.len() as u64;
    let mut inventory = Inventory::new(profile);
    inventory.items.push(InventoryItem {
        name: item_name.to_string(),
        category: tidymac_core::Category::Duplicate,
        path: files
            .first()
            .map(|f| f.path.clone())
            .unwrap_or_default(),
        bytes,
        file_count,
        safety: tidymac_core::SafetyLabel::Caution,
        reason: "Duplicate copies; the keep candidate is preserved".to_string(),
        files,
    });
    inventory.recalculate();
    inventory
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tidymac_core::SafetyLabel;

    struct Fixture {
        _temp: TempDir,
        state: StateDir,
        guard: SafetyGuard,
        home: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let home = temp.path().join("home");
        fs::create_dir_all(&home).unwrap();
        let state = StateDir::at(home.join(".tidymac"));
        let guard = SafetyGuard::with_home(&home);
        Fixture {
            _temp: temp,
            state,
            guard,
            home,
        }
    }

    fn cache_inventory(home: &Path, n: usize, size: usize) -> Inventory {
        let dir = home.join(".cache/app");
        fs::create_dir_all(&dir).unwrap();
        let mut files = Vec::new();
        for i in 0..n {
            let path = dir.join(format!("f{i}.bin"));
            fs::write(&path, vec![0u8; size]).unwrap();
            let meta = fs::metadata(&path).unwrap();
            files.push(FileEntry {
                path,
                size_bytes: meta.len(),
                modified: meta.modified().ok(),
            });
        }

        let mut inventory = Inventory::new("quick");
        inventory.items.push(InventoryItem {
            name: "app-cache".to_string(),
            category: tidymac_core::Category::UserCache,
            path: dir,
            bytes: (n * size) as u64,
            file_count: n as u64,
            safety: SafetyLabel::Safe,
            reason: "test caches".to_string(),
            files,
        });
        inventory.recalculate();
        inventory
    }

    #[test]
    fn test_preview_mutates_nothing() {
        let fx = fixture();
        let inventory = cache_inventory(&fx.home, 3, 100);
        let engine = CleanEngine::new(fx.state.clone(), fx.guard.clone());

        let report = engine
            .clean(&inventory, None, CleanMode::Preview, 7)
            .unwrap();
        assert_eq!(report.files_removed, 3);
        assert_eq!(report.bytes_freed, 300);
        assert!(report.session_id.is_none());
        assert!(fx.home.join(".cache/app/f0.bin").exists());
        // No session was opened.
        assert!(!fx.state.lock_path().exists());
    }

    #[test]
    fn test_soft_clean_stages_and_writes_manifest() {
        let fx = fixture();
        let inventory = cache_inventory(&fx.home, 5, 64);
        let engine = CleanEngine::new(fx.state.clone(), fx.guard.clone());

        let report = engine.clean(&inventory, None, CleanMode::Soft, 7).unwrap();
        assert_eq!(report.files_removed, 5);
        assert_eq!(report.bytes_freed, 320);
        assert!(report.errors.is_empty());
        let session_id = report.session_id.expect("soft clean opens a session");

        for i in 0..5 {
            assert!(!fx.home.join(format!(".cache/app/f{i}.bin")).exists());
        }
        let manifest =
            SessionManifest::load(&fx.state.sessions_dir(), &session_id).unwrap();
        assert_eq!(manifest.total_files, 5);
        assert!(manifest.items.iter().all(|r| r.staged_path.is_some()));
        // The lockfile is released at the end of the run.
        assert!(!fx.state.lock_path().exists());
    }

    #[test]
    fn test_hard_clean_unlinks_and_audits() {
        let fx = fixture();
        let inventory = cache_inventory(&fx.home, 2, 128);
        let engine = CleanEngine::new(fx.state.clone(), fx.guard.clone());

        let report = engine.clean(&inventory, None, CleanMode::Hard, 0).unwrap();
        assert_eq!(report.files_removed, 2);
        assert!(report.session_id.is_none());
        assert!(!fx.home.join(".cache/app/f0.bin").exists());

        // An audit manifest exists with null staged paths.
        let sessions =
            SessionManifest::list(&fx.state.sessions_dir(), &fx.state.staging_dir()).unwrap();
        assert_eq!(sessions.len(), 1);
        let manifest =
            SessionManifest::load(&fx.state.sessions_dir(), &sessions[0].session_id).unwrap();
        assert!(manifest.items.iter().all(|r| r.staged_path.is_none()));
    }

    #[test]
    fn test_protected_item_refused_at_clean_time() {
        let fx = fixture();
        let docs = fx.home.join("Documents");
        fs::create_dir_all(&docs).unwrap();
        fs::write(docs.join("novel.txt"), b"do not touch").unwrap();

        let mut inventory = Inventory::new("quick");
        inventory.items.push(InventoryItem {
            name: "bad".to_string(),
            category: tidymac_core::Category::UserCache,
            path: docs.clone(),
            bytes: 12,
            file_count: 1,
            safety: SafetyLabel::Safe,
            reason: String::new(),
            files: vec![FileEntry {
                path: docs.join("novel.txt"),
                size_bytes: 12,
                modified: None,
            }],
        });
        inventory.recalculate();

        let engine = CleanEngine::new(fx.state.clone(), fx.guard.clone());
        let report = engine.clean(&inventory, None, CleanMode::Hard, 0).unwrap();

        assert_eq!(report.files_removed, 0);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("safety_refused"));
        assert!(docs.join("novel.txt").exists());
    }

    #[test]
    fn test_changed_file_skipped_without_force() {
        let fx = fixture();
        let mut inventory = cache_inventory(&fx.home, 1, 50);
        // Rewrite the file after the "scan".
        let path = inventory.items[0].files[0].path.clone();
        fs::write(&path, vec![1u8; 999]).unwrap();
        inventory.recalculate();

        let engine = CleanEngine::new(fx.state.clone(), fx.guard.clone());
        let report = engine.clean(&inventory, None, CleanMode::Soft, 7).unwrap();
        assert_eq!(report.files_removed, 0);
        assert!(report.errors[0].contains("changed since scan"));
        assert!(path.exists());

        // With force the file goes.
        let engine = CleanEngine::new(fx.state.clone(), fx.guard.clone()).with_force(true);
        let report = engine.clean(&inventory, None, CleanMode::Soft, 7).unwrap();
        assert_eq!(report.files_removed, 1);
        assert!(!path.exists());
    }

    #[test]
    fn test_selection_by_item_name() {
        let fx = fixture();
        let mut inventory = cache_inventory(&fx.home, 2, 10);
        let trash = fx.home.join(".Trash");
        fs::create_dir_all(&trash).unwrap();
        fs::write(trash.join("old.txt"), b"trash").unwrap();
        inventory.items.push(InventoryItem {
            name: "trash".to_string(),
            category: tidymac_core::Category::Trash,
            path: trash.clone(),
            bytes: 5,
            file_count: 1,
            safety: SafetyLabel::Safe,
            reason: String::new(),
            files: vec![FileEntry {
                path: trash.join("old.txt"),
                size_bytes: 5,
                modified: None,
            }],
        });
        inventory.recalculate();

        let engine = CleanEngine::new(fx.state.clone(), fx.guard.clone());
        let report = engine
            .clean(&inventory, Some(&["trash".to_string()]), CleanMode::Soft, 7)
            .unwrap();
        assert_eq!(report.files_removed, 1);
        // The unselected cache files survive.
        assert!(fx.home.join(".cache/app/f0.bin").exists());
    }

    #[test]
    fn test_lock_conflict_is_fatal() {
        let fx = fixture();
        let inventory = cache_inventory(&fx.home, 1, 10);
        fx.state.init().unwrap();
        let _held = SessionLock::acquire(&fx.state.lock_path()).unwrap();

        let engine = CleanEngine::new(fx.state.clone(), fx.guard.clone());
        let err = engine
            .clean(&inventory, None, CleanMode::Soft, 7)
            .unwrap_err();
        assert_eq!(err.kind(), "session_locked");
    }

    #[test]
    fn test_subtree_item_removed_as_node() {
        let fx = fixture();
        let project = fx.home.join("Projects/app");
        fs::create_dir_all(project.join("node_modules/dep")).unwrap();
        fs::write(project.join("package.json"), b"{}").unwrap();
        fs::write(project.join("node_modules/dep/i.js"), vec![0u8; 200]).unwrap();

        let mut inventory = Inventory::new("developer");
        inventory.items.push(InventoryItem {
            name: "Node dependencies (app)".to_string(),
            category: tidymac_core::Category::Dev(tidymac_core::DevTool::Node),
            path: project.join("node_modules"),
            bytes: 200,
            file_count: 1,
            safety: SafetyLabel::Safe,
            reason: String::new(),
            files: Vec::new(),
        });
        inventory.recalculate();

        let engine = CleanEngine::new(fx.state.clone(), fx.guard.clone());
        let report = engine.clean(&inventory, None, CleanMode::Soft, 7).unwrap();
        assert_eq!(report.files_removed, 1);
        assert!(!project.join("node_modules").exists());

        // And undo brings the whole tree back.
        let session_id = report.session_id.unwrap();
        let restore = crate::restore::restore_session(
            &fx.state.sessions_dir(),
            &fx.state.staging_dir(),
            &session_id,
        )
        .unwrap();
        assert_eq!(restore.restored_count, 1);
        assert!(project.join("node_modules/dep/i.js").exists());
    }
}
