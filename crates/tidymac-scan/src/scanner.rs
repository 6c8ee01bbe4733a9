//! The scan orchestrator: profile in, classified inventory out.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use tokio::sync::broadcast;
use tracing::debug;

use tidymac_core::{
    catalog, format_size, Category, DetectorRule, Profile, SafetyGuard, SafetyLabel, ScanEnv,
    ScanTarget, TargetSource,
};

use crate::cache::ScanCache;
use crate::detector::detect_dev_projects;
use crate::inventory::{FileEntry, Inventory, InventoryItem};
use crate::record::RecordKind;
use crate::walker::{walk_root, WalkOptions, WalkOutcome};

/// Progress snapshot emitted while a scan runs.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    pub targets_done: u64,
    pub targets_total: u64,
    pub files_seen: u64,
    pub bytes_seen: u64,
    pub current_target: String,
}

/// Default floor below which an item is dropped from the inventory.
const DEFAULT_MIN_ITEM_BYTES: u64 = 1024 * 1024;

/// Target-driven parallel scanner.
pub struct Scanner {
    guard: SafetyGuard,
    env: ScanEnv,
    catalog: Vec<ScanTarget>,
    min_item_bytes: u64,
    cache_path: Option<PathBuf>,
    exclude: Vec<String>,
    cancel: Option<Arc<AtomicBool>>,
    progress_tx: broadcast::Sender<ScanProgress>,
}

impl Scanner {
    /// Create a scanner over the built-in catalog.
    pub fn new(guard: SafetyGuard, env: ScanEnv) -> Self {
        let (progress_tx, _) = broadcast::channel(64);
        Self {
            guard,
            env,
            catalog: catalog(),
            min_item_bytes: DEFAULT_MIN_ITEM_BYTES,
            cache_path: None,
            exclude: Vec::new(),
            cancel: None,
            progress_tx,
        }
    }

    /// Replace the target catalog.
    pub fn with_catalog(mut self, catalog: Vec<ScanTarget>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Change the minimum item size (0 keeps everything with bytes > 0).
    pub fn with_min_item_bytes(mut self, bytes: u64) -> Self {
        self.min_item_bytes = bytes;
        self
    }

    /// Enable the scan cache, persisted at `path`.
    pub fn with_cache(mut self, path: PathBuf) -> Self {
        self.cache_path = Some(path);
        self
    }

    /// Exclude paths containing any of the given substrings.
    pub fn with_exclude(mut self, patterns: Vec<String>) -> Self {
        self.exclude = patterns;
        self
    }

    /// Install a cooperative cancellation flag.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Subscribe to progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Run a full scan under the given profile.
    pub fn scan(&self, profile: &Profile) -> Inventory {
        let start = Instant::now();
        let policy = profile.policy();
        let targets = profile.select_targets(&self.catalog);

        let mut inventory = Inventory::new(profile.name.clone());
        let mut cache = self
            .cache_path
            .as_ref()
            .map(|p| ScanCache::load(p, &profile.name).unwrap_or_else(|| ScanCache::new(&profile.name)));

        // Partition: concrete-root targets are walked, detector targets are
        // interpreted.
        let mut walk_jobs: Vec<(usize, PathBuf)> = Vec::new();
        let mut cached_items: Vec<InventoryItem> = Vec::new();
        let mut detector_targets: Vec<&ScanTarget> = Vec::new();

        for (idx, target) in targets.iter().enumerate() {
            match &target.source {
                TargetSource::Detector(_) => detector_targets.push(target),
                _ => {
                    for root in target.source.resolve(&self.env) {
                        match cache.as_mut().and_then(|c| c.check(&root)) {
                            Some(entry) if entry.size_bytes > 0 => {
                                debug!(root = %root.display(), "scan cache hit");
                                cached_items.push(InventoryItem {
                                    name: target.name.clone(),
                                    category: target.category,
                                    path: root,
                                    bytes: entry.size_bytes,
                                    file_count: entry.file_count,
                                    safety: target.safety,
                                    reason: target.reason.clone(),
                                    files: Vec::new(),
                                });
                            }
                            Some(_) => {}
                            None => walk_jobs.push((idx, root)),
                        }
                    }
                }
            }
        }

        let targets_total = targets.len() as u64;

        // Walk all uncached roots in parallel.
        let outcomes: Vec<(usize, WalkOutcome)> = walk_jobs
            .into_par_iter()
            .map(|(idx, root)| {
                let target = &targets[idx];
                let opts = WalkOptions {
                    min_size: target.min_size,
                    min_age_days: target.min_age_days,
                    exclude: self.exclude.clone(),
                    cancel: self.cancel.clone(),
                    ..Default::default()
                };
                (idx, walk_root(&root, &self.guard, &opts))
            })
            .collect();

        // Fold outcomes into one item per (target, root).
        let mut done = 0u64;
        let mut files_seen = 0u64;
        let mut bytes_seen = 0u64;
        for (idx, outcome) in outcomes {
            let target = &targets[idx];
            for warning in &outcome.warnings {
                inventory
                    .errors
                    .push(format!("{}: {}", target.name, warning.message));
            }
            if let Some(cache) = cache.as_mut() {
                if !outcome.truncated {
                    cache.store(&outcome.root, outcome.bytes, outcome.file_count);
                }
            }
            files_seen += outcome.file_count;
            bytes_seen += outcome.bytes;
            done += 1;
            let _ = self.progress_tx.send(ScanProgress {
                targets_done: done,
                targets_total,
                files_seen,
                bytes_seen,
                current_target: target.name.clone(),
            });

            if outcome.bytes == 0 {
                continue;
            }
            inventory.items.push(InventoryItem {
                name: target.name.clone(),
                category: target.category,
                path: outcome.root,
                bytes: outcome.bytes,
                file_count: outcome.file_count,
                safety: target.safety,
                reason: target.reason.clone(),
                files: outcome
                    .records
                    .into_iter()
                    .filter(|r| r.kind == RecordKind::File)
                    .map(|r| FileEntry {
                        path: r.path,
                        size_bytes: r.size,
                        modified: Some(r.modified),
                    })
                    .collect(),
            });
        }

        inventory.items.extend(cached_items);

        // Detector-driven targets.
        for target in detector_targets {
            match &target.source {
                TargetSource::Detector(DetectorRule::DevProjects) => {
                    let roots = target.source.resolve(&self.env);
                    for project in detect_dev_projects(&roots, policy.stale_days) {
                        if project.bytes == 0 {
                            continue;
                        }
                        let safety = if project.stale {
                            SafetyLabel::Safe
                        } else {
                            SafetyLabel::Caution
                        };
                        let project_name = project
                            .project
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_else(|| project.project.display().to_string());
                        inventory.items.push(InventoryItem {
                            name: format!("{} ({project_name})", project.label),
                            category: Category::Dev(project.tool),
                            path: project.artifact,
                            bytes: project.bytes,
                            file_count: project.file_count,
                            safety,
                            reason: target.reason.clone(),
                            files: Vec::new(),
                        });
                    }
                }
                TargetSource::Detector(DetectorRule::LargeFiles) => {
                    if let Some(item) = self.find_large_files(target, policy.large_file_threshold_bytes)
                    {
                        inventory.items.push(item);
                    }
                }
                _ => unreachable!("partitioned above"),
            }
        }

        // Classification adjustments: size floor, then the guard check.
        // One rejected path drops the whole item.
        let min_bytes = self.min_item_bytes.max(1);
        let guard = &self.guard;
        let mut dropped: Vec<String> = Vec::new();
        inventory.items.retain(|item| {
            if item.bytes < min_bytes {
                return false;
            }
            // A whole-subtree item rooted at a cleanable prefix is emptied
            // rather than removed, so the prefix node itself is acceptable.
            if item.files.is_empty() && guard.permits_children(&item.path) {
                return true;
            }
            let rejected = item
                .removal_paths()
                .iter()
                .any(|p| !guard.is_deletable(p).is_allow());
            if rejected {
                dropped.push(format!(
                    "{}: dropped, contains paths the safety guard refuses",
                    item.name
                ));
            }
            !rejected
        });
        inventory.errors.extend(dropped);

        inventory.sort_items();
        inventory.recalculate();
        inventory.duration_secs = start.elapsed().as_secs_f64();

        if let (Some(cache), Some(path)) = (cache.as_mut(), self.cache_path.as_ref()) {
            if let Err(e) = cache.save(path) {
                inventory.errors.push(format!("scan cache save failed: {e}"));
            }
        }

        inventory
    }

    /// Large-file discovery under the home directory.
    fn find_large_files(&self, target: &ScanTarget, threshold: u64) -> Option<InventoryItem> {
        let opts = WalkOptions {
            min_size: Some(threshold),
            exclude: self.exclude.clone(),
            cancel: self.cancel.clone(),
            ..Default::default()
        };
        let outcome = walk_root(&self.env.home, &self.guard, &opts);

        // Only files the guard would actually let the cleaner remove.
        let mut files: Vec<FileEntry> = outcome
            .records
            .into_iter()
            .filter(|r| r.kind == RecordKind::File)
            .filter(|r| self.guard.is_deletable(&r.path).is_allow())
            .map(|r| FileEntry {
                path: r.path,
                size_bytes: r.size,
                modified: Some(r.modified),
            })
            .collect();
        if files.is_empty() {
            return None;
        }
        files.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));

        let bytes: u64 = files.iter().map(|f| f.size_bytes).sum();
        let file_count = files.len() as u64;
        Some(InventoryItem {
            name: format!("Large files (>{})", format_size(threshold)),
            category: target.category,
            path: self.env.home.clone(),
            bytes,
            file_count,
            safety: target.safety,
            reason: target.reason.clone(),
            files,
        })
    }
}
