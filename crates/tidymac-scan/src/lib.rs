//! Filesystem scanning engine for tidymac.
//!
//! This crate turns a resolved profile into a classified [`Inventory`]:
//! a bounded-parallel walk over the catalog targets, developer working
//! directory detection, and the classification fold.

mod cache;
mod detector;
mod inventory;
mod record;
mod scanner;
mod walker;

pub use cache::{CacheStats, ScanCache};
pub use detector::{
    detect_dev_projects, newest_source_mtime, probe_dev_tools, DevProject, DevToolUsage,
};
pub use inventory::{FileEntry, Inventory, InventoryItem};
pub use record::{FileRecord, RecordKind};
pub use scanner::{ScanProgress, Scanner};
pub use walker::{dir_size, walk_roots, VisitedSet, WalkOptions, WalkOutcome};

// Re-export core types for convenience.
pub use tidymac_core::{
    Category, Profile, SafetyGuard, SafetyLabel, ScanEnv, ScanTarget, ScanWarning, WarningKind,
};
