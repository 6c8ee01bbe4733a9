//! The staged cleaner for tidymac.
//!
//! Removal runs in three modes: preview (no mutation), soft (files move to
//! a session-scoped staging area with a durable manifest supporting undo),
//! and hard (direct unlink, manifest kept for audit). Sessions are guarded
//! by a lockfile and expire after a retention window.

mod engine;
mod lock;
mod manifest;
mod purge;
mod restore;
mod staging;

pub use engine::{inventory_from_files, CleanEngine, CleanProgress, CleanReport};
pub use lock::SessionLock;
pub use manifest::{RemovalRecord, SessionManifest, SessionSummary, SCHEMA_VERSION};
pub use purge::{
    purge_sessions, reconcile_staging, staging_health, PurgePolicy, PurgeReport, StagingHealth,
};
pub use restore::{restore_session, RestoreReport};
pub use staging::{content_sha256, StagedFile, StagingStore};

// Re-export the mode enum; it is part of the manifest wire format.
pub use tidymac_core::CleanMode;
