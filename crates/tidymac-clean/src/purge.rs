//! Retention purge: drop staged trees and manifests past their window.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use tidymac_core::{Result, TidyError};

use crate::manifest::SessionManifest;

/// Which sessions a purge may remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgePolicy {
    /// Only sessions past their retention window.
    Expired,
    /// Every session; the non-expired ones still require `force`.
    All,
}

/// Outcome of a purge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeReport {
    pub sessions_purged: u64,
    pub bytes_freed: u64,
    pub errors: Vec<String>,
}

/// Remove staging directories and manifests according to `policy`.
///
/// Idempotent: a second identical call removes nothing and reports zero.
pub fn purge_sessions(
    sessions_dir: &Path,
    staging_dir: &Path,
    policy: PurgePolicy,
    force: bool,
) -> Result<PurgeReport> {
    let mut report = PurgeReport {
        sessions_purged: 0,
        bytes_freed: 0,
        errors: Vec::new(),
    };

    for summary in SessionManifest::list(sessions_dir, staging_dir)? {
        let eligible = match policy {
            PurgePolicy::Expired => summary.is_expired,
            PurgePolicy::All => summary.is_expired || force,
        };
        if !eligible {
            if policy == PurgePolicy::All {
                report.errors.push(format!(
                    "{}: not expired; pass --force to purge anyway",
                    summary.session_id
                ));
            }
            continue;
        }

        let session_staging = staging_dir.join(&summary.session_id);
        let freed = summary.staged_size;
        if session_staging.exists() {
            if let Err(e) = fs::remove_dir_all(&session_staging) {
                report.errors.push(format!(
                    "cannot remove staging for {}: {e}",
                    summary.session_id
                ));
                continue;
            }
        }

        let manifest_path = sessions_dir.join(format!("{}.json", summary.session_id));
        if let Err(e) = fs::remove_file(&manifest_path) {
            report.errors.push(format!(
                "cannot remove manifest for {}: {e}",
                summary.session_id
            ));
            continue;
        }

        info!(session_id = %summary.session_id, freed, "session purged");
        report.sessions_purged += 1;
        report.bytes_freed += freed;
    }

    Ok(report)
}

/// Staging-area hygiene summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingHealth {
    pub session_count: u64,
    pub expired_count: u64,
    /// Bytes currently held across all staging directories.
    pub staged_bytes: u64,
    /// Bytes held by expired sessions alone.
    pub expired_bytes: u64,
    /// Set when the staging area deserves attention.
    pub warning: Option<String>,
}

/// Staged bytes above which the health check starts complaining.
const STAGING_WARN_BYTES: u64 = 5 * 1024 * 1024 * 1024;

/// Expired-session count above which the health check starts complaining.
const EXPIRED_WARN_COUNT: u64 = 10;

/// Summarize the staging area and suggest a purge when it has grown.
pub fn staging_health(sessions_dir: &Path, staging_dir: &Path) -> Result<StagingHealth> {
    let sessions = SessionManifest::list(sessions_dir, staging_dir)?;
    let session_count = sessions.len() as u64;
    let staged_bytes: u64 = sessions.iter().map(|s| s.staged_size).sum();
    let expired: Vec<_> = sessions.iter().filter(|s| s.is_expired).collect();
    let expired_count = expired.len() as u64;
    let expired_bytes: u64 = expired.iter().map(|s| s.staged_size).sum();

    let warning = if staged_bytes > STAGING_WARN_BYTES {
        Some(format!(
            "staging area holds {}; run a purge to free space",
            tidymac_core::format_size(staged_bytes)
        ))
    } else if expired_count > EXPIRED_WARN_COUNT {
        Some(format!(
            "{expired_count} expired sessions are still staged; purge them"
        ))
    } else {
        None
    };

    Ok(StagingHealth {
        session_count,
        expired_count,
        staged_bytes,
        expired_bytes,
        warning,
    })
}

/// Find staged trees with no manifest (a crash mid-session orphans them).
///
/// Run at startup; orphans are reported, never silently deleted.
pub fn reconcile_staging(sessions_dir: &Path, staging_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut orphans = Vec::new();
    let entries = match fs::read_dir(staging_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(orphans),
        Err(e) => return Err(TidyError::io(staging_dir, e)),
    };

    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(session_id) = path.file_name().map(|n| n.to_string_lossy().into_owned())
        else {
            continue;
        };
        if !sessions_dir.join(format!("{session_id}.json")).exists() {
            warn!(session_id, "staged files without a manifest");
            orphans.push(path);
        }
    }

    Ok(orphans)
}
