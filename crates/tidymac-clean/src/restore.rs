//! Undo: restore a soft session's files to their original locations.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use tidymac_core::{CleanMode, Result, TidyError};

use crate::manifest::SessionManifest;
use crate::staging::content_sha256;

/// Outcome of restoring a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreReport {
    pub session_id: String,
    pub restored_count: u64,
    pub restored_bytes: u64,
    pub errors: Vec<String>,
}

/// Restore every staged file of `session_id` back to its original path.
///
/// Records are processed in reverse removal order, so a staged parent
/// directory is recreated before the children that need it. A missing or
/// corrupted staged file is a per-file failure, not an abort; the session
/// is only marked restored when every file came back.
pub fn restore_session(
    sessions_dir: &Path,
    staging_dir: &Path,
    session_id: &str,
) -> Result<RestoreReport> {
    let mut manifest = SessionManifest::load(sessions_dir, session_id)?;

    if manifest.mode == CleanMode::Hard {
        return Err(TidyError::NotRestorable {
            session_id: session_id.to_string(),
            reason: "hard sessions have no staged files".to_string(),
        });
    }
    if manifest.restored {
        return Err(TidyError::NotRestorable {
            session_id: session_id.to_string(),
            reason: "session has already been restored".to_string(),
        });
    }
    if manifest.is_expired() {
        return Err(TidyError::SessionExpired {
            session_id: session_id.to_string(),
            expired_at: manifest.expires_at(),
        });
    }

    let mut report = RestoreReport {
        session_id: session_id.to_string(),
        restored_count: 0,
        restored_bytes: 0,
        errors: Vec::new(),
    };

    for record in manifest.items.iter().rev() {
        let Some(staged) = &record.staged_path else {
            continue;
        };
        let original = &record.original_path;

        if !staged.exists() {
            report.errors.push(format!(
                "staged file missing: {}",
                staged.display()
            ));
            continue;
        }
        if let Some(expected) = &record.content_sha256 {
            match content_sha256(staged) {
                Ok(actual) if &actual == expected => {}
                Ok(_) => {
                    report.errors.push(format!(
                        "digest mismatch for {}; leaving it staged",
                        staged.display()
                    ));
                    continue;
                }
                Err(e) => {
                    report
                        .errors
                        .push(format!("cannot verify {}: {e}", staged.display()));
                    continue;
                }
            }
        }
        if original.exists() {
            report.errors.push(format!(
                "original path already exists, not overwriting: {}",
                original.display()
            ));
            continue;
        }

        if let Some(parent) = original.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                report
                    .errors
                    .push(format!("cannot recreate {}: {e}", parent.display()));
                continue;
            }
        }

        match fs::rename(staged, original) {
            Ok(()) => {
                report.restored_count += 1;
                report.restored_bytes += record.size_bytes;
            }
            Err(e) => {
                warn!(staged = %staged.display(), error = %e, "rename failed during restore");
                report
                    .errors
                    .push(format!("cannot restore {}: {e}", original.display()));
            }
        }
    }

    if report.errors.is_empty() {
        // Restore does not extend retention; only the flag changes.
        manifest.restored = true;
        manifest.save(sessions_dir)?;
        remove_empty_dirs(&staging_dir.join(session_id));
        info!(session_id, files = report.restored_count, "session restored");
    } else {
        warn!(
            session_id,
            failures = report.errors.len(),
            "partial restore; session left open"
        );
    }

    Ok(report)
}

/// Remove now-empty directories bottom-up, including `dir` itself.
fn remove_empty_dirs(dir: &Path) {
    if !dir.is_dir() {
        return;
    }
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.filter_map(|e| e.ok()) {
            if entry.path().is_dir() {
                remove_empty_dirs(&entry.path());
            }
        }
    }
    // Fails while non-empty, which is exactly the behavior wanted.
    let _ = fs::remove_dir(dir);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::RemovalRecord;
    use crate::staging::StagingStore;
    use chrono::Utc;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        sessions: PathBuf,
        staging: PathBuf,
        data: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let sessions = temp.path().join("sessions");
        let staging = temp.path().join("staging");
        let data = temp.path().join("data");
        fs::create_dir_all(&sessions).unwrap();
        fs::create_dir_all(&staging).unwrap();
        fs::create_dir_all(&data).unwrap();
        Fixture {
            _temp: temp,
            sessions,
            staging,
            data,
        }
    }

    fn stage_one(fx: &Fixture, verify: bool) -> SessionManifest {
        let source = fx.data.join("cache/blob.bin");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, b"hello undo").unwrap();

        let mut manifest = SessionManifest::open("quick", CleanMode::Soft, 7);
        let store = StagingStore::create(&fx.staging, &manifest.session_id, verify).unwrap();
        let staged = store.stage(&source).unwrap();
        manifest.push(RemovalRecord {
            original_path: source,
            staged_path: Some(staged.staged_path),
            size_bytes: staged.size_bytes,
            mtime: Utc::now(),
            content_sha256: staged.content_sha256,
            item_name: "user-caches".to_string(),
            removed_at: Utc::now(),
        });
        manifest.save(&fx.sessions).unwrap();
        manifest
    }

    #[test]
    fn test_round_trip_restore() {
        let fx = fixture();
        let manifest = stage_one(&fx, true);
        let original = fx.data.join("cache/blob.bin");
        assert!(!original.exists());

        let report =
            restore_session(&fx.sessions, &fx.staging, &manifest.session_id).unwrap();
        assert!(report.errors.is_empty());
        assert_eq!(report.restored_count, 1);
        assert_eq!(fs::read(&original).unwrap(), b"hello undo");

        // The manifest now records the restore; a second undo refuses.
        let err =
            restore_session(&fx.sessions, &fx.staging, &manifest.session_id).unwrap_err();
        assert_eq!(err.kind(), "not_restorable");

        // Empty staging directories are gone.
        assert!(!fx.staging.join(&manifest.session_id).exists());
    }

    #[test]
    fn test_expired_session_refused_unchanged() {
        let fx = fixture();
        let mut manifest = stage_one(&fx, false);
        manifest.created_at = Utc::now() - chrono::Duration::days(8);
        manifest.save(&fx.sessions).unwrap();

        let err =
            restore_session(&fx.sessions, &fx.staging, &manifest.session_id).unwrap_err();
        assert_eq!(err.kind(), "session_expired");

        let reloaded = SessionManifest::load(&fx.sessions, &manifest.session_id).unwrap();
        assert!(!reloaded.restored);
        // Staged content is untouched.
        assert!(fx.staging.join(&manifest.session_id).exists());
    }

    #[test]
    fn test_missing_staged_file_is_per_file_failure() {
        let fx = fixture();
        let manifest = stage_one(&fx, false);
        // Sabotage the staged copy.
        let staged = manifest.items[0].staged_path.clone().unwrap();
        fs::remove_file(&staged).unwrap();

        let report =
            restore_session(&fx.sessions, &fx.staging, &manifest.session_id).unwrap();
        assert_eq!(report.restored_count, 0);
        assert_eq!(report.errors.len(), 1);

        // Partial restores leave the session open.
        let reloaded = SessionManifest::load(&fx.sessions, &manifest.session_id).unwrap();
        assert!(!reloaded.restored);
    }

    #[test]
    fn test_digest_mismatch_leaves_file_staged() {
        let fx = fixture();
        let manifest = stage_one(&fx, true);
        let staged = manifest.items[0].staged_path.clone().unwrap();
        fs::write(&staged, b"tampered!!").unwrap();

        let report =
            restore_session(&fx.sessions, &fx.staging, &manifest.session_id).unwrap();
        assert_eq!(report.restored_count, 0);
        assert!(report.errors[0].contains("digest mismatch"));
        assert!(staged.exists());
        assert!(!fx.data.join("cache/blob.bin").exists());
    }

    #[test]
    fn test_hard_session_rejected() {
        let fx = fixture();
        let manifest = SessionManifest::open("quick", CleanMode::Hard, 0);
        manifest.save(&fx.sessions).unwrap();

        let err =
            restore_session(&fx.sessions, &fx.staging, &manifest.session_id).unwrap_err();
        assert_eq!(err.kind(), "not_restorable");
    }

    #[test]
    fn test_existing_original_not_overwritten() {
        let fx = fixture();
        let manifest = stage_one(&fx, false);
        let original = fx.data.join("cache/blob.bin");
        fs::create_dir_all(original.parent().unwrap()).unwrap();
        fs::write(&original, b"newer content").unwrap();

        let report =
            restore_session(&fx.sessions, &fx.staging, &manifest.session_id).unwrap();
        assert_eq!(report.restored_count, 0);
        assert!(report.errors[0].contains("not overwriting"));
        assert_eq!(fs::read(&original).unwrap(), b"newer content");
    }
}
