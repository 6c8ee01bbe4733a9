//! Session manifests: the durable record of a cleanup run.
//!
//! The manifest file is the source of truth; in-memory values are caches
//! over it. Writes go through a temp file and an atomic rename so a crash
//! never leaves a half-written manifest behind.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use tidymac_core::{CleanMode, Result, TidyError};

/// Current manifest schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// One removed file inside a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovalRecord {
    /// Absolute path before removal.
    pub original_path: PathBuf,
    /// Where the file was staged; null in hard mode.
    pub staged_path: Option<PathBuf>,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Modification time at removal.
    pub mtime: DateTime<Utc>,
    /// SHA-256 of content, when verification was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_sha256: Option<String>,
    /// Inventory item the file belonged to.
    pub item_name: String,
    /// When the removal happened.
    pub removed_at: DateTime<Utc>,
}

/// A complete session manifest (schema v1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionManifest {
    pub schema_version: u32,
    /// Timestamp-derived, sortable, filename-safe identifier.
    pub session_id: String,
    pub profile: String,
    pub mode: CleanMode,
    pub created_at: DateTime<Utc>,
    pub restored: bool,
    pub retention_days: u32,
    pub total_bytes: u64,
    pub total_files: u64,
    pub items: Vec<RemovalRecord>,
}

impl SessionManifest {
    /// Open a new session. The identifier is the creation timestamp with
    /// colons replaced so it stays filename-safe and sorts by time.
    pub fn open(profile: &str, mode: CleanMode, retention_days: u32) -> Self {
        let now = Utc::now();
        Self {
            schema_version: SCHEMA_VERSION,
            session_id: now.format("%Y-%m-%dT%H-%M-%S").to_string(),
            profile: profile.to_string(),
            mode,
            created_at: now,
            restored: false,
            retention_days,
            total_bytes: 0,
            total_files: 0,
            items: Vec::new(),
        }
    }

    /// Append a removal record, updating the aggregates.
    pub fn push(&mut self, record: RemovalRecord) {
        self.total_bytes += record.size_bytes;
        self.total_files += 1;
        self.items.push(record);
    }

    /// When this session's staged files expire.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::days(i64::from(self.retention_days))
    }

    /// Whether the retention window has elapsed.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at()
    }

    /// Manifest file path inside a sessions directory.
    pub fn path_in(&self, sessions_dir: &Path) -> PathBuf {
        sessions_dir.join(format!("{}.json", self.session_id))
    }

    /// Persist atomically: serialize to a temp file in the same directory,
    /// then rename over the target.
    pub fn save(&self, sessions_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(sessions_dir).map_err(|e| TidyError::io(sessions_dir, e))?;
        let target = self.path_in(sessions_dir);

        let json = serde_json::to_string_pretty(self).map_err(|e| TidyError::Other {
            message: format!("failed to serialize manifest: {e}"),
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(sessions_dir)
            .map_err(|e| TidyError::io(sessions_dir, e))?;
        use std::io::Write;
        tmp.write_all(json.as_bytes())
            .map_err(|e| TidyError::io(tmp.path(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| TidyError::io(tmp.path(), e))?;
        tmp.persist(&target).map_err(|e| TidyError::Io {
            path: target.clone(),
            source: e.error,
        })?;
        Ok(())
    }

    /// Load and validate a manifest by session id.
    pub fn load(sessions_dir: &Path, session_id: &str) -> Result<Self> {
        let path = sessions_dir.join(format!("{session_id}.json"));
        if !path.exists() {
            return Err(TidyError::InvalidManifest {
                path,
                message: format!("session '{session_id}' not found"),
            });
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| TidyError::io(&path, e))?;
        let manifest: SessionManifest =
            serde_json::from_str(&contents).map_err(|e| TidyError::InvalidManifest {
                path: path.clone(),
                message: e.to_string(),
            })?;
        if manifest.schema_version != SCHEMA_VERSION {
            return Err(TidyError::InvalidManifest {
                path,
                message: format!(
                    "unsupported schema version {}",
                    manifest.schema_version
                ),
            });
        }
        Ok(manifest)
    }

    /// Summaries of every session, newest first.
    pub fn list(sessions_dir: &Path, staging_dir: &Path) -> Result<Vec<SessionSummary>> {
        let mut sessions = Vec::new();
        let entries = match std::fs::read_dir(sessions_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(sessions),
            Err(e) => return Err(TidyError::io(sessions_dir, e)),
        };

        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            match Self::load(sessions_dir, &stem) {
                Ok(manifest) => {
                    let staged_size =
                        staged_size_on_disk(&staging_dir.join(&manifest.session_id));
                    sessions.push(SessionSummary {
                        session_id: manifest.session_id.clone(),
                        profile: manifest.profile.clone(),
                        mode: manifest.mode,
                        created_at: manifest.created_at,
                        expires_at: manifest.expires_at(),
                        is_expired: manifest.is_expired(),
                        restored: manifest.restored,
                        total_bytes: manifest.total_bytes,
                        total_files: manifest.total_files,
                        staged_size,
                    });
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable manifest");
                }
            }
        }

        sessions.sort_by(|a, b| b.session_id.cmp(&a.session_id));
        Ok(sessions)
    }

    /// The id of the most recent session, if any.
    pub fn most_recent(sessions_dir: &Path, staging_dir: &Path) -> Result<Option<String>> {
        Ok(Self::list(sessions_dir, staging_dir)?
            .into_iter()
            .next()
            .map(|s| s.session_id))
    }
}

/// Bytes currently held in a session's staging directory.
fn staged_size_on_disk(session_staging: &Path) -> u64 {
    if !session_staging.exists() {
        return 0;
    }
    walkdir::WalkDir::new(session_staging)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Summary row for `list sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub profile: String,
    pub mode: CleanMode,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_expired: bool,
    pub restored: bool,
    pub total_bytes: u64,
    pub total_files: u64,
    /// Bytes currently on disk in the session's staging directory.
    pub staged_size: u64,
}
