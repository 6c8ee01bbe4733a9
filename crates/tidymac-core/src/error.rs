//! Error types shared across the tidymac crates.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the cleanup engine.
///
/// Scanning failures are generally *not* reported through this type; they are
/// aggregated as [`ScanWarning`]s on the affected inventory item. `TidyError`
/// covers the fatal and per-file conditions of cleaning, restoring, and
/// duplicate detection.
#[derive(Debug, Error)]
pub enum TidyError {
    /// The safety guard refused to touch a path.
    #[error("safety guard refused {path}: {reason}")]
    SafetyRefused { path: PathBuf, reason: String },

    /// Path not found.
    #[error("path not found: {path}")]
    NotFound { path: PathBuf },

    /// Permission denied for a path.
    #[error("permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Generic I/O error with path context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Profile does not exist or failed to parse.
    #[error("invalid profile '{name}': {message}")]
    InvalidProfile { name: String, message: String },

    /// Manifest is missing, unparseable, or has an unsupported schema.
    #[error("invalid manifest at {path}: {message}")]
    InvalidManifest { path: PathBuf, message: String },

    /// Another process holds the session lock.
    #[error("session lock held by pid {pid}")]
    SessionLocked { pid: u32 },

    /// The session's retention window has elapsed.
    #[error("session '{session_id}' expired at {expired_at}")]
    SessionExpired {
        session_id: String,
        expired_at: DateTime<Utc>,
    },

    /// The session cannot be restored (hard mode, or already restored).
    #[error("session '{session_id}' is not restorable: {reason}")]
    NotRestorable { session_id: String, reason: String },

    /// A copy verification (size or digest) mismatched.
    #[error("verification failed for {path}: {message}")]
    VerificationFailed { path: PathBuf, message: String },

    /// The operation was cancelled cooperatively.
    #[error("operation cancelled")]
    Cancelled,

    /// A time budget was exhausted.
    #[error("budget exceeded: {message}")]
    BudgetExceeded { message: String },

    /// Catch-all with context already baked in.
    #[error("{message}")]
    Other { message: String },
}

impl TidyError {
    /// Create an I/O error, classifying common kinds into typed variants.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }

    /// Create an untyped error from a message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// The stable machine-readable kind string for this error.
    ///
    /// These strings are part of the consumer API surface: collaborators
    /// match on them rather than on display text.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SafetyRefused { .. } => "safety_refused",
            Self::NotFound { .. } => "path_not_found",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::Io { .. } => "io_error",
            Self::InvalidProfile { .. } => "invalid_profile",
            Self::InvalidManifest { .. } => "invalid_manifest",
            Self::SessionLocked { .. } => "session_locked",
            Self::SessionExpired { .. } => "session_expired",
            Self::NotRestorable { .. } => "not_restorable",
            Self::VerificationFailed { .. } => "verification_failed",
            Self::Cancelled => "cancelled",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::Other { .. } => "error",
        }
    }
}

/// Kind of non-fatal warning collected during a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// Error reading a file or directory.
    ReadError,
    /// Error reading metadata.
    MetadataError,
    /// Symbolic link target does not exist.
    BrokenSymlink,
    /// The safety guard refused descent or deletion.
    SafetyRefused,
    /// A per-target time budget halted the walk early.
    Truncated,
}

/// Non-fatal warning attached to a scan target or inventory item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message, including an actionable hint where one exists.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a permission-denied warning with the access hint.
    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            message: format!(
                "Permission denied: {} (the calling process may need broader disk access)",
                path.display()
            ),
            path,
            kind: WarningKind::PermissionDenied,
        }
    }

    /// Create a read-error warning.
    pub fn read_error(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        let path = path.into();
        Self {
            message: format!("Read error at {}: {error}", path.display()),
            path,
            kind: WarningKind::ReadError,
        }
    }

    /// Create a truncation warning for a walk that hit its time budget.
    pub fn truncated(path: impl Into<PathBuf>, budget_secs: u64) -> Self {
        let path = path.into();
        Self {
            message: format!(
                "Walk of {} exceeded the {budget_secs}s budget; results are partial",
                path.display()
            ),
            path,
            kind: WarningKind::Truncated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_classification() {
        let err = TidyError::io(
            "/some/path",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, TidyError::PermissionDenied { .. }));
        assert_eq!(err.kind(), "permission_denied");

        let err = TidyError::io(
            "/some/path",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert_eq!(err.kind(), "path_not_found");
    }

    #[test]
    fn test_warning_carries_path() {
        let warning = ScanWarning::permission_denied("/blocked/path");
        assert_eq!(warning.kind, WarningKind::PermissionDenied);
        assert!(warning.message.contains("/blocked/path"));
    }

    #[test]
    fn test_kind_strings_are_snake_case() {
        assert_eq!(
            TidyError::SafetyRefused {
                path: PathBuf::from("/x"),
                reason: "test".into()
            }
            .kind(),
            "safety_refused"
        );
        assert_eq!(TidyError::Cancelled.kind(), "cancelled");
    }
}
