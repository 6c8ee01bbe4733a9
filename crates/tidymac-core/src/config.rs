//! State directory layout and persistent configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::TidyError;
use crate::Result;

/// How files are removed by the cleaner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanMode {
    /// Report what would be removed without touching the filesystem.
    Preview,
    /// Move files into the staging area with a manifest for undo.
    Soft,
    /// Unlink files directly. A manifest is still written for audit.
    Hard,
}

impl std::fmt::Display for CleanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CleanMode::Preview => write!(f, "preview"),
            CleanMode::Soft => write!(f, "soft"),
            CleanMode::Hard => write!(f, "hard"),
        }
    }
}

/// The on-disk state directory (`~/.tidymac` unless overridden).
///
/// ```text
/// config.toml
/// profiles/<name>.toml
/// staging/<session-id>/...
/// sessions/<session-id>.json
/// scan_cache.json
/// tidymac.lock
/// ```
#[derive(Debug, Clone)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    /// State directory at an explicit root.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The default state directory, honoring `$TIDYMAC_HOME`.
    pub fn resolve() -> Self {
        let root = std::env::var_os("TIDYMAC_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(std::env::temp_dir)
                    .join(".tidymac")
            });
        Self { root }
    }

    /// Root of the state directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of `config.toml`.
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Directory of user-defined profiles.
    pub fn profiles_dir(&self) -> PathBuf {
        self.root.join("profiles")
    }

    /// Root of the staging area.
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join("staging")
    }

    /// Directory holding session manifests.
    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    /// Path of the scan result cache.
    pub fn cache_path(&self) -> PathBuf {
        self.root.join("scan_cache.json")
    }

    /// Path of the session lockfile.
    pub fn lock_path(&self) -> PathBuf {
        self.root.join("tidymac.lock")
    }

    /// Create the directory skeleton.
    pub fn init(&self) -> Result<()> {
        for dir in [
            self.root.clone(),
            self.profiles_dir(),
            self.staging_dir(),
            self.sessions_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| TidyError::io(&dir, e))?;
        }
        Ok(())
    }
}

/// Persistent configuration loaded from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Mode used when the caller does not specify one.
    #[serde(default = "default_mode")]
    pub default_mode: CleanMode,

    /// Profile used when the caller does not specify one.
    #[serde(default = "default_profile")]
    pub default_profile: String,

    /// Days a soft-deleted session is kept before purge.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Large-file detector threshold in MiB.
    #[serde(default = "default_large_file_mb")]
    pub large_file_threshold_mb: u64,

    /// Staleness threshold in days for dev-project artifacts.
    #[serde(default = "default_stale_days")]
    pub stale_days: u32,

    /// Substring patterns excluded from all scans.
    #[serde(default)]
    pub exclude_paths: Vec<String>,
}

fn default_mode() -> CleanMode {
    CleanMode::Preview
}
fn default_profile() -> String {
    "quick".to_string()
}
fn default_retention_days() -> u32 {
    7
}
fn default_large_file_mb() -> u64 {
    500
}
fn default_stale_days() -> u32 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_mode: default_mode(),
            default_profile: default_profile(),
            retention_days: default_retention_days(),
            large_file_threshold_mb: default_large_file_mb(),
            stale_days: default_stale_days(),
            exclude_paths: Vec::new(),
        }
    }
}

impl Config {
    /// Load from the state directory, falling back to defaults when the
    /// file does not exist.
    pub fn load(state: &StateDir) -> Result<Self> {
        let path = state.config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| TidyError::io(&path, e))?;
        toml::from_str(&contents).map_err(|e| TidyError::Other {
            message: format!("failed to parse {}: {e}", path.display()),
        })
    }

    /// Save to the state directory.
    pub fn save(&self, state: &StateDir) -> Result<()> {
        state.init()?;
        let path = state.config_path();
        let contents = toml::to_string_pretty(self).map_err(|e| TidyError::Other {
            message: format!("failed to serialize config: {e}"),
        })?;
        std::fs::write(&path, contents).map_err(|e| TidyError::io(&path, e))
    }

    /// Large-file threshold in bytes.
    pub fn large_file_threshold_bytes(&self) -> u64 {
        self.large_file_threshold_mb * 1024 * 1024
    }

    /// Whether a path matches one of the exclude patterns.
    pub fn is_excluded(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        self.exclude_paths.iter().any(|p| path_str.contains(p.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_state_dir_layout() {
        let temp = TempDir::new().unwrap();
        let state = StateDir::at(temp.path().join(".tidymac"));
        state.init().unwrap();

        assert!(state.staging_dir().is_dir());
        assert!(state.sessions_dir().is_dir());
        assert!(state.profiles_dir().is_dir());
        assert_eq!(state.lock_path().file_name().unwrap(), "tidymac.lock");
    }

    #[test]
    fn test_config_defaults_when_missing() {
        let temp = TempDir::new().unwrap();
        let state = StateDir::at(temp.path());
        let config = Config::load(&state).unwrap();
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.stale_days, 30);
        assert_eq!(config.default_profile, "quick");
        assert_eq!(config.default_mode, CleanMode::Preview);
    }

    #[test]
    fn test_config_round_trip() {
        let temp = TempDir::new().unwrap();
        let state = StateDir::at(temp.path().join(".tidymac"));
        let mut config = Config::default();
        config.retention_days = 14;
        config.exclude_paths.push("node_modules".into());
        config.save(&state).unwrap();

        let loaded = Config::load(&state).unwrap();
        assert_eq!(loaded.retention_days, 14);
        assert!(loaded.is_excluded(Path::new("/a/node_modules/b")));
        assert!(!loaded.is_excluded(Path::new("/a/src/b")));
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(CleanMode::Preview.to_string(), "preview");
        assert_eq!(CleanMode::Soft.to_string(), "soft");
        assert_eq!(CleanMode::Hard.to_string(), "hard");
    }
}
