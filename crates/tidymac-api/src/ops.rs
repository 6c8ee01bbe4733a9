//! The engine operations behind the consumer API.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use tidymac_clean::{
    purge_sessions, reconcile_staging, restore_session, staging_health, CleanEngine, CleanReport,
    PurgePolicy, PurgeReport, RestoreReport, SessionManifest, SessionSummary, StagingHealth,
};
use tidymac_core::{
    builtin_profiles, CleanMode, Config, Profile, Result, SafetyGuard, ScanEnv, StateDir,
    TidyError,
};
use tidymac_dupes::{DupConfig, DupReport, DuplicateFinder};
use tidymac_scan::{probe_dev_tools, DevToolUsage, Inventory, Scanner};

/// Exit codes for the CLI collaborator.
pub const EXIT_OK: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_NOOP: i32 = 2;
pub const EXIT_USAGE: i32 = 64;
pub const EXIT_SAFETY: i32 = 73;
pub const EXIT_IO: i32 = 74;

/// Map a fatal error to its exit code.
pub fn error_exit_code(error: &TidyError) -> i32 {
    match error.kind() {
        "invalid_profile" => EXIT_USAGE,
        "safety_refused" => EXIT_SAFETY,
        "io_error" | "permission_denied" | "path_not_found" => EXIT_IO,
        _ => EXIT_PARTIAL,
    }
}

/// Row of `list profiles`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub name: String,
    pub description: String,
    pub aggression: String,
}

/// Per-category slice of `disk usage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryUsage {
    pub category: String,
    pub bytes: u64,
    pub files: u64,
}

/// Result of `disk usage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskUsage {
    pub categories: Vec<CategoryUsage>,
    pub total_bytes: u64,
    pub total_files: u64,
    /// Developer tool caches present on this machine.
    pub dev_tools: Vec<DevToolUsage>,
}

/// Handle over one state directory; every API operation hangs off this.
pub struct Tidymac {
    state: StateDir,
    config: Config,
    guard: SafetyGuard,
    env: ScanEnv,
}

impl Tidymac {
    /// Open against the default state directory and the real home.
    pub fn open() -> Result<Self> {
        Self::with_parts(StateDir::resolve(), SafetyGuard::new(), ScanEnv::current())
    }

    /// Open against explicit state, guard, and environment.
    pub fn with_parts(state: StateDir, guard: SafetyGuard, env: ScanEnv) -> Result<Self> {
        state.init()?;
        let config = Config::load(&state)?;
        for orphan in reconcile_staging(&state.sessions_dir(), &state.staging_dir())? {
            warn!(path = %orphan.display(), "orphaned staging directory from an interrupted session");
        }
        Ok(Self {
            state,
            config,
            guard,
            env,
        })
    }

    /// The loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// List built-in and user profiles.
    pub fn list_profiles(&self) -> Vec<ProfileSummary> {
        Profile::available(&self.state.profiles_dir())
            .into_iter()
            .filter_map(|name| Profile::load(&name, &self.state.profiles_dir()).ok())
            .map(|p| ProfileSummary {
                name: p.name.clone(),
                description: p.description.clone(),
                aggression: p.aggression.to_string(),
            })
            .collect()
    }

    /// Scan under a profile and return the classified inventory.
    pub fn scan(&self, profile_name: &str) -> Result<Inventory> {
        let profile = self.load_profile(profile_name)?;
        Ok(self.scanner().scan(&profile))
    }

    /// Top-level category breakdown over every catalog target.
    pub fn disk_usage(&self) -> Result<DiskUsage> {
        let mut profile = builtin_profiles()
            .into_iter()
            .find(|p| p.name == "deep")
            .ok_or_else(|| TidyError::InvalidProfile {
                name: "deep".to_string(),
                message: "built-in profile missing".to_string(),
            })?;
        profile.include_dangerous = true;
        let inventory = self.scanner().scan(&profile);

        let mut by_category: BTreeMap<String, CategoryUsage> = BTreeMap::new();
        for item in &inventory.items {
            let entry = by_category
                .entry(item.category.to_string())
                .or_insert_with(|| CategoryUsage {
                    category: item.category.to_string(),
                    bytes: 0,
                    files: 0,
                });
            entry.bytes += item.bytes;
            entry.files += item.file_count;
        }

        let mut categories: Vec<CategoryUsage> = by_category.into_values().collect();
        categories.sort_by(|a, b| b.bytes.cmp(&a.bytes));
        Ok(DiskUsage {
            total_bytes: inventory.total_reclaimable,
            total_files: inventory.total_files,
            categories,
            dev_tools: probe_dev_tools(&self.env),
        })
    }

    /// Hygiene summary of the staging area.
    pub fn staging_health(&self) -> Result<StagingHealth> {
        staging_health(&self.state.sessions_dir(), &self.state.staging_dir())
    }

    /// Scan, then clean the selected items under `mode`.
    pub fn clean(
        &self,
        profile_name: &str,
        mode: CleanMode,
        items: Option<Vec<String>>,
        force: bool,
    ) -> Result<CleanReport> {
        let inventory = self.scan(profile_name)?;
        if inventory.items.is_empty() {
            return Ok(CleanReport {
                mode,
                files_removed: 0,
                bytes_freed: 0,
                session_id: None,
                errors: Vec::new(),
            });
        }
        let engine = CleanEngine::new(self.state.clone(), self.guard.clone())
            .with_verify(true)
            .with_force(force);
        engine.clean(
            &inventory,
            items.as_deref(),
            mode,
            self.config.retention_days,
        )
    }

    /// Summaries of all sessions, newest first.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        SessionManifest::list(&self.state.sessions_dir(), &self.state.staging_dir())
    }

    /// Undo a soft session; `None` restores the most recent one.
    pub fn restore(&self, session_id: Option<&str>) -> Result<RestoreReport> {
        let sessions_dir = self.state.sessions_dir();
        let staging_dir = self.state.staging_dir();
        let id = match session_id {
            Some(id) => id.to_string(),
            None => SessionManifest::most_recent(&sessions_dir, &staging_dir)?.ok_or_else(
                || TidyError::Other {
                    message: "no sessions to restore".to_string(),
                },
            )?,
        };
        restore_session(&sessions_dir, &staging_dir, &id)
    }

    /// Run the duplicate pipeline over a caller-supplied root.
    pub fn find_duplicates(&self, root: &Path, perceptual: bool) -> Result<DupReport> {
        let config = DupConfig::builder()
            .root(root.to_path_buf())
            .perceptual(perceptual)
            .exclude(self.config.exclude_paths.clone())
            .build()
            .map_err(|e| TidyError::Other {
                message: format!("invalid duplicate config: {e}"),
            })?;
        DuplicateFinder::with_config(config).find()
    }

    /// Purge sessions by policy.
    pub fn purge(&self, policy: PurgePolicy, force: bool) -> Result<PurgeReport> {
        purge_sessions(
            &self.state.sessions_dir(),
            &self.state.staging_dir(),
            policy,
            force,
        )
    }

    fn load_profile(&self, name: &str) -> Result<Profile> {
        let mut profile = Profile::load(name, &self.state.profiles_dir())?;
        // Profile knobs default from config when the profile leaves them at
        // the built-in defaults and the config overrides them.
        if profile.stale_days == 30 && self.config.stale_days != 30 {
            profile.stale_days = self.config.stale_days;
        }
        Ok(profile)
    }

    fn scanner(&self) -> Scanner {
        Scanner::new(self.guard.clone(), self.env.clone())
            .with_cache(self.state.cache_path())
            .with_exclude(self.config.exclude_paths.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn api_for(temp: &TempDir) -> (Tidymac, PathBuf) {
        let home = temp.path().join("home");
        fs::create_dir_all(&home).unwrap();
        let state = StateDir::at(home.join(".tidymac"));
        state.init().unwrap();
        let api = Tidymac::with_parts(
            state,
            SafetyGuard::with_home(&home),
            ScanEnv::with_home(&home),
        )
        .unwrap();
        (api, home)
    }

    #[test]
    fn test_list_profiles_includes_builtins() {
        let temp = TempDir::new().unwrap();
        let (api, _) = api_for(&temp);
        let profiles = api.list_profiles();
        let names: Vec<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
        for expected in ["quick", "developer", "creative", "deep"] {
            assert!(names.contains(&expected), "missing builtin {expected}");
        }
    }

    #[test]
    fn test_unknown_profile_maps_to_usage_exit() {
        let temp = TempDir::new().unwrap();
        let (api, _) = api_for(&temp);
        let err = api.scan("nonexistent").unwrap_err();
        assert_eq!(error_exit_code(&err), EXIT_USAGE);
    }

    #[test]
    fn test_reports_serialize_to_json() {
        let temp = TempDir::new().unwrap();
        let (api, home) = api_for(&temp);
        fs::create_dir_all(home.join(".cache")).unwrap();

        let inventory = api.scan("quick").unwrap();
        let json = serde_json::to_value(&inventory).unwrap();
        assert_eq!(json["profile"], "quick");

        let sessions = api.list_sessions().unwrap();
        serde_json::to_string(&sessions).unwrap();
    }

    #[test]
    fn test_restore_without_sessions_is_error() {
        let temp = TempDir::new().unwrap();
        let (api, _) = api_for(&temp);
        assert!(api.restore(None).is_err());
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(
            error_exit_code(&TidyError::SafetyRefused {
                path: PathBuf::from("/x"),
                reason: "r".into()
            }),
            EXIT_SAFETY
        );
        assert_eq!(
            error_exit_code(&TidyError::InvalidProfile {
                name: "x".into(),
                message: "m".into()
            }),
            EXIT_USAGE
        );
        assert_eq!(
            error_exit_code(&TidyError::NotFound {
                path: PathBuf::from("/x")
            }),
            EXIT_IO
        );
    }
}
