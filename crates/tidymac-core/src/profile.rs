//! Profiles: named target subsets plus policy knobs.
//!
//! Four built-in profiles ship with the engine; user profiles are TOML files
//! in the state directory merged field-wise on top of the built-in with the
//! same name (or the defaults when the name is new). Lists replace rather
//! than union.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TidyError;
use crate::target::{Category, SafetyLabel, ScanTarget};
use crate::Result;

/// How aggressively a profile selects and removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggression {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Aggression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Aggression::Low => write!(f, "low"),
            Aggression::Medium => write!(f, "medium"),
            Aggression::High => write!(f, "high"),
        }
    }
}

/// A fully resolved profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub description: String,
    pub aggression: Aggression,
    /// Catalog target names this profile scans.
    pub targets: Vec<String>,
    /// Staleness threshold in days.
    pub stale_days: u32,
    /// Large-file threshold in MiB.
    pub large_file_threshold_mb: u64,
    /// Whether Dangerous-labeled targets are included in the scan.
    pub include_dangerous: bool,
}

/// Policy knobs extracted from a profile for the scanner and cleaner.
#[derive(Debug, Clone, Copy)]
pub struct Policy {
    pub aggression: Aggression,
    pub stale_days: u32,
    pub large_file_threshold_bytes: u64,
    pub include_dangerous: bool,
}

impl Profile {
    /// The policy knobs of this profile.
    pub fn policy(&self) -> Policy {
        Policy {
            aggression: self.aggression,
            stale_days: self.stale_days,
            large_file_threshold_bytes: self.large_file_threshold_mb * 1024 * 1024,
            include_dangerous: self.include_dangerous,
        }
    }

    /// Select the active targets from the catalog.
    ///
    /// Unknown names are warned and skipped; Dangerous targets are dropped
    /// unless the profile opts in.
    pub fn select_targets(&self, catalog: &[ScanTarget]) -> Vec<ScanTarget> {
        let mut selected = Vec::new();
        for name in &self.targets {
            match catalog.iter().find(|t| t.name == name.as_str()) {
                Some(target) => {
                    if target.safety == SafetyLabel::Dangerous && !self.include_dangerous {
                        continue;
                    }
                    selected.push(target.clone());
                }
                None => tracing::warn!(profile = %self.name, target = %name, "unknown target name"),
            }
        }
        selected
    }

    /// Load a profile by name: built-in first, then `<profiles_dir>/<name>.toml`
    /// merged over the matching built-in (or the defaults).
    pub fn load(name: &str, profiles_dir: &Path) -> Result<Self> {
        let base = builtin_profiles()
            .into_iter()
            .find(|p| p.name == name);

        let path = profiles_dir.join(format!("{name}.toml"));
        if !path.exists() {
            return base.ok_or_else(|| TidyError::InvalidProfile {
                name: name.to_string(),
                message: "not a built-in and no profile file exists".to_string(),
            });
        }

        let contents = std::fs::read_to_string(&path).map_err(|e| TidyError::io(&path, e))?;
        let overlay: ProfileOverlay =
            toml::from_str(&contents).map_err(|e| TidyError::InvalidProfile {
                name: name.to_string(),
                message: format!("failed to parse {}: {e}", path.display()),
            })?;
        overlay.warn_unknown_keys(name);

        let mut profile = base.unwrap_or_else(|| Profile {
            name: name.to_string(),
            description: String::new(),
            aggression: Aggression::Low,
            targets: Vec::new(),
            stale_days: 30,
            large_file_threshold_mb: 500,
            include_dangerous: false,
        });
        overlay.apply(&mut profile);
        Ok(profile)
    }

    /// All available profile names: built-ins plus user profile files.
    pub fn available(profiles_dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = builtin_profiles().into_iter().map(|p| p.name).collect();
        if let Ok(entries) = std::fs::read_dir(profiles_dir) {
            for entry in entries.filter_map(|e| e.ok()) {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) = path.file_stem() {
                        let name = stem.to_string_lossy().into_owned();
                        if !names.contains(&name) {
                            names.push(name);
                        }
                    }
                }
            }
        }
        names
    }
}

/// Partial profile read from a user TOML file. Every field optional; present
/// fields override the base, lists replace wholesale.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileOverlay {
    pub name: Option<String>,
    pub description: Option<String>,
    pub aggression: Option<Aggression>,
    pub targets: Option<Vec<String>>,
    pub stale_days: Option<u32>,
    pub large_file_threshold_mb: Option<u64>,
    pub include_dangerous: Option<bool>,
    /// Anything else in the file; warned about and dropped, never stored.
    #[serde(flatten)]
    pub unknown: HashMap<String, toml::Value>,
}

impl ProfileOverlay {
    fn warn_unknown_keys(&self, profile: &str) {
        for key in self.unknown.keys() {
            tracing::warn!(profile, key, "ignoring unknown profile field");
        }
    }

    fn apply(&self, base: &mut Profile) {
        if let Some(v) = &self.name {
            base.name = v.clone();
        }
        if let Some(v) = &self.description {
            base.description = v.clone();
        }
        if let Some(v) = self.aggression {
            base.aggression = v;
        }
        if let Some(v) = &self.targets {
            base.targets = v.clone();
        }
        if let Some(v) = self.stale_days {
            base.stale_days = v;
        }
        if let Some(v) = self.large_file_threshold_mb {
            base.large_file_threshold_mb = v;
        }
        if let Some(v) = self.include_dangerous {
            base.include_dangerous = v;
        }
    }
}

fn quick_targets() -> Vec<String> {
    [
        "user-caches",
        "xdg-caches",
        "user-logs",
        "temp-files",
        "user-temp",
        "trash",
        "quicklook-thumbnails",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn developer_targets() -> Vec<String> {
    let mut targets = quick_targets();
    targets.extend(
        [
            "crash-reports",
            "xcode-derived-data",
            "ios-simulators",
            "docker-data",
            "homebrew-cache",
            "pip-cache",
            "pip-cache-darwin",
            "npm-cache",
            "yarn-cache",
            "cocoapods-cache",
            "cargo-registry",
            "cargo-registry-src",
            "gradle-cache",
            "maven-repository",
            "conda-packages",
            "dev-projects",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    targets
}

/// The four built-in profiles.
pub fn builtin_profiles() -> Vec<Profile> {
    vec![
        Profile {
            name: "quick".to_string(),
            description: "Fast daily cleanup: caches, temp files, trash".to_string(),
            aggression: Aggression::Low,
            targets: quick_targets(),
            stale_days: 30,
            large_file_threshold_mb: 500,
            include_dangerous: false,
        },
        Profile {
            name: "developer".to_string(),
            description: "Everything in quick plus developer tool caches and artifacts"
                .to_string(),
            aggression: Aggression::Medium,
            targets: developer_targets(),
            stale_days: 30,
            large_file_threshold_mb: 500,
            include_dangerous: false,
        },
        Profile {
            name: "creative".to_string(),
            description: "Everything in quick plus media previews and render caches".to_string(),
            aggression: Aggression::Medium,
            targets: {
                let mut t = quick_targets();
                t.extend(
                    ["crash-reports", "mail-attachments", "media-previews", "render-caches"]
                        .iter()
                        .map(|s| s.to_string()),
                );
                t
            },
            stale_days: 14,
            large_file_threshold_mb: 200,
            include_dangerous: false,
        },
        Profile {
            name: "deep".to_string(),
            description: "Thorough cleanup: every target, including large files".to_string(),
            aggression: Aggression::High,
            targets: {
                let mut t = developer_targets();
                t.extend(
                    [
                        "system-logs",
                        "volume-trash",
                        "mail-attachments",
                        "media-previews",
                        "render-caches",
                        "downloaded-installers",
                        "xcode-archives",
                        "large-files",
                    ]
                    .iter()
                    .map(|s| s.to_string()),
                );
                t
            },
            stale_days: 14,
            large_file_threshold_mb: 100,
            include_dangerous: false,
        },
    ]
}
