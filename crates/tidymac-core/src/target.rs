//! The scan-target catalog.
//!
//! Targets are immutable configuration assembled at startup: where to look,
//! how to classify what is found, and how dangerous removal is. Resolution
//! is polymorphic over literal paths, home-relative paths, globs, and
//! detector rules.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Safety judgment attached to an inventory item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLabel {
    /// Routinely removed without review.
    Safe,
    /// Review recommended before removal.
    Caution,
    /// Never auto-selected; shown for transparency only.
    Dangerous,
}

impl std::fmt::Display for SafetyLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SafetyLabel::Safe => write!(f, "Safe"),
            SafetyLabel::Caution => write!(f, "Caution"),
            SafetyLabel::Dangerous => write!(f, "Dangerous"),
        }
    }
}

/// Developer tool a cache or artifact tree belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevTool {
    Xcode,
    XcodeArchives,
    Simulators,
    Docker,
    Node,
    Venv,
    Conda,
    Homebrew,
    Pip,
    Npm,
    Yarn,
    CocoaPods,
    Cargo,
    Gradle,
    Maven,
}

impl std::fmt::Display for DevTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DevTool::Xcode => write!(f, "Xcode"),
            DevTool::XcodeArchives => write!(f, "Xcode Archives"),
            DevTool::Simulators => write!(f, "Simulators"),
            DevTool::Docker => write!(f, "Docker"),
            DevTool::Node => write!(f, "Node"),
            DevTool::Venv => write!(f, "Python venv"),
            DevTool::Conda => write!(f, "Conda"),
            DevTool::Homebrew => write!(f, "Homebrew"),
            DevTool::Pip => write!(f, "pip"),
            DevTool::Npm => write!(f, "npm"),
            DevTool::Yarn => write!(f, "Yarn"),
            DevTool::CocoaPods => write!(f, "CocoaPods"),
            DevTool::Cargo => write!(f, "Cargo"),
            DevTool::Gradle => write!(f, "Gradle"),
            DevTool::Maven => write!(f, "Maven"),
        }
    }
}

/// Category of an inventory item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    UserCache,
    SystemCache,
    Logs,
    TempFiles,
    CrashReports,
    Trash,
    MailAttachment,
    MediaPreviews,
    DownloadedInstaller,
    Dev(DevTool),
    LargeFile,
    Duplicate,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::UserCache => write!(f, "Cache"),
            Category::SystemCache => write!(f, "System Cache"),
            Category::Logs => write!(f, "Log"),
            Category::TempFiles => write!(f, "Temp"),
            Category::CrashReports => write!(f, "Crash Reports"),
            Category::Trash => write!(f, "Trash"),
            Category::MailAttachment => write!(f, "Mail"),
            Category::MediaPreviews => write!(f, "Media Previews"),
            Category::DownloadedInstaller => write!(f, "Installer"),
            Category::Dev(tool) => write!(f, "Dev: {tool}"),
            Category::LargeFile => write!(f, "Large"),
            Category::Duplicate => write!(f, "Duplicate"),
        }
    }
}

/// Environment a target resolves against. A test seam: production code
/// uses the real home directory, tests substitute a temp root.
#[derive(Debug, Clone)]
pub struct ScanEnv {
    /// Home directory used for tilde expansion.
    pub home: PathBuf,
}

impl ScanEnv {
    /// Environment for the current user.
    pub fn current() -> Self {
        Self {
            home: dirs::home_dir().unwrap_or_else(std::env::temp_dir),
        }
    }

    /// Environment with an explicit home directory.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Expand a leading `~` against this environment's home.
    pub fn expand(&self, path: &str) -> PathBuf {
        match path.strip_prefix("~/") {
            Some(rest) => self.home.join(rest),
            None if path == "~" => self.home.clone(),
            None => PathBuf::from(path),
        }
    }
}

/// Rules interpreted by the scanner rather than resolved to fixed paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorRule {
    /// Walk project roots looking for developer working directories
    /// (node_modules, target/, venvs, ...) by signature files.
    DevProjects,
    /// Files above the profile's size threshold under user-writable roots.
    LargeFiles,
}

/// How a target's candidate paths are found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSource {
    /// A literal absolute path.
    Path(String),
    /// A `~`-relative path.
    Home(String),
    /// A glob over `~`-expanded roots.
    Glob(String),
    /// A detector rule; resolution yields the search roots.
    Detector(DetectorRule),
}

impl TargetSource {
    /// Resolve to concrete, existing root directories.
    ///
    /// Detector sources resolve to the project search roots the rule walks;
    /// the scanner interprets the rule itself.
    pub fn resolve(&self, env: &ScanEnv) -> Vec<PathBuf> {
        let candidates: Vec<PathBuf> = match self {
            TargetSource::Path(p) => vec![PathBuf::from(p)],
            TargetSource::Home(rel) => vec![env.home.join(rel)],
            TargetSource::Glob(pattern) => {
                let expanded = env.expand(pattern);
                let pattern = expanded.to_string_lossy().into_owned();
                match glob::glob(&pattern) {
                    Ok(paths) => paths.filter_map(|p| p.ok()).collect(),
                    Err(e) => {
                        tracing::warn!(pattern, error = %e, "invalid glob pattern in catalog");
                        Vec::new()
                    }
                }
            }
            TargetSource::Detector(_) => project_search_roots(env),
        };
        candidates.into_iter().filter(|p| p.exists()).collect()
    }
}

/// Conventional locations where development projects live.
fn project_search_roots(env: &ScanEnv) -> Vec<PathBuf> {
    [
        "Projects", "projects", "Code", "code", "Development", "dev", "workspace", "repos",
        "src",
    ]
    .iter()
    .map(|rel| env.home.join(rel))
    .collect()
}

/// A single entry in the scan catalog.
#[derive(Debug, Clone)]
pub struct ScanTarget {
    /// Stable name; profiles select targets by this.
    pub name: String,
    /// Category attached to the resulting inventory item.
    pub category: Category,
    /// Where candidate paths come from.
    pub source: TargetSource,
    /// Default safety label.
    pub safety: SafetyLabel,
    /// Human-readable reason shown next to the item.
    pub reason: String,
    /// Only count files at least this large.
    pub min_size: Option<u64>,
    /// Only count files at least this stale (days since mtime).
    pub min_age_days: Option<u32>,
}

impl ScanTarget {
    /// Create a target with no size or age filters.
    pub fn new(
        name: impl Into<String>,
        category: Category,
        source: TargetSource,
        safety: SafetyLabel,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            source,
            safety,
            reason: reason.into(),
            min_size: None,
            min_age_days: None,
        }
    }

    /// Only count files whose staleness is at least `days`.
    pub fn min_age(mut self, days: u32) -> Self {
        self.min_age_days = Some(days);
        self
    }
}

/// The static catalog of scan targets.
pub fn catalog() -> Vec<ScanTarget> {
    use Category::*;
    use SafetyLabel::*;

    fn home(p: &str) -> TargetSource {
        TargetSource::Home(p.to_string())
    }
    fn path(p: &str) -> TargetSource {
        TargetSource::Path(p.to_string())
    }
    fn volumes(p: &str) -> TargetSource {
        TargetSource::Glob(p.to_string())
    }

    vec![
        // System junk
        ScanTarget::new(
            "user-caches",
            UserCache,
            home("Library/Caches"),
            Safe,
            "Application caches regenerated automatically",
        ),
        ScanTarget::new(
            "xdg-caches",
            UserCache,
            home(".cache"),
            Safe,
            "Per-user cache directory regenerated on demand",
        ),
        ScanTarget::new(
            "user-logs",
            Logs,
            home("Library/Logs"),
            Safe,
            "Application log files",
        ),
        ScanTarget::new(
            "system-logs",
            Logs,
            path("/var/log"),
            Caution,
            "System logs; old entries are safe to remove",
        )
        .min_age(7),
        ScanTarget::new(
            "temp-files",
            TempFiles,
            path("/tmp"),
            Safe,
            "Temporary files created by the system and apps",
        )
        .min_age(1),
        ScanTarget::new(
            "user-temp",
            TempFiles,
            path("/var/folders"),
            Safe,
            "Per-user temporary and cache folders",
        )
        .min_age(1),
        ScanTarget::new(
            "trash",
            Trash,
            home(".Trash"),
            Safe,
            "Files already moved to the trash bin",
        ),
        ScanTarget::new(
            "volume-trash",
            Trash,
            volumes("/Volumes/*/.Trashes"),
            Safe,
            "Trash folders on external volumes",
        ),
        ScanTarget::new(
            "crash-reports",
            CrashReports,
            home("Library/Logs/DiagnosticReports"),
            Safe,
            "Crash reports; safe to remove unless debugging",
        ),
        ScanTarget::new(
            "quicklook-thumbnails",
            SystemCache,
            home("Library/Caches/com.apple.QuickLook.thumbnailcache"),
            Safe,
            "Thumbnail previews regenerated on demand",
        ),
        ScanTarget::new(
            "mail-attachments",
            MailAttachment,
            home("Library/Mail Downloads"),
            Safe,
            "Cached mail attachments re-fetched from the server",
        ),
        ScanTarget::new(
            "media-previews",
            MediaPreviews,
            home("Library/Caches/com.apple.photoanalysisd"),
            Caution,
            "Media analysis previews regenerated over time",
        ),
        ScanTarget::new(
            "render-caches",
            MediaPreviews,
            home("Movies/Motion Templates.localized/.cache"),
            Caution,
            "Render caches from video tooling",
        ),
        ScanTarget::new(
            "downloaded-installers",
            DownloadedInstaller,
            home("Library/Caches/com.apple.appstoreagent"),
            Caution,
            "Installer payloads already applied",
        )
        .min_age(7),
        // Developer caches
        ScanTarget::new(
            "xcode-derived-data",
            Dev(DevTool::Xcode),
            home("Library/Developer/Xcode/DerivedData"),
            Safe,
            "Build artifacts Xcode regenerates on the next build",
        ),
        ScanTarget::new(
            "xcode-archives",
            Dev(DevTool::XcodeArchives),
            home("Library/Developer/Xcode/Archives"),
            Dangerous,
            "Submission archives; keep to debug shipped builds",
        )
        .min_age(90),
        ScanTarget::new(
            "ios-simulators",
            Dev(DevTool::Simulators),
            home("Library/Developer/CoreSimulator/Caches"),
            Caution,
            "Simulator caches; re-downloaded when needed",
        ),
        ScanTarget::new(
            "docker-data",
            Dev(DevTool::Docker),
            home("Library/Containers/com.docker.docker/Data"),
            Caution,
            "Docker images and volumes; prefer `docker system prune`",
        ),
        ScanTarget::new(
            "homebrew-cache",
            Dev(DevTool::Homebrew),
            home("Library/Caches/Homebrew"),
            Safe,
            "Downloaded package archives re-fetched on demand",
        ),
        ScanTarget::new(
            "pip-cache",
            Dev(DevTool::Pip),
            home(".cache/pip"),
            Safe,
            "Python package download cache re-fetched on demand",
        ),
        ScanTarget::new(
            "pip-cache-darwin",
            Dev(DevTool::Pip),
            home("Library/Caches/pip"),
            Safe,
            "Python package download cache re-fetched on demand",
        ),
        ScanTarget::new(
            "npm-cache",
            Dev(DevTool::Npm),
            home(".npm/_cacache"),
            Safe,
            "npm package cache re-fetched on demand",
        ),
        ScanTarget::new(
            "yarn-cache",
            Dev(DevTool::Yarn),
            home("Library/Caches/Yarn"),
            Safe,
            "Yarn package cache re-fetched on demand",
        ),
        ScanTarget::new(
            "cocoapods-cache",
            Dev(DevTool::CocoaPods),
            home("Library/Caches/CocoaPods"),
            Safe,
            "CocoaPods spec and download cache",
        ),
        ScanTarget::new(
            "cargo-registry",
            Dev(DevTool::Cargo),
            home(".cargo/registry/cache"),
            Safe,
            "Crate downloads re-fetched on demand",
        ),
        ScanTarget::new(
            "cargo-registry-src",
            Dev(DevTool::Cargo),
            home(".cargo/registry/src"),
            Safe,
            "Unpacked crate sources re-created on demand",
        ),
        ScanTarget::new(
            "gradle-cache",
            Dev(DevTool::Gradle),
            home(".gradle/caches"),
            Safe,
            "Gradle build cache and dependency downloads",
        ),
        ScanTarget::new(
            "maven-repository",
            Dev(DevTool::Maven),
            home(".m2/repository"),
            Caution,
            "Maven repository; may hold locally installed artifacts",
        ),
        ScanTarget::new(
            "conda-packages",
            Dev(DevTool::Conda),
            home(".conda/pkgs"),
            Safe,
            "Conda package downloads re-fetched on demand",
        ),
        // Detector-driven targets
        ScanTarget::new(
            "dev-projects",
            Dev(DevTool::Node),
            TargetSource::Detector(DetectorRule::DevProjects),
            Caution,
            "Build artifacts and dependency trees inside project directories",
        ),
        ScanTarget::new(
            "large-files",
            LargeFile,
            TargetSource::Detector(DetectorRule::LargeFiles),
            Caution,
            "Files above the size threshold that may no longer be needed",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_catalog_names_are_unique() {
        let targets = catalog();
        let mut names: Vec<&str> = targets.iter().map(|t| t.name.as_str()).collect();
        names.sort_unstable();
        let before = names.len();
        names.dedup();
        assert_eq!(before, names.len());
        assert!(before >= 25, "catalog unexpectedly small: {before}");
    }

    #[test]
    fn test_home_source_resolution() {
        let temp = TempDir::new().unwrap();
        let env = ScanEnv::with_home(temp.path());
        fs::create_dir_all(temp.path().join("Library/Caches")).unwrap();

        let source = TargetSource::Home("Library/Caches".to_string());
        assert_eq!(
            source.resolve(&env),
            vec![temp.path().join("Library/Caches")]
        );

        // Nonexistent roots resolve to nothing.
        let source = TargetSource::Home("Library/Nope".to_string());
        assert!(source.resolve(&env).is_empty());
    }

    #[test]
    fn test_glob_source_resolution() {
        let temp = TempDir::new().unwrap();
        let env = ScanEnv::with_home(temp.path());
        fs::create_dir_all(temp.path().join("vols/a/.Trashes")).unwrap();
        fs::create_dir_all(temp.path().join("vols/b/.Trashes")).unwrap();

        let source = TargetSource::Glob("~/vols/*/.Trashes".to_string());
        let mut resolved = source.resolve(&env);
        resolved.sort();
        assert_eq!(resolved.len(), 2);
        assert!(resolved[0].ends_with("a/.Trashes"));
    }

    #[test]
    fn test_tilde_expansion() {
        let env = ScanEnv::with_home("/home/someone");
        assert_eq!(
            env.expand("~/x/y"),
            PathBuf::from("/home/someone/x/y")
        );
        assert_eq!(env.expand("~"), PathBuf::from("/home/someone"));
        assert_eq!(env.expand("/abs"), PathBuf::from("/abs"));
    }

    #[test]
    fn test_safety_label_ordering() {
        assert!(SafetyLabel::Safe < SafetyLabel::Caution);
        assert!(SafetyLabel::Caution < SafetyLabel::Dangerous);
    }

    #[test]
    fn test_category_display() {
        assert_eq!(Category::Dev(DevTool::Node).to_string(), "Dev: Node");
        assert_eq!(Category::UserCache.to_string(), "Cache");
    }
}
