//! The safety guard: the last line of defense before inspection or deletion.
//!
//! Every path the walker descends into and every path the cleaner removes is
//! checked here first. The guard fails closed: when canonicalization or any
//! other check errors, the verdict is deny.

use std::path::{Path, PathBuf};

/// Outcome of a guard check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The path may be inspected or deleted.
    Allow,
    /// The path must not be touched.
    Deny { reason: String },
}

impl Verdict {
    /// Whether this verdict permits the operation.
    pub fn is_allow(&self) -> bool {
        matches!(self, Verdict::Allow)
    }

    fn deny(reason: impl Into<String>) -> Self {
        Verdict::Deny {
            reason: reason.into(),
        }
    }
}

/// Root-level paths protected in their entirety. Deleting any of these, or
/// an ancestor of one, is always refused.
const SYSTEM_ROOTS: &[&str] = &[
    "/", "/System", "/Applications", "/Users", "/Library", "/usr", "/bin", "/sbin", "/var",
    "/etc", "/opt", "/private", "/cores", "/Volumes",
];

/// Home-relative directories whose entire subtree is off limits.
const PROTECTED_HOME_SUBTREES: &[&str] = &[
    "Desktop",
    "Documents",
    "Downloads",
    "Pictures",
    "Music",
    "Movies",
    "Applications",
    "Library/Preferences",
    ".ssh",
    ".gnupg",
];

/// Home-relative prefixes that are known-cleanable. Deletion is permitted
/// only strictly inside one of these (or inside an explicitly added prefix
/// such as the staging root).
const CLEANABLE_HOME_PREFIXES: &[&str] = &[
    "Library/Caches",
    "Library/Logs",
    "Library/Developer",
    "Library/Containers/com.docker.docker/Data",
    "Library/Mail Downloads",
    ".Trash",
    ".cache",
    ".npm",
    ".docker",
    ".cargo/registry",
    ".gradle/caches",
    ".m2/repository",
    ".conda/pkgs",
];

/// Prefixes outside the home directory that are known-cleanable.
const CLEANABLE_SYSTEM_PREFIXES: &[&str] = &["/tmp", "/private/tmp", "/var/folders", "/var/log"];

/// Gatekeeper consulted before any inspection or deletion.
///
/// Paths inside the home directory are judged against the home-relative
/// block and allow tables; paths outside it against the system tables.
/// Prefixes registered with [`allow_prefix`](Self::allow_prefix) apply
/// everywhere.
#[derive(Debug, Clone)]
pub struct SafetyGuard {
    home: PathBuf,
    exact_block: Vec<PathBuf>,
    subtree_block: Vec<PathBuf>,
    home_allow: Vec<PathBuf>,
    system_allow: Vec<PathBuf>,
    extra_allow: Vec<PathBuf>,
}

impl SafetyGuard {
    /// Build a guard for the current user's home directory.
    pub fn new() -> Self {
        Self::with_home(dirs::home_dir().unwrap_or_else(|| PathBuf::from("/var/empty")))
    }

    /// Build a guard rooted at an explicit home directory.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        // Canonicalize home up front so comparisons with canonicalized
        // candidates line up (e.g. /tmp vs /private/tmp on macOS).
        let home = home.canonicalize().unwrap_or(home);

        let mut exact_block: Vec<PathBuf> = SYSTEM_ROOTS.iter().map(PathBuf::from).collect();
        exact_block.push(home.clone());

        let subtree_block: Vec<PathBuf> = PROTECTED_HOME_SUBTREES
            .iter()
            .map(|rel| home.join(rel))
            .collect();

        let home_allow: Vec<PathBuf> = CLEANABLE_HOME_PREFIXES
            .iter()
            .map(|rel| home.join(rel))
            .collect();

        let mut system_allow: Vec<PathBuf> =
            CLEANABLE_SYSTEM_PREFIXES.iter().map(PathBuf::from).collect();
        let tmp = std::env::temp_dir();
        system_allow.push(tmp.canonicalize().unwrap_or(tmp));

        Self {
            home,
            exact_block,
            subtree_block,
            home_allow,
            system_allow,
            extra_allow: Vec::new(),
        }
    }

    /// The home directory this guard is rooted at.
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Register an additional cleanable prefix (the staging root, or a
    /// caller-supplied duplicate-scan root).
    pub fn allow_prefix(&mut self, prefix: impl Into<PathBuf>) {
        let prefix = prefix.into();
        self.extra_allow.push(prefix.canonicalize().unwrap_or(prefix));
    }

    /// Decide whether `path` may be deleted.
    pub fn is_deletable(&self, path: &Path) -> Verdict {
        // Fail closed on anything that cannot be resolved.
        let canonical = match path.canonicalize() {
            Ok(p) => p,
            Err(e) => return Verdict::deny(format!("cannot resolve path: {e}")),
        };

        // Protected subtrees swallow everything beneath them, including
        // symlinks that resolve into them.
        for blocked in &self.subtree_block {
            if canonical.starts_with(blocked) {
                return Verdict::deny(format!("protected location: {}", blocked.display()));
            }
        }

        // Never a blocklist entry itself, nor an ancestor of one.
        for blocked in self.exact_block.iter().chain(self.subtree_block.iter()) {
            if &canonical == blocked || blocked.starts_with(&canonical) {
                return Verdict::deny(format!("protected location: {}", blocked.display()));
            }
        }

        // Nothing shallower than three components when it is a directory.
        if canonical.is_dir() && component_depth(&canonical) <= 2 {
            return Verdict::deny("refusing to remove a top-level directory");
        }

        if strictly_within_any(&canonical, &self.extra_allow) {
            return Verdict::Allow;
        }

        let allow = if canonical.starts_with(&self.home) {
            &self.home_allow
        } else {
            &self.system_allow
        };
        if strictly_within_any(&canonical, allow) {
            return Verdict::Allow;
        }

        // Recognized developer artifacts (a node_modules tree, a target/
        // directory next to Cargo.toml, ...) are cleanable wherever the
        // project lives.
        if canonical.starts_with(&self.home) && is_dev_artifact(&canonical) {
            return Verdict::Allow;
        }

        Verdict::deny("unrecognized location")
    }

    /// Whether `path` is itself a cleanable prefix root.
    ///
    /// The prefix node is never deletable, but its children are; the cleaner
    /// uses this to empty a prefix directory instead of removing it.
    pub fn permits_children(&self, path: &Path) -> bool {
        let canonical = match path.canonicalize() {
            Ok(p) => p,
            Err(_) => return false,
        };
        self.extra_allow
            .iter()
            .chain(self.home_allow.iter())
            .chain(self.system_allow.iter())
            .any(|prefix| prefix == &canonical)
    }

    /// Whether the walker must not descend into `path`.
    ///
    /// Looser than [`is_deletable`](Self::is_deletable): scanning inside a
    /// cache is fine even when the individual path would not be deletable,
    /// but protected subtrees (documents, key material) are never entered.
    pub fn blocks_descent(&self, path: &Path) -> bool {
        let canonical = match path.canonicalize() {
            Ok(p) => p,
            Err(_) => return true,
        };
        self.subtree_block
            .iter()
            .any(|blocked| canonical.starts_with(blocked))
    }
}

impl Default for SafetyGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `path` is (or lies inside) a developer tool's artifact tree,
/// verified by the signature file of the enclosing project.
fn is_dev_artifact(path: &Path) -> bool {
    let mut current = Some(path);
    while let Some(dir) = current {
        let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
            break;
        };
        let parent = dir.parent();
        let sibling = |file: &str| parent.map(|p| p.join(file).is_file()).unwrap_or(false);

        let matched = match name {
            "node_modules" | ".gradle" => true,
            "target" => sibling("Cargo.toml"),
            ".next" | "dist" | "build" => sibling("package.json"),
            "Pods" => sibling("Podfile"),
            "DerivedData" => true,
            _ => dir.join("pyvenv.cfg").is_file(),
        };
        if matched {
            return true;
        }
        current = parent;
    }
    false
}

/// Strictly inside one of `prefixes` (the prefix itself does not count).
fn strictly_within_any(path: &Path, prefixes: &[PathBuf]) -> bool {
    prefixes
        .iter()
        .any(|prefix| path.starts_with(prefix) && path != prefix)
}

/// Number of normal path components below the filesystem root.
fn component_depth(path: &Path) -> usize {
    path.components()
        .filter(|c| matches!(c, std::path::Component::Normal(_)))
        .count()
}
