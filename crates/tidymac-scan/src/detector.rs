//! Developer working-directory detection.
//!
//! During a walk over project roots, a directory is classified as a
//! developer working directory when it carries a signature file. Rules are
//! tested in order, first match wins, and the outermost match wins on
//! nesting: once a project matches, nothing beneath it is inspected again.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use rayon::prelude::*;
use walkdir::WalkDir;

use tidymac_core::DevTool;

use crate::walker::dir_size;

/// Maximum depth below a search root at which projects are recognized.
const PROJECT_SEARCH_DEPTH: usize = 5;

/// Depth to which project sources are sampled for the staleness check.
const SOURCE_MTIME_DEPTH: usize = 4;

/// A matched developer working directory.
#[derive(Debug, Clone)]
pub struct DevProject {
    /// Which tool produced the artifact tree.
    pub tool: DevTool,
    /// Display label ("Node dependencies", "Rust build artifacts", ...).
    pub label: &'static str,
    /// The project directory the signature was found in.
    pub project: PathBuf,
    /// The artifact subtree to aggregate.
    pub artifact: PathBuf,
    /// Aggregate size of the artifact subtree.
    pub bytes: u64,
    /// Number of files in the artifact subtree.
    pub file_count: u64,
    /// Whether the project's newest source is older than the threshold.
    pub stale: bool,
}

/// A signature match before sizing.
struct Hit {
    tool: DevTool,
    label: &'static str,
    artifacts: Vec<PathBuf>,
}

/// Test the signature rules against one directory, in order.
fn match_signature(dir: &Path) -> Option<Hit> {
    let has = |rel: &str| dir.join(rel).is_dir();
    let has_file = |rel: &str| dir.join(rel).is_file();

    if has("node_modules") {
        return Some(Hit {
            tool: DevTool::Node,
            label: "Node dependencies",
            artifacts: vec![dir.join("node_modules")],
        });
    }
    if has_file("package.json") {
        let artifacts: Vec<PathBuf> = [".next", "dist", "build"]
            .iter()
            .map(|a| dir.join(a))
            .filter(|p| p.is_dir())
            .collect();
        if !artifacts.is_empty() {
            return Some(Hit {
                tool: DevTool::Node,
                label: "Node build artifacts",
                artifacts,
            });
        }
    }
    if has_file("Cargo.toml") && has("target") {
        return Some(Hit {
            tool: DevTool::Cargo,
            label: "Rust build artifacts",
            artifacts: vec![dir.join("target")],
        });
    }
    if is_virtualenv(dir) {
        return Some(Hit {
            tool: DevTool::Venv,
            label: "Python virtual environment",
            artifacts: vec![dir.to_path_buf()],
        });
    }
    if has(".gradle") {
        return Some(Hit {
            tool: DevTool::Gradle,
            label: "Gradle caches",
            artifacts: vec![dir.join(".gradle")],
        });
    }
    if has("Pods") && has_file("Podfile") {
        return Some(Hit {
            tool: DevTool::CocoaPods,
            label: "CocoaPods",
            artifacts: vec![dir.join("Pods")],
        });
    }
    if has("DerivedData") && is_xcode_workspace(dir) {
        return Some(Hit {
            tool: DevTool::Xcode,
            label: "Xcode derived data",
            artifacts: vec![dir.join("DerivedData")],
        });
    }
    None
}

/// A virtual environment carries `pyvenv.cfg`, or an activate script plus a
/// versioned `lib/pythonX.Y` directory.
fn is_virtualenv(dir: &Path) -> bool {
    if dir.join("pyvenv.cfg").is_file() {
        return true;
    }
    if !dir.join("bin/activate").is_file() {
        return false;
    }
    std::fs::read_dir(dir.join("lib"))
        .map(|entries| {
            entries.filter_map(|e| e.ok()).any(|e| {
                e.file_name()
                    .to_string_lossy()
                    .starts_with("python")
            })
        })
        .unwrap_or(false)
}

fn is_xcode_workspace(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries.filter_map(|e| e.ok()).any(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                name.ends_with(".xcworkspace") || name.ends_with(".xcodeproj")
            })
        })
        .unwrap_or(false)
}

/// Newest modification time among the project's sources, ignoring the
/// artifact subtrees themselves.
pub fn newest_source_mtime(project: &Path, artifacts: &[PathBuf]) -> Option<SystemTime> {
    WalkDir::new(project)
        .follow_links(false)
        .max_depth(SOURCE_MTIME_DEPTH)
        .into_iter()
        .filter_entry(|e| !artifacts.iter().any(|a| e.path() == a))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok()?.modified().ok())
        .max()
}

/// Scan the given search roots for developer working directories.
///
/// `stale_days` controls the Safe upgrade: an artifact whose project has no
/// source newer than the threshold is routine to remove.
pub fn detect_dev_projects(search_roots: &[PathBuf], stale_days: u32) -> Vec<DevProject> {
    let stale_cutoff = std::time::Duration::from_secs(u64::from(stale_days) * 86_400);
    let now = SystemTime::now();

    let mut projects: Vec<DevProject> = search_roots
        .par_iter()
        .flat_map(|root| scan_search_root(root, now, stale_cutoff))
        .collect();

    projects.sort_by(|a, b| b.bytes.cmp(&a.bytes).then_with(|| a.artifact.cmp(&b.artifact)));
    projects
}

fn scan_search_root(
    root: &Path,
    now: SystemTime,
    stale_cutoff: std::time::Duration,
) -> Vec<DevProject> {
    let mut found = Vec::new();
    if !root.is_dir() {
        return found;
    }

    let mut iter = WalkDir::new(root)
        .follow_links(false)
        .max_depth(PROJECT_SEARCH_DEPTH)
        .into_iter();

    while let Some(entry) = iter.next() {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if entry.depth() > 0 && name.starts_with('.') && !is_virtualenv(entry.path()) {
            iter.skip_current_dir();
            continue;
        }

        if let Some(hit) = match_signature(entry.path()) {
            let project = entry.path().to_path_buf();
            let newest = newest_source_mtime(&project, &hit.artifacts);
            let stale = newest
                .map(|t| now.duration_since(t).unwrap_or_default() > stale_cutoff)
                .unwrap_or(true);

            for artifact in hit.artifacts {
                let bytes = dir_size(&artifact);
                let file_count = count_files(&artifact);
                found.push(DevProject {
                    tool: hit.tool,
                    label: hit.label,
                    project: project.clone(),
                    artifact,
                    bytes,
                    file_count,
                    stale,
                });
            }
            // Outermost signature wins: nothing below a matched project is
            // inspected again.
            iter.skip_current_dir();
        }
    }

    found
}

fn count_files(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count() as u64
}

/// A developer tool whose cache directory exists on this machine.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DevToolUsage {
    pub tool: DevTool,
    pub cache_path: PathBuf,
    pub bytes: u64,
}

/// Probe which developer tool caches are present, with their current sizes.
pub fn probe_dev_tools(env: &tidymac_core::ScanEnv) -> Vec<DevToolUsage> {
    let candidates: [(DevTool, &str); 10] = [
        (DevTool::Xcode, "Library/Developer/Xcode/DerivedData"),
        (DevTool::Docker, "Library/Containers/com.docker.docker/Data"),
        (DevTool::Homebrew, "Library/Caches/Homebrew"),
        (DevTool::Npm, ".npm/_cacache"),
        (DevTool::Yarn, "Library/Caches/Yarn"),
        (DevTool::Pip, ".cache/pip"),
        (DevTool::Cargo, ".cargo/registry/cache"),
        (DevTool::Gradle, ".gradle/caches"),
        (DevTool::CocoaPods, "Library/Caches/CocoaPods"),
        (DevTool::Conda, ".conda/pkgs"),
    ];

    candidates
        .iter()
        .filter_map(|(tool, rel)| {
            let cache_path = env.home.join(rel);
            cache_path.is_dir().then(|| DevToolUsage {
                tool: *tool,
                bytes: dir_size(&cache_path),
                cache_path,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path, bytes: usize) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![0u8; bytes]).unwrap();
    }

    #[test]
    fn test_node_modules_detected() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("app");
        touch(&project.join("package.json"), 10);
        touch(&project.join("node_modules/react/index.js"), 500);

        let hits = detect_dev_projects(&[temp.path().to_path_buf()], 30);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].tool, DevTool::Node);
        assert_eq!(hits[0].bytes, 500);
        assert!(hits[0].artifact.ends_with("node_modules"));
    }

    #[test]
    fn test_cargo_target_detected() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("svc");
        touch(&project.join("Cargo.toml"), 20);
        touch(&project.join("src/main.rs"), 30);
        touch(&project.join("target/debug/svc"), 4096);

        let hits = detect_dev_projects(&[temp.path().to_path_buf()], 30);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].tool, DevTool::Cargo);
        assert_eq!(hits[0].bytes, 4096);
        // Fresh sources keep the artifact at Caution.
        assert!(!hits[0].stale);
    }

    #[test]
    fn test_virtualenv_detected_by_pyvenv_cfg() {
        let temp = TempDir::new().unwrap();
        let venv = temp.path().join("proj/.venv");
        touch(&venv.join("pyvenv.cfg"), 10);
        touch(&venv.join("lib/python3.12/site-packages/x.py"), 100);

        let hits = detect_dev_projects(&[temp.path().to_path_buf()], 30);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].tool, DevTool::Venv);
    }

    #[test]
    fn test_outermost_signature_wins() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("mono");
        touch(&project.join("package.json"), 10);
        // A crate vendored inside node_modules must not be reported again.
        touch(&project.join("node_modules/some-native/Cargo.toml"), 10);
        touch(&project.join("node_modules/some-native/target/out.o"), 64);

        let hits = detect_dev_projects(&[temp.path().to_path_buf()], 30);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].tool, DevTool::Node);
    }

    #[test]
    fn test_first_rule_wins_over_later_rules() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("hybrid");
        touch(&project.join("node_modules/a.js"), 10);
        touch(&project.join("Cargo.toml"), 10);
        touch(&project.join("target/x"), 10);

        let hits = detect_dev_projects(&[temp.path().to_path_buf()], 30);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].label, "Node dependencies");
    }

    #[test]
    fn test_plain_build_dir_not_matched_without_package_json() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("cmake-proj/build/out.o"), 100);

        let hits = detect_dev_projects(&[temp.path().to_path_buf()], 30);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_probe_reports_existing_tool_caches() {
        let temp = TempDir::new().unwrap();
        let env = tidymac_core::ScanEnv::with_home(temp.path());
        touch(&temp.path().join(".cache/pip/wheel.whl"), 1000);
        touch(&temp.path().join(".npm/_cacache/blob"), 500);

        let mut tools = probe_dev_tools(&env);
        tools.sort_by_key(|t| t.bytes);
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].tool, DevTool::Npm);
        assert_eq!(tools[0].bytes, 500);
        assert_eq!(tools[1].tool, DevTool::Pip);
        assert_eq!(tools[1].bytes, 1000);
    }
}
