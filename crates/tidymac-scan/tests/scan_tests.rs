use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;
use tidymac_scan::{Category, Profile, SafetyGuard, SafetyLabel, Scanner, ScanEnv, ScanTarget};
use tidymac_core::{Aggression, TargetSource};

struct Fixture {
    _temp: TempDir,
    home: PathBuf,
    guard: SafetyGuard,
    env: ScanEnv,
}

fn fixture() -> Fixture {
    let temp = TempDir::new().unwrap();
    let home = temp.path().join("home");
    fs::create_dir_all(&home).unwrap();
    let guard = SafetyGuard::with_home(&home);
    let env = ScanEnv::with_home(&home);
    Fixture {
        _temp: temp,
        home,
        guard,
        env,
    }
}

fn profile(targets: &[&str]) -> Profile {
    Profile {
        name: "developer".to_string(),
        description: String::new(),
        aggression: Aggression::Medium,
        targets: targets.iter().map(|s| s.to_string()).collect(),
        stale_days: 30,
        large_file_threshold_mb: 500,
        include_dangerous: false,
    }
}

fn pip_target() -> ScanTarget {
    ScanTarget::new(
        "pip-cache",
        Category::Dev(tidymac_core::DevTool::Pip),
        TargetSource::Home(".cache/pip".to_string()),
        SafetyLabel::Safe,
        "Python package download cache re-fetched on demand",
    )
}

/// 100 files of 100 KiB in the pip cache: the inventory carries a pip item
/// of exactly 9.77 MiB and 100 files, labeled Safe.
#[test]
fn test_pip_cache_reclamation_scan() {
    let fx = fixture();
    let http = fx.home.join(".cache/pip/http");
    fs::create_dir_all(&http).unwrap();
    for i in 0..100 {
        // Distinct content so nothing collapses.
        let mut blob = vec![0u8; 100 * 1024];
        blob[0] = (i % 256) as u8;
        blob[1] = (i / 256) as u8;
        fs::write(http.join(format!("cache-{i:03}.bin")), blob).unwrap();
    }

    let scanner = Scanner::new(fx.guard.clone(), fx.env.clone())
        .with_catalog(vec![pip_target()]);
    let inventory = scanner.scan(&profile(&["pip-cache"]));

    let item = inventory
        .items
        .iter()
        .find(|i| i.name.contains("pip"))
        .expect("pip item present");
    assert_eq!(item.file_count, 100);
    assert_eq!(item.bytes, 10_240_000);
    assert_eq!(item.bytes_formatted(), "9.77 MiB");
    assert_eq!(item.safety, SafetyLabel::Safe);

    // Invariant: totals equal the sum over items.
    assert_eq!(
        inventory.total_reclaimable,
        inventory.items.iter().map(|i| i.bytes).sum::<u64>()
    );
    assert_eq!(
        inventory.total_files,
        inventory.items.iter().map(|i| i.file_count).sum::<u64>()
    );
}

/// Every path in every inventory item satisfies the safety guard.
#[test]
fn test_all_inventory_paths_pass_guard() {
    let fx = fixture();
    let cache = fx.home.join(".cache/pip/wheels");
    fs::create_dir_all(&cache).unwrap();
    for i in 0..10 {
        fs::write(cache.join(format!("w{i}.whl")), vec![0u8; 200 * 1024]).unwrap();
    }

    let scanner = Scanner::new(fx.guard.clone(), fx.env.clone())
        .with_catalog(vec![pip_target()]);
    let inventory = scanner.scan(&profile(&["pip-cache"]));

    assert!(!inventory.items.is_empty());
    for item in &inventory.items {
        for path in item.removal_paths() {
            assert!(
                fx.guard.is_deletable(path).is_allow(),
                "{} failed the guard",
                path.display()
            );
        }
    }
}

#[test]
fn test_scan_metadata_and_ordering() {
    let fx = fixture();
    // Two targets with different labels and sizes.
    let cache = fx.home.join(".cache/big");
    fs::create_dir_all(&cache).unwrap();
    fs::write(cache.join("big.bin"), vec![0u8; 4 * 1024 * 1024]).unwrap();
    let logs = fx.home.join("Library/Logs");
    fs::create_dir_all(&logs).unwrap();
    fs::write(logs.join("app.log"), vec![0u8; 2 * 1024 * 1024]).unwrap();

    let catalog = vec![
        ScanTarget::new(
            "xdg-caches",
            Category::UserCache,
            TargetSource::Home(".cache".to_string()),
            SafetyLabel::Safe,
            "caches",
        ),
        ScanTarget::new(
            "user-logs",
            Category::Logs,
            TargetSource::Home("Library/Logs".to_string()),
            SafetyLabel::Caution,
            "logs",
        ),
    ];
    let scanner = Scanner::new(fx.guard.clone(), fx.env.clone()).with_catalog(catalog);
    let inventory = scanner.scan(&profile(&["xdg-caches", "user-logs"]));

    assert_eq!(inventory.profile, "developer");
    assert_eq!(inventory.items.len(), 2);
    // Safe before Caution regardless of size.
    assert_eq!(inventory.items[0].safety, SafetyLabel::Safe);
    assert_eq!(inventory.items[1].safety, SafetyLabel::Caution);
    assert!(inventory.duration_secs >= 0.0);
}

#[test]
fn test_unreadable_target_is_warning_not_abort() {
    let fx = fixture();
    let cache = fx.home.join(".cache/ok");
    fs::create_dir_all(&cache).unwrap();
    fs::write(cache.join("f"), vec![0u8; 2 * 1024 * 1024]).unwrap();

    let catalog = vec![
        ScanTarget::new(
            "xdg-caches",
            Category::UserCache,
            TargetSource::Home(".cache".to_string()),
            SafetyLabel::Safe,
            "caches",
        ),
        // Points at a path that resolves but vanishes before the walk.
        ScanTarget::new(
            "ghost",
            Category::TempFiles,
            TargetSource::Path("/nonexistent/tidymac-test".to_string()),
            SafetyLabel::Safe,
            "gone",
        ),
    ];
    let scanner = Scanner::new(fx.guard.clone(), fx.env.clone()).with_catalog(catalog);
    let inventory = scanner.scan(&profile(&["xdg-caches", "ghost"]));

    // The readable target still produced an item.
    assert_eq!(inventory.items.len(), 1);
}

#[test]
fn test_stale_project_upgraded_to_safe() {
    let fx = fixture();
    let project = fx.home.join("Projects/ancient");
    fs::create_dir_all(project.join("node_modules/lib")).unwrap();
    fs::write(project.join("package.json"), b"{}").unwrap();
    fs::write(project.join("node_modules/lib/i.js"), vec![0u8; 2 * 1024 * 1024]).unwrap();

    // Age every project file past the staleness threshold.
    let old = std::time::SystemTime::now() - std::time::Duration::from_secs(90 * 86_400);
    for entry in walkdir_all(&project) {
        if entry.is_file() {
            let f = fs::File::options().write(true).open(&entry).unwrap();
            f.set_times(fs::FileTimes::new().set_modified(old)).unwrap();
        }
    }

    let catalog = vec![ScanTarget::new(
        "dev-projects",
        Category::Dev(tidymac_core::DevTool::Node),
        TargetSource::Detector(tidymac_core::DetectorRule::DevProjects),
        SafetyLabel::Caution,
        "project artifacts",
    )];
    let scanner = Scanner::new(fx.guard.clone(), fx.env.clone()).with_catalog(catalog);
    let inventory = scanner.scan(&profile(&["dev-projects"]));

    assert_eq!(inventory.items.len(), 1);
    assert_eq!(inventory.items[0].safety, SafetyLabel::Safe);
}

fn walkdir_all(root: &std::path::Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        out.push(dir.clone());
        if let Ok(entries) = fs::read_dir(&dir) {
            for entry in entries.filter_map(|e| e.ok()) {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    out.push(path);
                }
            }
        }
    }
    out
}
