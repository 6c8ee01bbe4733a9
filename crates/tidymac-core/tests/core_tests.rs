use std::fs;
use std::path::Path;

use tempfile::TempDir;
use tidymac_core::{
    builtin_profiles, catalog, Profile, SafetyGuard, SafetyLabel, ScanEnv, TargetSource,
};

fn guard_with_home(temp: &TempDir) -> SafetyGuard {
    let home = temp.path().join("home");
    fs::create_dir_all(&home).unwrap();
    SafetyGuard::with_home(home)
}

#[test]
fn test_blocklist_denied_for_every_profile() {
    let temp = TempDir::new().unwrap();
    let guard = guard_with_home(&temp);
    let home = guard.home().to_path_buf();
    for dir in ["Documents", "Desktop", ".ssh"] {
        fs::create_dir_all(home.join(dir)).unwrap();
    }

    // The guard is profile-independent: every protected path is denied no
    // matter which profile or mode a clean runs under.
    for _profile in builtin_profiles() {
        for path in [
            home.as_path(),
            &home.join("Documents"),
            &home.join("Desktop"),
            &home.join(".ssh"),
            Path::new("/"),
        ] {
            assert!(
                !guard.is_deletable(path).is_allow(),
                "{} must be denied",
                path.display()
            );
        }
    }
}

#[test]
fn test_dev_artifacts_recognized_by_signature() {
    let temp = TempDir::new().unwrap();
    let guard = guard_with_home(&temp);
    let home = guard.home().to_path_buf();

    let project = home.join("work/svc");
    fs::create_dir_all(project.join("target/debug")).unwrap();
    fs::write(project.join("Cargo.toml"), b"[package]").unwrap();
    fs::write(project.join("target/debug/bin"), b"elf").unwrap();
    assert!(guard.is_deletable(&project.join("target")).is_allow());
    assert!(guard
        .is_deletable(&project.join("target/debug/bin"))
        .is_allow());

    // A bare target/ directory with no Cargo.toml is not an artifact.
    let plain = home.join("work/other");
    fs::create_dir_all(plain.join("target")).unwrap();
    fs::write(plain.join("target/f"), b"x").unwrap();
    assert!(!guard.is_deletable(&plain.join("target")).is_allow());
}

#[test]
fn test_catalog_targets_resolve_against_fake_home() {
    let temp = TempDir::new().unwrap();
    let home = temp.path().join("home");
    fs::create_dir_all(home.join("Library/Caches/pip")).unwrap();
    fs::create_dir_all(home.join(".cache/pip")).unwrap();
    let env = ScanEnv::with_home(&home);

    let catalog = catalog();
    let pip = catalog
        .iter()
        .find(|t| t.name == "pip-cache")
        .expect("pip cache target exists");
    let roots = pip.source.resolve(&env);
    assert_eq!(roots, vec![home.join(".cache/pip")]);

    // Detector targets resolve to project search roots, which do not exist
    // under this fake home.
    let dev = catalog.iter().find(|t| t.name == "dev-projects").unwrap();
    assert!(dev.source.resolve(&env).is_empty());
}

#[test]
fn test_profile_targets_select_catalog_subset() {
    let catalog = catalog();
    let developer = builtin_profiles()
        .into_iter()
        .find(|p| p.name == "developer")
        .unwrap();
    let selected = developer.select_targets(&catalog);

    assert!(selected.iter().any(|t| t.name == "pip-cache"));
    assert!(selected.iter().any(|t| t.name == "xcode-derived-data"));
    // Dangerous targets stay out without the opt-in.
    assert!(selected.iter().all(|t| t.safety != SafetyLabel::Dangerous));
    // quick is a strict subset of developer.
    let quick = builtin_profiles()
        .into_iter()
        .find(|p| p.name == "quick")
        .unwrap();
    for name in &quick.targets {
        assert!(developer.targets.contains(name));
    }
}

#[test]
fn test_custom_profile_file_round_trip() {
    let temp = TempDir::new().unwrap();
    let profiles_dir = temp.path().join("profiles");
    fs::create_dir_all(&profiles_dir).unwrap();
    fs::write(
        profiles_dir.join("nightly.toml"),
        r#"
name = "nightly"
description = "cron cleanup"
aggression = "high"
targets = ["trash", "temp-files", "pip-cache"]
stale_days = 7
large_file_threshold_mb = 250
include_dangerous = false
"#,
    )
    .unwrap();

    let profile = Profile::load("nightly", &profiles_dir).unwrap();
    assert_eq!(profile.stale_days, 7);
    assert_eq!(profile.large_file_threshold_mb, 250);
    assert_eq!(profile.targets.len(), 3);
    assert_eq!(profile.policy().large_file_threshold_bytes, 250 * 1024 * 1024);

    let names = Profile::available(&profiles_dir);
    assert!(names.contains(&"nightly".to_string()));
}

#[test]
fn test_glob_target_source() {
    let temp = TempDir::new().unwrap();
    let home = temp.path().join("home");
    for vol in ["a", "b"] {
        fs::create_dir_all(home.join(format!("Volumes/{vol}/.Trashes"))).unwrap();
    }
    let env = ScanEnv::with_home(&home);

    let source = TargetSource::Glob("~/Volumes/*/.Trashes".to_string());
    assert_eq!(source.resolve(&env).len(), 2);
}
