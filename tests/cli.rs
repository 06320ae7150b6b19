use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Copies a fixture package into a fresh temporary directory.
fn package(name: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for entry in walkdir::WalkDir::new(fixture(name)) {
        let entry = entry.unwrap();
        let relative = entry.path().strip_prefix(fixture(name)).unwrap();
        let target = dir.path().join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).unwrap();
        } else {
            std::fs::copy(entry.path(), &target).unwrap();
        }
    }
    dir
}

fn bundler() -> Command {
    let mut command = Command::cargo_bin("kodegen_bundler_app").unwrap();
    command.env_remove("KODEGEN_BUNDLER_DIRECTORY");
    command
}

#[test]
fn help_lists_the_commands() {
    bundler()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("bundle"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("migrate"));
}

#[test]
fn dry_run_flag_is_hidden() {
    bundler()
        .args(["bundle", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--copy-out"))
        .stdout(predicate::str::contains("--dry-run").not());
}

#[test]
fn unknown_bundler_is_a_usage_error() {
    bundler()
        .args(["bundle", "--bundler", "linuxDeb"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown bundler"));
}

#[test]
fn migrate_rewrites_legacy_json() {
    let dir = package("legacy");

    bundler()
        .args(["migrate", "--directory"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Migrated"));

    let migrated = std::fs::read_to_string(dir.path().join("Bundler.toml")).unwrap();
    assert!(migrated.contains("format_version = 2"));
    assert!(migrated.contains("com.example.hello"));
    assert!(dir.path().join("Bundle.json.orig").is_file());
    assert!(!dir.path().join("Bundle.json").exists());
}

#[test]
fn migrate_leaves_current_files_alone() {
    let dir = package("hello");
    let before = std::fs::read_to_string(dir.path().join("Bundler.toml")).unwrap();

    bundler()
        .args(["migrate", "--directory"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("already up to date"));

    let after = std::fs::read_to_string(dir.path().join("Bundler.toml")).unwrap();
    assert_eq!(before, after);
}

#[test]
fn missing_configuration_fails() {
    let dir = tempfile::tempdir().unwrap();
    bundler()
        .args(["migrate", "--directory"])
        .arg(dir.path())
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error"));
}

#[test]
fn unknown_app_names_the_available_apps() {
    let dir = package("hello");
    bundler()
        .args(["bundle", "Goodbye", "--dry-run", "--platform", "linux", "--directory"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Hello"));
}

#[cfg(target_os = "linux")]
#[test]
fn dry_run_reports_the_intended_bundle_without_building() {
    let dir = package("hello");

    bundler()
        .args(["bundle", "--dry-run", "--bundler", "linuxGeneric", "--directory"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello (dry run)"))
        .stdout(predicate::str::contains("linuxGeneric"));

    assert!(!dir.path().join("target").exists());
}

#[cfg(target_os = "linux")]
#[test]
fn installers_cannot_be_run() {
    let dir = package("hello");
    bundler()
        .args(["run", "--skip-build", "--bundler", "linuxRPM", "--directory"])
        .arg(dir.path())
        .assert()
        .failure();
}
