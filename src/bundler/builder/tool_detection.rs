//! External tool detection and availability checking.
//!
//! Each probe runs once per process; the result is cached in a `LazyLock`.

use std::{path::Path, sync::LazyLock};

/// `xcrun` is available (simulator and device enumeration, devicectl).
pub static HAS_XCRUN: LazyLock<bool> = LazyLock::new(|| probe("xcrun", &["--version"]));

/// `objcopy` is available for splitting ELF debug information.
pub static HAS_OBJCOPY: LazyLock<bool> = LazyLock::new(|| probe("objcopy", &["--version"]));

fn probe(tool: &str, version_args: &[&str]) -> bool {
    match which::which(tool) {
        Ok(path) => check_version(tool, &path, version_args),
        Err(e) => {
            log::debug!("{} not found in PATH: {}", tool, e);
            false
        }
    }
}

fn check_version(tool: &str, path: &Path, version_args: &[&str]) -> bool {
    log::debug!("Found {} at: {}", tool, path.display());

    match std::process::Command::new(path).args(version_args).output() {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout);
            let first_line = version.lines().next().unwrap_or_default();
            log::debug!("✓ {} available: {}", tool, first_line.trim());
            true
        }
        Ok(output) => {
            log::warn!(
                "{} found at {} but the version check failed (exit code: {:?}). Stderr: {}",
                tool,
                path.display(),
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            );
            false
        }
        Err(e) => {
            log::warn!(
                "{} found at {} but failed to execute: {}. Check file permissions.",
                tool,
                path.display(),
                e
            );
            false
        }
    }
}
