//! Dynamic library bundling for `.app` bundles.
//!
//! Dependency dylibs are copied into the bundle's `Frameworks` directory, get
//! an `@rpath` install name, and the executable's load commands are rewritten
//! to find them through an rpath pointing at `Frameworks`.

use crate::bundler::{
    BundlerContext, Error, Result,
    error::ErrorExt,
    utils::{fs, process},
};
use std::{
    collections::BTreeSet,
    ffi::OsStr,
    path::{Path, PathBuf},
};
use tokio::process::Command;

/// Extracts dynamic library dependencies from a Mach-O binary using goblin.
///
/// Non Mach-O files yield an empty list.
pub fn linked_libraries(binary_path: &Path) -> Result<Vec<String>> {
    let buffer = std::fs::read(binary_path).fs_context("failed to read binary", binary_path)?;
    parse_linked_libraries(&buffer, binary_path)
}

fn parse_linked_libraries(buffer: &[u8], binary_path: &Path) -> Result<Vec<String>> {
    use goblin::mach::{Mach, SingleArch};

    let object = match goblin::Object::parse(buffer) {
        Ok(object) => object,
        Err(e) => {
            log::warn!("Could not parse {}: {e}", binary_path.display());
            return Ok(Vec::new());
        }
    };

    match object {
        goblin::Object::Mach(Mach::Binary(macho)) => {
            Ok(macho.libs.iter().map(|s| s.to_string()).collect())
        }
        goblin::Object::Mach(Mach::Fat(fat)) => {
            // Every slice of a universal binary links the same libraries.
            match fat.get(0) {
                Ok(SingleArch::MachO(macho)) => {
                    Ok(macho.libs.iter().map(|s| s.to_string()).collect())
                }
                Ok(_) => Ok(Vec::new()),
                Err(e) => Err(Error::GenericError(format!(
                    "failed to parse universal binary {}: {e}",
                    binary_path.display()
                ))),
            }
        }
        _ => {
            log::warn!(
                "Binary {} is not a Mach-O file, skipping dylib discovery",
                binary_path.display()
            );
            Ok(Vec::new())
        }
    }
}

/// Determines if a dylib path is a system library that should NOT be bundled.
///
/// - "self" - Mach-O special value indicating the binary itself
/// - `/System/` and `/usr/lib/` - OS libraries
/// - `@rpath`, `@executable_path`, `@loader_path` - already relative
pub fn is_system_dylib(path: &str) -> bool {
    path == "self"
        || path.starts_with("/System/")
        || path.starts_with("/usr/lib/")
        || path.starts_with("@rpath")
        || path.starts_with("@executable_path")
        || path.starts_with("@loader_path")
}

/// Copies the context's dynamic libraries into `frameworks_dir` and points
/// `executable` at them through `rpath`.
///
/// # Returns
///
/// The copied libraries, which have to be signed before the bundle.
pub async fn bundle_dependency_libraries(
    ctx: &BundlerContext,
    executable: &Path,
    frameworks_dir: &Path,
    rpath: &str,
) -> Result<Vec<PathBuf>> {
    let libraries: Vec<&PathBuf> = ctx.dynamic_libraries().map(|built| &built.path).collect();
    if libraries.is_empty() {
        return Ok(Vec::new());
    }

    fs::create_dir_all(frameworks_dir, false).await?;

    let mut bundled = Vec::new();
    let mut names = BTreeSet::new();
    for library in libraries {
        let name = library.file_name().ok_or_else(|| {
            Error::GenericError(format!("Invalid dylib path: {}", library.display()))
        })?;
        let destination = frameworks_dir.join(name);
        fs::copy_file(library, &destination).await?;

        log::debug!("Bundling dylib: {}", destination.display());
        install_name_tool(
            &destination,
            &["-id", &format!("@rpath/{}", name.to_string_lossy())],
        )
        .await?;

        names.insert(name.to_os_string());
        bundled.push(destination);
    }

    log::info!("Fixing dylib paths for {}", executable.display());
    for dependency in linked_libraries(executable)? {
        if is_system_dylib(&dependency) {
            continue;
        }
        let Some(name) = Path::new(&dependency).file_name() else {
            continue;
        };
        if !names.contains(name) {
            log::warn!(
                "{} links {dependency}, which is not a declared dependency",
                executable.display()
            );
            continue;
        }

        let new_path = format!("@rpath/{}", name.to_string_lossy());
        log::debug!("  Rewriting: {dependency} -> {new_path}");
        install_name_tool(executable, &["-change", &dependency, &new_path]).await?;
    }

    // Fails when the rpath already exists, which is fine.
    let output = process::output_unchecked(
        Command::new("install_name_tool")
            .args(["-add_rpath", rpath])
            .arg(executable),
    )
    .await?;
    if !output.status.success() {
        log::debug!("  rpath {rpath} may already exist");
    }

    log::info!("Bundled {} dylibs into {}", bundled.len(), display_name(frameworks_dir));
    Ok(bundled)
}

async fn install_name_tool(path: &Path, args: &[&str]) -> Result<()> {
    process::output(Command::new("install_name_tool").args(args).arg(path)).await?;
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or_else(|| OsStr::new(""))
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_libraries_stay_linked() {
        assert!(is_system_dylib("/usr/lib/libSystem.B.dylib"));
        assert!(is_system_dylib(
            "/System/Library/Frameworks/AppKit.framework/Versions/C/AppKit"
        ));
        assert!(is_system_dylib("@rpath/libgreeter.dylib"));
        assert!(!is_system_dylib("/opt/homebrew/lib/libpcre2-8.0.dylib"));
        assert!(!is_system_dylib("/Users/dev/tools/build/out/libgreeter.dylib"));
    }

    #[test]
    fn non_mach_o_files_link_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script");
        std::fs::write(&path, "#!/bin/sh\necho hello\n").unwrap();
        assert!(linked_libraries(&path).unwrap().is_empty());
    }

    #[tokio::test]
    async fn nothing_to_bundle_without_dynamic_libraries() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = crate::bundler::context::tests::context(dir.path());
        let frameworks = dir.path().join("Frameworks");

        let bundled =
            bundle_dependency_libraries(&ctx, &ctx.executable(), &frameworks, "@executable_path/../Frameworks")
                .await
                .unwrap();
        assert!(bundled.is_empty());
        assert!(!frameworks.exists());
    }
}
