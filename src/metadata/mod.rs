//! Package metadata and target discovery from a single Cargo.toml

use crate::bundler::{Error, Result, error::ErrorExt};
use std::path::Path;

/// Package metadata extracted from Cargo.toml
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageMetadata {
    /// Package name from Cargo.toml
    pub name: String,

    /// Package description from Cargo.toml
    pub description: String,

    /// Package version from Cargo.toml (e.g., "0.1.0")
    pub version: String,

    /// List of package authors from Cargo.toml
    pub authors: Vec<String>,

    /// SPDX license identifier (e.g., "Apache-2.0 OR MIT")
    pub license: Option<String>,

    /// Homepage URL if specified in Cargo.toml
    pub homepage: Option<String>,
}

/// The package's library target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LibraryTarget {
    /// Crate name of the library (hyphens already replaced).
    pub name: String,

    /// Declared `crate-type`s; empty means the default `lib`.
    pub crate_types: Vec<String>,
}

/// Manifest data the bundler needs from Cargo.toml
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CargoManifest {
    /// Package metadata ([package] section)
    pub metadata: PackageMetadata,

    /// Binary targets, explicit and auto-discovered, in discovery order
    pub binaries: Vec<String>,

    /// Library target, if the package has one
    pub library: Option<LibraryTarget>,
}

impl CargoManifest {
    /// Whether `name` is a binary target of the package.
    pub fn has_binary(&self, name: &str) -> bool {
        self.binaries.iter().any(|binary| binary == name)
    }

    /// Whether the library is built as `crate_type` (`cdylib`, `staticlib`, ...).
    pub fn library_has_crate_type(&self, crate_type: &str) -> bool {
        self.library
            .as_ref()
            .is_some_and(|lib| lib.crate_types.iter().any(|t| t == crate_type))
    }
}

fn invalid(path: &Path, reason: impl Into<String>) -> Error {
    Error::Context {
        context: format!("invalid manifest {}", path.display()),
        source: Box::new(Error::GenericError(reason.into())),
    }
}

fn string_field(table: &toml::Value, key: &str) -> Option<String> {
    table.get(key).and_then(|v| v.as_str()).map(String::from)
}

/// Load the manifest from Cargo.toml (single read + parse)
///
/// Binary targets come from `[[bin]]` entries plus cargo's auto-discovery
/// (`src/main.rs` and `src/bin/`), unless `autobins = false`.
pub fn load_manifest(cargo_toml_path: &Path) -> Result<CargoManifest> {
    // Step 1: Read file once
    let manifest = std::fs::read_to_string(cargo_toml_path)
        .fs_context("reading Cargo.toml", cargo_toml_path)?;

    // Step 2: Parse TOML once
    let toml_value: toml::Value = toml::from_str(&manifest)
        .map_err(|e| invalid(cargo_toml_path, format!("failed to parse: {e}")))?;

    let package = toml_value
        .get("package")
        .ok_or_else(|| invalid(cargo_toml_path, "no [package] section"))?;

    // Step 3: Extract metadata from parsed TOML (no additional I/O)
    let metadata = PackageMetadata {
        name: string_field(package, "name")
            .ok_or_else(|| invalid(cargo_toml_path, "missing 'name' in [package]"))?,

        description: string_field(package, "description")
            .unwrap_or_else(|| "Rust application".to_string()),

        // Workspace-inherited versions are tables; they fall back to 0.0.0.
        version: string_field(package, "version").unwrap_or_else(|| "0.0.0".to_string()),

        authors: package
            .get("authors")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default(),

        license: string_field(package, "license"),

        homepage: string_field(package, "homepage"),
    };

    let package_dir = cargo_toml_path
        .parent()
        .ok_or_else(|| invalid(cargo_toml_path, "Cargo.toml has no parent directory"))?;

    // Step 4: Binary targets
    let binaries = discover_binaries(&toml_value, package, &metadata.name, package_dir);

    // Step 5: Library target
    let library = discover_library(&toml_value, &metadata.name, package_dir);

    Ok(CargoManifest {
        metadata,
        binaries,
        library,
    })
}

fn discover_binaries(
    toml_value: &toml::Value,
    package: &toml::Value,
    package_name: &str,
    package_dir: &Path,
) -> Vec<String> {
    let mut binaries: Vec<String> = toml_value
        .get("bin")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|bin| string_field(bin, "name")).collect())
        .unwrap_or_default();

    let autobins = package
        .get("autobins")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);
    if !autobins {
        return binaries;
    }

    let mut push = |name: String| {
        if !binaries.contains(&name) {
            binaries.push(name);
        }
    };

    if package_dir.join("src/main.rs").is_file() {
        push(package_name.to_string());
    }

    let bin_dir = package_dir.join("src/bin");
    if let Ok(entries) = std::fs::read_dir(&bin_dir) {
        let mut discovered: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                if path.is_file() && path.extension().is_some_and(|ext| ext == "rs") {
                    path.file_stem().map(|s| s.to_string_lossy().into_owned())
                } else if path.join("main.rs").is_file() {
                    path.file_name().map(|s| s.to_string_lossy().into_owned())
                } else {
                    None
                }
            })
            .collect();
        discovered.sort();
        discovered.into_iter().for_each(&mut push);
    }

    binaries
}

fn discover_library(
    toml_value: &toml::Value,
    package_name: &str,
    package_dir: &Path,
) -> Option<LibraryTarget> {
    let lib = toml_value.get("lib");
    if lib.is_none() && !package_dir.join("src/lib.rs").is_file() {
        return None;
    }

    let name = lib
        .and_then(|lib| string_field(lib, "name"))
        .unwrap_or_else(|| package_name.replace('-', "_"));
    let crate_types = lib
        .and_then(|lib| lib.get("crate-type"))
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    Some(LibraryTarget { name, crate_types })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(manifest: &str, files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), manifest).unwrap();
        for file in files {
            let path = dir.path().join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "fn main() {}").unwrap();
        }
        dir
    }

    #[test]
    fn discovers_explicit_and_implicit_binaries() {
        let dir = package(
            r#"
            [package]
            name = "hello-app"
            version = "0.3.0"
            description = "Says hello"

            [[bin]]
            name = "helper"
            path = "tools/helper.rs"
            "#,
            &["src/main.rs", "src/bin/cli.rs", "src/bin/daemon/main.rs", "src/lib.rs"],
        );

        let manifest = load_manifest(&dir.path().join("Cargo.toml")).unwrap();
        assert_eq!(manifest.metadata.version, "0.3.0");
        assert_eq!(manifest.binaries, ["helper", "hello-app", "cli", "daemon"]);
        assert!(manifest.has_binary("daemon"));
        assert_eq!(manifest.library.unwrap().name, "hello_app");
    }

    #[test]
    fn autobins_false_keeps_only_explicit_targets() {
        let dir = package(
            r#"
            [package]
            name = "hello"
            version = "0.1.0"
            autobins = false

            [lib]
            crate-type = ["cdylib"]
            "#,
            &["src/main.rs"],
        );

        let manifest = load_manifest(&dir.path().join("Cargo.toml")).unwrap();
        assert!(manifest.binaries.is_empty());
        assert!(manifest.library_has_crate_type("cdylib"));
    }

    #[test]
    fn missing_package_section_is_an_error() {
        let dir = package("[workspace]\nmembers = []\n", &[]);
        assert!(load_manifest(&dir.path().join("Cargo.toml")).is_err());
    }
}
