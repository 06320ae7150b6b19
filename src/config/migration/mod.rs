//! Locating, reading and upgrading configuration files.
//!
//! Three on-disk generations are understood:
//!
//! | Generation | File           | Detected by                     |
//! |------------|----------------|---------------------------------|
//! | current    | `Bundler.toml` | `format_version` key present    |
//! | previous   | `Bundler.toml` | `format_version` key absent     |
//! | legacy     | `Bundle.json`  | no `Bundler.toml` in the package|
//!
//! Older generations are transformed into the current schema. In
//! [`MigrationMode::ReadOnly`] the result only lives in memory; in
//! [`MigrationMode::Rewrite`] a new `Bundler.toml` is written and the original
//! file is kept alongside with an `.orig` suffix.

mod v0;
mod v1;

use super::{MigrationError, PackageConfiguration};
use std::{
    fmt::Display,
    path::{Path, PathBuf},
    sync::Once,
};

/// Current and previous generation file name.
pub const CONFIGURATION_FILE_NAME: &str = "Bundler.toml";

/// Legacy JSON file name.
pub const LEGACY_JSON_FILE_NAME: &str = "Bundle.json";

/// Suffix appended to the original file when rewriting.
pub const BACKUP_SUFFIX: &str = "orig";

static READ_ONLY_WARNING: Once = Once::new();

/// Whether a migrated configuration is written back to disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MigrationMode {
    /// Transform in memory only.
    ReadOnly,
    /// Write the migrated file, keeping a backup of the original.
    Rewrite,
}

/// On-disk generation a configuration was read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatGeneration {
    /// `Bundler.toml` with `format_version`.
    Current,
    /// `Bundler.toml` without `format_version`.
    Toml,
    /// `Bundle.json`.
    Json,
}

impl Display for FormatGeneration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FormatGeneration::Current => "current Bundler.toml",
            FormatGeneration::Toml => "previous-generation Bundler.toml",
            FormatGeneration::Json => "legacy Bundle.json",
        })
    }
}

/// What loading had to do to produce a current configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The file already uses the current format; nothing was touched.
    AlreadyUpToDate,
    /// The file was transformed from an older generation.
    Migrated {
        /// Generation the file was read as.
        from: FormatGeneration,
        /// Conversion warnings (dropped fields and values).
        warnings: Vec<String>,
        /// Backup of the original, when the file was rewritten.
        backup: Option<PathBuf>,
    },
}

/// A configuration in the current schema, with where it came from.
#[derive(Clone, Debug)]
pub struct LoadedConfiguration {
    /// The configuration.
    pub configuration: PackageConfiguration,
    /// File it was read from.
    pub path: PathBuf,
    /// Migration performed while loading.
    pub outcome: MigrationOutcome,
}

/// Loads the package configuration in `directory`, migrating it if needed.
///
/// # Errors
///
/// [`MigrationError::NotFound`] when neither file exists; read, parse and
/// write failures otherwise.
pub async fn load(
    directory: &Path,
    mode: MigrationMode,
) -> Result<LoadedConfiguration, MigrationError> {
    let toml_path = directory.join(CONFIGURATION_FILE_NAME);
    let json_path = directory.join(LEGACY_JSON_FILE_NAME);

    let (configuration, path, generation, warnings) = if toml_path.is_file() {
        let contents = read(&toml_path).await?;
        let table: toml::Table = parse_toml(&toml_path, &contents)?;

        if table.contains_key("format_version") {
            let configuration = parse_toml(&toml_path, &contents)?;
            log::debug!("{} is up to date", toml_path.display());
            return Ok(LoadedConfiguration {
                configuration,
                path: toml_path.clone(),
                outcome: MigrationOutcome::AlreadyUpToDate,
            });
        }

        let old = parse_toml(&toml_path, &contents)?;
        let (configuration, warnings) = v1::migrate(old);
        (configuration, toml_path.clone(), FormatGeneration::Toml, warnings)
    } else if json_path.is_file() {
        let contents = read(&json_path).await?;
        let old = serde_json::from_str(&contents).map_err(|source| MigrationError::InvalidJson {
            path: json_path.clone(),
            source,
        })?;
        let (configuration, warnings) = v0::migrate(old);
        (configuration, json_path, FormatGeneration::Json, warnings)
    } else {
        return Err(MigrationError::NotFound {
            directory: directory.to_path_buf(),
        });
    };

    for warning in &warnings {
        log::warn!("{}", warning);
    }

    let backup = match mode {
        MigrationMode::ReadOnly => {
            READ_ONLY_WARNING.call_once(|| {
                log::warn!(
                    "{} uses the {} format; it was migrated in memory. \
                     Run `kodegen_bundler_app migrate` to update it on disk.",
                    path.display(),
                    generation
                );
            });
            None
        }
        MigrationMode::Rewrite => Some(rewrite(directory, &path, &configuration).await?),
    };

    let path = if backup.is_some() { toml_path } else { path };

    Ok(LoadedConfiguration {
        configuration,
        path,
        outcome: MigrationOutcome::Migrated {
            from: generation,
            warnings,
            backup,
        },
    })
}

/// Moves `original` aside and writes `configuration` as the new `Bundler.toml`.
async fn rewrite(
    directory: &Path,
    original: &Path,
    configuration: &PackageConfiguration,
) -> Result<PathBuf, MigrationError> {
    let encoded = toml::to_string_pretty(configuration)?;

    let mut backup_name = original.file_name().unwrap_or_default().to_os_string();
    backup_name.push(".");
    backup_name.push(BACKUP_SUFFIX);
    let backup = original.with_file_name(backup_name);

    tokio::fs::rename(original, &backup)
        .await
        .map_err(|source| MigrationError::Write {
            path: backup.clone(),
            source,
        })?;

    let target = directory.join(CONFIGURATION_FILE_NAME);
    tokio::fs::write(&target, encoded)
        .await
        .map_err(|source| MigrationError::Write {
            path: target.clone(),
            source,
        })?;

    log::info!(
        "✓ Migrated {} (original kept at {})",
        target.display(),
        backup.display()
    );
    Ok(backup)
}

async fn read(path: &Path) -> Result<String, MigrationError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| MigrationError::Read {
            path: path.to_path_buf(),
            source,
        })
}

fn parse_toml<T: serde::de::DeserializeOwned>(
    path: &Path,
    contents: &str,
) -> Result<T, MigrationError> {
    toml::from_str(contents).map_err(|source| MigrationError::InvalidToml {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CURRENT_FORMAT_VERSION;

    const CURRENT: &str = r#"format_version = 2

[apps.App]
identifier = "com.example.app"
product = "app"
version = "1.0.0"
"#;

    #[tokio::test]
    async fn current_files_are_never_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIGURATION_FILE_NAME);
        std::fs::write(&path, CURRENT).unwrap();

        let loaded = load(dir.path(), MigrationMode::Rewrite).await.unwrap();
        assert_eq!(loaded.outcome, MigrationOutcome::AlreadyUpToDate);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), CURRENT);
        assert!(!dir.path().join("Bundler.toml.orig").exists());
    }

    #[tokio::test]
    async fn json_generation_is_rewritten_with_a_backup() {
        let dir = tempfile::tempdir().unwrap();
        let json = r#"{"product": "hello", "bundleIdentifier": "com.example.hello", "versionString": "0.1.0"}"#;
        std::fs::write(dir.path().join(LEGACY_JSON_FILE_NAME), json).unwrap();

        let loaded = load(dir.path(), MigrationMode::Rewrite).await.unwrap();
        assert!(matches!(
            loaded.outcome,
            MigrationOutcome::Migrated { from: FormatGeneration::Json, backup: Some(_), .. }
        ));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("Bundle.json.orig")).unwrap(),
            json
        );
        assert!(!dir.path().join(LEGACY_JSON_FILE_NAME).exists());

        // The rewritten file now loads as current.
        let reloaded = load(dir.path(), MigrationMode::ReadOnly).await.unwrap();
        assert_eq!(reloaded.outcome, MigrationOutcome::AlreadyUpToDate);
        assert_eq!(reloaded.configuration.format_version, CURRENT_FORMAT_VERSION);
        assert_eq!(reloaded.configuration, loaded.configuration);
    }

    #[tokio::test]
    async fn read_only_mode_leaves_files_alone() {
        let dir = tempfile::tempdir().unwrap();
        let toml = "[apps.App]\nidentifier = \"com.example.app\"\nproduct = \"app\"\nversion = \"1.0.0\"\n";
        std::fs::write(dir.path().join(CONFIGURATION_FILE_NAME), toml).unwrap();

        let loaded = load(dir.path(), MigrationMode::ReadOnly).await.unwrap();
        assert!(matches!(
            loaded.outcome,
            MigrationOutcome::Migrated { from: FormatGeneration::Toml, backup: None, .. }
        ));
        assert_eq!(
            std::fs::read_to_string(dir.path().join(CONFIGURATION_FILE_NAME)).unwrap(),
            toml
        );
    }

    #[tokio::test]
    async fn missing_configuration_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load(dir.path(), MigrationMode::ReadOnly).await,
            Err(MigrationError::NotFound { .. })
        ));
    }
}
