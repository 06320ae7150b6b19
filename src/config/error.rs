//! Typed failures of configuration loading, migration and flattening.

use super::{Condition, Dependency};
use std::path::PathBuf;
use thiserror::Error;

/// Failure while flattening or validating a loaded configuration.
#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// The file declares a format version this build does not understand.
    #[error(
        "unsupported format_version {found} (expected {expected}); run `kodegen_bundler_app migrate`"
    )]
    UnsupportedFormatVersion {
        /// Version found in the file.
        found: u32,
        /// Version this build reads.
        expected: u32,
    },

    /// A project reuses the name reserved for the root package.
    #[error("'{name}' is reserved for the root package and cannot name a project")]
    ReservedProjectName {
        /// Offending project name.
        name: String,
    },

    /// A project's builder is not a Rust builder script.
    #[error("project '{project}' has builder '{name}', builder scripts must end in '.rs'")]
    InvalidBuilderName {
        /// Project declaring the builder.
        project: String,
        /// Builder name as written.
        name: String,
    },

    /// A git project does not pin a revision.
    #[error("project '{project}' uses a git source and must set `revision`")]
    MissingRevision {
        /// Project missing the revision.
        project: String,
    },

    /// An overlay sets fields that are exclusive to a different condition.
    #[error(
        "app '{app}': overlay #{overlay} ({overlay_condition}) sets {}, which are only available under {condition}",
        .fields.join(", ")
    )]
    ExclusivePropertiesViolation {
        /// App declaring the overlay.
        app: String,
        /// Index of the overlay in declaration order.
        overlay: usize,
        /// Condition of the offending overlay.
        overlay_condition: Condition,
        /// Condition the fields are exclusive to.
        condition: Condition,
        /// Every offending field of the rule.
        fields: Vec<&'static str>,
    },

    /// A package requirement contains a character outside the allow-list.
    #[error("app '{app}': requirement '{requirement}' contains invalid character '{character}'")]
    InvalidRequirement {
        /// App declaring the requirement.
        app: String,
        /// Requirement as written.
        requirement: String,
        /// First rejected character.
        character: char,
    },

    /// A package requirement is empty.
    #[error("app '{app}': requirements cannot be empty strings")]
    EmptyRequirement {
        /// App declaring the requirement.
        app: String,
    },

    /// A dependency names an undeclared project or product.
    #[error(
        "app '{app}' depends on '{dependency}', which is not declared (available: {})",
        .available.join(", ")
    )]
    UnknownDependency {
        /// App declaring the dependency.
        app: String,
        /// Dependency as written.
        dependency: Dependency,
        /// Names that would have been accepted.
        available: Vec<String>,
    },

    /// The configuration declares no apps.
    #[error("the configuration does not declare any apps")]
    NoApps,

    /// The requested app is not declared.
    #[error("unknown app '{name}' (available: {})", .available.join(", "))]
    UnknownApp {
        /// Requested app.
        name: String,
        /// Declared apps.
        available: Vec<String>,
    },

    /// Several apps are declared and none was named.
    #[error("multiple apps are declared, pass one of: {}", .available.join(", "))]
    AmbiguousApp {
        /// Declared apps.
        available: Vec<String>,
    },

    /// The resolved-app cache was asked for a different resolution than it holds.
    #[error("configuration was already resolved for {cached}, cannot resolve again for {requested}")]
    ResolutionContextChanged {
        /// Resolution held by the cache.
        cached: String,
        /// Resolution that was requested.
        requested: String,
    },
}

/// Failure while locating, reading or upgrading a configuration file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MigrationError {
    /// Neither a current nor a legacy configuration file exists.
    #[error("no Bundler.toml or Bundle.json found in {}", .directory.display())]
    NotFound {
        /// Directory that was searched.
        directory: PathBuf,
    },

    /// The configuration file could not be read.
    #[error("failed to read {}", .path.display())]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },

    /// A TOML configuration file is malformed.
    #[error("invalid configuration in {}", .path.display())]
    InvalidToml {
        /// File that was parsed.
        path: PathBuf,
        /// Parser diagnostic.
        #[source]
        source: toml::de::Error,
    },

    /// A legacy JSON configuration file is malformed.
    #[error("invalid legacy configuration in {}", .path.display())]
    InvalidJson {
        /// File that was parsed.
        path: PathBuf,
        /// Parser diagnostic.
        #[source]
        source: serde_json::Error,
    },

    /// The migrated configuration could not be encoded.
    #[error("failed to encode the migrated configuration")]
    Serialize(#[from] toml::ser::Error),

    /// The migrated configuration or its backup could not be written.
    #[error("failed to write {}", .path.display())]
    Write {
        /// File that was written.
        path: PathBuf,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },
}
