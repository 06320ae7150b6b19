//! Error types for bundling operations.
//!
//! Every pipeline component has its own closed error enum; this module defines the
//! umbrella [`Error`] the orchestrator propagates, plus the small extension traits
//! used throughout the bundler to attach context to failures.

use crate::bundler::{codesign::CodesignError, device::DeviceError};
use crate::config::{ConfigurationError, MigrationError};
use std::{
    fmt::Display,
    path::{Path, PathBuf},
    process::ExitStatus,
};

/// Result type alias for bundler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage a build-side failure happened in.
///
/// Resolution stages (configuration, device, codesigning) carry their own typed
/// errors; the stages listed here wrap whatever failed inside them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Building or locating declared dependencies.
    DependencyBuild,
    /// Copying dependency libraries next to the main product.
    DependencyCopy,
    /// Building the app's main executable.
    MainBuild,
    /// Extracting debug information and stripping.
    DebugInfo,
    /// Appending the embedded metadata blob.
    MetadataEmbedding,
    /// Removing stale outputs.
    OutputCleanup,
    /// Running the selected bundler backend.
    Packaging,
    /// Copying the bundle to the copy-out location.
    CopyOut,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let description = match self {
            Stage::DependencyBuild => "building dependencies",
            Stage::DependencyCopy => "copying dependency libraries",
            Stage::MainBuild => "building the main product",
            Stage::DebugInfo => "processing debug information",
            Stage::MetadataEmbedding => "embedding metadata",
            Stage::OutputCleanup => "removing stale outputs",
            Stage::Packaging => "packaging",
            Stage::CopyOut => "copying the bundle out",
        };
        f.write_str(description)
    }
}

/// Main error type for the bundling pipeline.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration could not be flattened or validated.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Configuration could not be loaded or migrated.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// No single device could be resolved.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Codesigning inputs are inconsistent or unresolvable.
    #[error(transparent)]
    Codesign(#[from] CodesignError),

    /// Argument combination is invalid for the resolved platform or bundler.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// A build-side pipeline stage failed.
    #[error("{stage} failed")]
    Stage {
        /// Stage that failed.
        stage: Stage,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// Additional context wrapped around another bundler error.
    #[error("{context}")]
    Context {
        /// What was being attempted.
        context: String,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// Filesystem operation failed on a known path.
    #[error("{context}: {}", .path.display())]
    Fs {
        /// What was being attempted.
        context: String,
        /// Path the operation touched.
        path: PathBuf,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },

    /// External command could not be started.
    #[error("failed to run `{command}`")]
    CommandFailed {
        /// Command that failed to start.
        command: String,
        /// Underlying IO failure.
        #[source]
        error: std::io::Error,
    },

    /// External command ran but reported failure.
    #[error("`{command}` failed ({status}){}", stderr_suffix(.stderr))]
    CommandExited {
        /// Command line that failed.
        command: String,
        /// Exit status reported by the OS.
        status: ExitStatus,
        /// Captured standard error (may be empty when output was streamed).
        stderr: String,
    },

    /// A build step finished but its expected product is missing.
    #[error("expected {description} at {}", .path.display())]
    MissingArtifact {
        /// What was expected.
        description: String,
        /// Where it was expected.
        path: PathBuf,
    },

    /// Architecture cannot be handled by a backend or platform.
    #[error("unsupported architecture: {0}")]
    ArchError(String),

    /// Generic error with message.
    #[error("{0}")]
    GenericError(String),

    /// IO error without path context.
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// Directory traversal failed.
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),

    /// Path prefix stripping failed.
    #[error(transparent)]
    StripPrefix(#[from] std::path::StripPrefixError),

    /// JSON encoding or decoding failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Property list could not be written.
    #[error(transparent)]
    Plist(#[from] plist::Error),

    /// RPM package could not be assembled.
    #[cfg(target_os = "linux")]
    #[error(transparent)]
    Rpm(#[from] rpm::Error),
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        // The last lines of compiler/tool output carry the actual failure.
        let tail: Vec<&str> = trimmed.lines().rev().take(20).collect();
        let tail: Vec<&str> = tail.into_iter().rev().collect();
        format!(":\n{}", tail.join("\n"))
    }
}

/// Returns early with a [`Error::GenericError`] built from a format string.
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::bundler::Error::GenericError(format!($($arg)*)))
    };
}

/// Attaches a human readable context to a failure.
pub trait Context<T> {
    /// Wraps the error (or the missing value) with `context`.
    fn context<C: Display>(self, context: C) -> Result<T>;

    /// Like [`Context::context`], computing the context lazily.
    fn with_context<C: Display, F: FnOnce() -> C>(self, f: F) -> Result<T>;
}

impl<T> Context<T> for Result<T> {
    fn context<C: Display>(self, context: C) -> Result<T> {
        self.map_err(|source| Error::Context {
            context: context.to_string(),
            source: Box::new(source),
        })
    }

    fn with_context<C: Display, F: FnOnce() -> C>(self, f: F) -> Result<T> {
        self.map_err(|source| Error::Context {
            context: f().to_string(),
            source: Box::new(source),
        })
    }
}

impl<T> Context<T> for Option<T> {
    fn context<C: Display>(self, context: C) -> Result<T> {
        self.ok_or_else(|| Error::GenericError(context.to_string()))
    }

    fn with_context<C: Display, F: FnOnce() -> C>(self, f: F) -> Result<T> {
        self.ok_or_else(|| Error::GenericError(f().to_string()))
    }
}

/// Attaches a path and description to IO failures.
pub trait ErrorExt<T> {
    /// Converts an IO failure into [`Error::Fs`].
    fn fs_context(self, context: &str, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, context: &str, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|source| Error::Fs {
            context: context.to_string(),
            path: path.as_ref().to_path_buf(),
            source,
        })
    }
}

/// Tags a failure with the pipeline stage it happened in.
pub trait StageExt<T> {
    /// Wraps the error in [`Error::Stage`].
    fn stage(self, stage: Stage) -> Result<T>;
}

impl<T> StageExt<T> for Result<T> {
    fn stage(self, stage: Stage) -> Result<T> {
        self.map_err(|source| Error::Stage {
            stage,
            source: Box::new(source),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_error_keeps_source_chain() {
        let failure: Result<()> = Err(Error::GenericError("builder exited".into()));
        let err = failure.stage(Stage::DependencyBuild).unwrap_err();

        assert_eq!(err.to_string(), "building dependencies failed");
        let source = std::error::Error::source(&err).expect("stage errors carry a source");
        assert_eq!(source.to_string(), "builder exited");
    }

    #[test]
    fn option_context_becomes_generic_error() {
        let missing: Option<u8> = None;
        let err = missing.context("no main binary found").unwrap_err();
        assert!(matches!(err, Error::GenericError(ref m) if m == "no main binary found"));
    }
}
