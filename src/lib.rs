//! Configuration-driven app bundler.
//!
//! Turns a cargo executable described in `Bundler.toml` into a
//! platform-native bundle:
//! - macOS, iOS, tvOS, watchOS and visionOS `.app` bundles (darwinApp)
//! - Linux directories, AppImages and RPM packages
//! - Windows folders and NSIS installers
//!
//! It can be used both as a CLI tool and as a library dependency.

pub mod bundler;
pub mod cli;
pub mod config;
pub mod error;
pub mod metadata;
pub mod source;

// Re-export commonly used types
pub use error::{BundlerError, CliError, Result};
