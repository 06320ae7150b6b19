//! Top-level error type of the command line tool.
//!
//! Library errors are wrapped here and rendered once by `main`.

use thiserror::Error;

/// Result type alias for command execution
pub type Result<T> = std::result::Result<T, BundlerError>;

/// Main error type for all command failures
#[derive(Error, Debug)]
pub enum BundlerError {
    /// CLI argument errors
    #[error(transparent)]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Pipeline errors
    #[error(transparent)]
    Bundler(#[from] crate::bundler::Error),

    /// Configuration loading and migration errors
    #[error(transparent)]
    Migration(#[from] crate::config::MigrationError),

    /// Generic errors from anyhow
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Command execution failed
    #[error("Command execution failed: {command} - {reason}")]
    ExecutionFailed {
        /// Command that failed
        command: String,
        /// Reason for the error
        reason: String,
    },
}

impl BundlerError {
    /// Messages of this error and every error in its `source()` chain.
    pub fn chain(&self) -> Vec<String> {
        let mut messages = vec![self.to_string()];
        let mut source = std::error::Error::source(self);
        while let Some(error) = source {
            let message = error.to_string();
            if messages.last() != Some(&message) {
                messages.push(message);
            }
            source = error.source();
        }
        messages
    }
}
