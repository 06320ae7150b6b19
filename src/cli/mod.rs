//! Command line interface for kodegen bundler.
//!
//! This module parses arguments, dispatches to the `bundle`, `run` and
//! `migrate` commands and reports their outcome.

pub mod args;
pub mod commands;
mod output;

pub use args::{Args, Command, RuntimeConfig};
pub use output::OutputManager;

use crate::config::ResolvedAppCache;
use crate::error::Result;

/// Runs the command selected by `args` and returns the exit code.
///
/// One [`ResolvedAppCache`] lives for the whole invocation.
pub async fn run(args: &Args, config: &RuntimeConfig) -> Result<i32> {
    let mut cache = ResolvedAppCache::new();

    match &args.command {
        Command::Bundle(bundle) => commands::bundle(bundle, config, &mut cache).await,
        Command::Run(run) => commands::run(run, config, &mut cache).await,
        Command::Migrate(migrate) => commands::migrate(migrate, config).await,
    }
}

/// Create runtime configuration from arguments
pub fn create_runtime_config(args: &Args) -> RuntimeConfig {
    RuntimeConfig::from(args)
}
