//! Bundle orchestration and coordination.
//!
//! # Module Organization
//!
//! - [`orchestrator`] - [`Bundler`], the staged pipeline
//! - [`dependencies`] - building the products an app depends on
//! - [`checksum`] - SHA-256 of finished bundles
//! - [`signing`] - certificate import for CI signing on macOS
//! - [`tool_detection`] - external tool availability checking

pub mod checksum;
pub mod dependencies;
pub mod orchestrator;
#[cfg(target_os = "macos")]
mod signing;
pub(crate) mod tool_detection;

pub use orchestrator::{BundleReport, BundleRequest, Bundler};
