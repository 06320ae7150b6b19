//! Bundling pipeline.
//!
//! [`Bundler`] drives one run from device resolution to the finished bundle.
//! Everything that talks to external tools goes through a
//! [`toolchain::Toolchain`]; the backends in [`platform`] turn the built
//! executable into a distributable.
//!
//! # Module Organization
//!
//! - [`builder`] - the orchestrator and the dependency builder
//! - [`codesign`] - codesigning resolution
//! - [`context`] - state accumulated during a run
//! - [`device`] - device and platform resolution
//! - [`embed`] - app metadata carried by executables and Apple bundles
//! - [`platform`] - bundler backends
//! - [`runner`] - launching a bundle
//! - [`target`] - platforms, architectures and build configurations
//! - [`toolchain`] - external build and device tools

pub mod builder;
pub mod codesign;
pub mod context;
pub mod device;
pub mod embed;
pub mod error;
pub mod platform;
pub mod runner;
pub mod target;
pub mod toolchain;

pub mod utils {
    //! Filesystem, HTTP and process helpers shared by the pipeline.

    pub mod fs;
    pub mod http;
    pub mod process;
}

pub use builder::{BundleReport, BundleRequest, Bundler};
pub use context::BundlerContext;
pub use error::{Error, Result};
