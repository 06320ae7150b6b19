//! Facts gathered during one bundling run.
//!
//! A [`BundlerContext`] is created once directories are known and is handed to
//! every later stage. Stages only add to it: codesigning is attached once and
//! built dependencies are insert-only.

use super::{
    Error, Result,
    codesign::CodesigningContext,
    device::Device,
    platform::BundlerChoice,
    target::{Arch, BuildConfiguration, Platform},
};
use crate::config::{Dependency, FlatAppConfiguration, ProductType};
use std::{collections::BTreeMap, path::PathBuf, sync::OnceLock};

/// Directories a run reads from and writes to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Directories {
    /// Package root (holds `Bundler.toml` and `Cargo.toml`).
    pub package: PathBuf,
    /// Cargo target directory.
    pub scratch: PathBuf,
    /// Where the built executable lands.
    pub products: PathBuf,
    /// Where bundles are written.
    pub output: PathBuf,
    /// Checkouts and builds of projects; never cleaned as a stale output.
    pub dependencies: PathBuf,
}

/// A dependency product that exists on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuiltDependency {
    /// Kind of the product.
    pub kind: ProductType,
    /// Path of the built artifact.
    pub path: PathBuf,
}

/// Accumulated state of one run.
#[derive(Clone, Debug)]
pub struct BundlerContext {
    /// Name of the app in `Bundler.toml`.
    pub app_name: String,
    /// Cargo package name.
    pub package_name: String,
    /// The flattened app.
    pub app: FlatAppConfiguration,
    /// Directories of the run.
    pub directories: Directories,
    /// Target device.
    pub device: Device,
    /// Selected bundler.
    pub bundler: BundlerChoice,
    /// Architectures being built, several for universal builds.
    pub architectures: Vec<Arch>,
    /// Debug or release.
    pub configuration: BuildConfiguration,
    codesigning: OnceLock<Option<CodesigningContext>>,
    built_dependencies: BTreeMap<Dependency, BuiltDependency>,
    debug_info: OnceLock<PathBuf>,
}

impl BundlerContext {
    /// Starts a context with nothing attached yet.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        app_name: String,
        package_name: String,
        app: FlatAppConfiguration,
        directories: Directories,
        device: Device,
        bundler: BundlerChoice,
        architectures: Vec<Arch>,
        configuration: BuildConfiguration,
    ) -> Self {
        Self {
            app_name,
            package_name,
            app,
            directories,
            device,
            bundler,
            architectures,
            configuration,
            codesigning: OnceLock::new(),
            built_dependencies: BTreeMap::new(),
            debug_info: OnceLock::new(),
        }
    }

    /// Platform of the run (the device's platform).
    pub fn platform(&self) -> Platform {
        self.device.platform()
    }

    /// File name of the main executable.
    pub fn executable_name(&self) -> String {
        format!("{}{}", self.app.product, self.platform().executable_suffix())
    }

    /// Built main executable in the products directory.
    pub fn executable(&self) -> PathBuf {
        self.directories.products.join(self.executable_name())
    }

    /// Attaches resolved codesigning; only allowed once.
    pub fn attach_codesigning(&mut self, codesigning: Option<CodesigningContext>) -> Result<()> {
        self.codesigning.set(codesigning).map_err(|_| {
            Error::GenericError("codesigning was already attached to this run".to_string())
        })
    }

    /// Resolved codesigning, `None` for unsigned bundles.
    pub fn codesigning(&self) -> Option<&CodesigningContext> {
        self.codesigning.get().and_then(Option::as_ref)
    }

    /// Records a built dependency; each dependency is recorded once.
    pub fn insert_built_dependency(
        &mut self,
        dependency: Dependency,
        built: BuiltDependency,
    ) -> Result<()> {
        if self.built_dependencies.contains_key(&dependency) {
            return Err(Error::GenericError(format!(
                "dependency '{dependency}' was already built in this run"
            )));
        }
        self.built_dependencies.insert(dependency, built);
        Ok(())
    }

    /// Every built dependency, ordered by dependency.
    pub fn built_dependencies(&self) -> &BTreeMap<Dependency, BuiltDependency> {
        &self.built_dependencies
    }

    /// Dynamic libraries among the built dependencies.
    pub fn dynamic_libraries(&self) -> impl Iterator<Item = &BuiltDependency> {
        self.built_dependencies
            .values()
            .filter(|built| built.kind == ProductType::DynamicLibrary)
    }

    /// Records where debug information was extracted to.
    pub fn record_debug_info(&mut self, path: PathBuf) -> Result<()> {
        self.debug_info.set(path).map_err(|_| {
            Error::GenericError("debug information was already extracted in this run".to_string())
        })
    }

    /// Extracted debug information, if any.
    pub fn debug_info(&self) -> Option<&PathBuf> {
        self.debug_info.get()
    }
}
