//! Windows NSIS installer creation.
//!
//! Creates a Modern UI installer with NSIS (Nullsoft Scriptable Install System).
//! `makensis` runs on every host, so Windows installers can be produced from
//! Linux and macOS as well.
//!
//! # Module Organization
//!
//! - `template` - NSI script template
//! - `toolset` - makensis location
//! - `script` - NSI script generation from the template
//! - `build` - makensis execution
//! - `utils` - architecture mapping and BOM-prefixed writing

mod build;
mod script;
mod template;
mod toolset;
mod utils;

pub use script::render_nsi_script;

use super::{four_part_version, single_arch};
use crate::bundler::{
    BundleRequest, BundlerContext, Result,
    platform::{Backend, BundleStructure},
    utils::fs,
};
use crate::config::InstallMode;
use crate::metadata::CargoManifest;
use std::path::PathBuf;

/// The `windowsInstaller` backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct NsisBackend;

/// Facts computed before the build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NsisContext {
    /// NSIS architecture name (`x64`, `x86`, `arm64`).
    pub arch: &'static str,
    /// Four-part `VIProductVersion`.
    pub version_nsis: String,
    pub publisher: String,
    pub description: String,
    pub install_mode: InstallMode,
    pub compression: &'static str,
    /// Absolute path of the installer icon, when the app icon is an `.ico`.
    pub installer_icon: Option<PathBuf>,
}

impl NsisBackend {
    fn script_dir(ctx: &BundlerContext) -> PathBuf {
        ctx.directories.scratch.join("nsis").join(&ctx.app_name)
    }
}

impl Backend for NsisBackend {
    type Context = NsisContext;

    fn compute_context(
        &self,
        ctx: &BundlerContext,
        _request: &BundleRequest,
        manifest: &CargoManifest,
    ) -> Result<NsisContext> {
        let installer_icon = ctx
            .app
            .icon
            .as_ref()
            .filter(|icon| {
                icon.extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("ico"))
            })
            .map(|icon| ctx.directories.package.join(icon));
        if ctx.app.icon.is_some() && installer_icon.is_none() {
            log::warn!("App icon is not an .ico file; the installer uses the default NSIS icon");
        }

        Ok(NsisContext {
            arch: utils::map_arch(single_arch(ctx)?)?,
            version_nsis: four_part_version(&ctx.app.version)?,
            publisher: manifest
                .metadata
                .authors
                .first()
                .map(|author| utils::publisher_name(author))
                .unwrap_or_else(|| "Unknown Publisher".to_string()),
            description: manifest.metadata.description.clone(),
            install_mode: ctx.app.install_mode,
            compression: utils::COMPRESSION,
            installer_icon,
        })
    }

    fn intended_output(&self, ctx: &BundlerContext, extra: &NsisContext) -> BundleStructure {
        BundleStructure {
            root: ctx.directories.output.join(format!(
                "{}_{}_{}-setup.exe",
                ctx.app_name, ctx.app.version, extra.arch
            )),
            executable: None,
            manifest: None,
            artifacts: Vec::new(),
        }
    }

    async fn bundle(&self, ctx: &BundlerContext, extra: &NsisContext) -> Result<BundleStructure> {
        let structure = self.intended_output(ctx, extra);
        log::info!("Building NSIS installer for {}", ctx.app_name);

        let makensis = toolset::find_makensis()?;

        let script_dir = Self::script_dir(ctx);
        fs::create_dir_all(&script_dir, true).await?;

        let files: Vec<PathBuf> = std::iter::once(ctx.executable())
            .chain(ctx.dynamic_libraries().map(|library| library.path.clone()))
            .collect();
        let nsi_path = script::generate_nsi_script(ctx, extra, &files, &script_dir).await?;

        build::run_makensis(&makensis, &nsi_path, &structure.root).await?;
        fs::remove_path(&script_dir).await?;

        log::info!("✓ Created NSIS installer: {}", structure.root.display());
        Ok(structure)
    }
}
