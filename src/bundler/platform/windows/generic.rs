//! Plain directory bundle for Windows.
//!
//! ```text
//! <output>/<App>/<exe>.exe
//! <output>/<App>/<exe>.exe.manifest
//! <output>/<App>/*.dll
//! ```

use super::{four_part_version, single_arch};
use crate::bundler::{
    BundleRequest, BundlerContext, Error, Result,
    error::ErrorExt,
    platform::{Backend, BundleStructure},
    target::Arch,
    utils::fs,
};
use crate::metadata::CargoManifest;
use handlebars::Handlebars;
use serde::Serialize;
use std::path::PathBuf;

const MANIFEST_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<assembly xmlns="urn:schemas-microsoft-com:asm.v1" manifestVersion="1.0">
  <assemblyIdentity type="win32" name="{{identifier}}" version="{{version}}" processorArchitecture="{{arch}}"/>
  <description>{{description}}</description>
  <trustInfo xmlns="urn:schemas-microsoft-com:asm.v3">
    <security>
      <requestedPrivileges>
        <requestedExecutionLevel level="asInvoker" uiAccess="false"/>
      </requestedPrivileges>
    </security>
  </trustInfo>
  <compatibility xmlns="urn:schemas-microsoft-com:compatibility.v1">
    <application>
      <supportedOS Id="{8e0f7a12-bfb3-4fe8-b9a5-48fd50a15a9a}"/>
    </application>
  </compatibility>
  <application xmlns="urn:schemas-microsoft-com:asm.v3">
    <windowsSettings>
      <dpiAware xmlns="http://schemas.microsoft.com/SMI/2005/WindowsSettings">true/pm</dpiAware>
      <dpiAwareness xmlns="http://schemas.microsoft.com/SMI/2016/WindowsSettings">PerMonitorV2</dpiAwareness>
      <longPathAware xmlns="http://schemas.microsoft.com/SMI/2016/WindowsSettings">true</longPathAware>
    </windowsSettings>
  </application>
</assembly>
"#;

/// The `windowsGeneric` backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct WindowsGenericBackend;

/// Facts computed before the build.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WindowsGenericContext {
    pub identifier: String,
    /// Four-part assembly version.
    pub version: String,
    /// `processorArchitecture` value.
    pub arch: &'static str,
    pub description: String,
}

/// Maps an architecture to the assembly manifest's naming.
pub fn manifest_arch(arch: Arch) -> Result<&'static str> {
    match arch {
        Arch::X86_64 => Ok("amd64"),
        Arch::X86 => Ok("x86"),
        Arch::AArch64 => Ok("arm64"),
        other => Err(Error::ArchError(format!(
            "Windows bundles cannot target {other}"
        ))),
    }
}

impl WindowsGenericContext {
    /// Renders the side-by-side manifest.
    pub fn render_manifest(&self) -> Result<String> {
        Handlebars::new()
            .render_template(MANIFEST_TEMPLATE, self)
            .map_err(|e| Error::GenericError(format!("failed to render manifest: {e}")))
    }
}

impl WindowsGenericBackend {
    fn root(ctx: &BundlerContext) -> PathBuf {
        ctx.directories.output.join(&ctx.app_name)
    }
}

impl Backend for WindowsGenericBackend {
    type Context = WindowsGenericContext;

    fn compute_context(
        &self,
        ctx: &BundlerContext,
        _request: &BundleRequest,
        manifest: &CargoManifest,
    ) -> Result<WindowsGenericContext> {
        Ok(WindowsGenericContext {
            identifier: ctx.app.identifier.clone(),
            version: four_part_version(&ctx.app.version)?,
            arch: manifest_arch(single_arch(ctx)?)?,
            description: manifest.metadata.description.clone(),
        })
    }

    fn intended_output(&self, ctx: &BundlerContext, _extra: &WindowsGenericContext) -> BundleStructure {
        let root = Self::root(ctx);
        let executable = root.join(ctx.executable_name());
        BundleStructure {
            manifest: Some(root.join(format!("{}.manifest", ctx.executable_name()))),
            executable: Some(executable),
            artifacts: Vec::new(),
            root,
        }
    }

    async fn bundle(
        &self,
        ctx: &BundlerContext,
        extra: &WindowsGenericContext,
    ) -> Result<BundleStructure> {
        let structure = self.intended_output(ctx, extra);
        log::info!("Creating {}", structure.root.display());

        fs::create_dir_all(&structure.root, true).await?;
        if let Some(executable) = &structure.executable {
            fs::copy_file(&ctx.executable(), executable).await?;
        }

        for library in ctx.dynamic_libraries() {
            if let Some(name) = library.path.file_name() {
                fs::copy_file(&library.path, &structure.root.join(name)).await?;
            }
        }

        if let Some(manifest) = &structure.manifest {
            tokio::fs::write(manifest, extra.render_manifest()?)
                .await
                .fs_context("writing application manifest", manifest)?;
        }

        log::info!("✓ Created {}", structure.root.display());
        Ok(structure)
    }
}
