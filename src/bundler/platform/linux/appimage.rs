//! AppImage bundler - portable Linux applications.
//!
//! The shared `usr/` tree is written into an AppDir in the scratch directory
//! and handed to linuxdeploy, which bundles the shared libraries the
//! executable needs and emits the `.AppImage`.

use super::{LinuxLayout, desktop::DesktopEntry, populate, single_arch};
use crate::{
    bail,
    bundler::{
        BundleRequest, BundlerContext, Error, Result,
        error::{Context, ErrorExt},
        platform::{Backend, BundleStructure},
        target::Arch,
        utils::{fs, http, process},
    },
};
use crate::metadata::CargoManifest;
use std::path::{Path, PathBuf};
use tokio::process::Command;

const LINUXDEPLOY_BASE_URL: &str =
    "https://github.com/linuxdeploy/linuxdeploy/releases/download/continuous";

/// Icon formats linuxdeploy accepts.
const ICON_EXTENSIONS: [&str; 3] = ["png", "svg", "xpm"];

/// The `linuxAppImage` backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct AppImageBackend;

/// Facts computed before the build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppImageContext {
    /// Architecture name as linuxdeploy spells it.
    pub arch: &'static str,
    /// Desktop entry `Comment=`.
    pub description: Option<String>,
}

/// Maps an architecture to linuxdeploy's naming.
pub fn appimage_arch(arch: Arch) -> Result<&'static str> {
    match arch {
        Arch::X86_64 => Ok("x86_64"),
        Arch::X86 => Ok("i386"),
        Arch::AArch64 => Ok("aarch64"),
        Arch::Armhf => Ok("armhf"),
        other => Err(Error::ArchError(format!(
            "linuxdeploy has no build for {other}"
        ))),
    }
}

impl AppImageBackend {
    fn app_dir(ctx: &BundlerContext) -> PathBuf {
        ctx.directories
            .scratch
            .join("appimage")
            .join(format!("{}.AppDir", ctx.app_name))
    }
}

impl Backend for AppImageBackend {
    type Context = AppImageContext;

    fn compute_context(
        &self,
        ctx: &BundlerContext,
        _request: &BundleRequest,
        manifest: &CargoManifest,
    ) -> Result<AppImageContext> {
        let Some(icon) = &ctx.app.icon else {
            bail!(
                "AppImages need an icon; set `icon` for app '{}' (png, svg or xpm)",
                ctx.app_name
            );
        };
        let supported = icon
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ICON_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if !supported {
            bail!(
                "AppImage icon {} must be a png, svg or xpm file",
                icon.display()
            );
        }

        Ok(AppImageContext {
            arch: appimage_arch(single_arch(ctx)?)?,
            description: Some(manifest.metadata.description.clone()),
        })
    }

    fn intended_output(&self, ctx: &BundlerContext, extra: &AppImageContext) -> BundleStructure {
        let root = ctx.directories.output.join(format!(
            "{}-{}-{}.AppImage",
            ctx.app_name, ctx.app.version, extra.arch
        ));
        BundleStructure {
            executable: Some(root.clone()),
            manifest: None,
            artifacts: Vec::new(),
            root,
        }
    }

    /// Bundle project as AppImage.
    ///
    /// # Process
    ///
    /// 1. Downloads linuxdeploy (cached per user)
    /// 2. Writes the AppDir (`usr/bin`, `usr/lib`, `usr/share`)
    /// 3. Invokes linuxdeploy to create the AppImage
    async fn bundle(&self, ctx: &BundlerContext, extra: &AppImageContext) -> Result<BundleStructure> {
        let structure = self.intended_output(ctx, extra);
        log::info!("Building AppImage for {}", ctx.app_name);
        log::debug!("Using architecture: {}", extra.arch);

        let tools_dir = tools_dir(ctx);
        fs::create_dir_all(&tools_dir, false).await?;
        let linuxdeploy = download_linuxdeploy(&tools_dir, extra.arch)
            .await
            .context("failed to download linuxdeploy tool")?;

        let app_dir = Self::app_dir(ctx);
        fs::create_dir_all(&app_dir, true).await?;

        let layout = LinuxLayout::new(ctx, &app_dir);
        let entry = DesktopEntry::for_app(ctx, extra.description.as_deref(), &ctx.executable_name());
        populate(ctx, &layout, &entry, &format!("/usr/bin/{}", ctx.executable_name())).await?;

        let icon = layout
            .icon
            .as_ref()
            .context("AppImage icon missing from the AppDir")?;

        let mut command = Command::new(&linuxdeploy);
        command
            .env("OUTPUT", &structure.root)
            .env("ARCH", extra.arch)
            .env("LD_LIBRARY_PATH", &layout.lib_dir)
            .arg("--appdir")
            .arg(&app_dir)
            .arg("--executable")
            .arg(&layout.executable)
            .arg("--desktop-file")
            .arg(&layout.desktop_file)
            .arg("--icon-file")
            .arg(icon);
        for library in ctx.dynamic_libraries() {
            command.arg("--library").arg(&library.path);
        }
        command.args(["--output", "appimage"]);
        process::status(&mut command).await?;

        if !structure.root.is_file() {
            return Err(Error::MissingArtifact {
                description: "linuxdeploy output".to_string(),
                path: structure.root.clone(),
            });
        }
        fs::set_executable(&structure.root).await?;
        fs::remove_path(&app_dir).await?;

        log::info!("✓ Created AppImage: {}", structure.root.display());
        Ok(structure)
    }
}

/// Per-user cache for downloaded tools, falling back to the scratch directory.
fn tools_dir(ctx: &BundlerContext) -> PathBuf {
    dirs::cache_dir()
        .map(|cache| cache.join("kodegen").join("tools"))
        .unwrap_or_else(|| ctx.directories.scratch.join(".tools"))
}

/// Download and extract linuxdeploy tool.
///
/// Downloads the linuxdeploy AppImage from GitHub, extracts it (containers
/// usually lack FUSE), and returns the path to the extracted AppRun binary.
async fn download_linuxdeploy(tools_dir: &Path, arch: &str) -> Result<PathBuf> {
    let tool_name = format!("linuxdeploy-{arch}.AppImage");
    let tool_path = tools_dir.join(&tool_name);
    let extracted_dir = tools_dir.join(format!("linuxdeploy-{arch}-extracted"));
    let extracted_apprun = extracted_dir.join("AppRun");

    if extracted_apprun.exists() {
        log::debug!("linuxdeploy already extracted at {}", extracted_apprun.display());
        return Ok(extracted_apprun);
    }

    if !tool_path.exists() {
        log::info!("Downloading linuxdeploy for {arch}...");

        let data = http::download(&format!("{LINUXDEPLOY_BASE_URL}/{tool_name}")).await?;
        tokio::fs::write(&tool_path, data)
            .await
            .fs_context("writing linuxdeploy tool", &tool_path)?;
        fs::set_executable(&tool_path).await?;
    }

    log::info!("Extracting linuxdeploy for {arch}...");
    fs::create_dir_all(&extracted_dir, true).await?;

    // Creates squashfs-root/ in the working directory.
    process::output(
        Command::new(&tool_path)
            .arg("--appimage-extract")
            .current_dir(&extracted_dir),
    )
    .await?;

    let squashfs_root = extracted_dir.join("squashfs-root");
    if !squashfs_root.exists() {
        bail!("linuxdeploy extraction did not create squashfs-root directory");
    }

    let mut entries = tokio::fs::read_dir(&squashfs_root)
        .await
        .fs_context("reading extracted linuxdeploy", &squashfs_root)?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .fs_context("reading extracted linuxdeploy", &squashfs_root)?
    {
        let dst = extracted_dir.join(entry.file_name());
        tokio::fs::rename(entry.path(), &dst)
            .await
            .fs_context("moving extracted file", &dst)?;
    }
    tokio::fs::remove_dir(&squashfs_root)
        .await
        .fs_context("removing squashfs-root", &squashfs_root)?;

    if !extracted_apprun.exists() {
        bail!("AppRun not found after extraction");
    }
    fs::set_executable(&extracted_apprun).await?;

    Ok(extracted_apprun)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::context::tests::context;

    fn manifest() -> CargoManifest {
        CargoManifest {
            metadata: crate::metadata::PackageMetadata {
                name: "hello".into(),
                description: String::new(),
                version: "1.2.3".into(),
                authors: vec![],
                license: None,
                homepage: None,
            },
            binaries: vec!["hello".into()],
            library: None,
        }
    }

    #[test]
    fn requires_a_supported_icon() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        let request = BundleRequest::new(dir.path());

        assert!(AppImageBackend.compute_context(&ctx, &request, &manifest()).is_err());

        ctx.app.icon = Some("assets/icon.icns".into());
        assert!(AppImageBackend.compute_context(&ctx, &request, &manifest()).is_err());

        ctx.app.icon = Some("assets/icon.png".into());
        let extra = AppImageBackend
            .compute_context(&ctx, &request, &manifest())
            .unwrap();
        let structure = AppImageBackend.intended_output(&ctx, &extra);
        assert_eq!(
            structure.root,
            ctx.directories.output.join("Hello-1.2.3-x86_64.AppImage")
        );
        assert_eq!(structure.executable.as_ref(), Some(&structure.root));
    }

    #[test]
    fn maps_architectures() {
        assert_eq!(appimage_arch(Arch::X86).unwrap(), "i386");
        assert_eq!(appimage_arch(Arch::Armhf).unwrap(), "armhf");
        assert!(appimage_arch(Arch::Riscv64).is_err());
    }
}
