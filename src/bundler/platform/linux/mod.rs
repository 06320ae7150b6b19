//! Linux backends.
//!
//! All three backends share the same `usr/` tree: the executable in
//! `usr/bin`, dependency libraries in `usr/lib`, and the desktop entry, icon
//! and optional D-Bus service under `usr/share`. [`LinuxLayout`] names those
//! paths and [`populate`] writes them.
//!
//! # Module Organization
//!
//! - [`generic`] - the tree itself plus a `.tar.gz` of it
//! - [`appimage`] - the tree turned into an AppImage by linuxdeploy
//! - [`rpm`] - the tree packaged as an RPM
//! - [`desktop`] - desktop entry and D-Bus service rendering

pub mod appimage;
pub mod desktop;
pub mod generic;
pub mod rpm;

use crate::bundler::{
    BundlerContext, Error, Result,
    error::ErrorExt,
    target::Arch,
    utils::fs,
};
use desktop::DesktopEntry;
use std::path::{Path, PathBuf};

/// Paths of the shared `usr/` tree below some root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinuxLayout {
    pub bin_dir: PathBuf,
    pub executable: PathBuf,
    pub lib_dir: PathBuf,
    pub desktop_file: PathBuf,
    pub icon: Option<PathBuf>,
    pub dbus_service: Option<PathBuf>,
}

impl LinuxLayout {
    /// Layout below `root`; pure.
    pub fn new(ctx: &BundlerContext, root: &Path) -> Self {
        let usr = root.join("usr");
        let share = usr.join("share");
        let identifier = &ctx.app.identifier;
        let bin_dir = usr.join("bin");

        Self {
            executable: bin_dir.join(ctx.executable_name()),
            bin_dir,
            lib_dir: usr.join("lib"),
            desktop_file: share.join("applications").join(format!("{identifier}.desktop")),
            icon: ctx.app.icon.as_ref().map(|icon| {
                let mut name = identifier.clone();
                if let Some(ext) = icon.extension() {
                    name.push('.');
                    name.push_str(&ext.to_string_lossy());
                }
                share.join("pixmaps").join(name)
            }),
            dbus_service: ctx
                .app
                .dbus_activatable
                .then(|| share.join("dbus-1/services").join(format!("{identifier}.service"))),
        }
    }
}

/// The single architecture of a linux build.
pub(crate) fn single_arch(ctx: &BundlerContext) -> Result<Arch> {
    match ctx.architectures.as_slice() {
        [arch] => Ok(*arch),
        other => Err(Error::ArchError(format!(
            "linux bundles hold exactly one architecture, got {}",
            other.len()
        ))),
    }
}

/// Writes the `usr/` tree of `layout`.
///
/// `installed_exec` is the `Exec=` value of the D-Bus service file, the path
/// the executable has once installed.
pub(crate) async fn populate(
    ctx: &BundlerContext,
    layout: &LinuxLayout,
    entry: &DesktopEntry,
    installed_exec: &str,
) -> Result<()> {
    fs::copy_file(&ctx.executable(), &layout.executable).await?;
    fs::set_executable(&layout.executable).await?;

    for library in ctx.dynamic_libraries() {
        let Some(name) = library.path.file_name() else {
            continue;
        };
        fs::copy_file(&library.path, &layout.lib_dir.join(name)).await?;
    }

    write(&layout.desktop_file, entry.render()?).await?;

    if let (Some(source), Some(icon)) = (&ctx.app.icon, &layout.icon) {
        fs::copy_file(&ctx.directories.package.join(source), icon).await?;
    }

    if let Some(service) = &layout.dbus_service {
        write(
            service,
            desktop::dbus_service(&ctx.app.identifier, installed_exec)?,
        )
        .await?;
    }

    Ok(())
}

async fn write(path: &Path, contents: String) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent, false).await?;
    }
    tokio::fs::write(path, contents)
        .await
        .fs_context("writing file", path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{context::tests::context, context::BuiltDependency};
    use crate::config::{Dependency, ProductType};

    #[tokio::test]
    async fn populates_the_usr_tree() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        ctx.app.icon = Some("assets/icon.png".into());
        ctx.app.dbus_activatable = true;

        std::fs::create_dir_all(&ctx.directories.products).unwrap();
        std::fs::write(ctx.executable(), b"exe").unwrap();
        std::fs::create_dir_all(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("assets/icon.png"), b"png").unwrap();
        let lib = dir.path().join("libgreeter.so");
        std::fs::write(&lib, b"lib").unwrap();
        ctx.insert_built_dependency(
            Dependency::new("tools", "greeter"),
            BuiltDependency {
                kind: ProductType::DynamicLibrary,
                path: lib,
            },
        )
        .unwrap();

        let root = dir.path().join("out/Hello");
        let layout = LinuxLayout::new(&ctx, &root);
        let entry = DesktopEntry::for_app(&ctx, None, "hello");
        populate(&ctx, &layout, &entry, "/usr/bin/hello").await.unwrap();

        assert!(root.join("usr/bin/hello").is_file());
        assert!(root.join("usr/lib/libgreeter.so").is_file());
        assert!(root.join("usr/share/applications/com.example.hello.desktop").is_file());
        assert!(root.join("usr/share/pixmaps/com.example.hello.png").is_file());
        let service = std::fs::read_to_string(
            root.join("usr/share/dbus-1/services/com.example.hello.service"),
        )
        .unwrap();
        assert!(service.contains("Exec=/usr/bin/hello"));
    }

    #[test]
    fn universal_builds_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        assert_eq!(single_arch(&ctx).unwrap(), Arch::X86_64);
        ctx.architectures.push(Arch::AArch64);
        assert!(single_arch(&ctx).is_err());
    }
}
