//! Plain directory bundle plus a `.tar.gz` of it.
//!
//! ```text
//! <output>/<App>/usr/bin/<exe>
//! <output>/<App>/usr/lib/*.so
//! <output>/<App>/usr/share/applications/<identifier>.desktop
//! <output>/<App>-<version>-<arch>.tar.gz
//! ```

use super::{LinuxLayout, desktop::DesktopEntry, populate, single_arch};
use crate::bundler::{
    BundleRequest, BundlerContext, Error, Result,
    error::ErrorExt,
    platform::{Backend, BundleStructure},
    utils::fs,
};
use crate::metadata::CargoManifest;
use flate2::{Compression, write::GzEncoder};
use std::path::{Path, PathBuf};

/// The `linuxGeneric` backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinuxGenericBackend;

/// Facts computed before the build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinuxGenericContext {
    /// Desktop entry `Comment=`.
    pub description: Option<String>,
    /// Architecture name used in the archive file name.
    pub arch: &'static str,
}

impl LinuxGenericBackend {
    fn root(ctx: &BundlerContext) -> PathBuf {
        ctx.directories.output.join(&ctx.app_name)
    }

    fn archive(ctx: &BundlerContext, extra: &LinuxGenericContext) -> PathBuf {
        ctx.directories.output.join(format!(
            "{}-{}-{}.tar.gz",
            ctx.app_name, ctx.app.version, extra.arch
        ))
    }
}

impl Backend for LinuxGenericBackend {
    type Context = LinuxGenericContext;

    fn compute_context(
        &self,
        ctx: &BundlerContext,
        _request: &BundleRequest,
        manifest: &CargoManifest,
    ) -> Result<LinuxGenericContext> {
        Ok(LinuxGenericContext {
            description: Some(manifest.metadata.description.clone()),
            arch: single_arch(ctx)?.linux_name(),
        })
    }

    fn intended_output(&self, ctx: &BundlerContext, extra: &LinuxGenericContext) -> BundleStructure {
        let root = Self::root(ctx);
        let layout = LinuxLayout::new(ctx, &root);
        BundleStructure {
            executable: Some(layout.executable),
            manifest: Some(layout.desktop_file),
            artifacts: vec![Self::archive(ctx, extra)],
            root,
        }
    }

    async fn bundle(&self, ctx: &BundlerContext, extra: &LinuxGenericContext) -> Result<BundleStructure> {
        let structure = self.intended_output(ctx, extra);
        log::info!("Creating {} layout", ctx.app_name);

        fs::create_dir_all(&structure.root, true).await?;
        let layout = LinuxLayout::new(ctx, &structure.root);
        let entry = DesktopEntry::for_app(ctx, extra.description.as_deref(), &ctx.executable_name());
        let installed = format!("/usr/bin/{}", ctx.executable_name());
        populate(ctx, &layout, &entry, &installed).await?;

        let archive = Self::archive(ctx, extra);
        create_tarball(&structure.root, &ctx.app_name, &archive).await?;

        log::info!("✓ Created {}", archive.display());
        Ok(structure)
    }
}

/// Writes `dir` into a gzip-compressed tarball under the top-level `prefix`.
pub async fn create_tarball(dir: &Path, prefix: &str, archive: &Path) -> Result<()> {
    let dir = dir.to_path_buf();
    let prefix = prefix.to_string();
    let archive = archive.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let file = std::fs::File::create(&archive).fs_context("creating archive", &archive)?;
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        builder.follow_symlinks(false);
        builder
            .append_dir_all(&prefix, &dir)
            .fs_context("archiving directory", &dir)?;
        builder
            .into_inner()
            .and_then(|encoder| encoder.finish())
            .fs_context("finishing archive", &archive)?;
        Ok(())
    })
    .await
    .map_err(|e| Error::GenericError(format!("archive task panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::context::tests::context;
    use flate2::read::GzDecoder;

    fn manifest() -> CargoManifest {
        CargoManifest {
            metadata: crate::metadata::PackageMetadata {
                name: "hello".into(),
                description: "Says hello".into(),
                version: "1.2.3".into(),
                authors: vec![],
                license: Some("MIT".into()),
                homepage: None,
            },
            binaries: vec!["hello".into()],
            library: None,
        }
    }

    #[tokio::test]
    async fn bundle_matches_intended_output() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        std::fs::create_dir_all(&ctx.directories.products).unwrap();
        std::fs::write(ctx.executable(), b"exe").unwrap();

        let request = BundleRequest::new(dir.path());
        let extra = LinuxGenericBackend
            .compute_context(&ctx, &request, &manifest())
            .unwrap();
        let intended = LinuxGenericBackend.intended_output(&ctx, &extra);
        let produced = LinuxGenericBackend.bundle(&ctx, &extra).await.unwrap();

        assert_eq!(intended, produced);
        assert_eq!(
            produced.artifacts,
            [ctx.directories.output.join("Hello-1.2.3-x86_64.tar.gz")]
        );
        for path in produced.output_paths() {
            assert!(path.exists(), "{}", path.display());
        }

        let desktop = std::fs::read_to_string(produced.manifest.unwrap()).unwrap();
        assert!(desktop.contains("Comment=Says hello"));

        let archive = std::fs::File::open(&produced.artifacts[0]).unwrap();
        let mut entries: Vec<String> = tar::Archive::new(GzDecoder::new(archive))
            .entries()
            .unwrap()
            .map(|entry| entry.unwrap().path().unwrap().display().to_string())
            .collect();
        entries.sort();
        assert!(entries.contains(&"Hello/usr/bin/hello".to_string()));
    }
}
