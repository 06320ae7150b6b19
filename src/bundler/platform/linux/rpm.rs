//! RPM packages.
//!
//! The shared `usr/` tree is staged in the scratch directory and every file
//! in it is added to the package at the same path below `/`. The app's
//! `requirements` become `Requires:` entries.

use super::{LinuxLayout, desktop::DesktopEntry, populate, single_arch};
use crate::bundler::{
    BundleRequest, BundlerContext, Error, Result,
    platform::{Backend, BundleStructure},
    utils::fs,
};
use crate::metadata::CargoManifest;
use std::path::PathBuf;

/// The `linuxRPM` backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct RpmBackend;

/// Version comparison in a requirement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Less,
    LessEqual,
    Equal,
    GreaterEqual,
    Greater,
}

/// One parsed `requirements` entry, e.g. `glibc >= 2.31`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub version: Option<(Comparison, String)>,
}

impl Requirement {
    /// Parses `name` or `name <op> version`.
    pub fn parse(requirement: &str) -> Result<Self> {
        let invalid = || {
            Error::InvalidArguments(format!(
                "invalid RPM requirement '{requirement}', expected 'name' or 'name >= version'"
            ))
        };

        let parts: Vec<&str> = requirement.split_whitespace().collect();
        match parts.as_slice() {
            [name] => Ok(Self {
                name: name.to_string(),
                version: None,
            }),
            [name, op, version] => {
                let comparison = match *op {
                    "<" => Comparison::Less,
                    "<=" => Comparison::LessEqual,
                    "=" | "==" => Comparison::Equal,
                    ">=" => Comparison::GreaterEqual,
                    ">" => Comparison::Greater,
                    _ => return Err(invalid()),
                };
                Ok(Self {
                    name: name.to_string(),
                    version: Some((comparison, version.to_string())),
                })
            }
            _ => Err(invalid()),
        }
    }
}

/// Facts computed before the build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpmContext {
    /// Package name, the cargo package name.
    pub name: String,
    /// RPM architecture name.
    pub arch: &'static str,
    pub release: String,
    pub license: String,
    pub summary: String,
    pub url: Option<String>,
    pub vendor: Option<String>,
    pub requirements: Vec<Requirement>,
}

impl RpmBackend {
    fn staging_dir(ctx: &BundlerContext) -> PathBuf {
        ctx.directories.scratch.join("rpm").join(&ctx.app_name)
    }
}

impl Backend for RpmBackend {
    type Context = RpmContext;

    fn compute_context(
        &self,
        ctx: &BundlerContext,
        _request: &BundleRequest,
        manifest: &CargoManifest,
    ) -> Result<RpmContext> {
        let metadata = &manifest.metadata;
        let license = metadata.license.clone().unwrap_or_else(|| {
            log::warn!("Cargo.toml has no license; the RPM declares 'Unknown'");
            "Unknown".to_string()
        });

        Ok(RpmContext {
            name: ctx.package_name.clone(),
            arch: single_arch(ctx)?.linux_name(),
            release: "1".to_string(),
            license,
            summary: metadata.description.clone(),
            url: metadata.homepage.clone(),
            vendor: metadata.authors.first().cloned(),
            requirements: ctx
                .app
                .requirements
                .iter()
                .map(|requirement| Requirement::parse(requirement))
                .collect::<Result<_>>()?,
        })
    }

    fn intended_output(&self, ctx: &BundlerContext, extra: &RpmContext) -> BundleStructure {
        BundleStructure {
            root: ctx.directories.output.join(format!(
                "{}-{}-{}.{}.rpm",
                extra.name, ctx.app.version, extra.release, extra.arch
            )),
            executable: None,
            manifest: None,
            artifacts: Vec::new(),
        }
    }

    async fn bundle(&self, ctx: &BundlerContext, extra: &RpmContext) -> Result<BundleStructure> {
        let structure = self.intended_output(ctx, extra);
        log::info!("Building RPM package for {}", ctx.app_name);

        let staging = Self::staging_dir(ctx);
        fs::create_dir_all(&staging, true).await?;
        let layout = LinuxLayout::new(ctx, &staging);
        let entry = DesktopEntry::for_app(ctx, Some(&extra.summary), &ctx.executable_name());
        populate(ctx, &layout, &entry, &format!("/usr/bin/{}", ctx.executable_name())).await?;

        write_package(ctx, extra, staging.clone(), structure.root.clone()).await?;
        fs::remove_path(&staging).await?;

        log::info!("✓ Created RPM: {}", structure.root.display());
        Ok(structure)
    }
}

#[cfg(target_os = "linux")]
async fn write_package(
    ctx: &BundlerContext,
    extra: &RpmContext,
    staging: PathBuf,
    output: PathBuf,
) -> Result<()> {
    use crate::bundler::error::ErrorExt;

    let executable = ctx.executable_name();
    let version = ctx.app.version.clone();
    let extra = extra.clone();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut builder = rpm::PackageBuilder::new(
            &extra.name,
            &version,
            &extra.license,
            extra.arch,
            &extra.summary,
        )
        .using_config(rpm::BuildConfig::default().compression(rpm::CompressionType::Gzip))
        .release(&extra.release);

        if let Some(url) = &extra.url {
            builder = builder.url(url);
        }
        if let Some(vendor) = &extra.vendor {
            builder = builder.vendor(vendor);
        }

        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(&staging)
            .into_iter()
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect();
        files.sort();

        for file in files {
            let relative = file.strip_prefix(&staging)?;
            let destination = format!("/{}", relative.display());
            let mode: u16 = if relative.starts_with("usr/bin") && relative.ends_with(&executable) {
                0o100755
            } else {
                0o100644
            };
            builder = builder.with_file(
                &file,
                rpm::FileOptions::new(destination).mode(rpm::FileMode::from(mode)),
            )?;
        }

        for requirement in &extra.requirements {
            builder = builder.requires(dependency(requirement));
        }

        let package = builder.build()?;
        let mut out = std::fs::File::create(&output).fs_context("creating RPM", &output)?;
        package.write(&mut out)?;
        Ok(())
    })
    .await
    .map_err(|e| Error::GenericError(format!("RPM task panicked: {e}")))?
}

#[cfg(not(target_os = "linux"))]
async fn write_package(
    _ctx: &BundlerContext,
    _extra: &RpmContext,
    _staging: PathBuf,
    _output: PathBuf,
) -> Result<()> {
    Err(Error::GenericError(
        "RPM packages can only be built on linux hosts".to_string(),
    ))
}

#[cfg(target_os = "linux")]
fn dependency(requirement: &Requirement) -> rpm::Dependency {
    let name = requirement.name.as_str();
    match &requirement.version {
        None => rpm::Dependency::any(name),
        Some((Comparison::Less, version)) => rpm::Dependency::less(name, version),
        Some((Comparison::LessEqual, version)) => rpm::Dependency::less_eq(name, version),
        Some((Comparison::Equal, version)) => rpm::Dependency::eq(name, version),
        Some((Comparison::GreaterEqual, version)) => rpm::Dependency::greater_eq(name, version),
        Some((Comparison::Greater, version)) => rpm::Dependency::greater(name, version),
    }
}
