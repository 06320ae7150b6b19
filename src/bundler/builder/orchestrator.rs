//! Main bundler orchestration and coordination.
//!
//! [`Bundler::bundle`] runs the pipeline stages strictly in order; the first
//! failure aborts everything after it. Build-side failures are tagged with the
//! [`Stage`] they happened in.

use super::{
    checksum::calculate_sha256,
    dependencies::{build_cargo_product, build_dependencies, install_dependencies},
};
use crate::bundler::{
    BundlerContext, Error, Result,
    codesign::{CodesignOptions, resolve_codesigning},
    context::Directories,
    device::{DeviceError, resolve_device},
    embed::{embed_metadata, embeds_in_executable},
    error::{ErrorExt, Stage, StageExt},
    platform::{BackendPlan, BundleStructure, BundlerChoice},
    target::{Arch, BuildConfiguration, Platform},
    toolchain::{CargoTarget, SystemToolchain, Toolchain, XcodeBuild},
    utils::fs,
};
use crate::config::{ResolutionContext, ResolvedAppCache};
use crate::metadata::load_manifest;
use path_absolutize::Absolutize;
use std::path::{Path, PathBuf};

/// Everything a bundling run is asked to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundleRequest {
    /// App to bundle; `None` selects the only app.
    pub app: Option<String>,
    /// Package root.
    pub directory: PathBuf,
    pub platform: Option<Platform>,
    /// `--device` selector.
    pub device: Option<String>,
    /// `--simulator` search term.
    pub simulator: Option<String>,
    pub bundler: Option<BundlerChoice>,
    pub configuration: BuildConfiguration,
    /// Explicit `--arch` values.
    pub architectures: Vec<Arch>,
    pub universal: bool,
    pub output_dir: Option<PathBuf>,
    pub scratch_dir: Option<PathBuf>,
    pub products_dir: Option<PathBuf>,
    pub codesign: CodesignOptions,
    pub skip_build: bool,
    pub strip: bool,
    /// `--xcodebuild` / `--no-xcodebuild`; `None` picks by platform.
    pub xcodebuild: Option<bool>,
    /// Directory the finished bundle is copied into.
    pub copy_out: Option<PathBuf>,
    pub dry_run: bool,
    /// Hot-reload server address; debug builds only.
    pub hot_reload: Option<String>,
}

impl BundleRequest {
    /// A request with every option at its default.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            app: None,
            directory: directory.into(),
            platform: None,
            device: None,
            simulator: None,
            bundler: None,
            configuration: BuildConfiguration::Debug,
            architectures: Vec::new(),
            universal: false,
            output_dir: None,
            scratch_dir: None,
            products_dir: None,
            codesign: CodesignOptions::default(),
            skip_build: false,
            strip: false,
            xcodebuild: None,
            copy_out: None,
            dry_run: false,
            hot_reload: None,
        }
    }
}

/// Outcome of a run.
#[derive(Clone, Debug)]
pub struct BundleReport {
    /// Final state of the run.
    pub context: BundlerContext,
    /// What the backend produced, or would produce for a dry run.
    pub structure: BundleStructure,
    /// Where `--copy-out` put the bundle.
    pub copied_to: Option<PathBuf>,
    /// SHA-256 of the bundle; `None` for dry runs.
    pub checksum: Option<String>,
    pub dry_run: bool,
}

/// Main bundler orchestrator.
///
/// Holds the [`Toolchain`] every stage talks to and, on macOS, the temporary
/// keychain an `APPLE_CERTIFICATE` was imported into. The keychain lives as
/// long as the bundler so the imported identity stays usable for signing.
pub struct Bundler<T: Toolchain = SystemToolchain> {
    toolchain: T,
    #[cfg(target_os = "macos")]
    _temp_keychain: Option<kodegen_bundler_sign::macos::TempKeychain>,
}

impl<T: Toolchain + std::fmt::Debug> std::fmt::Debug for Bundler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug_struct = f.debug_struct("Bundler");
        debug_struct.field("toolchain", &self.toolchain);
        #[cfg(target_os = "macos")]
        debug_struct.field(
            "_temp_keychain",
            &self._temp_keychain.as_ref().map(|_| "<TempKeychain>"),
        );
        debug_struct.finish()
    }
}

impl Bundler<SystemToolchain> {
    /// Creates a bundler driving the tools installed on this machine.
    pub async fn new() -> Result<Self> {
        #[cfg(target_os = "macos")]
        let _temp_keychain = super::signing::setup_macos_signing().await?;

        Ok(Self {
            toolchain: SystemToolchain,
            #[cfg(target_os = "macos")]
            _temp_keychain,
        })
    }
}

impl<T: Toolchain> Bundler<T> {
    /// Creates a bundler on top of `toolchain`.
    pub fn with_toolchain(toolchain: T) -> Self {
        Self {
            toolchain,
            #[cfg(target_os = "macos")]
            _temp_keychain: None,
        }
    }

    /// The toolchain stages run against.
    pub fn toolchain(&self) -> &T {
        &self.toolchain
    }

    fn imported_identity(&self) -> Option<&str> {
        #[cfg(target_os = "macos")]
        {
            self._temp_keychain.as_ref().map(|k| k.signing_identity())
        }
        #[cfg(not(target_os = "macos"))]
        {
            None
        }
    }

    /// Runs the pipeline for `request`.
    ///
    /// The configuration is resolved through `cache`, so a later run in the
    /// same invocation (the `run` command) reuses it.
    pub async fn bundle(
        &self,
        request: &BundleRequest,
        cache: &mut ResolvedAppCache,
    ) -> Result<BundleReport> {
        let package_dir = request
            .directory
            .absolutize()
            .fs_context("resolving package directory", &request.directory)?
            .to_path_buf();

        // Device, and with it the platform of the run.
        let device = resolve_device(
            &self.toolchain,
            request.platform,
            request.device.as_deref(),
            request.simulator.as_deref(),
        )
        .await?;
        let platform = device.platform();
        log::info!("Target device: {}", device);

        // Bundler and configuration.
        let bundler = request
            .bundler
            .unwrap_or_else(|| BundlerChoice::default_for(platform));
        let resolved = cache
            .resolve(
                &package_dir,
                ResolutionContext { platform, bundler },
                request.app.as_deref(),
            )
            .await?
            .clone();

        let architectures = self.validate(request, platform, bundler)?;

        let codesigning = resolve_codesigning(
            &self.toolchain,
            platform,
            &request.codesign,
            self.imported_identity(),
        )
        .await?;

        let manifest = load_manifest(&package_dir.join("Cargo.toml"))?;
        if !manifest.has_binary(&resolved.app.product) {
            return Err(Error::InvalidArguments(format!(
                "product '{}' of app '{}' is not a binary target of {} (binaries: {})",
                resolved.app.product,
                resolved.name,
                manifest.metadata.name,
                manifest.binaries.join(", ")
            )));
        }

        let directories =
            derive_directories(request, &package_dir, platform, &architectures)?;
        let mut ctx = BundlerContext::new(
            resolved.name.clone(),
            manifest.metadata.name.clone(),
            resolved.app.clone(),
            directories,
            device,
            bundler,
            architectures,
            request.configuration,
        );
        ctx.attach_codesigning(codesigning)?;
        let plan = BackendPlan::compute(bundler, &ctx, request, &manifest)?;
        let intended = plan.intended_output(&ctx);
        check_output_paths(&ctx, &intended)?;

        if request.dry_run {
            log::info!("Dry run: {} would be written", intended.root.display());
            return Ok(BundleReport {
                context: ctx,
                structure: intended,
                copied_to: None,
                checksum: None,
                dry_run: true,
            });
        }

        let built = build_dependencies(
            &self.toolchain,
            &ctx,
            &resolved.projects,
            &manifest,
            request.skip_build,
        )
        .await
        .stage(Stage::DependencyBuild)?;

        install_dependencies(&mut ctx, built)
            .await
            .stage(Stage::DependencyCopy)?;

        self.build_main_product(request, &ctx)
            .await
            .stage(Stage::MainBuild)?;

        self.process_debug_info(request, &mut ctx)
            .await
            .stage(Stage::DebugInfo)?;

        if embeds_in_executable(ctx.platform()) {
            embed_metadata(&ctx.executable(), &ctx.app)
                .await
                .stage(Stage::MetadataEmbedding)?;
        }

        remove_stale_outputs(&ctx, &intended)
            .await
            .stage(Stage::OutputCleanup)?;

        let structure = plan.bundle(&ctx).await.stage(Stage::Packaging)?;
        if structure != intended {
            return Err(Error::Stage {
                stage: Stage::Packaging,
                source: Box::new(Error::GenericError(format!(
                    "{} produced {} but announced {}",
                    bundler,
                    structure.root.display(),
                    intended.root.display()
                ))),
            });
        }
        let checksum = calculate_sha256(&structure.root)
            .await
            .stage(Stage::Packaging)?;

        let copied_to = match &request.copy_out {
            Some(dir) => Some(copy_out(&structure, dir).await.stage(Stage::CopyOut)?),
            None => None,
        };

        log::info!("✓ Bundled {} ({})", ctx.app_name, structure.root.display());
        Ok(BundleReport {
            context: ctx,
            structure,
            copied_to,
            checksum: Some(checksum),
            dry_run: false,
        })
    }

    /// Checks the request against the resolved platform and bundler; returns
    /// the architectures to build.
    fn validate(
        &self,
        request: &BundleRequest,
        platform: Platform,
        bundler: BundlerChoice,
    ) -> Result<Vec<Arch>> {
        let host = self
            .toolchain
            .host_platform()
            .ok_or(DeviceError::UnsupportedHost)?;

        if !bundler.supported_hosts().contains(&host) {
            return Err(Error::InvalidArguments(format!(
                "{bundler} cannot run on {host}"
            )));
        }
        if !bundler.supported_targets().contains(&platform) {
            return Err(Error::InvalidArguments(format!(
                "{bundler} cannot bundle for {platform}"
            )));
        }
        if request.xcodebuild == Some(true) && !platform.is_apple() {
            return Err(Error::InvalidArguments(format!(
                "--xcodebuild is only available for Apple platforms, not {platform}"
            )));
        }
        if request.hot_reload.is_some() && request.configuration != BuildConfiguration::Debug {
            return Err(Error::InvalidArguments(
                "hot reloading is only available for debug builds".to_string(),
            ));
        }

        let supported = platform.supported_architectures();
        if request.universal {
            if !platform.supports_universal() {
                return Err(Error::InvalidArguments(format!(
                    "--universal is only available for macOS and macCatalyst, not {platform}"
                )));
            }
            if !request.architectures.is_empty() {
                return Err(Error::InvalidArguments(
                    "--universal cannot be combined with --arch".to_string(),
                ));
            }
            return Ok(supported.to_vec());
        }

        if request.architectures.is_empty() {
            let arch = Arch::host()
                .filter(|arch| supported.contains(arch))
                .or_else(|| supported.first().copied())
                .ok_or_else(|| Error::ArchError(format!("{platform} has no architectures")))?;
            return Ok(vec![arch]);
        }

        let mut architectures = Vec::with_capacity(request.architectures.len());
        for arch in &request.architectures {
            if !supported.contains(arch) {
                return Err(Error::ArchError(format!("{arch} is not supported on {platform}")));
            }
            if !architectures.contains(arch) {
                architectures.push(*arch);
            }
        }
        if architectures.len() > 1 && !platform.supports_universal() {
            return Err(Error::ArchError(format!(
                "{platform} builds hold exactly one architecture"
            )));
        }
        Ok(architectures)
    }

    async fn build_main_product(&self, request: &BundleRequest, ctx: &BundlerContext) -> Result<()> {
        let executable = ctx.executable();
        let use_xcodebuild = request
            .xcodebuild
            .unwrap_or_else(|| ctx.platform().defaults_to_xcodebuild());

        if use_xcodebuild {
            if request.skip_build {
                log::info!("Skipping xcodebuild (--skip-build)");
            } else {
                log::info!("Building {} with xcodebuild", ctx.app.product);
                self.toolchain
                    .xcodebuild(&XcodeBuild {
                        project_dir: ctx.directories.package.clone(),
                        scheme: ctx.app.product.clone(),
                        configuration: ctx.configuration,
                        platform: ctx.platform(),
                        derived_data: ctx.directories.scratch.join("xcodebuild"),
                        products_dir: ctx.directories.products.clone(),
                        output: executable.clone(),
                    })
                    .await?;
            }
        } else {
            log::info!("Building {} ({})", ctx.app.product, ctx.configuration);
            build_cargo_product(
                &self.toolchain,
                ctx,
                CargoTarget::Bin(ctx.app.product.clone()),
                &ctx.executable_name(),
                request.skip_build,
            )
            .await?;
        }

        if !executable.is_file() {
            return Err(Error::MissingArtifact {
                description: format!("executable of app '{}'", ctx.app_name),
                path: executable,
            });
        }
        log::info!("✓ Built {}", executable.display());
        Ok(())
    }

    async fn process_debug_info(&self, request: &BundleRequest, ctx: &mut BundlerContext) -> Result<()> {
        if request.skip_build {
            log::debug!("Leaving debug information untouched (--skip-build)");
            return Ok(());
        }

        let executable = ctx.executable();
        if let Some(debug_info) = self
            .toolchain
            .extract_debug_info(ctx.platform(), &executable)
            .await?
        {
            log::debug!("Debug information written to {}", debug_info.display());
            ctx.record_debug_info(debug_info)?;
        }
        if request.strip {
            self.toolchain.strip(ctx.platform(), &executable).await?;
        }
        Ok(())
    }
}

/// Directory layout of the run.
fn derive_directories(
    request: &BundleRequest,
    package_dir: &Path,
    platform: Platform,
    architectures: &[Arch],
) -> Result<Directories> {
    let absolute = |path: &PathBuf| -> Result<PathBuf> {
        Ok(path
            .absolutize_from(package_dir)
            .fs_context("resolving directory", path)?
            .to_path_buf())
    };

    let scratch = match &request.scratch_dir {
        Some(dir) => absolute(dir)?,
        None => package_dir.join("target"),
    };
    let configuration = request.configuration.directory_name();
    let products = match (&request.products_dir, architectures) {
        (Some(dir), _) => absolute(dir)?,
        (None, [arch]) => scratch
            .join(platform.rust_target(*arch)?)
            .join(configuration),
        (None, _) => scratch
            .join("universal")
            .join(platform.as_str())
            .join(configuration),
    };
    let output = match &request.output_dir {
        Some(dir) => absolute(dir)?,
        None => scratch.join("bundler"),
    };

    Ok(Directories {
        package: package_dir.to_path_buf(),
        dependencies: scratch.join("bundler").join("projects"),
        scratch,
        products,
        output,
    })
}

/// Removes what a previous run left at the paths the backend is about to write.
///
/// The dependency scratch directory is never removed, even when an output path
/// would contain it.
/// Rejects bundles whose outputs would replace the project build directory.
fn check_output_paths(ctx: &BundlerContext, intended: &BundleStructure) -> Result<()> {
    let dependencies = &ctx.directories.dependencies;
    match intended
        .output_paths()
        .find(|path| dependencies.starts_with(path))
    {
        Some(path) => Err(Error::InvalidArguments(format!(
            "{} would overwrite the project build directory {}; rename app '{}'",
            path.display(),
            dependencies.display(),
            ctx.app_name
        ))),
        None => Ok(()),
    }
}

async fn remove_stale_outputs(ctx: &BundlerContext, intended: &BundleStructure) -> Result<()> {
    tokio::fs::create_dir_all(&ctx.directories.output)
        .await
        .fs_context("creating output directory", &ctx.directories.output)?;

    for path in intended.output_paths() {
        if path.exists() || path.is_symlink() {
            log::debug!("Removing stale {}", path.display());
            fs::remove_path(path).await?;
        }
    }
    Ok(())
}

async fn copy_out(structure: &BundleStructure, dir: &Path) -> Result<PathBuf> {
    let name = structure.root.file_name().ok_or_else(|| {
        Error::GenericError(format!("bundle {} has no file name", structure.root.display()))
    })?;
    let destination = dir.join(name);
    fs::copy_path(&structure.root, &destination).await?;
    log::info!("✓ Copied bundle to {}", destination.display());
    Ok(destination)
}
