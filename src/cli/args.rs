//! Command line argument parsing and validation.
//!
//! This module provides the clap definitions for `bundle`, `run` and
//! `migrate`, and turns them into the requests the pipeline understands.

use crate::bundler::{
    BundleRequest,
    codesign::CodesignOptions,
    platform::BundlerChoice,
    runner::LaunchOptions,
    target::{Arch, BuildConfiguration, Platform},
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Configuration-driven app bundler
#[derive(Parser, Debug)]
#[command(
    name = "kodegen_bundler_app",
    version,
    about = "Builds cargo executables into platform-native app bundles",
    long_about = "Builds a cargo executable and its declared dependencies, then packages it for the \
resolved device: .app bundles, linux directories, AppImage, RPM, Windows folders or NSIS installers.

Apps are described in Bundler.toml at the package root.

Usage:
  kodegen_bundler_app bundle
  kodegen_bundler_app bundle HelloWorld --bundler linuxAppImage --configuration release
  kodegen_bundler_app run --simulator \"iPhone 15\"
  kodegen_bundler_app migrate --directory path/to/package"
)]
pub struct Args {
    /// Print debug logs and the full cause chain of errors
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build and package an app
    Bundle(BundleArgs),
    /// Build, package and launch an app
    Run(RunArgs),
    /// Rewrite an older configuration file in the current format
    Migrate(MigrateArgs),
}

/// Options shared by `bundle` and `run`.
#[derive(clap::Args, Debug, Clone)]
pub struct BundleArgs {
    /// App to bundle; may be omitted when the package declares one app
    #[arg(value_name = "APP")]
    pub app: Option<String>,

    /// Package root containing Cargo.toml and Bundler.toml
    #[arg(
        short = 'd',
        long,
        value_name = "DIR",
        env = "KODEGEN_BUNDLER_DIRECTORY",
        default_value = "."
    )]
    pub directory: PathBuf,

    /// Target platform (macOS, iOS, iOSSimulator, linux, windows, ...)
    #[arg(short, long, value_name = "PLATFORM")]
    pub platform: Option<Platform>,

    /// Device name or identifier
    #[arg(long, value_name = "DEVICE", conflicts_with = "simulator")]
    pub device: Option<String>,

    /// Simulator search term
    #[arg(long, value_name = "SEARCH")]
    pub simulator: Option<String>,

    /// Bundler backend (darwinApp, linuxGeneric, linuxAppImage, linuxRPM, windowsGeneric, windowsInstaller)
    #[arg(short, long, value_name = "BUNDLER")]
    pub bundler: Option<BundlerChoice>,

    /// Build configuration
    #[arg(short, long, value_enum, default_value_t = BuildConfiguration::Debug)]
    pub configuration: BuildConfiguration,

    /// Architecture to build for; repeat for several
    #[arg(long = "arch", value_name = "ARCH")]
    pub architectures: Vec<Arch>,

    /// Build for every architecture of the platform and merge the results
    #[arg(long, conflicts_with = "architectures")]
    pub universal: bool,

    /// Directory the bundle is written to
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Directory for intermediate build files
    #[arg(long, value_name = "DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Directory the built products are placed in
    #[arg(long, value_name = "DIR")]
    pub products_dir: Option<PathBuf>,

    /// Force codesigning on
    #[arg(long, overrides_with = "no_codesign")]
    pub codesign: bool,

    /// Force codesigning off
    #[arg(long, overrides_with = "codesign")]
    pub no_codesign: bool,

    /// Codesigning identity (hash, name substring, or "-" for ad-hoc)
    #[arg(long, value_name = "IDENTITY")]
    pub identity: Option<String>,

    /// Entitlements plist
    #[arg(long, value_name = "PATH")]
    pub entitlements: Option<PathBuf>,

    /// Provisioning profile embedded into device builds
    #[arg(long, value_name = "PATH")]
    pub provisioning_profile: Option<PathBuf>,

    /// Reuse existing build products instead of building
    #[arg(long)]
    pub skip_build: bool,

    /// Strip the executable after extracting debug information
    #[arg(long)]
    pub strip: bool,

    /// Build with xcodebuild (Apple platforms only)
    #[arg(long, overrides_with = "no_xcodebuild")]
    pub xcodebuild: bool,

    /// Build with cargo even when an Xcode project exists
    #[arg(long, overrides_with = "xcodebuild")]
    pub no_xcodebuild: bool,

    /// Copy the finished bundle into this directory
    #[arg(long, value_name = "DIR")]
    pub copy_out: Option<PathBuf>,

    /// Resolve everything and report the intended output without building
    #[arg(long, hide = true)]
    pub dry_run: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub bundle: BundleArgs,

    /// Hot-reload server address passed to the app (debug builds only)
    #[arg(long, value_name = "ADDR:PORT")]
    pub hot_reload: Option<String>,

    /// Arguments passed to the app
    #[arg(last = true, value_name = "ARGS")]
    pub arguments: Vec<String>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct MigrateArgs {
    /// Package root containing the configuration file
    #[arg(
        short = 'd',
        long,
        value_name = "DIR",
        env = "KODEGEN_BUNDLER_DIRECTORY",
        default_value = "."
    )]
    pub directory: PathBuf,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

fn tri_state(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

impl BundleArgs {
    /// Validate arguments for consistency.
    ///
    /// Platform-dependent rules are checked by the pipeline once the device
    /// is known.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(app) = &self.app
            && app.trim().is_empty()
        {
            return Err("App name cannot be empty".to_string());
        }
        if self.identity.is_some() && self.no_codesign {
            return Err("--identity cannot be combined with --no-codesign".to_string());
        }
        Ok(())
    }

    /// The pipeline request these arguments describe.
    pub fn to_request(&self) -> BundleRequest {
        BundleRequest {
            app: self.app.clone(),
            directory: self.directory.clone(),
            platform: self.platform,
            device: self.device.clone(),
            simulator: self.simulator.clone(),
            bundler: self.bundler,
            configuration: self.configuration,
            architectures: self.architectures.clone(),
            universal: self.universal,
            output_dir: self.output_dir.clone(),
            scratch_dir: self.scratch_dir.clone(),
            products_dir: self.products_dir.clone(),
            codesign: CodesignOptions {
                should_codesign: tri_state(self.codesign, self.no_codesign),
                identity: self.identity.clone(),
                entitlements: self.entitlements.clone(),
                provisioning_profile: self.provisioning_profile.clone(),
            },
            skip_build: self.skip_build,
            strip: self.strip,
            xcodebuild: tri_state(self.xcodebuild, self.no_xcodebuild),
            copy_out: self.copy_out.clone(),
            dry_run: self.dry_run,
            hot_reload: None,
        }
    }
}

impl RunArgs {
    /// The bundling request; with `--skip-build` only the existing bundle is located.
    pub fn to_request(&self) -> BundleRequest {
        let mut request = self.bundle.to_request();
        request.hot_reload = self.hot_reload.clone();
        if request.skip_build {
            request.dry_run = true;
        }
        request
    }

    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            hot_reload: self.hot_reload.clone(),
            arguments: self.arguments.clone(),
        }
    }
}

/// Configuration derived from command line arguments
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Output manager for colored terminal output
    output: super::OutputManager,
}

impl From<&Args> for RuntimeConfig {
    fn from(args: &Args) -> Self {
        Self {
            output: super::OutputManager::new(args.verbose, false),
        }
    }
}

impl RuntimeConfig {
    /// Get a reference to the output manager
    pub fn output(&self) -> &super::OutputManager {
        &self.output
    }

    pub fn is_verbose(&self) -> bool {
        self.output.is_verbose()
    }

    /// Print verbose message if in verbose mode
    pub fn verbose_println(&self, message: &str) -> std::io::Result<()> {
        self.output.verbose(message)
    }

    pub fn success(&self, message: &str) -> std::io::Result<()> {
        self.output.success(message)
    }

    pub fn warn(&self, message: &str) -> std::io::Result<()> {
        self.output.warn(message)
    }

    pub fn error(&self, message: &str) -> std::io::Result<()> {
        self.output.error(message)
    }

    /// Print progress message
    pub fn progress(&self, message: &str) -> std::io::Result<()> {
        self.output.progress(message)
    }

    /// Print section header
    pub fn section(&self, title: &str) -> std::io::Result<()> {
        self.output.section(title)
    }

    /// Print indented text
    pub fn indent(&self, message: &str) -> std::io::Result<()> {
        self.output.indent(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("kodegen_bundler_app").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn command_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn bundle_flags_map_onto_the_request() {
        let args = parse(&[
            "bundle",
            "Hello",
            "--directory",
            "pkg",
            "--platform",
            "linux",
            "--bundler",
            "linuxRPM",
            "--configuration",
            "release",
            "--arch",
            "x86_64",
            "--arch",
            "arm64",
            "--no-codesign",
            "--strip",
            "--copy-out",
            "dist",
        ]);
        let Command::Bundle(bundle) = args.command else {
            panic!("expected bundle");
        };
        let request = bundle.to_request();

        assert_eq!(request.app.as_deref(), Some("Hello"));
        assert_eq!(request.directory, PathBuf::from("pkg"));
        assert_eq!(request.platform, Some(Platform::Linux));
        assert_eq!(request.bundler, Some(BundlerChoice::LinuxRpm));
        assert_eq!(request.configuration, BuildConfiguration::Release);
        assert_eq!(request.architectures, vec![Arch::X86_64, Arch::AArch64]);
        assert_eq!(request.codesign.should_codesign, Some(false));
        assert_eq!(request.xcodebuild, None);
        assert!(request.strip);
        assert_eq!(request.copy_out, Some(PathBuf::from("dist")));
        assert!(!request.dry_run);
    }

    #[test]
    fn universal_conflicts_with_explicit_architectures() {
        let result = Args::try_parse_from([
            "kodegen_bundler_app",
            "bundle",
            "--universal",
            "--arch",
            "x86_64",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_bundler_is_rejected() {
        let result =
            Args::try_parse_from(["kodegen_bundler_app", "bundle", "--bundler", "linuxDeb"]);
        assert!(result.is_err());
    }

    #[test]
    fn run_with_skip_build_only_locates_the_bundle() {
        let args = parse(&[
            "run",
            "--skip-build",
            "--hot-reload",
            "127.0.0.1:4000",
            "--",
            "--flag",
            "value",
        ]);
        let Command::Run(run) = args.command else {
            panic!("expected run");
        };
        let request = run.to_request();
        assert!(request.dry_run);
        assert_eq!(request.hot_reload.as_deref(), Some("127.0.0.1:4000"));
        assert_eq!(run.launch_options().arguments, vec!["--flag", "value"]);
    }

    #[test]
    fn identity_requires_codesigning() {
        let args = parse(&["bundle", "--identity", "-", "--no-codesign"]);
        let Command::Bundle(bundle) = args.command else {
            panic!("expected bundle");
        };
        assert!(bundle.validate().is_err());
    }
}
