//! Bundler backends.
//!
//! Each backend turns the built executable plus the flattened app into one
//! platform-native distributable. The set of backends is closed:
//! [`BundlerChoice`] names them, [`BackendPlan`] holds the context one of them
//! computed, and every dispatch goes through a single `match` on that plan.
//!
//! # Module Organization
//!
//! - [`macos`] - `.app` bundles for every Apple platform
//! - [`linux`] - generic tarball, AppImage and RPM
//! - [`windows`] - plain directory and NSIS installer

pub mod linux;
pub mod macos;
pub mod windows;

use super::{BundleRequest, BundlerContext, Result, target::Platform};
use crate::metadata::CargoManifest;
use std::{
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Closed set of bundler backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BundlerChoice {
    /// `.app` bundle.
    DarwinApp,
    /// Directory layout plus `.tar.gz`.
    LinuxGeneric,
    /// `.AppImage` built with linuxdeploy.
    LinuxAppImage,
    /// `.rpm` package.
    LinuxRpm,
    /// Directory with the executable and its side-by-side manifest.
    WindowsGeneric,
    /// NSIS `-setup.exe` installer.
    WindowsInstaller,
}

impl BundlerChoice {
    /// Every backend, in declaration order.
    pub const ALL: [BundlerChoice; 6] = [
        BundlerChoice::DarwinApp,
        BundlerChoice::LinuxGeneric,
        BundlerChoice::LinuxAppImage,
        BundlerChoice::LinuxRpm,
        BundlerChoice::WindowsGeneric,
        BundlerChoice::WindowsInstaller,
    ];

    /// Identifier used on the command line and in `bundler(...)` conditions.
    pub fn as_str(self) -> &'static str {
        match self {
            BundlerChoice::DarwinApp => "darwinApp",
            BundlerChoice::LinuxGeneric => "linuxGeneric",
            BundlerChoice::LinuxAppImage => "linuxAppImage",
            BundlerChoice::LinuxRpm => "linuxRPM",
            BundlerChoice::WindowsGeneric => "windowsGeneric",
            BundlerChoice::WindowsInstaller => "windowsInstaller",
        }
    }

    /// Host platforms the backend can run on.
    pub fn supported_hosts(self) -> &'static [Platform] {
        match self {
            BundlerChoice::DarwinApp => &[Platform::MacOs],
            BundlerChoice::LinuxGeneric | BundlerChoice::LinuxAppImage | BundlerChoice::LinuxRpm => {
                &[Platform::Linux]
            }
            BundlerChoice::WindowsGeneric => &[Platform::Windows],
            BundlerChoice::WindowsInstaller => {
                &[Platform::Linux, Platform::MacOs, Platform::Windows]
            }
        }
    }

    /// Target platforms the backend can produce bundles for.
    pub fn supported_targets(self) -> &'static [Platform] {
        match self {
            BundlerChoice::DarwinApp => &[
                Platform::MacOs,
                Platform::MacCatalyst,
                Platform::IOs,
                Platform::IOsSimulator,
                Platform::TvOs,
                Platform::TvOsSimulator,
                Platform::VisionOs,
                Platform::VisionOsSimulator,
            ],
            BundlerChoice::LinuxGeneric | BundlerChoice::LinuxAppImage | BundlerChoice::LinuxRpm => {
                &[Platform::Linux]
            }
            BundlerChoice::WindowsGeneric | BundlerChoice::WindowsInstaller => {
                &[Platform::Windows]
            }
        }
    }

    /// Whether the output can be launched by the `run` command.
    pub fn is_runnable(self) -> bool {
        !matches!(self, BundlerChoice::LinuxRpm | BundlerChoice::WindowsInstaller)
    }

    /// Backend used for `platform` when `--bundler` is not given.
    pub fn default_for(platform: Platform) -> Self {
        match platform {
            Platform::Linux => BundlerChoice::LinuxGeneric,
            Platform::Windows => BundlerChoice::WindowsGeneric,
            _ => BundlerChoice::DarwinApp,
        }
    }
}

impl Display for BundlerChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BundlerChoice {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        BundlerChoice::ALL
            .into_iter()
            .find(|choice| choice.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let known: Vec<&str> = BundlerChoice::ALL.iter().map(|c| c.as_str()).collect();
                format!("unknown bundler '{s}' (expected one of: {})", known.join(", "))
            })
    }
}

/// What a backend produced, or would produce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundleStructure {
    /// The bundle itself (directory or file) inside the output directory.
    pub root: PathBuf,
    /// Executable inside the bundle, for runnable bundles.
    pub executable: Option<PathBuf>,
    /// Platform metadata manifest inside the bundle.
    pub manifest: Option<PathBuf>,
    /// Further files written next to `root` (archives, debug info, scripts).
    pub artifacts: Vec<PathBuf>,
}

impl BundleStructure {
    /// Top-level paths the backend owns in the output directory.
    pub fn output_paths(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.root.as_path()).chain(self.artifacts.iter().map(PathBuf::as_path))
    }
}

/// One bundler backend.
#[allow(async_fn_in_trait)]
pub trait Backend {
    /// Backend-specific facts derived before anything is built.
    type Context;

    /// Derives the backend context; must not touch the filesystem.
    fn compute_context(
        &self,
        ctx: &BundlerContext,
        request: &BundleRequest,
        manifest: &CargoManifest,
    ) -> Result<Self::Context>;

    /// The structure [`Backend::bundle`] will report; pure.
    fn intended_output(&self, ctx: &BundlerContext, extra: &Self::Context) -> BundleStructure;

    /// Produces the bundle.
    async fn bundle(&self, ctx: &BundlerContext, extra: &Self::Context) -> Result<BundleStructure>;
}

/// A backend together with the context it computed.
#[derive(Clone, Debug)]
pub enum BackendPlan {
    DarwinApp(macos::app::DarwinAppContext),
    LinuxGeneric(linux::generic::LinuxGenericContext),
    LinuxAppImage(linux::appimage::AppImageContext),
    LinuxRpm(linux::rpm::RpmContext),
    WindowsGeneric(windows::generic::WindowsGenericContext),
    WindowsInstaller(windows::nsis::NsisContext),
}

impl BackendPlan {
    /// Computes the context of the backend `choice`.
    pub fn compute(
        choice: BundlerChoice,
        ctx: &BundlerContext,
        request: &BundleRequest,
        manifest: &CargoManifest,
    ) -> Result<Self> {
        Ok(match choice {
            BundlerChoice::DarwinApp => {
                Self::DarwinApp(macos::app::DarwinAppBackend.compute_context(ctx, request, manifest)?)
            }
            BundlerChoice::LinuxGeneric => Self::LinuxGeneric(
                linux::generic::LinuxGenericBackend.compute_context(ctx, request, manifest)?,
            ),
            BundlerChoice::LinuxAppImage => Self::LinuxAppImage(
                linux::appimage::AppImageBackend.compute_context(ctx, request, manifest)?,
            ),
            BundlerChoice::LinuxRpm => {
                Self::LinuxRpm(linux::rpm::RpmBackend.compute_context(ctx, request, manifest)?)
            }
            BundlerChoice::WindowsGeneric => Self::WindowsGeneric(
                windows::generic::WindowsGenericBackend.compute_context(ctx, request, manifest)?,
            ),
            BundlerChoice::WindowsInstaller => Self::WindowsInstaller(
                windows::nsis::NsisBackend.compute_context(ctx, request, manifest)?,
            ),
        })
    }

    /// Backend this plan belongs to.
    pub fn choice(&self) -> BundlerChoice {
        match self {
            Self::DarwinApp(_) => BundlerChoice::DarwinApp,
            Self::LinuxGeneric(_) => BundlerChoice::LinuxGeneric,
            Self::LinuxAppImage(_) => BundlerChoice::LinuxAppImage,
            Self::LinuxRpm(_) => BundlerChoice::LinuxRpm,
            Self::WindowsGeneric(_) => BundlerChoice::WindowsGeneric,
            Self::WindowsInstaller(_) => BundlerChoice::WindowsInstaller,
        }
    }

    /// See [`Backend::intended_output`].
    pub fn intended_output(&self, ctx: &BundlerContext) -> BundleStructure {
        match self {
            Self::DarwinApp(extra) => macos::app::DarwinAppBackend.intended_output(ctx, extra),
            Self::LinuxGeneric(extra) => {
                linux::generic::LinuxGenericBackend.intended_output(ctx, extra)
            }
            Self::LinuxAppImage(extra) => linux::appimage::AppImageBackend.intended_output(ctx, extra),
            Self::LinuxRpm(extra) => linux::rpm::RpmBackend.intended_output(ctx, extra),
            Self::WindowsGeneric(extra) => {
                windows::generic::WindowsGenericBackend.intended_output(ctx, extra)
            }
            Self::WindowsInstaller(extra) => windows::nsis::NsisBackend.intended_output(ctx, extra),
        }
    }

    /// See [`Backend::bundle`].
    pub async fn bundle(&self, ctx: &BundlerContext) -> Result<BundleStructure> {
        match self {
            Self::DarwinApp(extra) => macos::app::DarwinAppBackend.bundle(ctx, extra).await,
            Self::LinuxGeneric(extra) => linux::generic::LinuxGenericBackend.bundle(ctx, extra).await,
            Self::LinuxAppImage(extra) => linux::appimage::AppImageBackend.bundle(ctx, extra).await,
            Self::LinuxRpm(extra) => linux::rpm::RpmBackend.bundle(ctx, extra).await,
            Self::WindowsGeneric(extra) => {
                windows::generic::WindowsGenericBackend.bundle(ctx, extra).await
            }
            Self::WindowsInstaller(extra) => windows::nsis::NsisBackend.bundle(ctx, extra).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_round_trip() {
        for choice in BundlerChoice::ALL {
            assert_eq!(choice.as_str().parse::<BundlerChoice>(), Ok(choice));
        }
        assert_eq!("LINUXRPM".parse::<BundlerChoice>(), Ok(BundlerChoice::LinuxRpm));
        assert!("deb".parse::<BundlerChoice>().is_err());
    }

    #[test]
    fn defaults_target_their_platform() {
        for platform in Platform::ALL {
            let choice = BundlerChoice::default_for(platform);
            assert!(choice.supported_targets().contains(&platform), "{platform}");
        }
    }

    #[test]
    fn installers_are_not_runnable() {
        assert!(!BundlerChoice::LinuxRpm.is_runnable());
        assert!(!BundlerChoice::WindowsInstaller.is_runnable());
        assert!(BundlerChoice::LinuxAppImage.is_runnable());
    }
}
