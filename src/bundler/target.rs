//! Target platforms, CPU architectures and build configurations.

use crate::bundler::{Error, Result};
use std::{fmt::Display, str::FromStr};

/// Platform an app is built for.
///
/// Each variant has a stable identifier (see [`Platform::as_str`]) used on the
/// command line and in `platform(...)` overlay conditions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Platform {
    /// macOS desktop apps.
    MacOs,
    /// iPad apps running on macOS.
    MacCatalyst,
    /// iOS devices.
    IOs,
    /// iOS simulator.
    IOsSimulator,
    /// tvOS devices.
    TvOs,
    /// tvOS simulator.
    TvOsSimulator,
    /// visionOS devices.
    VisionOs,
    /// visionOS simulator.
    VisionOsSimulator,
    /// Linux desktops.
    Linux,
    /// Windows desktops.
    Windows,
}

impl Platform {
    /// Every platform, in declaration order.
    pub const ALL: [Platform; 10] = [
        Platform::MacOs,
        Platform::MacCatalyst,
        Platform::IOs,
        Platform::IOsSimulator,
        Platform::TvOs,
        Platform::TvOsSimulator,
        Platform::VisionOs,
        Platform::VisionOsSimulator,
        Platform::Linux,
        Platform::Windows,
    ];

    /// Stable identifier used in configuration files and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::MacOs => "macOS",
            Platform::MacCatalyst => "macCatalyst",
            Platform::IOs => "iOS",
            Platform::IOsSimulator => "iOSSimulator",
            Platform::TvOs => "tvOS",
            Platform::TvOsSimulator => "tvOSSimulator",
            Platform::VisionOs => "visionOS",
            Platform::VisionOsSimulator => "visionOSSimulator",
            Platform::Linux => "linux",
            Platform::Windows => "windows",
        }
    }

    /// Platform of the machine running the bundler, if it is one we can target.
    pub fn host() -> Option<Platform> {
        if cfg!(target_os = "macos") {
            Some(Platform::MacOs)
        } else if cfg!(target_os = "linux") {
            Some(Platform::Linux)
        } else if cfg!(target_os = "windows") {
            Some(Platform::Windows)
        } else {
            None
        }
    }

    /// Whether the platform belongs to Apple's toolchain (codesigning, xcodebuild).
    pub fn is_apple(self) -> bool {
        !matches!(self, Platform::Linux | Platform::Windows)
    }

    /// Whether the platform is a simulator platform.
    pub fn is_simulator(self) -> bool {
        matches!(
            self,
            Platform::IOsSimulator | Platform::TvOsSimulator | Platform::VisionOsSimulator
        )
    }

    /// Simulator counterpart of a device platform (identity for simulator platforms).
    pub fn simulator_variant(self) -> Option<Platform> {
        match self {
            Platform::IOs | Platform::IOsSimulator => Some(Platform::IOsSimulator),
            Platform::TvOs | Platform::TvOsSimulator => Some(Platform::TvOsSimulator),
            Platform::VisionOs | Platform::VisionOsSimulator => Some(Platform::VisionOsSimulator),
            _ => None,
        }
    }

    /// Whether apps for this platform must be signed to run at all.
    pub fn requires_codesigning(self) -> bool {
        matches!(self, Platform::IOs | Platform::TvOs | Platform::VisionOs)
    }

    /// Whether the main product is built with `xcodebuild` unless the request
    /// says otherwise.
    pub fn defaults_to_xcodebuild(self) -> bool {
        matches!(
            self,
            Platform::IOs
                | Platform::IOsSimulator
                | Platform::TvOs
                | Platform::TvOsSimulator
                | Platform::VisionOs
                | Platform::VisionOsSimulator
        )
    }

    /// Whether the platform's executables can be launched directly on `host`.
    pub fn runs_on_host(self, host: Platform) -> bool {
        match self {
            Platform::MacOs | Platform::MacCatalyst => host == Platform::MacOs,
            Platform::Linux => host == Platform::Linux,
            Platform::Windows => host == Platform::Windows,
            _ => false,
        }
    }

    /// Whether several architectures can be merged into one universal binary.
    pub fn supports_universal(self) -> bool {
        matches!(self, Platform::MacOs | Platform::MacCatalyst)
    }

    /// Architectures the platform can be built for, preferred first.
    pub fn supported_architectures(self) -> &'static [Arch] {
        match self {
            Platform::MacOs | Platform::MacCatalyst => &[Arch::AArch64, Arch::X86_64],
            Platform::IOs | Platform::TvOs | Platform::VisionOs => &[Arch::AArch64],
            Platform::IOsSimulator | Platform::TvOsSimulator => &[Arch::AArch64, Arch::X86_64],
            Platform::VisionOsSimulator => &[Arch::AArch64],
            Platform::Linux => &[
                Arch::X86_64,
                Arch::AArch64,
                Arch::X86,
                Arch::Armhf,
                Arch::Riscv64,
            ],
            Platform::Windows => &[Arch::X86_64, Arch::AArch64, Arch::X86],
        }
    }

    /// Rust target triple for `arch` on this platform.
    pub fn rust_target(self, arch: Arch) -> Result<String> {
        if !self.supported_architectures().contains(&arch) {
            return Err(Error::ArchError(format!(
                "{} is not supported on {}",
                arch, self
            )));
        }

        let cpu = arch.rust_cpu();
        let triple = match self {
            Platform::MacOs => format!("{cpu}-apple-darwin"),
            Platform::MacCatalyst => format!("{cpu}-apple-ios-macabi"),
            Platform::IOs => format!("{cpu}-apple-ios"),
            Platform::IOsSimulator => match arch {
                Arch::X86_64 => "x86_64-apple-ios".to_string(),
                _ => format!("{cpu}-apple-ios-sim"),
            },
            Platform::TvOs => format!("{cpu}-apple-tvos"),
            Platform::TvOsSimulator => match arch {
                Arch::X86_64 => "x86_64-apple-tvos".to_string(),
                _ => format!("{cpu}-apple-tvos-sim"),
            },
            Platform::VisionOs => format!("{cpu}-apple-visionos"),
            Platform::VisionOsSimulator => format!("{cpu}-apple-visionos-sim"),
            Platform::Linux => match arch {
                Arch::Armhf => "armv7-unknown-linux-gnueabihf".to_string(),
                _ => format!("{cpu}-unknown-linux-gnu"),
            },
            Platform::Windows => format!("{cpu}-pc-windows-msvc"),
        };
        Ok(triple)
    }

    /// `xcodebuild -destination` value for a generic build of this platform.
    pub fn xcodebuild_destination(self) -> Option<&'static str> {
        match self {
            Platform::MacOs => Some("generic/platform=macOS"),
            Platform::MacCatalyst => Some("generic/platform=macOS,variant=Mac Catalyst"),
            Platform::IOs => Some("generic/platform=iOS"),
            Platform::IOsSimulator => Some("generic/platform=iOS Simulator"),
            Platform::TvOs => Some("generic/platform=tvOS"),
            Platform::TvOsSimulator => Some("generic/platform=tvOS Simulator"),
            Platform::VisionOs => Some("generic/platform=visionOS"),
            Platform::VisionOsSimulator => Some("generic/platform=visionOS Simulator"),
            Platform::Linux | Platform::Windows => None,
        }
    }

    /// Suffix of executables on this platform.
    pub fn executable_suffix(self) -> &'static str {
        if self == Platform::Windows { ".exe" } else { "" }
    }

    /// File name of a dynamic library called `name` on this platform.
    pub fn dynamic_library_name(self, name: &str) -> String {
        match self {
            Platform::Linux => format!("lib{name}.so"),
            Platform::Windows => format!("{name}.dll"),
            _ => format!("lib{name}.dylib"),
        }
    }

    /// File name of a static library called `name` on this platform.
    pub fn static_library_name(self, name: &str) -> String {
        match self {
            Platform::Windows => format!("{name}.lib"),
            _ => format!("lib{name}.a"),
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|platform| platform.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let known: Vec<&str> = Platform::ALL.iter().map(|p| p.as_str()).collect();
                format!("unknown platform '{s}' (expected one of: {})", known.join(", "))
            })
    }
}

/// CPU architecture for target binaries.
///
/// # Platform Support
///
/// - Linux: all architectures
/// - Apple platforms: X86_64 and AArch64 (macOS may merge both into a universal binary)
/// - Windows: X86_64, AArch64, X86
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Arch {
    /// x86_64 / AMD64 (64-bit)
    X86_64,
    /// x86 / i686 (32-bit)
    X86,
    /// AArch64 / ARM64 (64-bit)
    AArch64,
    /// ARM with hard-float (32-bit)
    Armhf,
    /// RISC-V (64-bit)
    Riscv64,
}

impl Arch {
    /// Architecture of the running bundler.
    pub fn host() -> Option<Arch> {
        match std::env::consts::ARCH {
            "x86_64" => Some(Arch::X86_64),
            "x86" => Some(Arch::X86),
            "aarch64" => Some(Arch::AArch64),
            "arm" => Some(Arch::Armhf),
            "riscv64" => Some(Arch::Riscv64),
            _ => None,
        }
    }

    /// CPU component of Rust target triples.
    pub fn rust_cpu(self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::X86 => "i686",
            Arch::AArch64 => "aarch64",
            Arch::Armhf => "armv7",
            Arch::Riscv64 => "riscv64gc",
        }
    }

    /// Name used by Linux packaging tools (AppImage, RPM).
    pub fn linux_name(self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::X86 => "i386",
            Arch::AArch64 => "aarch64",
            Arch::Armhf => "armhfp",
            Arch::Riscv64 => "riscv64",
        }
    }
}

impl Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Arch::X86_64 => "x86_64",
            Arch::X86 => "x86",
            Arch::AArch64 => "arm64",
            Arch::Armhf => "armv7",
            Arch::Riscv64 => "riscv64",
        };
        f.write_str(name)
    }
}

impl FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" | "x64" => Ok(Arch::X86_64),
            "x86" | "i686" | "i386" => Ok(Arch::X86),
            "arm64" | "aarch64" => Ok(Arch::AArch64),
            "armv7" | "armhf" => Ok(Arch::Armhf),
            "riscv64" => Ok(Arch::Riscv64),
            other => Err(format!("unknown architecture '{other}'")),
        }
    }
}

/// Build configuration passed to the compiler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum BuildConfiguration {
    /// Unoptimized build with debug assertions.
    #[default]
    Debug,
    /// Optimized build.
    Release,
}

impl BuildConfiguration {
    /// Directory name cargo uses for this configuration.
    pub fn directory_name(self) -> &'static str {
        match self {
            BuildConfiguration::Debug => "debug",
            BuildConfiguration::Release => "release",
        }
    }

    /// Configuration name as xcodebuild expects it.
    pub fn xcode_name(self) -> &'static str {
        match self {
            BuildConfiguration::Debug => "Debug",
            BuildConfiguration::Release => "Release",
        }
    }
}

impl Display for BuildConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.directory_name())
    }
}

/// Build system driving the main build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildSystem {
    /// `cargo build`.
    Cargo,
    /// `xcodebuild` against an Xcode project in the package root.
    Xcodebuild,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_identifiers_round_trip_case_insensitively() {
        for platform in Platform::ALL {
            assert_eq!(platform.as_str().parse::<Platform>(), Ok(platform));
        }
        assert_eq!("ios".parse::<Platform>(), Ok(Platform::IOs));
        assert!("android".parse::<Platform>().is_err());
    }

    #[test]
    fn simulator_triples_differ_per_architecture() {
        assert_eq!(
            Platform::IOsSimulator.rust_target(Arch::AArch64).unwrap(),
            "aarch64-apple-ios-sim"
        );
        assert_eq!(
            Platform::IOsSimulator.rust_target(Arch::X86_64).unwrap(),
            "x86_64-apple-ios"
        );
        assert!(Platform::IOs.rust_target(Arch::X86_64).is_err());
    }

    #[test]
    fn only_device_platforms_require_signing() {
        assert!(Platform::IOs.requires_codesigning());
        assert!(!Platform::IOsSimulator.requires_codesigning());
        assert!(!Platform::MacOs.requires_codesigning());
        assert!(!Platform::Linux.requires_codesigning());
    }
}
