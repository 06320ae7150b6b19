//! The seam between the pipeline and every external build or device tool.
//!
//! The orchestrator, the device resolver and the codesigning resolver only talk
//! to a [`Toolchain`]. [`SystemToolchain`] shells out to `cargo`, `xcodebuild`,
//! `xcrun`, `security`, `lipo`, `dsymutil`, `objcopy` and `strip`.

use super::{
    Error, Result,
    builder::tool_detection::{HAS_OBJCOPY, HAS_XCRUN},
    codesign::SigningIdentity,
    device::{ConnectedDevice, Device, Simulator},
    error::ErrorExt,
    target::{BuildConfiguration, Platform},
    utils::process,
};
use regex::Regex;
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use tokio::process::Command;

/// What `cargo build` should produce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CargoTarget {
    /// `--bin <name>`
    Bin(String),
    /// `--lib`
    Lib,
}

/// One `cargo build` invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CargoBuild {
    /// Directory holding `Cargo.toml`.
    pub manifest_dir: PathBuf,
    /// `--target-dir`
    pub target_dir: PathBuf,
    /// Target to build.
    pub target: CargoTarget,
    /// Debug or release.
    pub configuration: BuildConfiguration,
    /// `--target` triple.
    pub triple: String,
    /// Where the product is expected afterwards.
    pub output: PathBuf,
}

/// One `xcodebuild build` invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XcodeBuild {
    /// Directory holding the package.
    pub project_dir: PathBuf,
    /// Scheme (the product name).
    pub scheme: String,
    /// Debug or release.
    pub configuration: BuildConfiguration,
    /// Platform to build for.
    pub platform: Platform,
    /// `-derivedDataPath`
    pub derived_data: PathBuf,
    /// `CONFIGURATION_BUILD_DIR`
    pub products_dir: PathBuf,
    /// Where the product is expected afterwards.
    pub output: PathBuf,
}

/// Building one project through its builder script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectBuild {
    /// Project name in `Bundler.toml`.
    pub name: String,
    /// Builder script (`*.rs`) inside the project sources.
    pub builder: PathBuf,
    /// Root of the project sources.
    pub source_dir: PathBuf,
    /// Scratch directory the builder writes into.
    pub build_dir: PathBuf,
    /// Debug or release.
    pub configuration: BuildConfiguration,
    /// Platform being built for.
    pub platform: Platform,
    /// Rust target triple of the main build.
    pub triple: String,
    /// Products expected afterwards.
    pub outputs: Vec<PathBuf>,
}

/// External tools the pipeline depends on.
#[allow(async_fn_in_trait)]
pub trait Toolchain {
    /// Platform of the machine running the bundler.
    fn host_platform(&self) -> Option<Platform>;

    /// Installed simulators.
    async fn list_simulators(&self) -> Result<Vec<Simulator>>;

    /// Connected devices followed by simulators.
    async fn list_devices(&self) -> Result<Vec<Device>>;

    /// Installed codesigning identities, in keychain order.
    async fn list_identities(&self) -> Result<Vec<SigningIdentity>>;

    /// Runs `cargo build`.
    async fn cargo_build(&self, build: &CargoBuild) -> Result<()>;

    /// Runs `xcodebuild build`.
    async fn xcodebuild(&self, build: &XcodeBuild) -> Result<()>;

    /// Merges single-architecture binaries into `output` with `lipo`.
    async fn lipo(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;

    /// Compiles and runs a project's builder script.
    async fn run_builder(&self, build: &ProjectBuild) -> Result<()>;

    /// Splits debug information off `executable`, returning where it went.
    async fn extract_debug_info(&self, platform: Platform, executable: &Path)
    -> Result<Option<PathBuf>>;

    /// Strips symbols from `executable` in place.
    async fn strip(&self, platform: Platform, executable: &Path) -> Result<()>;
}

/// [`Toolchain`] backed by the real tools on `PATH`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemToolchain;

impl Toolchain for SystemToolchain {
    fn host_platform(&self) -> Option<Platform> {
        Platform::host()
    }

    async fn list_simulators(&self) -> Result<Vec<Simulator>> {
        if !*HAS_XCRUN {
            log::debug!("xcrun not available; no simulators");
            return Ok(Vec::new());
        }

        let output = process::output(
            Command::new("xcrun").args(["simctl", "list", "devices", "--json"]),
        )
        .await?;
        parse_simctl_devices(&output.stdout)
    }

    async fn list_devices(&self) -> Result<Vec<Device>> {
        if !*HAS_XCRUN {
            log::debug!("xcrun not available; no devices");
            return Ok(Vec::new());
        }

        let json_path =
            std::env::temp_dir().join(format!("kodegen-devicectl-{}.json", uuid::Uuid::new_v4()));
        let listed = process::output(
            Command::new("xcrun")
                .args(["devicectl", "list", "devices", "--quiet", "--json-output"])
                .arg(&json_path),
        )
        .await;

        let mut devices = match listed {
            Ok(_) => {
                let contents = tokio::fs::read(&json_path)
                    .await
                    .fs_context("reading devicectl output", &json_path)?;
                let _ = tokio::fs::remove_file(&json_path).await;
                parse_devicectl_devices(&contents)?
            }
            // Older Xcode versions ship without devicectl; simulators still work.
            Err(e) => {
                log::debug!("devicectl unavailable: {}", e);
                Vec::new()
            }
        };

        devices.extend(self.list_simulators().await?.into_iter().map(Device::Simulator));
        Ok(devices)
    }

    async fn list_identities(&self) -> Result<Vec<SigningIdentity>> {
        if which::which("security").is_err() {
            return Ok(Vec::new());
        }

        let output = process::output(
            Command::new("security").args(["find-identity", "-v", "-p", "codesigning"]),
        )
        .await?;
        parse_identities(&String::from_utf8_lossy(&output.stdout))
    }

    async fn cargo_build(&self, build: &CargoBuild) -> Result<()> {
        let mut command = Command::new("cargo");
        command
            .arg("build")
            .arg("--manifest-path")
            .arg(build.manifest_dir.join("Cargo.toml"))
            .arg("--target-dir")
            .arg(&build.target_dir)
            .args(["--target", &build.triple]);

        match &build.target {
            CargoTarget::Bin(name) => command.args(["--bin", name]),
            CargoTarget::Lib => command.arg("--lib"),
        };
        if build.configuration == BuildConfiguration::Release {
            command.arg("--release");
        }

        process::status(&mut command).await?;
        expect_output("cargo build product", &build.output)
    }

    async fn xcodebuild(&self, build: &XcodeBuild) -> Result<()> {
        let destination = build.platform.xcodebuild_destination().ok_or_else(|| {
            Error::InvalidArguments(format!("xcodebuild cannot build for {}", build.platform))
        })?;

        process::status(
            Command::new("xcodebuild")
                .current_dir(&build.project_dir)
                .args(["build", "-scheme", &build.scheme])
                .args(["-configuration", build.configuration.xcode_name()])
                .args(["-destination", destination])
                .arg("-derivedDataPath")
                .arg(&build.derived_data)
                .arg(format!(
                    "CONFIGURATION_BUILD_DIR={}",
                    build.products_dir.display()
                )),
        )
        .await?;
        expect_output("xcodebuild product", &build.output)
    }

    async fn lipo(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .fs_context("creating universal products directory", parent)?;
        }
        process::output(
            Command::new("lipo")
                .arg("-create")
                .arg("-output")
                .arg(output)
                .args(inputs),
        )
        .await?;
        Ok(())
    }

    async fn run_builder(&self, build: &ProjectBuild) -> Result<()> {
        tokio::fs::create_dir_all(&build.build_dir)
            .await
            .fs_context("creating project build directory", &build.build_dir)?;

        let host_suffix = if cfg!(windows) { ".exe" } else { "" };
        let builder_binary = build.build_dir.join(format!("builder{host_suffix}"));

        log::info!("Compiling builder for project '{}'", build.name);
        process::output(
            Command::new("rustc")
                .args(["--edition", "2021", "-O", "-o"])
                .arg(&builder_binary)
                .arg(&build.builder),
        )
        .await?;

        log::info!("Running builder for project '{}'", build.name);
        process::status(
            Command::new(&builder_binary)
                .current_dir(&build.source_dir)
                .env("KODEGEN_PROJECT_DIR", &build.source_dir)
                .env("KODEGEN_BUILD_DIR", &build.build_dir)
                .env("KODEGEN_CONFIGURATION", build.configuration.directory_name())
                .env("KODEGEN_PLATFORM", build.platform.as_str())
                .env("KODEGEN_TARGET", &build.triple),
        )
        .await?;

        for output in &build.outputs {
            expect_output(&format!("product of project '{}'", build.name), output)?;
        }
        Ok(())
    }

    async fn extract_debug_info(
        &self,
        platform: Platform,
        executable: &Path,
    ) -> Result<Option<PathBuf>> {
        if platform.is_apple() {
            let mut dsym = executable.as_os_str().to_os_string();
            dsym.push(".dSYM");
            let dsym = PathBuf::from(dsym);
            process::output(Command::new("dsymutil").arg(executable).arg("-o").arg(&dsym)).await?;
            return Ok(Some(dsym));
        }

        if platform == Platform::Linux {
            if !*HAS_OBJCOPY {
                log::warn!("objcopy not found; debug information stays in the executable");
                return Ok(None);
            }
            let debug = executable.with_extension("debug");
            process::output(
                Command::new("objcopy")
                    .arg("--only-keep-debug")
                    .arg(executable)
                    .arg(&debug),
            )
            .await?;
            process::output(
                Command::new("objcopy")
                    .arg(format!("--add-gnu-debuglink={}", debug.display()))
                    .arg(executable),
            )
            .await?;
            return Ok(Some(debug));
        }

        // MSVC writes the .pdb next to the executable during the build.
        Ok(None)
    }

    async fn strip(&self, platform: Platform, executable: &Path) -> Result<()> {
        match platform {
            Platform::Windows => {
                log::debug!("Skipping strip for Windows executables");
                Ok(())
            }
            Platform::Linux => {
                process::output(Command::new("strip").arg("--strip-unneeded").arg(executable))
                    .await?;
                Ok(())
            }
            _ => {
                process::output(Command::new("strip").arg("-x").arg(executable)).await?;
                Ok(())
            }
        }
    }
}

fn expect_output(description: &str, path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(Error::MissingArtifact {
            description: description.to_string(),
            path: path.to_path_buf(),
        })
    }
}

#[derive(Deserialize)]
struct SimctlList {
    devices: BTreeMap<String, Vec<SimctlDevice>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimctlDevice {
    udid: String,
    name: String,
    state: String,
    #[serde(default)]
    is_available: bool,
}

fn simulator_platform(runtime: &str) -> Option<Platform> {
    let runtime = runtime.rsplit('.').next().unwrap_or(runtime);
    if runtime.starts_with("iOS") {
        Some(Platform::IOsSimulator)
    } else if runtime.starts_with("tvOS") {
        Some(Platform::TvOsSimulator)
    } else if runtime.starts_with("xrOS") || runtime.starts_with("visionOS") {
        Some(Platform::VisionOsSimulator)
    } else {
        None
    }
}

/// Parses `xcrun simctl list devices --json`, keeping runtimes we can target.
fn parse_simctl_devices(json: &[u8]) -> Result<Vec<Simulator>> {
    let list: SimctlList = serde_json::from_slice(json)?;
    let mut simulators = Vec::new();
    for (runtime, devices) in list.devices {
        let Some(platform) = simulator_platform(&runtime) else {
            continue;
        };
        simulators.extend(devices.into_iter().map(|device| Simulator {
            id: device.udid,
            name: device.name,
            platform,
            is_booted: device.state == "Booted",
            is_available: device.is_available,
        }));
    }
    Ok(simulators)
}

#[derive(Deserialize)]
struct DevicectlOutput {
    result: DevicectlResult,
}

#[derive(Deserialize)]
struct DevicectlResult {
    #[serde(default)]
    devices: Vec<DevicectlDevice>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DevicectlDevice {
    identifier: String,
    device_properties: DevicectlDeviceProperties,
    hardware_properties: DevicectlHardwareProperties,
}

#[derive(Deserialize)]
struct DevicectlDeviceProperties {
    name: String,
}

#[derive(Deserialize)]
struct DevicectlHardwareProperties {
    platform: String,
    udid: Option<String>,
}

fn parse_devicectl_devices(json: &[u8]) -> Result<Vec<Device>> {
    let output: DevicectlOutput = serde_json::from_slice(json)?;
    Ok(output
        .result
        .devices
        .into_iter()
        .filter_map(|device| {
            let platform = match device.hardware_properties.platform.as_str() {
                "iOS" => Platform::IOs,
                "tvOS" => Platform::TvOs,
                "xrOS" | "visionOS" => Platform::VisionOs,
                _ => return None,
            };
            Some(Device::Connected(ConnectedDevice {
                id: device.hardware_properties.udid.unwrap_or(device.identifier),
                name: device.device_properties.name,
                platform,
            }))
        })
        .collect())
}

const IDENTITY_LINE: &str = r#"^\s*\d+\)\s+([0-9A-Fa-f]{40})\s+"(.+)"\s*$"#;

/// Parses `security find-identity -v -p codesigning`.
fn parse_identities(stdout: &str) -> Result<Vec<SigningIdentity>> {
    let pattern = Regex::new(IDENTITY_LINE)
        .map_err(|e| Error::GenericError(format!("invalid identity pattern: {e}")))?;
    Ok(stdout
        .lines()
        .filter_map(|line| pattern.captures(line))
        .map(|captures| SigningIdentity {
            hash: captures[1].to_string(),
            name: captures[2].to_string(),
        })
        .collect())
}

#[cfg(test)]
pub(crate) use fake::FakeToolchain;

#[cfg(test)]
mod fake {
    use super::*;
    use std::sync::Mutex;

    /// In-memory toolchain: records every call, writes placeholder products
    /// where a real build would, and fails on request.
    #[derive(Debug, Default)]
    pub(crate) struct FakeToolchain {
        host: Option<Platform>,
        simulators: Vec<Simulator>,
        devices: Vec<Device>,
        identities: Vec<SigningIdentity>,
        fail_on: Option<String>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeToolchain {
        pub(crate) fn new(host: Platform) -> Self {
            Self {
                host: Some(host),
                ..Self::default()
            }
        }

        pub(crate) fn with_simulators(mut self, simulators: Vec<Simulator>) -> Self {
            self.simulators = simulators;
            self
        }

        pub(crate) fn with_devices(mut self, devices: Vec<Device>) -> Self {
            self.devices = devices;
            self
        }

        pub(crate) fn with_identities(mut self, identities: Vec<SigningIdentity>) -> Self {
            self.identities = identities;
            self
        }

        /// Makes every call whose recorded name starts with `prefix` fail.
        pub(crate) fn failing_on(mut self, prefix: &str) -> Self {
            self.fail_on = Some(prefix.to_string());
            self
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) -> Result<()> {
            let fails = self
                .fail_on
                .as_deref()
                .is_some_and(|prefix| call.starts_with(prefix));
            self.calls.lock().unwrap().push(call.clone());
            if fails {
                return Err(Error::GenericError(format!("injected failure in {call}")));
            }
            Ok(())
        }

        fn touch(path: &Path) -> Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, b"\x7fELF placeholder")?;
            Ok(())
        }
    }

    impl Toolchain for FakeToolchain {
        fn host_platform(&self) -> Option<Platform> {
            self.host
        }

        async fn list_simulators(&self) -> Result<Vec<Simulator>> {
            self.record("list_simulators".into())?;
            Ok(self.simulators.clone())
        }

        async fn list_devices(&self) -> Result<Vec<Device>> {
            self.record("list_devices".into())?;
            let mut devices = self.devices.clone();
            devices.extend(self.simulators.iter().cloned().map(Device::Simulator));
            Ok(devices)
        }

        async fn list_identities(&self) -> Result<Vec<SigningIdentity>> {
            self.record("list_identities".into())?;
            Ok(self.identities.clone())
        }

        async fn cargo_build(&self, build: &CargoBuild) -> Result<()> {
            let target = match &build.target {
                CargoTarget::Bin(name) => format!("bin {name}"),
                CargoTarget::Lib => "lib".to_string(),
            };
            self.record(format!("cargo_build {target} {}", build.triple))?;
            Self::touch(&build.output)
        }

        async fn xcodebuild(&self, build: &XcodeBuild) -> Result<()> {
            self.record(format!("xcodebuild {}", build.scheme))?;
            Self::touch(&build.output)
        }

        async fn lipo(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
            self.record(format!("lipo {}", inputs.len()))?;
            Self::touch(output)
        }

        async fn run_builder(&self, build: &ProjectBuild) -> Result<()> {
            self.record(format!("run_builder {}", build.name))?;
            for output in &build.outputs {
                Self::touch(output)?;
            }
            Ok(())
        }

        async fn extract_debug_info(
            &self,
            _platform: Platform,
            _executable: &Path,
        ) -> Result<Option<PathBuf>> {
            self.record("extract_debug_info".into())?;
            Ok(None)
        }

        async fn strip(&self, _platform: Platform, _executable: &Path) -> Result<()> {
            self.record("strip".into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simctl_output() {
        let json = br#"{
            "devices": {
                "com.apple.CoreSimulator.SimRuntime.iOS-17-2": [
                    {"udid": "A", "name": "iPhone 15", "state": "Booted", "isAvailable": true},
                    {"udid": "B", "name": "iPhone 15 Pro", "state": "Shutdown", "isAvailable": true}
                ],
                "com.apple.CoreSimulator.SimRuntime.xrOS-1-0": [
                    {"udid": "C", "name": "Apple Vision Pro", "state": "Shutdown", "isAvailable": false}
                ],
                "com.apple.CoreSimulator.SimRuntime.watchOS-10-2": [
                    {"udid": "D", "name": "Apple Watch", "state": "Shutdown", "isAvailable": true}
                ]
            }
        }"#;

        let simulators = parse_simctl_devices(json).unwrap();
        assert_eq!(simulators.len(), 3);
        assert_eq!(simulators[0].platform, Platform::IOsSimulator);
        assert!(simulators[0].is_booted);
        assert!(!simulators[1].is_booted);
        assert_eq!(simulators[2].platform, Platform::VisionOsSimulator);
        assert!(!simulators[2].is_available);
    }

    #[test]
    fn parses_devicectl_output() {
        let json = br#"{
            "result": {
                "devices": [
                    {
                        "identifier": "1234",
                        "deviceProperties": {"name": "Work Phone"},
                        "hardwareProperties": {"platform": "iOS", "udid": "0000-1111"}
                    },
                    {
                        "identifier": "5678",
                        "deviceProperties": {"name": "Watch"},
                        "hardwareProperties": {"platform": "watchOS"}
                    }
                ]
            }
        }"#;

        let devices = parse_devicectl_devices(json).unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id(), "0000-1111");
        assert_eq!(devices[0].platform(), Platform::IOs);
    }

    #[test]
    fn parses_security_identities() {
        let stdout = "  1) 0123456789ABCDEF0123456789ABCDEF01234567 \"Apple Development: Jane (TEAM1)\"\n\
                      \x20 2) 89ABCDEF0123456789ABCDEF0123456789ABCDEF \"Developer ID Application: Org (TEAM2)\"\n\
                      \x20    2 valid identities found\n";
        let identities = parse_identities(stdout).unwrap();
        assert_eq!(identities.len(), 2);
        assert_eq!(identities[0].name, "Apple Development: Jane (TEAM1)");
        assert_eq!(identities[1].hash, "89ABCDEF0123456789ABCDEF0123456789ABCDEF");
    }
}
