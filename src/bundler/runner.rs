//! Launching a finished bundle on its device.
//!
//! Host bundles run directly with inherited stdio. Simulator bundles are
//! installed and launched through `xcrun simctl`, connected devices through
//! `xcrun devicectl`.

use super::{
    BundleReport, Error, Result,
    device::Device,
    target::Platform,
    utils::process,
};
use std::{collections::BTreeMap, path::Path};
use tokio::process::Command;

/// Set to `1` in the app's environment when hot reloading is active.
pub const HOT_RELOAD_ENV: &str = "KODEGEN_HOT_RELOAD";
/// Address of the hot-reload server in the app's environment.
pub const HOT_RELOAD_SERVER_ENV: &str = "KODEGEN_HOT_RELOAD_SERVER";

/// How the app is started.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Hot-reload server address (`ADDR:PORT`).
    pub hot_reload: Option<String>,
    /// Arguments passed to the app.
    pub arguments: Vec<String>,
}

impl LaunchOptions {
    /// Variables added to the app's environment.
    pub fn environment(&self) -> BTreeMap<&'static str, String> {
        let mut environment = BTreeMap::new();
        if let Some(server) = &self.hot_reload {
            environment.insert(HOT_RELOAD_ENV, "1".to_string());
            environment.insert(HOT_RELOAD_SERVER_ENV, server.clone());
        }
        environment
    }
}

/// Commands that launch the bundle, in order. Every command but the last
/// prepares the device; the last one runs the app.
pub fn launch_commands(
    report: &BundleReport,
    options: &LaunchOptions,
    host: Option<Platform>,
) -> Result<Vec<Command>> {
    let ctx = &report.context;
    if !ctx.bundler.is_runnable() {
        return Err(Error::InvalidArguments(format!(
            "{} produces an installer, which cannot be run; choose another --bundler",
            ctx.bundler
        )));
    }

    let environment = options.environment();
    let root = &report.structure.root;

    match &ctx.device {
        Device::Host(_) | Device::MacCatalyst => {
            let platform = ctx.platform();
            if !host.is_some_and(|host| platform.runs_on_host(host)) {
                return Err(Error::InvalidArguments(format!(
                    "{platform} apps cannot run on this machine; pass --device or --simulator"
                )));
            }
            let executable = report.structure.executable.as_ref().ok_or_else(|| {
                Error::GenericError(format!("{} has no executable to run", root.display()))
            })?;

            let mut command = Command::new(executable);
            command.args(&options.arguments).envs(&environment);
            if platform == Platform::Linux
                && let Some(lib_dir) = linux_library_dir(executable)
            {
                command.env(
                    "LD_LIBRARY_PATH",
                    prepend_path(&lib_dir, std::env::var_os("LD_LIBRARY_PATH")),
                );
            }
            Ok(vec![command])
        }
        Device::Simulator(simulator) => {
            let mut commands = Vec::new();
            if !simulator.is_booted {
                let mut boot = Command::new("xcrun");
                boot.args(["simctl", "boot", &simulator.id]);
                commands.push(boot);
            }

            let mut install = Command::new("xcrun");
            install.args(["simctl", "install", &simulator.id]).arg(root);
            commands.push(install);

            // simctl forwards SIMCTL_CHILD_* variables to the launched app.
            let mut launch = Command::new("xcrun");
            launch
                .args(["simctl", "launch", "--console-pty", &simulator.id, &ctx.app.identifier])
                .args(&options.arguments)
                .envs(
                    environment
                        .iter()
                        .map(|(key, value)| (format!("SIMCTL_CHILD_{key}"), value)),
                );
            commands.push(launch);
            Ok(commands)
        }
        Device::Connected(device) => {
            let mut install = Command::new("xcrun");
            install
                .args(["devicectl", "device", "install", "app", "--device", &device.id])
                .arg(root);

            let mut launch = Command::new("xcrun");
            launch.args(["devicectl", "device", "process", "launch", "--console"]);
            launch.args(["--device", &device.id]);
            if !environment.is_empty() {
                launch
                    .arg("--environment-variables")
                    .arg(serde_json::to_string(&environment)?);
            }
            launch.arg(&ctx.app.identifier).args(&options.arguments);
            Ok(vec![install, launch])
        }
    }
}

/// `usr/lib` next to `usr/bin/<exe>`, when it exists.
fn linux_library_dir(executable: &Path) -> Option<std::path::PathBuf> {
    let lib_dir = executable.parent()?.parent()?.join("lib");
    lib_dir.is_dir().then_some(lib_dir)
}

fn prepend_path(dir: &Path, existing: Option<std::ffi::OsString>) -> std::ffi::OsString {
    let mut value = dir.as_os_str().to_os_string();
    if let Some(existing) = existing.filter(|existing| !existing.is_empty()) {
        value.push(":");
        value.push(existing);
    }
    value
}

/// Launches the bundle and waits for the app to exit.
pub async fn launch(report: &BundleReport, options: &LaunchOptions) -> Result<()> {
    let mut commands = launch_commands(report, options, Platform::host())?;
    let Some(mut app) = commands.pop() else {
        return Ok(());
    };

    for mut command in commands {
        process::output(&mut command).await?;
    }

    log::info!("Launching {} on {}", report.context.app_name, report.context.device);
    if let Some(server) = &options.hot_reload {
        log::info!("Hot reloading through {}", server);
    }
    process::status(&mut app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{
        context::tests::context,
        device::Simulator,
        platform::{BundleStructure, BundlerChoice},
    };
    use std::ffi::OsStr;

    fn report(root: &Path, device: Device, bundler: BundlerChoice) -> BundleReport {
        let mut ctx = context(root);
        ctx.device = device;
        ctx.bundler = bundler;
        let bundle = ctx.directories.output.join("Hello");
        BundleReport {
            structure: BundleStructure {
                executable: Some(bundle.join("usr/bin/hello")),
                manifest: None,
                artifacts: Vec::new(),
                root: bundle,
            },
            context: ctx,
            copied_to: None,
            checksum: None,
            dry_run: true,
        }
    }

    fn env<'a>(command: &'a Command, key: &str) -> Option<&'a OsStr> {
        command
            .as_std()
            .get_envs()
            .find(|(k, _)| *k == OsStr::new(key))
            .and_then(|(_, v)| v)
    }

    #[test]
    fn host_launch_sets_hot_reload_and_library_path() {
        let dir = tempfile::tempdir().unwrap();
        let report = report(dir.path(), Device::Host(Platform::Linux), BundlerChoice::LinuxGeneric);
        std::fs::create_dir_all(report.structure.root.join("usr/lib")).unwrap();

        let options = LaunchOptions {
            hot_reload: Some("127.0.0.1:4000".into()),
            arguments: vec!["--flag".into()],
        };
        let commands = launch_commands(&report, &options, Some(Platform::Linux)).unwrap();

        assert_eq!(commands.len(), 1);
        let app = &commands[0];
        assert_eq!(
            process::describe(app),
            format!("{} --flag", report.structure.root.join("usr/bin/hello").display())
        );
        assert_eq!(env(app, HOT_RELOAD_ENV), Some(OsStr::new("1")));
        assert_eq!(env(app, HOT_RELOAD_SERVER_ENV), Some(OsStr::new("127.0.0.1:4000")));
        let library_path = env(app, "LD_LIBRARY_PATH").unwrap().to_string_lossy();
        assert!(library_path.starts_with(&*report.structure.root.join("usr/lib").to_string_lossy()));
    }

    #[test]
    fn installers_cannot_run() {
        let dir = tempfile::tempdir().unwrap();
        let report = report(dir.path(), Device::Host(Platform::Linux), BundlerChoice::LinuxRpm);
        let err = launch_commands(&report, &LaunchOptions::default(), Some(Platform::Linux))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
    }

    #[test]
    fn foreign_host_bundles_cannot_run() {
        let dir = tempfile::tempdir().unwrap();
        let report = report(dir.path(), Device::Host(Platform::Linux), BundlerChoice::LinuxGeneric);
        assert!(launch_commands(&report, &LaunchOptions::default(), Some(Platform::MacOs)).is_err());
    }

    #[test]
    fn simulator_launch_boots_installs_and_forwards_environment() {
        let dir = tempfile::tempdir().unwrap();
        let simulator = Simulator {
            id: "SIM-1".into(),
            name: "iPhone 15".into(),
            platform: Platform::IOsSimulator,
            is_booted: false,
            is_available: true,
        };
        let report = report(dir.path(), Device::Simulator(simulator), BundlerChoice::DarwinApp);
        let options = LaunchOptions {
            hot_reload: Some("10.0.0.2:4000".into()),
            arguments: Vec::new(),
        };

        let commands = launch_commands(&report, &options, Some(Platform::MacOs)).unwrap();
        let described: Vec<String> = commands.iter().map(process::describe).collect();
        assert_eq!(described[0], "xcrun simctl boot SIM-1");
        assert_eq!(
            described[1],
            format!("xcrun simctl install SIM-1 {}", report.structure.root.display())
        );
        assert_eq!(described[2], "xcrun simctl launch --console-pty SIM-1 com.example.hello");
        assert_eq!(
            env(&commands[2], "SIMCTL_CHILD_KODEGEN_HOT_RELOAD_SERVER"),
            Some(OsStr::new("10.0.0.2:4000"))
        );
    }
}
