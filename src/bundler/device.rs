//! Turning platform, device and simulator selectors into one target device.

use super::{Result, target::Platform, toolchain::Toolchain};
use std::fmt::Display;
use thiserror::Error;

/// Selector value standing for the machine running the bundler.
pub const HOST_SELECTOR: &str = "host";

/// An installed simulator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Simulator {
    /// Simulator UDID.
    pub id: String,
    /// Human readable name ("iPhone 15 Pro").
    pub name: String,
    /// Simulator platform it emulates.
    pub platform: Platform,
    /// Whether the simulator is currently booted.
    pub is_booted: bool,
    /// Whether its runtime is installed and usable.
    pub is_available: bool,
}

/// A physical device connected to the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectedDevice {
    /// Device identifier.
    pub id: String,
    /// Human readable name.
    pub name: String,
    /// Platform the device runs.
    pub platform: Platform,
}

/// One concrete execution target; always maps to exactly one platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Device {
    /// This machine, building for the given platform.
    Host(Platform),
    /// This Mac running an iPad app through Mac Catalyst.
    MacCatalyst,
    /// A simulator instance.
    Simulator(Simulator),
    /// A physical device.
    Connected(ConnectedDevice),
}

impl Device {
    /// Platform the device runs.
    pub fn platform(&self) -> Platform {
        match self {
            Device::Host(platform) => *platform,
            Device::MacCatalyst => Platform::MacCatalyst,
            Device::Simulator(simulator) => simulator.platform,
            Device::Connected(device) => device.platform,
        }
    }

    /// Name shown to the user and matched by device selectors.
    pub fn name(&self) -> &str {
        match self {
            Device::Host(_) | Device::MacCatalyst => HOST_SELECTOR,
            Device::Simulator(simulator) => &simulator.name,
            Device::Connected(device) => &device.name,
        }
    }

    /// Identifier matched exactly by device selectors.
    pub fn id(&self) -> &str {
        match self {
            Device::Host(_) | Device::MacCatalyst => HOST_SELECTOR,
            Device::Simulator(simulator) => &simulator.id,
            Device::Connected(device) => &device.id,
        }
    }
}

impl Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Host(platform) => write!(f, "host ({platform})"),
            Device::MacCatalyst => write!(f, "host ({})", Platform::MacCatalyst),
            Device::Simulator(simulator) => {
                write!(f, "{} ({}, {})", simulator.name, simulator.platform, simulator.id)
            }
            Device::Connected(device) => write!(f, "{} ({}, {})", device.name, device.platform, device.id),
        }
    }
}

/// Why no single device could be resolved.
#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum DeviceError {
    /// `--device` and `--simulator` were both given.
    #[error("--device and --simulator cannot be used together")]
    ConflictingSelectors,

    /// The bundler cannot target the machine it runs on.
    #[error("the host operating system is not a supported platform")]
    UnsupportedHost,

    /// No device matches the selector.
    #[error("no device matches '{query}' (available: {})", .available.join(", "))]
    DeviceNotFound {
        /// Selector as given.
        query: String,
        /// Names of enumerated devices.
        available: Vec<String>,
    },

    /// The selected device runs a different platform than requested.
    #[error("device '{device}' runs {actual}, but {requested} was requested")]
    PlatformMismatch {
        /// Selected device name.
        device: String,
        /// Platform the device runs.
        actual: Platform,
        /// Platform given with --platform.
        requested: Platform,
    },

    /// A simulator search was combined with a platform that has no simulator.
    #[error("{platform} has no simulator platform")]
    NoSimulatorPlatform {
        /// Requested platform.
        platform: Platform,
    },

    /// No available simulator matches the search term.
    #[error(
        "no simulator matches '{query}'\n\
         List simulators with `xcrun simctl list devices`"
    )]
    SimulatorNotFound {
        /// Search term as given.
        query: String,
    },

    /// A simulator platform was requested but none is booted.
    #[error(
        "no booted {platform} simulator found\n\
         List simulators with `xcrun simctl list devices`, boot one with \
         `xcrun simctl boot <id>`, or pass `--simulator <search term>`"
    )]
    NoBootedSimulator {
        /// Requested simulator platform.
        platform: Platform,
    },

    /// A simulator platform was requested and several are booted.
    #[error(
        "multiple booted {platform} simulators ({}); pick one with `--simulator <search term>`",
        .booted.join(", ")
    )]
    MultipleBootedSimulators {
        /// Requested simulator platform.
        platform: Platform,
        /// Names of the booted simulators.
        booted: Vec<String>,
    },
}

/// Resolves the target device.
///
/// # Arguments
///
/// * `toolchain` - Source of host facts and device enumeration
/// * `platform` - Explicit `--platform`
/// * `device` - `--device` selector (`host`, an id or a name)
/// * `simulator` - `--simulator` search term
///
/// # Returns
///
/// Exactly one [`Device`]; its platform is the platform of the whole run.
pub async fn resolve_device<T: Toolchain>(
    toolchain: &T,
    platform: Option<Platform>,
    device: Option<&str>,
    simulator: Option<&str>,
) -> Result<Device> {
    match (device, simulator) {
        (Some(_), Some(_)) => Err(DeviceError::ConflictingSelectors.into()),
        (Some(selector), None) => resolve_selector(toolchain, platform, selector).await,
        (None, Some(term)) => search_simulators(toolchain, platform, term).await,
        (None, None) => match platform {
            Some(platform) if platform.is_simulator() => {
                booted_simulator(toolchain, platform).await
            }
            Some(Platform::MacCatalyst) => Ok(Device::MacCatalyst),
            Some(platform) => Ok(Device::Host(platform)),
            None => toolchain
                .host_platform()
                .map(Device::Host)
                .ok_or_else(|| DeviceError::UnsupportedHost.into()),
        },
    }
}

async fn resolve_selector<T: Toolchain>(
    toolchain: &T,
    platform: Option<Platform>,
    selector: &str,
) -> Result<Device> {
    if selector.eq_ignore_ascii_case(HOST_SELECTOR) {
        let host = toolchain.host_platform().ok_or(DeviceError::UnsupportedHost)?;
        return match platform {
            None => Ok(Device::Host(host)),
            Some(requested) if requested == host => Ok(Device::Host(host)),
            Some(Platform::MacCatalyst) if host == Platform::MacOs => Ok(Device::MacCatalyst),
            Some(requested) => Err(DeviceError::PlatformMismatch {
                device: HOST_SELECTOR.to_string(),
                actual: host,
                requested,
            }
            .into()),
        };
    }

    let devices = toolchain.list_devices().await?;
    let found = match devices.iter().find(|d| d.id() == selector) {
        Some(device) => device.clone(),
        None => {
            let matches: Vec<&Device> = devices
                .iter()
                .filter(|d| d.name().eq_ignore_ascii_case(selector))
                .collect();
            match matches.as_slice() {
                [] => {
                    return Err(DeviceError::DeviceNotFound {
                        query: selector.to_string(),
                        available: devices.iter().map(|d| d.name().to_string()).collect(),
                    }
                    .into());
                }
                [only] => (*only).clone(),
                [first, rest @ ..] => {
                    log::info!(
                        "{} devices are named '{}', using {} (also matched: {})",
                        rest.len() + 1,
                        selector,
                        first,
                        rest.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")
                    );
                    (*first).clone()
                }
            }
        }
    };

    if let Some(requested) = platform
        && requested != found.platform()
    {
        return Err(DeviceError::PlatformMismatch {
            device: found.name().to_string(),
            actual: found.platform(),
            requested,
        }
        .into());
    }

    Ok(found)
}

async fn search_simulators<T: Toolchain>(
    toolchain: &T,
    platform: Option<Platform>,
    term: &str,
) -> Result<Device> {
    let simulator_platform = match platform {
        Some(platform) => Some(
            platform
                .simulator_variant()
                .ok_or(DeviceError::NoSimulatorPlatform { platform })?,
        ),
        None => None,
    };

    let needle = term.to_lowercase();
    let mut matches: Vec<Simulator> = toolchain
        .list_simulators()
        .await?
        .into_iter()
        .filter(|s| s.is_available)
        .filter(|s| simulator_platform.is_none_or(|p| s.platform == p))
        .filter(|s| s.id == term || s.name.to_lowercase().contains(&needle))
        .collect();

    // Booted first, then shortest name; stable so enumeration order breaks ties.
    matches.sort_by_key(|s| (!s.is_booted, s.name.len()));

    let mut matches = matches.into_iter();
    let chosen = matches.next().ok_or_else(|| DeviceError::SimulatorNotFound {
        query: term.to_string(),
    })?;

    let others: Vec<String> = matches.map(|s| s.name).collect();
    if !others.is_empty() {
        log::info!(
            "Using simulator '{}' for '{}' (also matched: {})",
            chosen.name,
            term,
            others.join(", ")
        );
    }

    Ok(Device::Simulator(chosen))
}

async fn booted_simulator<T: Toolchain>(toolchain: &T, platform: Platform) -> Result<Device> {
    let mut booted: Vec<Simulator> = toolchain
        .list_simulators()
        .await?
        .into_iter()
        .filter(|s| s.platform == platform && s.is_available && s.is_booted)
        .collect();

    match booted.len() {
        0 => Err(DeviceError::NoBootedSimulator { platform }.into()),
        1 => Ok(Device::Simulator(booted.remove(0))),
        _ => Err(DeviceError::MultipleBootedSimulators {
            platform,
            booted: booted.into_iter().map(|s| s.name).collect(),
        }
        .into()),
    }
}
