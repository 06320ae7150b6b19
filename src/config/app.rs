//! App configuration as written by the user, overlays included.

use super::{Condition, Dependency};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Display, path::PathBuf};

/// Open-ended dictionary of user values (Info.plist entries, embedded metadata).
pub type ValueMap = BTreeMap<String, toml::Value>;

/// Who a Windows installer installs for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InstallMode {
    /// Installs into the user's profile, no elevation required.
    #[default]
    CurrentUser,
    /// Installs for every user, requires elevation.
    PerMachine,
    /// Lets the user pick at install time.
    Both,
}

impl Display for InstallMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            InstallMode::CurrentUser => "currentUser",
            InstallMode::PerMachine => "perMachine",
            InstallMode::Both => "both",
        })
    }
}

/// One `[apps.<name>]` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfiguration {
    /// Reverse-DNS identifier.
    pub identifier: String,
    /// Cargo binary target providing the executable.
    pub product: String,
    /// User-facing version string.
    pub version: String,
    /// Store/launcher category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Package-relative icon file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<PathBuf>,
    /// URL schemes the app handles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_schemes: Option<Vec<String>>,
    /// Extra platform metadata manifest entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plist: Option<ValueMap>,
    /// Values embedded into the executable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ValueMap>,
    /// Products built before the app.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<Dependency>>,
    /// Conditional overrides, applied in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overlays: Vec<Overlay>,
}

impl AppConfiguration {
    /// Creates an app with only the mandatory fields set.
    pub fn new(
        identifier: impl Into<String>,
        product: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            product: product.into(),
            version: version.into(),
            category: None,
            icon: None,
            url_schemes: None,
            plist: None,
            metadata: None,
            dependencies: None,
            overlays: Vec::new(),
        }
    }
}

/// A `[[apps.<name>.overlays]]` entry.
///
/// An absent field leaves the merged value untouched; there is no way to
/// clear a value set by the base configuration or an earlier overlay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Overlay {
    /// When the overlay applies.
    pub condition: Condition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_schemes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plist: Option<ValueMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ValueMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<Dependency>>,
    /// Registers the app as D-Bus activatable. Linux only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dbus_activatable: Option<bool>,
    /// RPM `Requires:` entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Vec<String>>,
    /// NSIS install mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_mode: Option<InstallMode>,
}

impl Overlay {
    /// Creates an overlay that sets nothing.
    pub fn new(condition: Condition) -> Self {
        Self {
            condition,
            identifier: None,
            product: None,
            version: None,
            category: None,
            icon: None,
            url_schemes: None,
            plist: None,
            metadata: None,
            dependencies: None,
            dbus_activatable: None,
            requirements: None,
            install_mode: None,
        }
    }
}

/// App configuration with overlays resolved; the only shape the pipeline reads.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlatAppConfiguration {
    pub identifier: String,
    pub product: String,
    pub version: String,
    pub category: Option<String>,
    pub icon: Option<PathBuf>,
    pub url_schemes: Vec<String>,
    pub plist: ValueMap,
    pub metadata: ValueMap,
    pub dependencies: Vec<Dependency>,
    pub dbus_activatable: bool,
    pub requirements: Vec<String>,
    pub install_mode: InstallMode,
}

impl FlatAppConfiguration {
    /// Base values with collections emptied and exclusive fields at their defaults.
    pub(crate) fn from_base(app: &AppConfiguration) -> Self {
        Self {
            identifier: app.identifier.clone(),
            product: app.product.clone(),
            version: app.version.clone(),
            category: app.category.clone(),
            icon: app.icon.clone(),
            url_schemes: app.url_schemes.clone().unwrap_or_default(),
            plist: app.plist.clone().unwrap_or_default(),
            metadata: app.metadata.clone().unwrap_or_default(),
            dependencies: app.dependencies.clone().unwrap_or_default(),
            dbus_activatable: false,
            requirements: Vec::new(),
            install_mode: InstallMode::default(),
        }
    }
}
