//! `Bundler.toml` configuration model.
//!
//! The on-disk file describes one or more apps plus optional subsidiary
//! projects. Apps carry conditional overlays that are resolved by [`flatten`]
//! for a single `(platform, bundler)` pair; the pipeline only ever consumes the
//! resulting [`FlatPackageConfiguration`].
//!
//! # Module Organization
//!
//! - [`app`] - apps, overlays and their flat form
//! - [`project`] - projects built by builder scripts
//! - [`fields`] - the overlay field table
//! - [`flatten`] - overlay resolution and validation
//! - [`migration`] - upgrading older configuration files
//! - [`cache`] - the per-invocation resolved app cache

pub mod app;
pub mod cache;
pub mod condition;
pub mod dependency;
pub mod error;
pub mod fields;
pub mod flatten;
pub mod migration;
pub mod project;

pub use app::{AppConfiguration, FlatAppConfiguration, InstallMode, Overlay, ValueMap};
pub use cache::{ResolvedApp, ResolvedAppCache};
pub use condition::{Condition, ResolutionContext};
pub use dependency::{Dependency, ROOT_PROJECT};
pub use error::{ConfigurationError, MigrationError};
pub use flatten::flatten;
pub use project::{
    BUILDER_SUFFIX, BuilderConfiguration, BuilderKind, FlatProjectConfiguration,
    ProductConfiguration, ProductType, ProjectConfiguration,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Format version written by and required from current configuration files.
pub const CURRENT_FORMAT_VERSION: u32 = 2;

/// Root of a current-format `Bundler.toml`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageConfiguration {
    /// Schema version, see [`CURRENT_FORMAT_VERSION`].
    pub format_version: u32,
    /// Apps by name.
    #[serde(default)]
    pub apps: BTreeMap<String, AppConfiguration>,
    /// Subsidiary projects by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub projects: BTreeMap<String, ProjectConfiguration>,
}

impl Default for PackageConfiguration {
    fn default() -> Self {
        Self {
            format_version: CURRENT_FORMAT_VERSION,
            apps: BTreeMap::new(),
            projects: BTreeMap::new(),
        }
    }
}

/// Package configuration after flattening.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlatPackageConfiguration {
    pub apps: BTreeMap<String, FlatAppConfiguration>,
    pub projects: BTreeMap<String, FlatProjectConfiguration>,
}

impl FlatPackageConfiguration {
    /// Picks the app named `name`, or the only app when no name is given.
    pub fn select_app(
        &self,
        name: Option<&str>,
    ) -> Result<(&String, &FlatAppConfiguration), ConfigurationError> {
        let available = || self.apps.keys().cloned().collect::<Vec<_>>();

        match name {
            Some(name) => self
                .apps
                .get_key_value(name)
                .ok_or_else(|| ConfigurationError::UnknownApp {
                    name: name.to_string(),
                    available: available(),
                }),
            None => {
                let mut apps = self.apps.iter();
                match (apps.next(), apps.next()) {
                    (Some(only), None) => Ok(only),
                    (None, _) => Err(ConfigurationError::NoApps),
                    (Some(_), Some(_)) => Err(ConfigurationError::AmbiguousApp {
                        available: available(),
                    }),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
        format_version = 2

        [apps.HelloWorld]
        identifier = "com.example.HelloWorld"
        product = "hello_world"
        version = "0.1.0"
        url_schemes = ["hello"]
        dependencies = ["helper", "tools.libgreeter"]

        [apps.HelloWorld.plist]
        NSHighResolutionCapable = true

        [[apps.HelloWorld.overlays]]
        condition = "platform(linux)"
        dbus_activatable = true

        [[apps.HelloWorld.overlays]]
        condition = "bundler(linuxRPM)"
        requirements = ["glibc >= 2.31"]

        [projects.tools]
        source = "git(https://github.com/example/tools)"
        revision = "v1.2.0"
        builder = { name = "Builder.rs", type = "wholeProject" }

        [projects.tools.products.libgreeter]
        type = "dynamicLibrary"
        output_directory = "out"
    "#;

    #[test]
    fn parses_the_documented_layout() {
        let config: PackageConfiguration = toml::from_str(EXAMPLE).unwrap();
        let app = &config.apps["HelloWorld"];
        assert_eq!(app.overlays.len(), 2);
        assert_eq!(
            app.dependencies.as_deref(),
            Some(&[Dependency::new(ROOT_PROJECT, "helper"), Dependency::new("tools", "libgreeter")][..])
        );
        assert_eq!(
            config.projects["tools"].products["libgreeter"].kind,
            ProductType::DynamicLibrary
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let toml = r#"
            format_version = 2
            [apps.App]
            identifier = "com.example.app"
            product = "app"
            version = "1.0.0"
            colour = "blue"
        "#;
        assert!(toml::from_str::<PackageConfiguration>(toml).is_err());
    }

    #[test]
    fn exclusive_fields_cannot_appear_on_the_base_app() {
        let toml = r#"
            format_version = 2
            [apps.App]
            identifier = "com.example.app"
            product = "app"
            version = "1.0.0"
            dbus_activatable = true
        "#;
        assert!(toml::from_str::<PackageConfiguration>(toml).is_err());
    }

    #[test]
    fn serialized_configuration_parses_back() {
        let config: PackageConfiguration = toml::from_str(EXAMPLE).unwrap();
        let encoded = toml::to_string_pretty(&config).unwrap();
        let decoded: PackageConfiguration = toml::from_str(&encoded).unwrap();
        assert_eq!(config, decoded);
    }

    #[test]
    fn app_selection() {
        let config: PackageConfiguration = toml::from_str(EXAMPLE).unwrap();
        let context = ResolutionContext {
            platform: crate::bundler::target::Platform::Linux,
            bundler: crate::bundler::platform::BundlerChoice::LinuxGeneric,
        };
        let flat = flatten(&config, context).unwrap();

        let (name, app) = flat.select_app(None).unwrap();
        assert_eq!(name, "HelloWorld");
        assert!(app.dbus_activatable);
        assert!(matches!(
            flat.select_app(Some("Other")),
            Err(ConfigurationError::UnknownApp { .. })
        ));
    }
}
