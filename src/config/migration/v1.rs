//! Previous-generation `Bundler.toml` (no `format_version` key, no overlays).

use crate::config::{
    AppConfiguration, Dependency, PackageConfiguration, ProjectConfiguration, ValueMap,
};
use serde::Deserialize;
use std::{collections::BTreeMap, path::PathBuf};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct PackageConfigurationV1 {
    #[serde(default)]
    apps: BTreeMap<String, AppConfigurationV1>,
    #[serde(default)]
    projects: BTreeMap<String, ProjectConfiguration>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AppConfigurationV1 {
    identifier: String,
    product: String,
    version: String,
    category: Option<String>,
    icon: Option<PathBuf>,
    url_schemes: Option<Vec<String>>,
    extra_plist_entries: Option<ValueMap>,
    metadata: Option<ValueMap>,
    dependencies: Option<Vec<Dependency>>,
    minimum_macos_version: Option<String>,
    minimum_ios_version: Option<String>,
}

/// Upgrades to the current schema, returning the warnings to report.
pub(super) fn migrate(old: PackageConfigurationV1) -> (PackageConfiguration, Vec<String>) {
    let mut warnings = Vec::new();
    let mut apps = BTreeMap::new();

    for (name, app) in old.apps {
        if let Some(version) = &app.minimum_macos_version {
            warnings.push(format!(
                "app '{name}': minimum_macos_version ({version}) is no longer supported and was dropped"
            ));
        }
        if let Some(version) = &app.minimum_ios_version {
            warnings.push(format!(
                "app '{name}': minimum_ios_version ({version}) is no longer supported and was dropped"
            ));
        }

        let mut migrated = AppConfiguration::new(app.identifier, app.product, app.version);
        migrated.category = app.category;
        migrated.icon = app.icon;
        migrated.url_schemes = app.url_schemes;
        migrated.plist = app.extra_plist_entries;
        migrated.metadata = app.metadata;
        migrated.dependencies = app.dependencies;
        apps.insert(name, migrated);
    }

    let config = PackageConfiguration {
        apps,
        projects: old.projects,
        ..PackageConfiguration::default()
    };
    (config, warnings)
}
