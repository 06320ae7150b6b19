//! Overlay resolution.
//!
//! Flattening turns a [`PackageConfiguration`] into a [`FlatPackageConfiguration`]
//! for one [`ResolutionContext`]. It only ever sees the current schema; older
//! files are upgraded by [`super::migration`] first.

use super::{
    AppConfiguration, ConfigurationError, FlatAppConfiguration, FlatPackageConfiguration,
    FlatProjectConfiguration, PackageConfiguration, ProjectConfiguration, ResolutionContext,
    BUILDER_SUFFIX, CURRENT_FORMAT_VERSION, ROOT_PROJECT,
    fields::{EXCLUSIVITY_RULES, ExclusivityRule, OVERLAY_FIELDS},
};
use crate::source::ProjectSource;
use std::collections::BTreeMap;

/// Flattens every app and project of `config` for `context`.
///
/// # Errors
///
/// Returns the first [`ConfigurationError`] found: format version, then
/// projects, then apps in name order.
pub fn flatten(
    config: &PackageConfiguration,
    context: ResolutionContext,
) -> Result<FlatPackageConfiguration, ConfigurationError> {
    if config.format_version != CURRENT_FORMAT_VERSION {
        return Err(ConfigurationError::UnsupportedFormatVersion {
            found: config.format_version,
            expected: CURRENT_FORMAT_VERSION,
        });
    }

    let mut projects = BTreeMap::new();
    for (name, project) in &config.projects {
        projects.insert(name.clone(), flatten_project(name, project)?);
    }

    let mut apps = BTreeMap::new();
    for (name, app) in &config.apps {
        let flat = flatten_app(name, app, context)?;
        check_dependencies(name, &flat, &projects)?;
        apps.insert(name.clone(), flat);
    }

    Ok(FlatPackageConfiguration { apps, projects })
}

/// Resolves one app's overlays for `context`.
pub fn flatten_app(
    name: &str,
    app: &AppConfiguration,
    context: ResolutionContext,
) -> Result<FlatAppConfiguration, ConfigurationError> {
    check_exclusivity(name, app, &EXCLUSIVITY_RULES)?;

    let mut flat = FlatAppConfiguration::from_base(app);
    for overlay in app
        .overlays
        .iter()
        .filter(|overlay| context.matches(&overlay.condition))
    {
        for field in OVERLAY_FIELDS.iter() {
            if (field.is_set)(overlay) {
                log::trace!("{name}: {} overrides {}", overlay.condition, field.name);
                (field.apply)(overlay, &mut flat);
            }
        }
    }

    for validate in OVERLAY_FIELDS.iter().filter_map(|field| field.validate) {
        validate(name, &flat)?;
    }

    Ok(flat)
}

fn check_exclusivity(
    name: &str,
    app: &AppConfiguration,
    rules: &[ExclusivityRule],
) -> Result<(), ConfigurationError> {
    for rule in rules {
        for (index, overlay) in app.overlays.iter().enumerate() {
            if overlay.condition == rule.condition {
                continue;
            }

            let fields: Vec<&'static str> = rule
                .fields
                .iter()
                .filter(|field| (field.is_set)(overlay))
                .map(|field| field.name)
                .collect();

            if !fields.is_empty() {
                return Err(ConfigurationError::ExclusivePropertiesViolation {
                    app: name.to_string(),
                    overlay: index,
                    overlay_condition: overlay.condition,
                    condition: rule.condition,
                    fields,
                });
            }
        }
    }
    Ok(())
}

fn flatten_project(
    name: &str,
    project: &ProjectConfiguration,
) -> Result<FlatProjectConfiguration, ConfigurationError> {
    if name == ROOT_PROJECT {
        return Err(ConfigurationError::ReservedProjectName {
            name: name.to_string(),
        });
    }

    if !project.builder.name.ends_with(BUILDER_SUFFIX) {
        return Err(ConfigurationError::InvalidBuilderName {
            project: name.to_string(),
            name: project.builder.name.clone(),
        });
    }

    if matches!(project.source, ProjectSource::Git(_) | ProjectSource::GitHub { .. })
        && project.revision.is_none()
    {
        return Err(ConfigurationError::MissingRevision {
            project: name.to_string(),
        });
    }

    Ok(FlatProjectConfiguration {
        source: project.source.clone(),
        revision: project.revision.clone(),
        builder: project.builder.clone(),
        products: project.products.clone(),
    })
}

/// Root-package dependencies are checked against the cargo manifest later.
fn check_dependencies(
    name: &str,
    app: &FlatAppConfiguration,
    projects: &BTreeMap<String, FlatProjectConfiguration>,
) -> Result<(), ConfigurationError> {
    for dependency in app.dependencies.iter().filter(|d| !d.is_root()) {
        let Some(project) = projects.get(&dependency.project) else {
            return Err(ConfigurationError::UnknownDependency {
                app: name.to_string(),
                dependency: dependency.clone(),
                available: projects.keys().cloned().collect(),
            });
        };

        if !project.products.contains_key(&dependency.product) {
            return Err(ConfigurationError::UnknownDependency {
                app: name.to_string(),
                dependency: dependency.clone(),
                available: project
                    .products
                    .keys()
                    .map(|product| format!("{}.{}", dependency.project, product))
                    .collect(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bundler::{platform::BundlerChoice, target::Platform},
        config::{Condition, Dependency, InstallMode, Overlay},
    };

    fn linux_generic() -> ResolutionContext {
        ResolutionContext {
            platform: Platform::Linux,
            bundler: BundlerChoice::LinuxGeneric,
        }
    }

    fn package(app: AppConfiguration) -> PackageConfiguration {
        let mut config = PackageConfiguration::default();
        config.apps.insert("App".to_string(), app);
        config
    }

    #[test]
    fn later_matching_overlays_win() {
        let mut app = AppConfiguration::new("com.example.app", "app", "1.0.0");
        let mut first = Overlay::new(Condition::Platform(Platform::Linux));
        first.version = Some("2.0.0".into());
        first.category = Some("Utility".into());
        let mut second = Overlay::new(Condition::Bundler(BundlerChoice::LinuxGeneric));
        second.version = Some("3.0.0".into());
        let mut other = Overlay::new(Condition::Platform(Platform::Windows));
        other.version = Some("9.9.9".into());
        app.overlays = vec![first, second, other];

        let flat = flatten_app("App", &app, linux_generic()).unwrap();
        assert_eq!(flat.version, "3.0.0");
        assert_eq!(flat.category.as_deref(), Some("Utility"));
        assert_eq!(flat.identifier, "com.example.app");
    }

    #[test]
    fn flattening_is_deterministic() {
        let mut app = AppConfiguration::new("com.example.app", "app", "1.0.0");
        let mut plist = crate::config::ValueMap::new();
        plist.insert("B".into(), toml::Value::Integer(2));
        plist.insert("A".into(), toml::Value::String("one".into()));
        let mut overlay = Overlay::new(Condition::Platform(Platform::Linux));
        overlay.plist = Some(plist);
        overlay.dbus_activatable = Some(true);
        app.overlays = vec![overlay];
        let config = package(app);

        let first = serde_json::to_string(&flatten(&config, linux_generic()).unwrap()).unwrap();
        let second = serde_json::to_string(&flatten(&config, linux_generic()).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn exclusive_fields_default_when_unset() {
        let app = AppConfiguration::new("com.example.app", "app", "1.0.0");
        let flat = flatten_app("App", &app, linux_generic()).unwrap();
        assert!(!flat.dbus_activatable);
        assert!(flat.requirements.is_empty());
        assert_eq!(flat.install_mode, InstallMode::CurrentUser);
        assert!(flat.url_schemes.is_empty());
        assert!(flat.plist.is_empty());
    }

    #[test]
    fn exclusivity_violation_names_every_field_once() {
        let mut app = AppConfiguration::new("com.example.app", "app", "1.0.0");
        let mut overlay = Overlay::new(Condition::Platform(Platform::Linux));
        overlay.requirements = Some(vec!["glibc".into()]);
        app.overlays = vec![Overlay::new(Condition::Platform(Platform::Linux)), overlay];

        let err = flatten_app("App", &app, linux_generic()).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::ExclusivePropertiesViolation {
                app: "App".into(),
                overlay: 1,
                overlay_condition: Condition::Platform(Platform::Linux),
                condition: Condition::Bundler(BundlerChoice::LinuxRpm),
                fields: vec!["requirements"],
            }
        );
    }

    #[test]
    fn exclusivity_violation_lists_every_field_of_a_multi_field_rule() {
        use crate::config::fields::{OverlayField, exclusivity_rules};
        use std::sync::LazyLock;

        // Every exclusive field moved under one condition.
        static RPM_ONLY: LazyLock<Vec<OverlayField>> = LazyLock::new(|| {
            OVERLAY_FIELDS
                .iter()
                .filter(|field| field.exclusive_to.is_some())
                .map(|field| OverlayField {
                    exclusive_to: Some(Condition::Bundler(BundlerChoice::LinuxRpm)),
                    ..*field
                })
                .collect()
        });
        let rules = exclusivity_rules(RPM_ONLY.as_slice());
        assert_eq!(rules.len(), 1);
        assert!(rules[0].fields.len() > 1);

        let mut app = AppConfiguration::new("com.example.app", "app", "1.0.0");
        let mut overlay = Overlay::new(Condition::Platform(Platform::Linux));
        overlay.dbus_activatable = Some(true);
        overlay.install_mode = Some(InstallMode::PerMachine);
        app.overlays = vec![overlay];

        let err = check_exclusivity("App", &app, &rules).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::ExclusivePropertiesViolation {
                app: "App".into(),
                overlay: 0,
                overlay_condition: Condition::Platform(Platform::Linux),
                condition: Condition::Bundler(BundlerChoice::LinuxRpm),
                fields: vec!["dbus_activatable", "install_mode"],
            }
        );
    }

    #[test]
    fn exclusivity_is_checked_even_for_non_matching_overlays() {
        let mut app = AppConfiguration::new("com.example.app", "app", "1.0.0");
        let mut overlay = Overlay::new(Condition::Platform(Platform::MacOs));
        overlay.dbus_activatable = Some(true);
        app.overlays = vec![overlay];

        let err = flatten_app("App", &app, linux_generic()).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::ExclusivePropertiesViolation { ref fields, .. }
                if fields == &vec!["dbus_activatable"]
        ));
    }

    #[test]
    fn requirements_are_validated_after_merging() {
        let mut app = AppConfiguration::new("com.example.app", "app", "1.0.0");
        let mut overlay = Overlay::new(Condition::Bundler(BundlerChoice::LinuxRpm));
        overlay.requirements = Some(vec!["glibc >= 2.31".into(), "evil; rm".into()]);
        app.overlays = vec![overlay];
        let context = ResolutionContext {
            platform: Platform::Linux,
            bundler: BundlerChoice::LinuxRpm,
        };

        let err = flatten_app("App", &app, context).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::InvalidRequirement {
                app: "App".into(),
                requirement: "evil; rm".into(),
                character: ';',
            }
        );

        // Not merged for other bundlers, so never validated there.
        assert!(flatten_app("App", &app, linux_generic()).is_ok());
    }

    #[test]
    fn projects_are_validated() {
        let toml = r#"
            format_version = 2
            [apps.App]
            identifier = "com.example.app"
            product = "app"
            version = "1.0.0"
            [projects.root]
            source = "local(vendor/root)"
            builder = { name = "Builder.rs", type = "wholeProject" }
        "#;
        let config: PackageConfiguration = toml::from_str(toml).unwrap();
        assert_eq!(
            flatten(&config, linux_generic()).unwrap_err(),
            ConfigurationError::ReservedProjectName { name: "root".into() }
        );

        let toml = r#"
            format_version = 2
            [apps.App]
            identifier = "com.example.app"
            product = "app"
            version = "1.0.0"
            [projects.tools]
            source = "git(https://github.com/example/tools)"
            builder = { name = "Builder.rs", type = "wholeProject" }
        "#;
        let config: PackageConfiguration = toml::from_str(toml).unwrap();
        assert_eq!(
            flatten(&config, linux_generic()).unwrap_err(),
            ConfigurationError::MissingRevision { project: "tools".into() }
        );

        let toml = r#"
            format_version = 2
            [apps.App]
            identifier = "com.example.app"
            product = "app"
            version = "1.0.0"
            [projects.tools]
            source = "local(tools)"
            builder = { name = "build.sh", type = "wholeProject" }
        "#;
        let config: PackageConfiguration = toml::from_str(toml).unwrap();
        assert!(matches!(
            flatten(&config, linux_generic()).unwrap_err(),
            ConfigurationError::InvalidBuilderName { .. }
        ));
    }

    #[test]
    fn dependencies_must_name_declared_products() {
        let toml = r#"
            format_version = 2
            [apps.App]
            identifier = "com.example.app"
            product = "app"
            version = "1.0.0"
            dependencies = ["helper", "tools.libgreeter", "tools.missing"]
            [projects.tools]
            source = "local(tools)"
            builder = { name = "Builder.rs", type = "wholeProject" }
            [projects.tools.products.libgreeter]
            type = "dynamicLibrary"
        "#;
        let config: PackageConfiguration = toml::from_str(toml).unwrap();
        let err = flatten(&config, linux_generic()).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::UnknownDependency {
                app: "App".into(),
                dependency: Dependency::new("tools", "missing"),
                available: vec!["tools.libgreeter".into()],
            }
        );
    }

    #[test]
    fn other_format_versions_are_rejected() {
        let mut config = package(AppConfiguration::new("com.example.app", "app", "1.0.0"));
        config.format_version = 3;
        assert_eq!(
            flatten(&config, linux_generic()).unwrap_err(),
            ConfigurationError::UnsupportedFormatVersion {
                found: 3,
                expected: CURRENT_FORMAT_VERSION
            }
        );
    }
}
