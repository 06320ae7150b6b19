//! Declarative table of overlay fields.
//!
//! Each row says how to detect the field in an overlay, how to merge it into a
//! flat app, which condition (if any) it is exclusive to, and how to validate
//! the merged value. Exclusivity checks, merging and post-merge validation are
//! all driven from this one table.

use super::{
    Condition, ConfigurationError, FlatAppConfiguration, Overlay,
};
use crate::bundler::{platform::BundlerChoice, target::Platform};
use std::sync::LazyLock;

/// Post-merge validator: app name and flattened value.
pub type Validator = fn(&str, &FlatAppConfiguration) -> Result<(), ConfigurationError>;

/// One overlay field.
pub struct OverlayField {
    /// Key as written in `Bundler.toml`.
    pub name: &'static str,
    /// Condition an overlay must have to set this field.
    pub exclusive_to: Option<Condition>,
    /// Whether the overlay sets the field.
    pub is_set: fn(&Overlay) -> bool,
    /// Copies the overlay's value into the flat app (only called when set).
    pub apply: fn(&Overlay, &mut FlatAppConfiguration),
    /// Check run against the flattened value.
    pub validate: Option<Validator>,
}

impl std::fmt::Debug for OverlayField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayField")
            .field("name", &self.name)
            .field("exclusive_to", &self.exclusive_to)
            .field("validated", &self.validate.is_some())
            .finish()
    }
}

/// Fields sharing one exclusivity condition.
#[derive(Debug)]
pub struct ExclusivityRule {
    /// Only overlays with exactly this condition may set the fields.
    pub condition: Condition,
    /// Fields covered by the rule, in table order.
    pub fields: Vec<&'static OverlayField>,
}

/// Every overlay field, in declaration order.
pub static OVERLAY_FIELDS: LazyLock<Vec<OverlayField>> = LazyLock::new(|| {
    vec![
        OverlayField {
            name: "identifier",
            exclusive_to: None,
            is_set: |o| o.identifier.is_some(),
            apply: |o, flat| {
                if let Some(value) = &o.identifier {
                    flat.identifier = value.clone();
                }
            },
            validate: None,
        },
        OverlayField {
            name: "product",
            exclusive_to: None,
            is_set: |o| o.product.is_some(),
            apply: |o, flat| {
                if let Some(value) = &o.product {
                    flat.product = value.clone();
                }
            },
            validate: None,
        },
        OverlayField {
            name: "version",
            exclusive_to: None,
            is_set: |o| o.version.is_some(),
            apply: |o, flat| {
                if let Some(value) = &o.version {
                    flat.version = value.clone();
                }
            },
            validate: None,
        },
        OverlayField {
            name: "category",
            exclusive_to: None,
            is_set: |o| o.category.is_some(),
            apply: |o, flat| {
                if o.category.is_some() {
                    flat.category = o.category.clone();
                }
            },
            validate: None,
        },
        OverlayField {
            name: "icon",
            exclusive_to: None,
            is_set: |o| o.icon.is_some(),
            apply: |o, flat| {
                if o.icon.is_some() {
                    flat.icon = o.icon.clone();
                }
            },
            validate: None,
        },
        OverlayField {
            name: "url_schemes",
            exclusive_to: None,
            is_set: |o| o.url_schemes.is_some(),
            apply: |o, flat| {
                if let Some(value) = &o.url_schemes {
                    flat.url_schemes = value.clone();
                }
            },
            validate: None,
        },
        OverlayField {
            name: "plist",
            exclusive_to: None,
            is_set: |o| o.plist.is_some(),
            apply: |o, flat| {
                if let Some(value) = &o.plist {
                    flat.plist = value.clone();
                }
            },
            validate: None,
        },
        OverlayField {
            name: "metadata",
            exclusive_to: None,
            is_set: |o| o.metadata.is_some(),
            apply: |o, flat| {
                if let Some(value) = &o.metadata {
                    flat.metadata = value.clone();
                }
            },
            validate: None,
        },
        OverlayField {
            name: "dependencies",
            exclusive_to: None,
            is_set: |o| o.dependencies.is_some(),
            apply: |o, flat| {
                if let Some(value) = &o.dependencies {
                    flat.dependencies = value.clone();
                }
            },
            validate: None,
        },
        OverlayField {
            name: "dbus_activatable",
            exclusive_to: Some(Condition::Platform(Platform::Linux)),
            is_set: |o| o.dbus_activatable.is_some(),
            apply: |o, flat| {
                if let Some(value) = o.dbus_activatable {
                    flat.dbus_activatable = value;
                }
            },
            validate: None,
        },
        OverlayField {
            name: "requirements",
            exclusive_to: Some(Condition::Bundler(BundlerChoice::LinuxRpm)),
            is_set: |o| o.requirements.is_some(),
            apply: |o, flat| {
                if let Some(value) = &o.requirements {
                    flat.requirements = value.clone();
                }
            },
            validate: Some(validate_requirements),
        },
        OverlayField {
            name: "install_mode",
            exclusive_to: Some(Condition::Bundler(BundlerChoice::WindowsInstaller)),
            is_set: |o| o.install_mode.is_some(),
            apply: |o, flat| {
                if let Some(value) = o.install_mode {
                    flat.install_mode = value;
                }
            },
            validate: None,
        },
    ]
});

/// Exclusive fields of [`OVERLAY_FIELDS`] grouped by condition.
pub static EXCLUSIVITY_RULES: LazyLock<Vec<ExclusivityRule>> =
    LazyLock::new(|| exclusivity_rules(OVERLAY_FIELDS.as_slice()));

/// Groups the exclusive fields of `fields` by condition, in order of first
/// appearance.
pub fn exclusivity_rules(fields: &'static [OverlayField]) -> Vec<ExclusivityRule> {
    let mut rules: Vec<ExclusivityRule> = Vec::new();
    for field in fields {
        let Some(condition) = field.exclusive_to else {
            continue;
        };
        match rules.iter_mut().find(|rule| rule.condition == condition) {
            Some(rule) => rule.fields.push(field),
            None => rules.push(ExclusivityRule {
                condition,
                fields: vec![field],
            }),
        }
    }
    rules
}

fn is_requirement_character(c: char) -> bool {
    c.is_ascii_alphanumeric() || " ._+-<>=():".contains(c)
}

fn validate_requirements(app: &str, flat: &FlatAppConfiguration) -> Result<(), ConfigurationError> {
    for requirement in &flat.requirements {
        if requirement.trim().is_empty() {
            return Err(ConfigurationError::EmptyRequirement {
                app: app.to_string(),
            });
        }
        if let Some(character) = requirement.chars().find(|c| !is_requirement_character(*c)) {
            return Err(ConfigurationError::InvalidRequirement {
                app: app.to_string(),
                requirement: requirement.clone(),
                character,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_exclusive_field_belongs_to_one_rule() {
        let exclusive = OVERLAY_FIELDS
            .iter()
            .filter(|field| field.exclusive_to.is_some())
            .count();
        let covered: usize = EXCLUSIVITY_RULES.iter().map(|rule| rule.fields.len()).sum();
        assert_eq!(exclusive, covered);
        assert_eq!(EXCLUSIVITY_RULES.len(), 3);
    }

    #[test]
    fn field_names_are_unique() {
        let mut names: Vec<_> = OVERLAY_FIELDS.iter().map(|field| field.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), OVERLAY_FIELDS.len());
    }

    #[test]
    fn requirement_allow_list() {
        assert!("glibc >= 2.31".chars().all(is_requirement_character));
        assert!("libfoo(x86-64)".chars().all(is_requirement_character));
        assert!(!is_requirement_character(';'));
        assert!(!is_requirement_character('$'));
    }
}
