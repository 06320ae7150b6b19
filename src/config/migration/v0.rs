//! Legacy `Bundle.json`: a single flat app with camelCase keys.

use crate::config::{AppConfiguration, PackageConfiguration, ValueMap};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct BundleJson {
    app_name: Option<String>,
    product: String,
    bundle_identifier: String,
    version_string: String,
    build_number: Option<JsonValue>,
    category: Option<String>,
    #[serde(rename = "minOSVersion")]
    min_os_version: Option<String>,
    url_scheme: Option<String>,
    #[serde(default)]
    extra_info_plist_entries: BTreeMap<String, JsonValue>,
}

/// Upgrades to the current schema, returning the warnings to report.
pub(super) fn migrate(old: BundleJson) -> (PackageConfiguration, Vec<String>) {
    let mut warnings = Vec::new();
    let name = old.app_name.unwrap_or_else(|| old.product.clone());

    if let Some(version) = &old.min_os_version {
        warnings.push(format!(
            "app '{name}': minOSVersion ({version}) is no longer supported and was dropped"
        ));
    }

    let mut app = AppConfiguration::new(old.bundle_identifier, old.product, old.version_string);
    app.category = old.category;
    app.url_schemes = old.url_scheme.map(|scheme| vec![scheme]);

    if let Some(build_number) = old.build_number.as_ref().and_then(json_to_toml) {
        let mut metadata = ValueMap::new();
        metadata.insert("build_number".to_string(), build_number);
        app.metadata = Some(metadata);
    }

    if !old.extra_info_plist_entries.is_empty() {
        let mut plist = ValueMap::new();
        let mut dropped = 0;
        for (key, value) in &old.extra_info_plist_entries {
            match json_to_toml(value) {
                Some(value) => {
                    plist.insert(key.clone(), value);
                }
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            warnings.push(format!(
                "app '{name}': dropped {dropped} extraInfoPlistEntries value(s) that cannot be represented in Bundler.toml"
            ));
        }
        if !plist.is_empty() {
            app.plist = Some(plist);
        }
    }

    let mut config = PackageConfiguration::default();
    config.apps.insert(name, app);
    (config, warnings)
}

/// Converts a JSON value, failing on `null` anywhere or integers beyond `i64`.
fn json_to_toml(value: &JsonValue) -> Option<toml::Value> {
    match value {
        JsonValue::Null => None,
        JsonValue::Bool(b) => Some(toml::Value::Boolean(*b)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(toml::Value::Integer(i))
            } else if n.is_u64() {
                None
            } else {
                n.as_f64().map(toml::Value::Float)
            }
        }
        JsonValue::String(s) => Some(toml::Value::String(s.clone())),
        JsonValue::Array(items) => items
            .iter()
            .map(json_to_toml)
            .collect::<Option<Vec<_>>>()
            .map(toml::Value::Array),
        JsonValue::Object(entries) => entries
            .iter()
            .map(|(key, value)| json_to_toml(value).map(|value| (key.clone(), value)))
            .collect::<Option<toml::Table>>()
            .map(toml::Value::Table),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CURRENT_FORMAT_VERSION;

    fn parse(json: &str) -> BundleJson {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn mandatory_fields_survive() {
        let (config, warnings) = migrate(parse(
            r#"{"product": "hello", "bundleIdentifier": "com.example.hello", "versionString": "1.2.3"}"#,
        ));

        assert_eq!(config.format_version, CURRENT_FORMAT_VERSION);
        assert!(warnings.is_empty());
        let app = &config.apps["hello"];
        assert_eq!(app.identifier, "com.example.hello");
        assert_eq!(app.product, "hello");
        assert_eq!(app.version, "1.2.3");
        assert!(app.overlays.is_empty());
    }

    #[test]
    fn promotes_single_values() {
        let (config, warnings) = migrate(parse(
            r#"{
                "appName": "Hello",
                "product": "hello",
                "bundleIdentifier": "com.example.hello",
                "versionString": "1.2.3",
                "buildNumber": 42,
                "urlScheme": "hello",
                "minOSVersion": "11.0"
            }"#,
        ));

        let app = &config.apps["Hello"];
        assert_eq!(app.url_schemes.as_deref(), Some(&["hello".to_string()][..]));
        assert_eq!(
            app.metadata.as_ref().and_then(|m| m.get("build_number")),
            Some(&toml::Value::Integer(42))
        );
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn unrepresentable_plist_entries_are_dropped_with_one_warning() {
        let (config, warnings) = migrate(parse(
            r#"{
                "product": "hello",
                "bundleIdentifier": "com.example.hello",
                "versionString": "1.2.3",
                "extraInfoPlistEntries": {
                    "Kept": {"nested": [1, 2.5, "x"]},
                    "Null": null,
                    "NestedNull": [1, null],
                    "Huge": 18446744073709551615
                }
            }"#,
        ));

        let plist = config.apps["hello"].plist.as_ref().unwrap();
        assert_eq!(plist.len(), 1);
        assert!(plist.contains_key("Kept"));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("dropped 3"));
    }
}
