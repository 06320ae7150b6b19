//! Metadata trailer appended to the built executable.
//!
//! Layout at the end of the file:
//!
//! ```text
//! <compact JSON> <JSON length: u64 little endian> <b"KDGNMETA">
//! ```
//!
//! Loaders ignore trailing bytes, so the executable keeps working; the running
//! app finds its metadata by reading its own file backwards.
//!
//! Apple code signatures cover the whole Mach-O, so Apple bundles never get a
//! trailer. The same JSON goes into the bundle resources as
//! [`METADATA_RESOURCE`] instead.

use super::{Result, error::ErrorExt, target::Platform};
use crate::config::FlatAppConfiguration;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/// Marks the end of an embedded metadata trailer.
pub const METADATA_MAGIC: &[u8; 8] = b"KDGNMETA";

const TRAILER_LEN: usize = 16;

/// Metadata file name inside Apple bundle resources.
pub const METADATA_RESOURCE: &str = "kodegen-metadata.json";

/// Whether metadata for `platform` is appended to the executable.
pub fn embeds_in_executable(platform: Platform) -> bool {
    !platform.is_apple()
}

/// What the running app can read about itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedMetadata {
    /// App identifier.
    pub identifier: String,
    /// App version.
    pub version: String,
    /// The app's `metadata` table.
    pub metadata: BTreeMap<String, JsonValue>,
}

impl EmbeddedMetadata {
    /// Metadata for a flattened app.
    pub fn for_app(app: &FlatAppConfiguration) -> Self {
        Self {
            identifier: app.identifier.clone(),
            version: app.version.clone(),
            metadata: app
                .metadata
                .iter()
                .map(|(key, value)| (key.clone(), toml_to_json(value)))
                .collect(),
        }
    }
}

/// Converts a TOML value; datetimes become their RFC 3339 text.
pub fn toml_to_json(value: &toml::Value) -> JsonValue {
    match value {
        toml::Value::String(s) => JsonValue::String(s.clone()),
        toml::Value::Integer(i) => JsonValue::from(*i),
        toml::Value::Float(f) => JsonValue::from(*f),
        toml::Value::Boolean(b) => JsonValue::Bool(*b),
        toml::Value::Datetime(d) => JsonValue::String(d.to_string()),
        toml::Value::Array(items) => JsonValue::Array(items.iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => JsonValue::Object(
            table
                .iter()
                .map(|(key, value)| (key.clone(), toml_to_json(value)))
                .collect(),
        ),
    }
}

/// Length of the file body before an existing trailer, if there is one.
fn body_len(bytes: &[u8]) -> Option<usize> {
    let magic_start = bytes.len().checked_sub(METADATA_MAGIC.len())?;
    if &bytes[magic_start..] != METADATA_MAGIC {
        return None;
    }

    let len_start = bytes.len().checked_sub(TRAILER_LEN)?;
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[len_start..magic_start]);
    let json_len = usize::try_from(u64::from_le_bytes(len_bytes)).ok()?;
    len_start.checked_sub(json_len)
}

/// Appends `metadata` to `bytes`, replacing an existing trailer.
pub fn append_trailer(bytes: &mut Vec<u8>, metadata: &EmbeddedMetadata) -> Result<()> {
    if let Some(body) = body_len(bytes) {
        bytes.truncate(body);
    }

    let json = serde_json::to_vec(metadata)?;
    let json_len = json.len() as u64;
    bytes.extend_from_slice(&json);
    bytes.extend_from_slice(&json_len.to_le_bytes());
    bytes.extend_from_slice(METADATA_MAGIC);
    Ok(())
}

/// Reads the trailer from a file's contents.
pub fn read_trailer(bytes: &[u8]) -> Result<Option<EmbeddedMetadata>> {
    let Some(body) = body_len(bytes) else {
        return Ok(None);
    };
    let json = &bytes[body..bytes.len() - TRAILER_LEN];
    Ok(Some(serde_json::from_slice(json)?))
}

/// Embeds the app's metadata into `executable` in place.
pub async fn embed_metadata(executable: &Path, app: &FlatAppConfiguration) -> Result<()> {
    let mut bytes = tokio::fs::read(executable)
        .await
        .fs_context("reading executable", executable)?;

    append_trailer(&mut bytes, &EmbeddedMetadata::for_app(app))?;

    tokio::fs::write(executable, bytes)
        .await
        .fs_context("writing executable", executable)?;
    log::debug!("Embedded metadata into {}", executable.display());
    Ok(())
}

/// Writes the app's metadata as [`METADATA_RESOURCE`] into `resources_dir`.
pub async fn write_metadata_resource(
    resources_dir: &Path,
    app: &FlatAppConfiguration,
) -> Result<PathBuf> {
    let path = resources_dir.join(METADATA_RESOURCE);
    let json = serde_json::to_vec(&EmbeddedMetadata::for_app(app))?;
    tokio::fs::create_dir_all(resources_dir)
        .await
        .fs_context("creating resources directory", resources_dir)?;
    tokio::fs::write(&path, json)
        .await
        .fs_context("writing metadata resource", &path)?;
    log::debug!("Wrote metadata to {}", path.display());
    Ok(path)
}

/// Reads embedded metadata for an executable; `None` when it has none.
///
/// Looks for a trailer first, then for [`METADATA_RESOURCE`] in
/// `../Resources` (macOS layout) and next to the executable (flat layout).
pub async fn read_embedded_metadata(executable: &Path) -> Result<Option<EmbeddedMetadata>> {
    let bytes = tokio::fs::read(executable)
        .await
        .fs_context("reading executable", executable)?;
    if let Some(metadata) = read_trailer(&bytes)? {
        return Ok(Some(metadata));
    }

    let Some(dir) = executable.parent() else {
        return Ok(None);
    };
    for candidate in [
        dir.join("../Resources").join(METADATA_RESOURCE),
        dir.join(METADATA_RESOURCE),
    ] {
        if candidate.is_file() {
            let json = tokio::fs::read(&candidate)
                .await
                .fs_context("reading metadata resource", &candidate)?;
            return Ok(Some(serde_json::from_slice(&json)?));
        }
    }
    Ok(None)
}
