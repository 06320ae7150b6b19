//! Subsidiary projects built by their own builder script.

use crate::source::ProjectSource;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Display, path::PathBuf};

/// Suffix every builder script name must carry.
pub const BUILDER_SUFFIX: &str = ".rs";

/// How a project's builder is driven.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BuilderKind {
    /// One builder invocation builds every product of the project.
    #[default]
    WholeProject,
}

/// `builder = { name = "Builder.rs", type = "wholeProject" }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuilderConfiguration {
    /// Builder script path, relative to the project root.
    pub name: String,
    /// Invocation style.
    #[serde(rename = "type", default)]
    pub kind: BuilderKind,
}

/// Kind of artifact a product produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProductType {
    Executable,
    DynamicLibrary,
    StaticLibrary,
}

impl Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ProductType::Executable => "executable",
            ProductType::DynamicLibrary => "dynamic library",
            ProductType::StaticLibrary => "static library",
        })
    }
}

/// `[projects.<name>.products.<product>]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductConfiguration {
    /// Artifact kind.
    #[serde(rename = "type")]
    pub kind: ProductType,
    /// Where the builder leaves the artifact, relative to the project build directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_directory: Option<PathBuf>,
}

/// `[projects.<name>]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfiguration {
    /// Where the project's sources live.
    pub source: ProjectSource,
    /// Git revision to check out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Builder script building the products.
    pub builder: BuilderConfiguration,
    /// Products the builder produces.
    #[serde(default)]
    pub products: BTreeMap<String, ProductConfiguration>,
}

/// Validated project configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FlatProjectConfiguration {
    pub source: ProjectSource,
    pub revision: Option<String>,
    pub builder: BuilderConfiguration,
    pub products: BTreeMap<String, ProductConfiguration>,
}
