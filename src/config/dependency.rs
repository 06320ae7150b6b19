//! References from an app to products it needs built first.

use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

/// Project name standing for the package the configuration lives in.
pub const ROOT_PROJECT: &str = "root";

/// A `project.product` reference.
///
/// A bare `product` refers to a product of the root package.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Dependency {
    /// Project providing the product, [`ROOT_PROJECT`] for the package itself.
    pub project: String,
    /// Product name inside the project.
    pub product: String,
}

impl Dependency {
    /// Creates a dependency on `product` of `project`.
    pub fn new(project: impl Into<String>, product: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            product: product.into(),
        }
    }

    /// Whether the product is built by the root package.
    pub fn is_root(&self) -> bool {
        self.project == ROOT_PROJECT
    }
}

impl Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_root() {
            f.write_str(&self.product)
        } else {
            write!(f, "{}.{}", self.project, self.product)
        }
    }
}

impl FromStr for Dependency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (project, product) = match s.split_once('.') {
            Some((project, product)) => (project, product),
            None => (ROOT_PROJECT, s),
        };

        if project.is_empty() || product.is_empty() || product.contains('.') {
            return Err(format!(
                "invalid dependency '{s}', expected 'project.product' or 'product'"
            ));
        }

        Ok(Dependency::new(project, product))
    }
}

impl TryFrom<String> for Dependency {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Dependency> for String {
    fn from(dependency: Dependency) -> Self {
        dependency.to_string()
    }
}
