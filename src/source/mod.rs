//! Project source resolution

use crate::bundler::{
    error::{Context, Error, ErrorExt, Result},
    utils::process,
};
use path_absolutize::Absolutize;
use serde::{Deserialize, Serialize};
use std::{
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
};
use url::Url;

/// Where a project's sources come from.
///
/// Written as `git(<url>)`, `local(<path>)` or `github(<org>/<repo>)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProjectSource {
    /// Any git remote.
    Git(Url),
    /// A directory relative to the package root.
    Local(PathBuf),
    /// Shorthand for a GitHub repository.
    GitHub { org: String, repo: String },
}

impl FromStr for ProjectSource {
    type Err = String;

    fn from_str(source: &str) -> std::result::Result<Self, Self::Err> {
        let source = source.trim();
        let (kind, rest) = source
            .split_once('(')
            .ok_or_else(|| format!("invalid source '{source}', expected git(..), local(..) or github(..)"))?;
        let value = rest
            .strip_suffix(')')
            .ok_or_else(|| format!("invalid source '{source}', missing closing parenthesis"))?
            .trim();

        match kind.trim() {
            "git" => Url::parse(value)
                .map(Self::Git)
                .map_err(|e| format!("invalid git URL '{value}': {e}")),
            "local" if !value.is_empty() => Ok(Self::Local(PathBuf::from(value))),
            "github" => {
                // GitHub org/repo: exactly one '/', both halves non-empty
                match value.split_once('/') {
                    Some((org, repo)) if !org.is_empty() && !repo.is_empty() && !repo.contains('/') => {
                        Ok(Self::GitHub {
                            org: org.to_string(),
                            repo: repo.to_string(),
                        })
                    }
                    _ => Err(format!("invalid GitHub repository '{value}', expected org/repo")),
                }
            }
            other => Err(format!("invalid source '{source}', unknown kind '{other}'")),
        }
    }
}

impl Display for ProjectSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Git(url) => write!(f, "git({url})"),
            Self::Local(path) => write!(f, "local({})", path.display()),
            Self::GitHub { org, repo } => write!(f, "github({org}/{repo})"),
        }
    }
}

impl TryFrom<String> for ProjectSource {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProjectSource> for String {
    fn from(source: ProjectSource) -> Self {
        source.to_string()
    }
}

impl ProjectSource {
    /// Remote to clone from, `None` for local sources.
    pub fn clone_url(&self) -> Option<String> {
        match self {
            Self::Git(url) => Some(url.to_string()),
            Self::GitHub { org, repo } => Some(format!("https://github.com/{}/{}.git", org, repo)),
            Self::Local(_) => None,
        }
    }

    /// Makes the project's sources available on disk and returns their root.
    ///
    /// Local sources resolve against `package_dir`. Remote sources are cloned
    /// into `checkout_dir` (or updated when already cloned) and `revision` is
    /// checked out.
    pub async fn fetch(
        &self,
        package_dir: &Path,
        checkout_dir: &Path,
        revision: Option<&str>,
    ) -> Result<PathBuf> {
        if let Self::Local(path) = self {
            let resolved = path
                .absolutize_from(package_dir)
                .fs_context("resolving local project path", path)?
                .to_path_buf();
            if !resolved.is_dir() {
                return Err(Error::MissingArtifact {
                    description: "local project directory".to_string(),
                    path: resolved,
                });
            }
            return Ok(resolved);
        }

        let url = self
            .clone_url()
            .context("remote project sources always have a clone URL")?;

        if checkout_dir.join(".git").exists() {
            log::info!("Updating {}", checkout_dir.display());
            process::output(
                tokio::process::Command::new("git")
                    .arg("-C")
                    .arg(checkout_dir)
                    .args(["fetch", "--tags", "origin"]),
            )
            .await?;
        } else {
            log::info!("Cloning {}", url);
            if let Some(parent) = checkout_dir.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .fs_context("creating project checkout directory", parent)?;
            }
            process::output(
                tokio::process::Command::new("git")
                    .arg("clone")
                    .arg(&url)
                    .arg(checkout_dir),
            )
            .await?;
        }

        if let Some(revision) = revision {
            process::output(
                tokio::process::Command::new("git")
                    .arg("-C")
                    .arg(checkout_dir)
                    .args(["checkout", "--quiet", revision]),
            )
            .await?;
        }

        Ok(checkout_dir.to_path_buf())
    }
}
