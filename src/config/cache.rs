//! Per-invocation cache of the resolved app.
//!
//! The top-level command owns one [`ResolvedAppCache`] and hands it to every
//! pipeline run it drives, so `run` reuses what `bundle` already resolved.
//! The cache is write-once: a second resolution for a different context or
//! app is an error rather than a silent re-resolve.

use super::{
    ConfigurationError, FlatAppConfiguration, FlatProjectConfiguration, ResolutionContext,
    flatten,
    migration::{self, MigrationMode, MigrationOutcome},
};
use crate::bundler::{Error, Result};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/// An app flattened for one resolution context.
#[derive(Clone, Debug)]
pub struct ResolvedApp {
    /// Context the configuration was flattened for.
    pub context: ResolutionContext,
    /// Name of the selected app.
    pub name: String,
    /// The flattened app.
    pub app: FlatAppConfiguration,
    /// Every flattened project of the package.
    pub projects: BTreeMap<String, FlatProjectConfiguration>,
    /// Configuration file the app was read from.
    pub path: PathBuf,
    /// Migration performed while loading.
    pub migration: MigrationOutcome,
}

impl ResolvedApp {
    fn ensure_matches(&self, context: ResolutionContext, app: Option<&str>) -> Result<()> {
        let same_app = app.is_none_or(|name| name == self.name);
        if self.context == context && same_app {
            return Ok(());
        }

        Err(ConfigurationError::ResolutionContextChanged {
            cached: format!("app '{}' on {}", self.name, self.context),
            requested: format!("app '{}' on {}", app.unwrap_or(&self.name), context),
        }
        .into())
    }
}

/// Write-once holder of the [`ResolvedApp`].
#[derive(Debug, Default)]
pub struct ResolvedAppCache {
    resolved: Option<ResolvedApp>,
}

impl ResolvedAppCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The resolved app, if anything was resolved yet.
    pub fn get(&self) -> Option<&ResolvedApp> {
        self.resolved.as_ref()
    }

    /// Loads (migrating in memory), flattens and selects the app on first use;
    /// returns the cached result afterwards.
    ///
    /// # Errors
    ///
    /// Configuration and migration failures, or
    /// [`ConfigurationError::ResolutionContextChanged`] when the cache already
    /// holds a different resolution.
    pub async fn resolve(
        &mut self,
        directory: &Path,
        context: ResolutionContext,
        app: Option<&str>,
    ) -> Result<&ResolvedApp> {
        match self.resolved {
            Some(ref existing) => {
                log::debug!("Reusing resolved configuration for app '{}'", existing.name);
                existing.ensure_matches(context, app)?;
            }
            None => {
                let loaded = migration::load(directory, MigrationMode::ReadOnly).await?;
                let package = flatten(&loaded.configuration, context)?;
                let (name, flat) = package.select_app(app)?;
                log::debug!("Resolved app '{}' for {}", name, context);

                self.resolved = Some(ResolvedApp {
                    context,
                    name: name.clone(),
                    app: flat.clone(),
                    projects: package.projects.clone(),
                    path: loaded.path,
                    migration: loaded.outcome,
                });
            }
        }

        self.resolved
            .as_ref()
            .ok_or_else(|| Error::GenericError("resolved app cache is empty".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{platform::BundlerChoice, target::Platform};

    const CONFIG: &str = r#"
format_version = 2
[apps.App]
identifier = "com.example.app"
product = "app"
version = "1.0.0"
"#;

    fn context(bundler: BundlerChoice) -> ResolutionContext {
        ResolutionContext {
            platform: Platform::Linux,
            bundler,
        }
    }

    #[tokio::test]
    async fn second_resolution_reuses_the_first() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Bundler.toml"), CONFIG).unwrap();

        let mut cache = ResolvedAppCache::new();
        cache
            .resolve(dir.path(), context(BundlerChoice::LinuxGeneric), None)
            .await
            .unwrap();

        // The file is gone, so a second load would fail.
        std::fs::remove_file(dir.path().join("Bundler.toml")).unwrap();
        let resolved = cache
            .resolve(dir.path(), context(BundlerChoice::LinuxGeneric), Some("App"))
            .await
            .unwrap();
        assert_eq!(resolved.name, "App");
    }

    #[tokio::test]
    async fn different_context_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Bundler.toml"), CONFIG).unwrap();

        let mut cache = ResolvedAppCache::new();
        cache
            .resolve(dir.path(), context(BundlerChoice::LinuxGeneric), None)
            .await
            .unwrap();

        let err = cache
            .resolve(dir.path(), context(BundlerChoice::LinuxRpm), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::ResolutionContextChanged { .. })
        ));
    }
}
