use crate::cli::{RuntimeConfig, args::MigrateArgs};
use crate::config::migration::{self, MigrationMode, MigrationOutcome};
use crate::error::Result;

/// Rewrites the package configuration in the current format.
pub async fn execute(args: &MigrateArgs, config: &RuntimeConfig) -> Result<i32> {
    let loaded = migration::load(&args.directory, MigrationMode::Rewrite).await?;

    match &loaded.outcome {
        MigrationOutcome::AlreadyUpToDate => {
            config.success(&format!("{} is already up to date", loaded.path.display()))?;
        }
        MigrationOutcome::Migrated {
            from,
            warnings,
            backup,
        } => {
            config.success(&format!(
                "Migrated {} from the {} format",
                loaded.path.display(),
                from
            ))?;
            if let Some(backup) = backup {
                config.indent(&format!("Original kept at {}", backup.display()))?;
            }
            if !warnings.is_empty() {
                config.warn(&format!(
                    "{} setting(s) could not be carried over; see the warnings above",
                    warnings.len()
                ))?;
            }
        }
    }
    Ok(0)
}
