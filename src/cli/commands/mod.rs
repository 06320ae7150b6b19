//! Command execution for `bundle`, `run` and `migrate`.
//!
//! Every command returns the process exit code; failures propagate as
//! [`crate::error::BundlerError`] and are rendered once by `main`.

mod bundle;
mod migrate;
mod run;

pub use bundle::execute as bundle;
pub use migrate::execute as migrate;
pub use run::execute as run;

use super::RuntimeConfig;
use crate::bundler::BundleReport;

/// Prints where the bundle is, or would be.
fn print_report(config: &RuntimeConfig, report: &BundleReport) -> std::io::Result<()> {
    let ctx = &report.context;
    if report.dry_run {
        config.section(&format!("{} (dry run)", ctx.app_name))?;
    } else {
        config.section(&ctx.app_name)?;
    }

    config.indent(&format!("Device:   {}", ctx.device))?;
    config.indent(&format!("Bundler:  {}", ctx.bundler))?;
    config.indent(&format!("Bundle:   {}", report.structure.root.display()))?;
    if let Some(executable) = &report.structure.executable {
        config.indent(&format!("Binary:   {}", executable.display()))?;
    }
    for artifact in &report.structure.artifacts {
        config.indent(&format!("Artifact: {}", artifact.display()))?;
    }
    if let Some(checksum) = &report.checksum {
        config.verbose_println(&format!("  SHA-256:  {checksum}"))?;
    }
    if let Some(copied_to) = &report.copied_to {
        config.indent(&format!("Copied:   {}", copied_to.display()))?;
    }
    Ok(())
}
