use super::print_report;
use crate::bundler::Bundler;
use crate::cli::{RuntimeConfig, args::BundleArgs};
use crate::config::ResolvedAppCache;
use crate::error::{CliError, Result};

/// Builds and packages the app.
pub async fn execute(
    args: &BundleArgs,
    config: &RuntimeConfig,
    cache: &mut ResolvedAppCache,
) -> Result<i32> {
    args.validate()
        .map_err(|reason| CliError::InvalidArguments { reason })?;

    let bundler = Bundler::new().await?;
    let report = bundler.bundle(&args.to_request(), cache).await?;

    print_report(config, &report)?;
    if report.dry_run {
        config.progress("Dry run: nothing was built")?;
    } else {
        config.success(&format!(
            "Bundled {} for {}",
            report.context.app_name, report.context.device
        ))?;
    }
    Ok(0)
}
