use super::print_report;
use crate::bundler::{Bundler, runner};
use crate::cli::{RuntimeConfig, args::RunArgs};
use crate::config::ResolvedAppCache;
use crate::error::{CliError, Result};

/// Bundles the app, then launches it on its device.
///
/// With `--skip-build` the bundle step only resolves where the existing bundle
/// is; the bundle must have been produced by an earlier `bundle`.
pub async fn execute(
    args: &RunArgs,
    config: &RuntimeConfig,
    cache: &mut ResolvedAppCache,
) -> Result<i32> {
    args.bundle
        .validate()
        .map_err(|reason| CliError::InvalidArguments { reason })?;

    let request = args.to_request();
    let bundler = Bundler::new().await?;
    let report = bundler.bundle(&request, cache).await?;
    print_report(config, &report)?;

    if report.dry_run && !report.structure.root.exists() {
        return Err(CliError::ExecutionFailed {
            command: "run".to_string(),
            reason: format!(
                "{} does not exist; run without --skip-build first",
                report.structure.root.display()
            ),
        }
        .into());
    }

    runner::launch(&report, &args.launch_options()).await?;
    Ok(0)
}
