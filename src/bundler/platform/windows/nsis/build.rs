//! NSIS installer build execution.

use crate::bundler::{
    error::{ErrorExt, Result},
    utils::process,
};
use std::path::Path;
use tokio::process::Command;

/// Run makensis to compile an NSI script into the installer executable.
///
/// # Arguments
/// - `makensis` - Path to the makensis binary
/// - `nsi_path` - Path to the NSI script file to compile
/// - `output_path` - Path where the installer .exe should be created
pub async fn run_makensis(makensis: &Path, nsi_path: &Path, output_path: &Path) -> Result<()> {
    log::info!("Running makensis...");

    if let Some(parent) = output_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .fs_context("creating installer output directory", parent)?;
    }

    let mut output_define = std::ffi::OsString::from("-DOUTPUT_FILE=");
    output_define.push(output_path);

    process::output(
        Command::new(makensis)
            .args(["-V3", "-INPUTCHARSET", "UTF8", "-OUTPUTCHARSET", "UTF8"])
            .arg(output_define)
            .arg(nsi_path),
    )
    .await?;

    Ok(())
}
