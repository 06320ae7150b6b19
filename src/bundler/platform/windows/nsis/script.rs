//! NSIS installer script generation.
//!
//! Generates NSI installer scripts from templates using Handlebars,
//! with all necessary metadata, paths, and configuration settings.

use super::{NsisContext, template::NSI_TEMPLATE, utils};
use crate::bundler::{BundlerContext, Error, Result};
use crate::config::InstallMode;
use handlebars::Handlebars;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
struct UrlScheme {
    scheme: String,
    key: String,
    command_key: String,
}

/// Values the template is rendered with.
#[derive(Debug, Serialize)]
struct ScriptData {
    product_name: String,
    version: String,
    version_nsis: String,
    publisher: String,
    description: String,
    binary_name: String,
    main_binary: String,
    binary_files: Vec<String>,
    installed_files: Vec<String>,
    uninstaller: String,
    uninstall_key: String,
    install_dir: String,
    machine_dir: String,
    user_dir: String,
    execution_level: &'static str,
    shell_context: &'static str,
    both: bool,
    is_64bit: bool,
    compression: &'static str,
    start_menu_dir: String,
    start_menu_shortcut: String,
    url_schemes: Vec<UrlScheme>,
    installer_icon: Option<String>,
}

/// Renders the NSI script.
///
/// # Arguments
/// - `ctx` - Run context; provides the app and the files to install
/// - `extra` - Installer facts computed before the build
/// - `files` - Absolute paths of the files the installer carries, main
///   executable first
pub fn render_nsi_script(
    ctx: &BundlerContext,
    extra: &NsisContext,
    files: &[PathBuf],
) -> Result<String> {
    let product = &ctx.app_name;
    let binary_name = ctx.executable_name();
    let identifier = &ctx.app.identifier;

    let file_names: Vec<String> = files
        .iter()
        .filter_map(|file| file.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect();
    if file_names.is_empty() {
        return Err(Error::GenericError("No binaries found to bundle".into()));
    }

    let machine_dir = format!("$PROGRAMFILES64\\{product}");
    let user_dir = format!("$LOCALAPPDATA\\Programs\\{product}");
    let (install_dir, execution_level, shell_context) = match extra.install_mode {
        InstallMode::PerMachine => (machine_dir.clone(), "admin", "all"),
        InstallMode::CurrentUser => (user_dir.clone(), "user", "current"),
        InstallMode::Both => (machine_dir.clone(), "highest", "all"),
    };
    let start_menu_dir = format!("$SMPROGRAMS\\{product}");

    let data = ScriptData {
        product_name: product.clone(),
        version: ctx.app.version.clone(),
        version_nsis: extra.version_nsis.clone(),
        publisher: extra.publisher.clone(),
        description: extra.description.clone(),
        main_binary: format!("$INSTDIR\\{binary_name}"),
        binary_name,
        binary_files: files.iter().map(|f| f.display().to_string()).collect(),
        installed_files: file_names
            .iter()
            .map(|name| format!("$INSTDIR\\{name}"))
            .collect(),
        uninstaller: "$INSTDIR\\uninstall.exe".to_string(),
        uninstall_key: format!(
            "Software\\Microsoft\\Windows\\CurrentVersion\\Uninstall\\{identifier}"
        ),
        install_dir,
        machine_dir,
        user_dir,
        execution_level,
        shell_context,
        both: extra.install_mode == InstallMode::Both,
        is_64bit: extra.arch != "x86",
        compression: extra.compression,
        start_menu_shortcut: format!("{start_menu_dir}\\{product}.lnk"),
        start_menu_dir,
        url_schemes: ctx
            .app
            .url_schemes
            .iter()
            .map(|scheme| UrlScheme {
                scheme: scheme.clone(),
                key: format!("Software\\Classes\\{scheme}"),
                command_key: format!("Software\\Classes\\{scheme}\\shell\\open\\command"),
            })
            .collect(),
        installer_icon: extra.installer_icon.as_ref().map(|p| p.display().to_string()),
    };

    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
        .register_template_string("installer.nsi", NSI_TEMPLATE)
        .map_err(|e| Error::GenericError(format!("failed to register NSI template: {e}")))?;
    handlebars
        .render("installer.nsi", &data)
        .map_err(|e| Error::GenericError(format!("failed to render NSI template: {e}")))
}

/// Generate NSI installer script from template.
///
/// Writes output with UTF-8 BOM required by NSIS.
///
/// # Returns
/// Path to the generated installer.nsi file
pub async fn generate_nsi_script(
    ctx: &BundlerContext,
    extra: &NsisContext,
    files: &[PathBuf],
    output_dir: &Path,
) -> Result<PathBuf> {
    let nsi_content = render_nsi_script(ctx, extra, files)?;
    let nsi_path = output_dir.join("installer.nsi");
    utils::write_utf8_bom(&nsi_path, &nsi_content).await?;
    Ok(nsi_path)
}
