//! `codesign` invocation.

use crate::bundler::{
    Result,
    codesign::{CodesignIdentity, CodesigningContext},
    target::Platform,
    utils::process,
};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Builds the `codesign` command line for `path`.
///
/// Entitlements apply to the bundle only; nested code is signed without
/// them. Named identities on device platforms get the hardened runtime and a
/// secure timestamp.
pub fn codesign_command(
    path: &Path,
    codesigning: &CodesigningContext,
    platform: Platform,
    with_entitlements: bool,
) -> Command {
    let mut command = Command::new("codesign");
    command
        .args(["--force", "--sign", codesigning.identity.sign_argument()]);

    match &codesigning.identity {
        CodesignIdentity::Named(_) if !platform.is_simulator() => {
            command.args(["--options", "runtime", "--timestamp"]);
        }
        _ => {
            command.arg("--timestamp=none");
        }
    }

    if with_entitlements && let Some(entitlements) = &codesigning.entitlements {
        command.arg("--entitlements").arg(entitlements);
    }

    command.arg(path);
    command
}

/// Signs nested libraries first, then the bundle itself.
pub async fn sign_bundle(
    bundle: &Path,
    nested: &[PathBuf],
    codesigning: &CodesigningContext,
    platform: Platform,
) -> Result<()> {
    for path in nested {
        log::debug!("Signing {}", path.display());
        process::output(&mut codesign_command(path, codesigning, platform, false)).await?;
    }

    log::info!("Signing {} with {}", bundle.display(), codesigning.identity);
    process::output(&mut codesign_command(bundle, codesigning, platform, true)).await?;
    log::info!("✓ Signed {}", bundle.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::codesign::SigningIdentity;

    fn args(command: &Command) -> Vec<String> {
        command
            .as_std()
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn ad_hoc_signatures_skip_the_timestamp_server() {
        let codesigning = CodesigningContext {
            identity: CodesignIdentity::AdHoc,
            entitlements: Some("app.entitlements".into()),
            provisioning_profile: None,
        };
        let command = codesign_command(Path::new("Hello.app"), &codesigning, Platform::MacOs, true);
        assert_eq!(
            args(&command),
            [
                "--force",
                "--sign",
                "-",
                "--timestamp=none",
                "--entitlements",
                "app.entitlements",
                "Hello.app"
            ]
        );
    }

    #[test]
    fn named_identities_use_the_hardened_runtime() {
        let codesigning = CodesigningContext {
            identity: CodesignIdentity::Named(SigningIdentity {
                hash: "ABCDEF".into(),
                name: "Apple Development: Jane Doe (TEAM123456)".into(),
            }),
            entitlements: Some("app.entitlements".into()),
            provisioning_profile: None,
        };
        let command = codesign_command(
            Path::new("Frameworks/libgreeter.dylib"),
            &codesigning,
            Platform::IOs,
            false,
        );
        assert_eq!(
            args(&command),
            [
                "--force",
                "--sign",
                "ABCDEF",
                "--options",
                "runtime",
                "--timestamp",
                "Frameworks/libgreeter.dylib"
            ]
        );
    }
}
