//! Deciding whether and how the bundle is signed.
//!
//! [`resolve_codesigning`] is a pure decision procedure over the command line
//! inputs and the installed identities; the actual `codesign` invocation lives
//! with the backend that produces something signable.

use super::{Result, target::Platform, toolchain::Toolchain};
use std::{
    fmt::Display,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Identity value requesting ad-hoc signing.
pub const AD_HOC_IDENTITY: &str = "-";

/// Codesigning inputs as given on the command line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CodesignOptions {
    /// `--codesign` / `--no-codesign`; `None` when neither was given.
    pub should_codesign: Option<bool>,
    /// `--identity`
    pub identity: Option<String>,
    /// `--entitlements`
    pub entitlements: Option<PathBuf>,
    /// `--provisioning-profile`
    pub provisioning_profile: Option<PathBuf>,
}

impl CodesignOptions {
    /// Names of the signing inputs that were given, in flag order.
    fn given_inputs(&self) -> Vec<&'static str> {
        let mut given = Vec::new();
        if self.should_codesign.is_some() {
            given.push("--codesign/--no-codesign");
        }
        if self.identity.is_some() {
            given.push("--identity");
        }
        if self.entitlements.is_some() {
            given.push("--entitlements");
        }
        if self.provisioning_profile.is_some() {
            given.push("--provisioning-profile");
        }
        given
    }
}

/// A signing identity installed in a keychain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningIdentity {
    /// SHA-1 fingerprint as printed by `security find-identity`.
    pub hash: String,
    /// Common name, e.g. `Apple Development: Jane Doe (ABCDE12345)`.
    pub name: String,
}

/// Identity passed to `codesign --sign`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodesignIdentity {
    /// Ad-hoc signature (`-`).
    AdHoc,
    /// An installed identity.
    Named(SigningIdentity),
}

impl CodesignIdentity {
    /// Argument for `codesign --sign`.
    pub fn sign_argument(&self) -> &str {
        match self {
            CodesignIdentity::AdHoc => AD_HOC_IDENTITY,
            CodesignIdentity::Named(identity) => &identity.hash,
        }
    }
}

impl Display for CodesignIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodesignIdentity::AdHoc => f.write_str("ad-hoc"),
            CodesignIdentity::Named(identity) => write!(f, "{} ({})", identity.name, identity.hash),
        }
    }
}

/// Resolved signing parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodesigningContext {
    /// Identity to sign with.
    pub identity: CodesignIdentity,
    /// Entitlements plist.
    pub entitlements: Option<PathBuf>,
    /// Provisioning profile embedded into the bundle.
    pub provisioning_profile: Option<PathBuf>,
}

/// Codesigning inputs that cannot be satisfied.
#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum CodesignError {
    /// Signing inputs were given for a platform without codesigning.
    #[error("{platform} does not support codesigning; remove {}", .inputs.join(", "))]
    NotSupported {
        /// Target platform.
        platform: Platform,
        /// Flags that were given.
        inputs: Vec<&'static str>,
    },

    /// Signing was disabled for a platform that cannot run unsigned code.
    #[error("{platform} apps must be codesigned; remove --no-codesign")]
    SigningRequired {
        /// Target platform.
        platform: Platform,
    },

    /// Signing parameters were given while signing is off.
    #[error("{} given but codesigning is disabled", .inputs.join(", "))]
    InconsistentInputs {
        /// Flags that were given.
        inputs: Vec<&'static str>,
    },

    /// Entitlements or provisioning profile file does not exist.
    #[error("{description} not found at {}", .path.display())]
    MissingFile {
        /// Which input pointed at the file.
        description: &'static str,
        /// Path as given.
        path: PathBuf,
    },

    /// The named identity is not installed.
    #[error(
        "no codesigning identity matches '{query}'\n\
         List identities with `security find-identity -v -p codesigning`"
    )]
    IdentityNotFound {
        /// Identity as given.
        query: String,
    },

    /// Signing is needed but nothing is installed.
    #[error(
        "no codesigning identities installed\n\
         Create one in Xcode (Settings > Accounts > Manage Certificates), set \
         APPLE_CERTIFICATE and APPLE_CERTIFICATE_PASSWORD, or pass `--identity -` \
         for ad-hoc signing"
    )]
    NoIdentities,
}

/// Resolves codesigning for `platform`.
///
/// # Arguments
///
/// * `toolchain` - Enumerates installed identities
/// * `platform` - Target platform of the run
/// * `options` - Command line inputs
/// * `imported_identity` - Identity imported from `APPLE_CERTIFICATE`, preferred
///   over keychain identities
///
/// # Returns
///
/// `None` when the bundle stays unsigned.
pub async fn resolve_codesigning<T: Toolchain>(
    toolchain: &T,
    platform: Platform,
    options: &CodesignOptions,
    imported_identity: Option<&str>,
) -> Result<Option<CodesigningContext>> {
    if !platform.is_apple() {
        let inputs = options.given_inputs();
        if !inputs.is_empty() {
            return Err(CodesignError::NotSupported { platform, inputs }.into());
        }
        return Ok(None);
    }

    let should_codesign = match (options.should_codesign, platform.requires_codesigning()) {
        (Some(false), true) => return Err(CodesignError::SigningRequired { platform }.into()),
        (Some(true), true) => true,
        (None, true) => {
            log::info!("{platform} apps must be signed; enabling codesigning");
            true
        }
        (Some(value), false) => value,
        (None, false) => false,
    };

    if !should_codesign {
        let mut inputs = Vec::new();
        if options.identity.is_some() {
            inputs.push("--identity");
        }
        if options.entitlements.is_some() {
            inputs.push("--entitlements");
        }
        if options.provisioning_profile.is_some() {
            inputs.push("--provisioning-profile");
        }
        if !inputs.is_empty() {
            return Err(CodesignError::InconsistentInputs { inputs }.into());
        }
        return Ok(None);
    }

    let entitlements = existing_file("entitlements", options.entitlements.as_deref())?;
    let provisioning_profile =
        existing_file("provisioning profile", options.provisioning_profile.as_deref())?;

    let identity = match options.identity.as_deref() {
        Some(AD_HOC_IDENTITY) => CodesignIdentity::AdHoc,
        Some(query) => {
            let identities = installed_identities(toolchain, imported_identity).await?;
            identities
                .into_iter()
                .find(|i| i.hash.eq_ignore_ascii_case(query) || i.name.contains(query))
                .map(CodesignIdentity::Named)
                .ok_or_else(|| CodesignError::IdentityNotFound {
                    query: query.to_string(),
                })?
        }
        None => {
            let mut identities = installed_identities(toolchain, imported_identity)
                .await?
                .into_iter();
            let first = identities.next().ok_or(CodesignError::NoIdentities)?;
            let others = identities.count();
            if others > 0 {
                log::info!(
                    "{} codesigning identities found; using '{}' (pass --identity to choose)",
                    others + 1,
                    first.name
                );
            }
            CodesignIdentity::Named(first)
        }
    };

    log::debug!("Codesigning with {}", identity);
    Ok(Some(CodesigningContext {
        identity,
        entitlements,
        provisioning_profile,
    }))
}

async fn installed_identities<T: Toolchain>(
    toolchain: &T,
    imported: Option<&str>,
) -> Result<Vec<SigningIdentity>> {
    let mut identities = toolchain.list_identities().await?;
    if let Some(imported) = imported
        && let Some(position) = identities
            .iter()
            .position(|i| i.name == imported || i.hash == imported)
    {
        let identity = identities.remove(position);
        identities.insert(0, identity);
    }
    Ok(identities)
}

fn existing_file(description: &'static str, path: Option<&Path>) -> Result<Option<PathBuf>> {
    match path {
        Some(path) if !path.is_file() => Err(CodesignError::MissingFile {
            description,
            path: path.to_path_buf(),
        }
        .into()),
        Some(path) => Ok(Some(path.to_path_buf())),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{Error, toolchain::FakeToolchain};

    fn identity(hash: &str, name: &str) -> SigningIdentity {
        SigningIdentity {
            hash: hash.to_string(),
            name: name.to_string(),
        }
    }

    fn codesign_error(result: Result<Option<CodesigningContext>>) -> CodesignError {
        match result {
            Err(Error::Codesign(err)) => err,
            other => panic!("expected a codesigning error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn required_platforms_reject_no_codesign_whatever_else_is_given() {
        let toolchain =
            FakeToolchain::new(Platform::MacOs).with_identities(vec![identity("AA", "Dev")]);
        let dir = tempfile::tempdir().unwrap();
        let entitlements = dir.path().join("app.entitlements");
        std::fs::write(&entitlements, "<plist/>").unwrap();

        for options in [
            CodesignOptions {
                should_codesign: Some(false),
                ..Default::default()
            },
            CodesignOptions {
                should_codesign: Some(false),
                identity: Some("-".into()),
                entitlements: Some(entitlements.clone()),
                provisioning_profile: None,
            },
        ] {
            for platform in [Platform::IOs, Platform::TvOs, Platform::VisionOs] {
                let err = codesign_error(
                    resolve_codesigning(&toolchain, platform, &options, None).await,
                );
                assert_eq!(err, CodesignError::SigningRequired { platform });
            }
        }
    }

    #[tokio::test]
    async fn unset_flag_is_promoted_on_required_platforms() {
        let toolchain = FakeToolchain::new(Platform::MacOs).with_identities(vec![
            identity("AA", "Apple Development: First"),
            identity("BB", "Apple Development: Second"),
        ]);

        let context = resolve_codesigning(&toolchain, Platform::IOs, &CodesignOptions::default(), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            context.identity,
            CodesignIdentity::Named(identity("AA", "Apple Development: First"))
        );
    }

    #[tokio::test]
    async fn explicit_codesign_on_required_platforms_signs() {
        let toolchain = FakeToolchain::new(Platform::MacOs)
            .with_identities(vec![identity("AA", "Apple Development: First")]);
        let options = CodesignOptions {
            should_codesign: Some(true),
            ..Default::default()
        };

        for platform in [Platform::IOs, Platform::TvOs, Platform::VisionOs] {
            let context = resolve_codesigning(&toolchain, platform, &options, None)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(context.identity.sign_argument(), "AA");
        }
    }

    #[tokio::test]
    async fn entitlements_without_signing_are_rejected() {
        let toolchain = FakeToolchain::new(Platform::MacOs);
        let options = CodesignOptions {
            entitlements: Some(PathBuf::from("app.entitlements")),
            ..Default::default()
        };

        for platform in [Platform::MacOs, Platform::MacCatalyst, Platform::IOsSimulator] {
            let err = codesign_error(resolve_codesigning(&toolchain, platform, &options, None).await);
            assert_eq!(
                err,
                CodesignError::InconsistentInputs {
                    inputs: vec!["--entitlements"]
                }
            );
        }
    }

    #[tokio::test]
    async fn non_apple_platforms_reject_every_input() {
        let toolchain = FakeToolchain::new(Platform::Linux);
        assert_eq!(
            resolve_codesigning(&toolchain, Platform::Linux, &CodesignOptions::default(), None)
                .await
                .unwrap(),
            None
        );

        let options = CodesignOptions {
            should_codesign: Some(false),
            ..Default::default()
        };
        let err = codesign_error(resolve_codesigning(&toolchain, Platform::Windows, &options, None).await);
        assert!(matches!(err, CodesignError::NotSupported { platform: Platform::Windows, .. }));
    }

    #[tokio::test]
    async fn missing_identities_are_reported_with_a_hint() {
        let toolchain = FakeToolchain::new(Platform::MacOs);
        let options = CodesignOptions {
            should_codesign: Some(true),
            ..Default::default()
        };
        let err = codesign_error(resolve_codesigning(&toolchain, Platform::MacOs, &options, None).await);
        assert_eq!(err, CodesignError::NoIdentities);
        assert!(err.to_string().contains("--identity -"));
    }

    #[tokio::test]
    async fn ad_hoc_identity_skips_enumeration() {
        let toolchain = FakeToolchain::new(Platform::MacOs);
        let options = CodesignOptions {
            should_codesign: Some(true),
            identity: Some("-".into()),
            ..Default::default()
        };
        let context = resolve_codesigning(&toolchain, Platform::MacOs, &options, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(context.identity, CodesignIdentity::AdHoc);
        assert!(toolchain.calls().is_empty());
    }

    #[tokio::test]
    async fn named_identities_match_hash_or_name_and_imported_ones_come_first() {
        let toolchain = FakeToolchain::new(Platform::MacOs).with_identities(vec![
            identity("AA", "Apple Development: Laptop"),
            identity("BB", "Developer ID Application: CI"),
        ]);

        let options = CodesignOptions {
            should_codesign: Some(true),
            identity: Some("bb".into()),
            ..Default::default()
        };
        let context = resolve_codesigning(&toolchain, Platform::MacOs, &options, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(context.identity.sign_argument(), "BB");

        let options = CodesignOptions {
            should_codesign: Some(true),
            ..Default::default()
        };
        let context = resolve_codesigning(
            &toolchain,
            Platform::MacOs,
            &options,
            Some("Developer ID Application: CI"),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(context.identity.sign_argument(), "BB");

        let options = CodesignOptions {
            should_codesign: Some(true),
            identity: Some("Distribution".into()),
            ..Default::default()
        };
        let err = codesign_error(resolve_codesigning(&toolchain, Platform::MacOs, &options, None).await);
        assert!(matches!(err, CodesignError::IdentityNotFound { .. }));
    }

    #[tokio::test]
    async fn signing_files_must_exist() {
        let toolchain = FakeToolchain::new(Platform::MacOs);
        let options = CodesignOptions {
            should_codesign: Some(true),
            identity: Some("-".into()),
            entitlements: Some(PathBuf::from("/nonexistent/app.entitlements")),
            provisioning_profile: None,
        };
        let err = codesign_error(resolve_codesigning(&toolchain, Platform::MacOs, &options, None).await);
        assert!(matches!(err, CodesignError::MissingFile { description: "entitlements", .. }));
    }
}
