//! Certificate import for signing in CI.

use crate::bundler::{Error, Result};
use base64::Engine;
use kodegen_bundler_sign::macos::TempKeychain;

/// Imports `APPLE_CERTIFICATE` into a temporary keychain.
///
/// - `APPLE_CERTIFICATE`: base64-encoded `.p12`
/// - `APPLE_CERTIFICATE_PASSWORD`: its password
///
/// Returns `None` when either variable is unset. The keychain must outlive
/// every signing operation, so the [`super::Bundler`] owns it.
pub async fn setup_macos_signing() -> Result<Option<TempKeychain>> {
    let (Ok(cert_b64), Ok(password)) = (
        std::env::var("APPLE_CERTIFICATE"),
        std::env::var("APPLE_CERTIFICATE_PASSWORD"),
    ) else {
        return Ok(None);
    };

    let cert_bytes = base64::engine::general_purpose::STANDARD
        .decode(cert_b64.trim())
        .map_err(|e| {
            Error::GenericError(format!("Invalid APPLE_CERTIFICATE (not valid base64): {e}"))
        })?;

    log::info!("Importing certificate from APPLE_CERTIFICATE environment variable");
    let keychain = TempKeychain::from_certificate_bytes(&cert_bytes, password.trim())
        .await
        .map_err(|e| Error::GenericError(format!("Failed to import certificate: {e}")))?;

    log::info!("✓ Certificate imported to temporary keychain");
    Ok(Some(keychain))
}
