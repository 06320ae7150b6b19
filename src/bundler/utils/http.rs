//! HTTP utilities for downloading bundler tools.

use crate::bundler::error::{Error, Result};

/// Downloads a file from a URL.
///
/// Returns the file contents as a byte vector. Used by the AppImage backend
/// to fetch linuxdeploy.
pub async fn download(url: &str) -> Result<Vec<u8>> {
    log::info!("Downloading {url}");

    let response = reqwest::get(url)
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|e| Error::GenericError(format!("Download of {url} failed: {e}")))?;

    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::GenericError(format!("Failed to read response from {url}: {e}")))?;

    Ok(bytes.to_vec())
}
