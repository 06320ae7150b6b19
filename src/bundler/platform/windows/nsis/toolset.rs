//! makensis location.

use crate::bundler::error::{Error, Result};
use std::path::PathBuf;

/// Locates `makensis` on `PATH`.
pub fn find_makensis() -> Result<PathBuf> {
    which::which("makensis").map_err(|_| {
        Error::GenericError(
            "makensis not found. Please install NSIS (e.g., apt-get install nsis, brew install makensis)"
                .into(),
        )
    })
}
