//! NSIS utility functions.

use crate::bundler::{
    error::{Error, ErrorExt, Result},
    target::Arch,
};
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Compressor passed to `SetCompressor /SOLID`.
pub const COMPRESSION: &str = "lzma";

/// Map architecture to NSIS arch string.
pub fn map_arch(arch: Arch) -> Result<&'static str> {
    match arch {
        Arch::X86_64 => Ok("x64"),
        Arch::X86 => Ok("x86"),
        Arch::AArch64 => Ok("arm64"),
        other => Err(Error::ArchError(format!(
            "Unsupported architecture for NSIS: {other}"
        ))),
    }
}

/// Publisher shown in Add/Remove Programs, taken from a Cargo author entry.
///
/// The `<email>` part is dropped: `"Jane Doe <jane@example.com>"` -> `"Jane Doe"`.
pub fn publisher_name(author: &str) -> String {
    author
        .split('<')
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(author)
        .to_string()
}

/// Write file with UTF-8 BOM (required by NSIS).
pub async fn write_utf8_bom(path: &Path, content: &str) -> Result<()> {
    let mut file = tokio::fs::File::create(path)
        .await
        .fs_context("creating NSI script file", path)?;

    file.write_all(&[0xEF, 0xBB, 0xBF])
        .await
        .fs_context("writing UTF-8 BOM", path)?;
    file.write_all(content.as_bytes())
        .await
        .fs_context("writing NSI content", path)?;
    file.flush().await.fs_context("flushing NSI file", path)?;

    Ok(())
}
