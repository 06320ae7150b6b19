//! Windows backends.
//!
//! - [`generic`] - the executable, its DLLs and a side-by-side manifest
//! - [`nsis`] - NSIS `-setup.exe` installer

pub mod generic;
pub mod nsis;

use crate::bundler::{BundlerContext, Error, Result, target::Arch};

/// The one architecture a Windows bundle is built for.
pub(crate) fn single_arch(ctx: &BundlerContext) -> Result<Arch> {
    match ctx.architectures.as_slice() {
        [arch] => Ok(*arch),
        other => Err(Error::ArchError(format!(
            "Windows bundles hold exactly one architecture, got {}",
            other.len()
        ))),
    }
}

/// Normalizes a version to the four numeric parts Windows version resources
/// and assembly manifests require.
///
/// Pre-release and build suffixes are dropped, missing parts are zero and
/// parts beyond the fourth are cut:
/// - "1" -> "1.0.0.0"
/// - "1.2.3" -> "1.2.3.0"
/// - "1.2.3-beta.1" -> "1.2.3.0"
/// - "1.2.3.4.5" -> "1.2.3.4"
pub fn four_part_version(version: &str) -> Result<String> {
    let core = version
        .split(['-', '+'])
        .next()
        .unwrap_or(version);

    let mut parts = core
        .split('.')
        .map(|part| {
            part.parse::<u16>().map_err(|_| {
                Error::InvalidArguments(format!(
                    "version '{version}' cannot be expressed as a Windows version (numeric parts up to 65535)"
                ))
            })
        })
        .collect::<Result<Vec<u16>>>()?;

    parts.resize(4, 0);
    Ok(parts
        .iter()
        .take(4)
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_have_four_parts() {
        assert_eq!(four_part_version("1").unwrap(), "1.0.0.0");
        assert_eq!(four_part_version("1.2").unwrap(), "1.2.0.0");
        assert_eq!(four_part_version("1.2.3").unwrap(), "1.2.3.0");
        assert_eq!(four_part_version("1.2.3.4.5").unwrap(), "1.2.3.4");
        assert_eq!(four_part_version("1.2.3-beta.1+sha.5").unwrap(), "1.2.3.0");
        assert!(four_part_version("1.x").is_err());
        assert!(four_part_version("70000.0").is_err());
    }
}
