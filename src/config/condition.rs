//! Overlay conditions and the context they are resolved against.

use crate::bundler::{platform::BundlerChoice, target::Platform};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

/// Single-axis equality test selecting when an overlay applies.
///
/// Written as `platform(<platform id>)` or `bundler(<bundler id>)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Condition {
    /// Matches when building for exactly this platform.
    Platform(Platform),
    /// Matches when packaging with exactly this bundler.
    Bundler(BundlerChoice),
}

impl Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Condition::Platform(platform) => write!(f, "platform({platform})"),
            Condition::Bundler(bundler) => write!(f, "bundler({bundler})"),
        }
    }
}

impl FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (axis, rest) = s
            .split_once('(')
            .ok_or_else(|| format!("invalid condition '{s}', expected platform(..) or bundler(..)"))?;
        let value = rest
            .strip_suffix(')')
            .ok_or_else(|| format!("invalid condition '{s}', missing closing parenthesis"))?
            .trim();

        match axis.trim() {
            "platform" => value.parse().map(Condition::Platform),
            "bundler" => value.parse().map(Condition::Bundler),
            other => Err(format!(
                "invalid condition '{s}', unknown axis '{other}' (expected platform or bundler)"
            )),
        }
    }
}

impl TryFrom<String> for Condition {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Condition> for String {
    fn from(condition: Condition) -> Self {
        condition.to_string()
    }
}

/// The `(platform, bundler)` pair a configuration is flattened for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResolutionContext {
    /// Target platform.
    pub platform: Platform,
    /// Chosen bundler backend.
    pub bundler: BundlerChoice,
}

impl ResolutionContext {
    /// Whether `condition` holds in this context.
    pub fn matches(&self, condition: &Condition) -> bool {
        match condition {
            Condition::Platform(platform) => *platform == self.platform,
            Condition::Bundler(bundler) => *bundler == self.bundler,
        }
    }
}

impl Display for ResolutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} with {}", self.platform, self.bundler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditions_parse_both_axes() {
        assert_eq!(
            "platform(linux)".parse::<Condition>(),
            Ok(Condition::Platform(Platform::Linux))
        );
        assert_eq!(
            "bundler(linuxRPM)".parse::<Condition>(),
            Ok(Condition::Bundler(BundlerChoice::LinuxRpm))
        );
        assert!("os(linux)".parse::<Condition>().is_err());
        assert!("platform(linux".parse::<Condition>().is_err());
    }

    #[test]
    fn context_matches_exact_values_only() {
        let context = ResolutionContext {
            platform: Platform::IOsSimulator,
            bundler: BundlerChoice::DarwinApp,
        };
        assert!(context.matches(&Condition::Platform(Platform::IOsSimulator)));
        assert!(!context.matches(&Condition::Platform(Platform::IOs)));
        assert!(context.matches(&Condition::Bundler(BundlerChoice::DarwinApp)));
    }
}
