use std::cmp::Ordering;

use semver::Version;

use crate::error::ParseError;

/// Strip a leading `v`/`V` as used by release tags ("v1.2.0").
pub fn normalize_version(version: &str) -> &str {
    let version = version.trim();
    version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version)
}

/// Parse a full semantic version, tolerating a `v` prefix.
pub fn parse_version(input: &str) -> Result<Version, ParseError> {
    Version::parse(normalize_version(input)).map_err(|e| ParseError::Version {
        input: input.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a version that may omit minor/patch, padding them with zeros.
///
/// - "1" -> 1.0.0
/// - "1.2" -> 1.2.0
/// - "1.2.3-rc.1" -> 1.2.3-rc.1
pub fn parse_partial_version(input: &str) -> Result<Version, ParseError> {
    let version = normalize_version(input);
    let parts: Vec<&str> = version.split('.').collect();
    let padded = match parts.len() {
        1 => format!("{}.0.0", parts[0]),
        2 => format!("{}.{}.0", parts[0], parts[1]),
        _ => version.to_string(),
    };
    Version::parse(&padded).map_err(|e| ParseError::Version {
        input: input.to_string(),
        reason: e.to_string(),
    })
}

/// Semver precedence: numeric core, then pre-release (a pre-release sorts
/// before the release it precedes). Build metadata is ignored.
pub fn compare(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch)
        .cmp(&(b.major, b.minor, b.patch))
        .then_with(|| a.pre.cmp(&b.pre))
}

/// True when both versions have the same precedence.
pub fn same_version(a: &Version, b: &Version) -> bool {
    compare(a, b) == Ordering::Equal
}
