//! Dependency version constraints
//!
//! Supported clause forms:
//! - `1.2.3`, `=1.2.3`, `==1.2.3` - exact match
//! - `!=1.2.3` - anything but
//! - `>=1.2.3`, `>1.2.3`, `<=1.2.3`, `<1.2.3` - comparison operators
//! - `^1.2.3` - caret: >=1.2.3 <2.0.0 (or <0.3.0 / <0.0.4 for 0.x)
//! - `~1.2.3` - tilde: >=1.2.3 <1.3.0
//! - `*`, `1.*`, `1.2.*` - wildcards
//!
//! Clauses are comma-separated and conjunctive.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use semver::Version;

use crate::error::ParseError;
use crate::version::semver::{compare, parse_partial_version};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Clause {
    Exact(Version),
    NotEqual(Version),
    Gte(Version),
    Gt(Version),
    Lte(Version),
    Lt(Version),
    Caret(Version),
    Tilde(Version),
    Any,
    WildcardMajor(u64),
    WildcardMinor(u64, u64),
}

impl Clause {
    fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        if text.is_empty() {
            return Err("empty clause".to_string());
        }

        let version = |rest: &str| parse_partial_version(rest.trim()).map_err(|e| e.to_string());

        if let Some(rest) = text.strip_prefix(">=") {
            version(rest).map(Clause::Gte)
        } else if let Some(rest) = text.strip_prefix("<=") {
            version(rest).map(Clause::Lte)
        } else if let Some(rest) = text.strip_prefix("==") {
            version(rest).map(Clause::Exact)
        } else if let Some(rest) = text.strip_prefix("!=") {
            version(rest).map(Clause::NotEqual)
        } else if let Some(rest) = text.strip_prefix('>') {
            version(rest).map(Clause::Gt)
        } else if let Some(rest) = text.strip_prefix('<') {
            version(rest).map(Clause::Lt)
        } else if let Some(rest) = text.strip_prefix('=') {
            version(rest).map(Clause::Exact)
        } else if let Some(rest) = text.strip_prefix('^') {
            version(rest).map(Clause::Caret)
        } else if let Some(rest) = text.strip_prefix('~') {
            version(rest).map(Clause::Tilde)
        } else if text == "*" {
            Ok(Clause::Any)
        } else if let Some(clause) = Self::parse_wildcard(text) {
            Ok(clause)
        } else {
            version(text).map(Clause::Exact)
        }
    }

    /// Parse wildcard patterns like "1.*" or "1.2.*"
    fn parse_wildcard(text: &str) -> Option<Self> {
        let text = text.strip_prefix('v').unwrap_or(text);
        let parts: Vec<&str> = text.split('.').collect();

        match parts.as_slice() {
            [major, "*"] => major.parse::<u64>().ok().map(Clause::WildcardMajor),
            [major, minor, "*"] => {
                let major = major.parse::<u64>().ok()?;
                let minor = minor.parse::<u64>().ok()?;
                Some(Clause::WildcardMinor(major, minor))
            }
            _ => None,
        }
    }

    fn matches(&self, version: &Version) -> bool {
        let cmp = |v: &Version| compare(version, v);
        match self {
            Clause::Exact(v) => cmp(v) == Ordering::Equal,
            Clause::NotEqual(v) => cmp(v) != Ordering::Equal,
            Clause::Gte(v) => cmp(v) != Ordering::Less,
            Clause::Gt(v) => cmp(v) == Ordering::Greater,
            Clause::Lte(v) => cmp(v) != Ordering::Greater,
            Clause::Lt(v) => cmp(v) == Ordering::Less,
            Clause::Caret(v) => {
                if cmp(v) == Ordering::Less {
                    return false;
                }
                // ^1.2.3 -> <2.0.0, ^0.2.3 -> <0.3.0, ^0.0.3 -> <0.0.4
                if v.major == 0 {
                    if v.minor == 0 {
                        version.major == 0 && version.minor == 0 && version.patch == v.patch
                    } else {
                        version.major == 0 && version.minor == v.minor
                    }
                } else {
                    version.major == v.major
                }
            }
            Clause::Tilde(v) => {
                cmp(v) != Ordering::Less && version.major == v.major && version.minor == v.minor
            }
            Clause::Any => true,
            Clause::WildcardMajor(major) => version.major == *major,
            Clause::WildcardMinor(major, minor) => {
                version.major == *major && version.minor == *minor
            }
        }
    }
}

/// A parsed constraint. Keeps its source text for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    raw: String,
    clauses: Vec<Clause>,
}

impl Constraint {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(ParseError::Constraint {
                input: input.to_string(),
                reason: "constraint is empty".to_string(),
            });
        }

        let clauses = raw
            .split(',')
            .map(Clause::parse)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|reason| ParseError::Constraint {
                input: input.to_string(),
                reason,
            })?;

        Ok(Self {
            raw: raw.to_string(),
            clauses,
        })
    }

    /// True when `version` satisfies every clause
    pub fn matches(&self, version: &Version) -> bool {
        self.clauses.iter().all(|clause| clause.matches(version))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Constraint {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

pub fn satisfies(version: &Version, constraint: &Constraint) -> bool {
    constraint.matches(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn matches(spec: &str, version: &str) -> bool {
        let constraint = Constraint::parse(spec).unwrap();
        satisfies(&Version::parse(version).unwrap(), &constraint)
    }

    #[rstest]
    #[case(">=1.2.0", "1.2.0", true)]
    #[case(">=1.2.0", "2.0.0", true)]
    #[case(">=1.2.0", "1.1.9", false)]
    #[case(">1.0.0", "1.0.1", true)]
    #[case(">1.0.0", "1.0.0", false)]
    #[case("<=1.0.0", "1.0.0", true)]
    #[case("<=1.0.0", "1.0.1", false)]
    #[case("<1.0.0", "0.9.9", true)]
    #[case("<1.0.0", "1.0.0", false)]
    #[case("=2.0.0", "2.0.0", true)]
    #[case("=2.0.0", "1.0.0", false)]
    #[case("==2.0.0", "2.0.0", true)]
    #[case("!=2.0.0", "2.0.0", false)]
    #[case("!=2.0.0", "2.0.1", true)]
    fn comparison_operators(#[case] spec: &str, #[case] version: &str, #[case] expected: bool) {
        assert_eq!(matches(spec, version), expected);
    }

    #[rstest]
    #[case("1.0.0", "1.0.0", true)]
    #[case("1.0.0", "1.0.1", false)]
    #[case("v1.0.0", "1.0.0", true)]
    #[case("1.0.0", "1.0.0+build.7", true)]
    fn bare_version_is_exact(#[case] spec: &str, #[case] version: &str, #[case] expected: bool) {
        assert_eq!(matches(spec, version), expected);
    }

    #[rstest]
    #[case("^1.2.3", "1.2.3", true)]
    #[case("^1.2.3", "1.9.9", true)]
    #[case("^1.2.3", "2.0.0", false)]
    #[case("^1.2.3", "1.2.2", false)]
    #[case("^0.2.3", "0.2.5", true)]
    #[case("^0.2.3", "0.3.0", false)]
    #[case("^0.0.3", "0.0.3", true)]
    #[case("^0.0.3", "0.0.4", false)]
    #[case("~1.2.3", "1.2.9", true)]
    #[case("~1.2.3", "1.3.0", false)]
    #[case("~1.2", "1.2.0", true)]
    fn caret_and_tilde(#[case] spec: &str, #[case] version: &str, #[case] expected: bool) {
        assert_eq!(matches(spec, version), expected);
    }

    #[rstest]
    #[case("*", "999.0.0", true)]
    #[case("1.*", "1.5.0", true)]
    #[case("1.*", "2.0.0", false)]
    #[case("1.2.*", "1.2.5", true)]
    #[case("1.2.*", "1.3.0", false)]
    fn wildcards(#[case] spec: &str, #[case] version: &str, #[case] expected: bool) {
        assert_eq!(matches(spec, version), expected);
    }

    #[rstest]
    #[case(">=1.0.0,<2.0.0", "1.5.0", true)]
    #[case(">=1.0.0, <2.0.0", "2.0.0", false)]
    #[case(">=1.0.0, <2.0.0", "0.9.0", false)]
    #[case(">=1.0.0, !=1.3.0, <2.0.0", "1.3.0", false)]
    fn clauses_are_conjunctive(#[case] spec: &str, #[case] version: &str, #[case] expected: bool) {
        assert_eq!(matches(spec, version), expected);
    }

    #[test]
    fn pre_release_sorts_before_release() {
        assert!(matches("<1.0.0", "1.0.0-rc.1"));
        assert!(!matches(">=1.0.0", "1.0.0-rc.1"));
    }

    #[rstest]
    #[case("")]
    #[case("invalid")]
    #[case("v")]
    #[case(">=")]
    #[case(">=1.0.0,")]
    #[case(">=abc")]
    fn parse_rejects_malformed_constraints(#[case] spec: &str) {
        assert!(matches!(
            Constraint::parse(spec),
            Err(ParseError::Constraint { .. })
        ));
    }

    #[test]
    fn display_keeps_source_text() {
        let constraint = Constraint::parse(" >=1.0.0, <2.0.0 ").unwrap();
        assert_eq!(constraint.to_string(), ">=1.0.0, <2.0.0");
    }
}
