//! Normalized repository locators

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

pub const DEFAULT_HOST: &str = "github.com";

/// Accepts `owner/name`, `host/owner/name`, `scheme://[user@]host/owner/name`
/// and scp-style `git@host:owner/name`, each with an optional `.git` suffix.
static LOCATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?:[A-Za-z][A-Za-z0-9+.-]*://)?(?:[^@/\s]+@)?(?P<host>[^/:@\s]+(?::\d+)?)[/:])?(?P<owner>[A-Za-z0-9_.-]+)/(?P<name>[A-Za-z0-9_.-]+)$",
    )
    .expect("locator regex is valid")
});

/// Identity of a source-control repository.
///
/// The host is lowercased; owner and name keep their case. Two identities are
/// equal iff these normalized parts match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryIdentity {
    host: String,
    owner: String,
    name: String,
}

impl RepositoryIdentity {
    pub fn new(
        host: impl Into<String>,
        owner: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into().to_ascii_lowercase(),
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Shorthand for a `github.com` repository
    pub fn github(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(DEFAULT_HOST, owner, name)
    }

    pub fn parse(input: &str) -> Result<Self, IdentityError> {
        let trimmed = input.trim().trim_end_matches('/');
        let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);

        let caps = LOCATOR.captures(trimmed).ok_or_else(|| IdentityError {
            input: input.to_string(),
        })?;

        let host = caps.name("host").map_or(DEFAULT_HOST, |m| m.as_str());
        Ok(Self::new(host, &caps["owner"], &caps["name"]))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `https://host/owner/name`
    pub fn url(&self) -> String {
        format!("https://{}/{}/{}", self.host, self.owner, self.name)
    }

    /// `owner/name`, the form hosting APIs address repositories by
    pub fn index_entry(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepositoryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.host, self.owner, self.name)
    }
}

impl FromStr for RepositoryIdentity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RepositoryIdentity {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RepositoryIdentity> for String {
    fn from(identity: RepositoryIdentity) -> Self {
        identity.url()
    }
}
