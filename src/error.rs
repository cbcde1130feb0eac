use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::identity::RepositoryIdentity;

/// Malformed version or constraint text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid version '{input}': {reason}")]
    Version { input: String, reason: String },

    #[error("invalid version constraint '{input}': {reason}")]
    Constraint { input: String, reason: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid repository locator '{input}': expected owner/name, host/owner/name or a repository URL")]
pub struct IdentityError {
    pub input: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RedirectError {
    #[error("redirect conflict: {from} already redirects to {existing}, refusing to point it at {requested}")]
    Conflict {
        from: RepositoryIdentity,
        existing: RepositoryIdentity,
        requested: RepositoryIdentity,
    },

    #[error("redirect cycle detected while resolving {identity}")]
    Cycle { identity: RepositoryIdentity },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("package store already holds a different package for {identity}")]
    Duplicate { identity: RepositoryIdentity },

    #[error(transparent)]
    Redirect(#[from] RedirectError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record {location}: {reason}")]
    Malformed { location: String, reason: String },
}

impl StorageError {
    /// Anchor a relative `Malformed` location in `dir`
    pub fn in_dir(self, dir: &Path) -> Self {
        match self {
            StorageError::Malformed { location, reason } => StorageError::Malformed {
                location: dir.join(location).display().to_string(),
                reason,
            },
            other => other,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Why a hosting API call failed. Drives the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    NotFound,
    Unauthorized,
    RateLimited,
    Transient,
    Malformed,
}

impl FetchErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, FetchErrorKind::RateLimited | FetchErrorKind::Transient)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FetchErrorKind::NotFound => "not found",
            FetchErrorKind::Unauthorized => "unauthorized",
            FetchErrorKind::RateLimited => "rate limited",
            FetchErrorKind::Transient => "transient",
            FetchErrorKind::Malformed => "malformed",
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
    /// Server-provided hint for rate limiting, in seconds
    pub retry_after_secs: Option<u64>,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::NotFound, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Transient, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Malformed, message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after_secs: Option<u64>) -> Self {
        Self {
            kind: FetchErrorKind::RateLimited,
            message: message.into(),
            retry_after_secs,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FetchError::malformed(e.to_string())
        } else {
            FetchError::transient(e.to_string())
        }
    }
}

/// Errors that abort a single catalog operation.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Redirect(#[from] RedirectError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("failed to fetch {identity}: {source}")]
    Fetch {
        identity: RepositoryIdentity,
        #[source]
        source: FetchError,
    },

    #[error("package {0} is not in the registry list; add it first with 'add-package'")]
    NotRegistered(RepositoryIdentity),

    #[error("package {0} is neither in the registry list nor in the package database")]
    NotTracked(RepositoryIdentity),

    #[error("no redirect from {0}")]
    NoRedirect(RepositoryIdentity),
}
