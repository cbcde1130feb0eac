//! Operation reports
//!
//! Every catalog operation returns a report, printed with [`fmt::Display`] for
//! people or serialized to JSON for automation.

use std::fmt;

use serde::Serialize;

use crate::error::{FetchError, FetchErrorKind};
use crate::fetcher::SkippedRelease;
use crate::identity::RepositoryIdentity;
use crate::validate::ValidationReport;

/// A repository that could not be synchronized
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    pub identity: RepositoryIdentity,
    /// Absent when the failure happened before any fetch, e.g. a redirect cycle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FetchErrorKind>,
    pub message: String,
}

impl SyncFailure {
    pub fn from_fetch(identity: RepositoryIdentity, error: FetchError) -> Self {
        Self {
            identity,
            kind: Some(error.kind),
            message: error.message,
        }
    }

    pub fn other(identity: RepositoryIdentity, message: impl Into<String>) -> Self {
        Self {
            identity,
            kind: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub added: Vec<RepositoryIdentity>,
    pub removed: Vec<RepositoryIdentity>,
    pub failures: Vec<SyncFailure>,
    pub skipped_releases: Vec<SkippedRelease>,
    pub dry_run: bool,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.failures.is_empty()
    }
}

/// One effect an operation had, or would have had in a dry run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Change {
    Registered {
        identity: RepositoryIdentity,
    },
    AlreadyRegistered {
        identity: RepositoryIdentity,
    },
    Unregistered {
        identity: RepositoryIdentity,
    },
    PackageStored {
        identity: RepositoryIdentity,
        releases: usize,
    },
    PackageRemoved {
        identity: RepositoryIdentity,
    },
    ReleaseAdded {
        identity: RepositoryIdentity,
        tag: String,
    },
    ReleaseAlreadyPresent {
        identity: RepositoryIdentity,
        tag: String,
    },
    RedirectAdded {
        from: RepositoryIdentity,
        to: RepositoryIdentity,
    },
    RedirectUnchanged {
        from: RepositoryIdentity,
        to: RepositoryIdentity,
    },
    RedirectRemoved {
        from: RepositoryIdentity,
        to: RepositoryIdentity,
    },
    /// A stored package re-keyed to its new canonical identity
    PackageMoved {
        from: RepositoryIdentity,
        to: RepositoryIdentity,
    },
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Registered { identity } => write!(f, "registered {}", identity),
            Change::AlreadyRegistered { identity } => {
                write!(f, "{} is already registered", identity)
            }
            Change::Unregistered { identity } => write!(f, "unregistered {}", identity),
            Change::PackageStored { identity, releases } => {
                write!(f, "stored {} ({} releases)", identity, releases)
            }
            Change::PackageRemoved { identity } => write!(f, "removed package {}", identity),
            Change::ReleaseAdded { identity, tag } => {
                write!(f, "added release {} of {}", tag, identity)
            }
            Change::ReleaseAlreadyPresent { identity, tag } => {
                write!(f, "release {} of {} is already present", tag, identity)
            }
            Change::RedirectAdded { from, to } => write!(f, "redirect {} -> {}", from, to),
            Change::RedirectUnchanged { from, to } => {
                write!(f, "redirect {} -> {} already exists", from, to)
            }
            Change::RedirectRemoved { from, to } => {
                write!(f, "removed redirect {} -> {}", from, to)
            }
            Change::PackageMoved { from, to } => write!(f, "moved package {} to {}", from, to),
        }
    }
}

/// Result of a catalog operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationReport {
    pub operation: &'static str,
    pub dry_run: bool,
    pub changes: Vec<Change>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_releases: Vec<SkippedRelease>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncReport>,
    /// State of the catalog after the operation. Informational for mutating
    /// operations; the outcome itself for `validate`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
    success: bool,
}

impl OperationReport {
    pub fn new(operation: &'static str, dry_run: bool) -> Self {
        Self {
            operation,
            dry_run,
            changes: Vec::new(),
            skipped_releases: Vec::new(),
            sync: None,
            validation: None,
            success: true,
        }
    }

    pub fn with_change(mut self, change: Change) -> Self {
        self.changes.push(change);
        self
    }

    pub fn with_sync(mut self, sync: SyncReport) -> Self {
        self.success &= sync.is_success();
        self.sync = Some(sync);
        self
    }

    pub fn with_validation(mut self, validation: ValidationReport) -> Self {
        self.validation = Some(validation);
        self
    }

    /// Like [`OperationReport::with_validation`], but the findings decide success
    pub fn with_validation_outcome(mut self, validation: ValidationReport) -> Self {
        self.success &= validation.is_valid();
        self.validation = Some(validation);
        self
    }

    pub fn is_success(&self) -> bool {
        self.success
    }
}

impl fmt::Display for OperationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.dry_run { "[dry-run] " } else { "" };
        let status = if self.success { "succeeded" } else { "failed" };
        writeln!(f, "{}{} {}", prefix, self.operation, status)?;

        for change in &self.changes {
            writeln!(f, "  {}", change)?;
        }

        if let Some(sync) = &self.sync {
            for identity in &sync.added {
                writeln!(f, "  + {}", identity)?;
            }
            for identity in &sync.removed {
                writeln!(f, "  - {}", identity)?;
            }
            for failure in &sync.failures {
                writeln!(f, "  ! {}: {}", failure.identity, failure.message)?;
            }
            if sync.is_empty() {
                writeln!(f, "  registry and package database are in sync")?;
            }
        }

        let skipped = self
            .skipped_releases
            .iter()
            .chain(self.sync.iter().flat_map(|s| s.skipped_releases.iter()));
        for release in skipped {
            writeln!(
                f,
                "  skipped {} {}: {}",
                release.identity, release.tag, release.reason
            )?;
        }

        if let Some(validation) = &self.validation {
            write!(f, "{}", validation)?;
        }
        Ok(())
    }
}
