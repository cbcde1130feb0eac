//! Dependency graph validation
//!
//! Checks every dependency of every stored release against the package database.
//! Pure: reads the database, never fetches or mutates.

use std::fmt;

use semver::Version;
use serde::Serialize;
use tracing::debug;

use crate::error::RedirectError;
use crate::identity::RepositoryIdentity;
use crate::model::{Dependency, Package, Release};
use crate::store::PackageDatabase;
use crate::version::satisfies;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsatisfiedReason {
    TargetPackageMissing,
    NoSatisfyingVersion,
    InvalidConstraint,
    RedirectCycle,
}

impl UnsatisfiedReason {
    pub fn as_str(self) -> &'static str {
        match self {
            UnsatisfiedReason::TargetPackageMissing => "target package missing",
            UnsatisfiedReason::NoSatisfyingVersion => "no satisfying version",
            UnsatisfiedReason::InvalidConstraint => "invalid constraint",
            UnsatisfiedReason::RedirectCycle => "redirect cycle",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct UnsatisfiedDependency {
    pub source_package: RepositoryIdentity,
    pub source_version: Version,
    pub target_identity: RepositoryIdentity,
    pub constraint: String,
    pub reason: UnsatisfiedReason,
}

impl fmt::Display for UnsatisfiedDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} requires {} {}: {}",
            self.source_package,
            self.source_version,
            self.target_identity,
            self.constraint,
            self.reason.as_str()
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub packages_checked: usize,
    pub dependencies_checked: usize,
    pub findings: Vec<UnsatisfiedDependency>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.findings.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  validation: {} packages, {} dependencies, {} unsatisfied",
            self.packages_checked,
            self.dependencies_checked,
            self.findings.len()
        )?;
        for finding in &self.findings {
            writeln!(f, "    {}", finding)?;
        }
        Ok(())
    }
}

/// Validate every dependency in `database`. Findings are sorted, so the same
/// database always yields the same report.
pub fn validate(database: &PackageDatabase) -> ValidationReport {
    let mut report = ValidationReport::default();

    for package in database.all() {
        report.packages_checked += 1;
        for release in package.releases() {
            for dependency in release.dependencies() {
                report.dependencies_checked += 1;
                if let Some(reason) = check_dependency(database, dependency) {
                    report
                        .findings
                        .push(finding(package, release, dependency, reason));
                }
            }
        }
    }

    report.findings.sort();
    debug!(
        "Validated {} dependencies, {} unsatisfied",
        report.dependencies_checked,
        report.findings.len()
    );
    report
}

fn check_dependency(
    database: &PackageDatabase,
    dependency: &Dependency,
) -> Option<UnsatisfiedReason> {
    let Ok(constraint) = dependency.constraint() else {
        return Some(UnsatisfiedReason::InvalidConstraint);
    };

    let target = match database.get(&dependency.repository) {
        Ok(Some(target)) => target,
        Ok(None) => return Some(UnsatisfiedReason::TargetPackageMissing),
        Err(RedirectError::Cycle { .. } | RedirectError::Conflict { .. }) => {
            return Some(UnsatisfiedReason::RedirectCycle);
        }
    };

    let satisfied = target
        .releases()
        .iter()
        .any(|release| satisfies(&release.version, &constraint));
    (!satisfied).then_some(UnsatisfiedReason::NoSatisfyingVersion)
}

fn finding(
    package: &Package,
    release: &Release,
    dependency: &Dependency,
    reason: UnsatisfiedReason,
) -> UnsatisfiedDependency {
    UnsatisfiedDependency {
        source_package: package.identity.clone(),
        source_version: release.version.clone(),
        target_identity: dependency.repository.clone(),
        constraint: dependency.version.clone(),
        reason,
    }
}
