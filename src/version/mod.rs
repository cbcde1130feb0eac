//! Version model
//!
//! Semantic version parsing, precedence ordering, and the constraint predicate
//! used to decide whether a release satisfies a dependency.
//!
//! # Modules
//!
//! - [`semver`]: Parsing (with `v` prefix and partial-version tolerance) and precedence
//! - [`constraint`]: Comma-separated constraint clauses and satisfaction

pub mod constraint;
pub mod semver;

pub use self::constraint::{Constraint, satisfies};
pub use self::semver::{compare, parse_version};
pub use ::semver::Version;
