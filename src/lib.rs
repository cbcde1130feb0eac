//! Decentralized mod catalog
//!
//! Tracks packages whose source of truth is a set of GitHub repositories:
//! synchronizes a declared registry list against a persisted package database,
//! follows repository redirects and validates that every declared dependency
//! resolves to a compatible release.

pub mod catalog;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod hosting;
pub mod identity;
pub mod lines;
pub mod logging;
pub mod model;
pub mod redirect;
pub mod report;
pub mod retry;
pub mod storage;
pub mod store;
pub mod sync;
pub mod validate;
pub mod version;

pub use catalog::Catalog;
pub use config::Config;
pub use error::CatalogError;
pub use identity::RepositoryIdentity;
pub use report::OperationReport;
