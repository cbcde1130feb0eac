//! Persistent storage for the registry list, redirect table and package records
//!
//! # Implementations
//!
//! - [`FsStorage`]: Registry and package database directories on disk
//! - [`MemoryStorage`]: Text-keyed map, used by tests and previews
//!
//! # Layout
//!
//! ```text
//! <registry>/*.txt                  registry list, one repository per line
//! <registry>/redirects/*.txt        `from -> to` redirect lines
//! <package_db>/packages/<owner>/<name>.json          github.com records
//! <package_db>/packages/<host>/<owner>/<name>.json   records on other hosts
//! ```

pub mod fs;
pub mod memory;

use std::path::PathBuf;

use crate::error::StorageError;
use crate::identity::{DEFAULT_HOST, RepositoryIdentity};
use crate::model::{Package, RegistryList};
use crate::redirect::RedirectTable;

pub use self::fs::FsStorage;
pub use self::memory::MemoryStorage;

/// Registry file that receives newly registered repositories
pub const REGISTRY_LIST_FILE: &str = "packages.txt";
/// Registry subdirectory holding redirect files
pub const REDIRECTS_DIR: &str = "redirects";
/// Redirect file (inside [`REDIRECTS_DIR`]) that receives new redirects
pub const REDIRECTS_FILE: &str = "redirects.txt";
pub const PACKAGES_DIR: &str = "packages";
/// Extension of registry list and redirect files
pub const TEXT_EXTENSION: &str = "txt";

/// Relative location of a package record. GitHub repositories are stored as
/// `packages/<owner>/<name>.json`, other hosts get an extra `<host>` level.
pub fn package_record_path(identity: &RepositoryIdentity) -> PathBuf {
    let mut path = PathBuf::from(PACKAGES_DIR);
    if identity.host() != DEFAULT_HOST {
        path.push(identity.host());
    }
    path.join(identity.owner())
        .join(format!("{}.json", identity.name()))
}

/// Read-all / write-one surface over the catalog's persisted artifacts.
/// Missing artifacts read as empty.
pub trait Storage: Send + Sync {
    fn read_registry_list(&self) -> Result<RegistryList, StorageError>;

    fn write_registry_list(&self, list: &RegistryList) -> Result<(), StorageError>;

    fn read_redirects(&self) -> Result<RedirectTable, StorageError>;

    fn write_redirects(&self, table: &RedirectTable) -> Result<(), StorageError>;

    fn read_packages(&self) -> Result<Vec<Package>, StorageError>;

    fn write_package(&self, package: &Package) -> Result<(), StorageError>;

    /// Deleting an absent record is not an error
    fn delete_package(&self, identity: &RepositoryIdentity) -> Result<(), StorageError>;

    fn write_packages(&self, packages: &[Package]) -> Result<(), StorageError> {
        packages
            .iter()
            .try_for_each(|package| self.write_package(package))
    }
}
