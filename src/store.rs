//! Package store
//!
//! Holds at most one package per canonical identity. Every lookup and insert is
//! resolved through the redirect table first, so a package is reachable by any
//! of its former locations.

use std::collections::HashMap;

use indexmap::IndexSet;
use tracing::{debug, info};

use crate::error::{RedirectError, StorageError, StoreError};
use crate::identity::RepositoryIdentity;
use crate::model::Package;
use crate::redirect::{AddOutcome, RedirectTable};
use crate::storage::Storage;

/// Packages keyed by canonical identity, plus the redirects used to find them
#[derive(Debug, Clone, Default)]
pub struct PackageDatabase {
    packages: HashMap<RepositoryIdentity, Package>,
    redirects: RedirectTable,
}

impl PackageDatabase {
    pub fn new(packages: Vec<Package>, redirects: RedirectTable) -> Self {
        Self {
            packages: packages
                .into_iter()
                .map(|package| (package.identity.clone(), package))
                .collect(),
            redirects,
        }
    }

    pub fn redirects(&self) -> &RedirectTable {
        &self.redirects
    }

    pub fn canonical(
        &self,
        identity: &RepositoryIdentity,
    ) -> Result<RepositoryIdentity, RedirectError> {
        self.redirects.canonical(identity)
    }

    pub fn get(&self, identity: &RepositoryIdentity) -> Result<Option<&Package>, RedirectError> {
        let canonical = self.canonical(identity)?;
        Ok(self.packages.get(&canonical))
    }

    pub fn contains(&self, identity: &RepositoryIdentity) -> Result<bool, RedirectError> {
        self.get(identity).map(|package| package.is_some())
    }

    /// Every stored package. Order is unspecified.
    pub fn all(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    /// Identities as stored, without redirect resolution
    pub fn identities(&self) -> impl Iterator<Item = &RepositoryIdentity> {
        self.packages.keys()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    Replaced,
    /// An identical package was already stored
    Unchanged,
}

/// Result of [`PackageStore::add_redirect`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectOutcome {
    pub outcome: AddOutcome,
    /// New canonical identity of the package that was stored at the source
    pub moved_to: Option<RepositoryIdentity>,
}

/// A [`PackageDatabase`] that remembers what changed since it was loaded
#[derive(Debug, Default)]
pub struct PackageStore {
    database: PackageDatabase,
    written: IndexSet<RepositoryIdentity>,
    removed: IndexSet<RepositoryIdentity>,
    redirects_dirty: bool,
}

impl PackageStore {
    pub fn new(database: PackageDatabase) -> Self {
        Self {
            database,
            ..Self::default()
        }
    }

    pub fn load(storage: &dyn Storage) -> Result<Self, StorageError> {
        let packages = storage.read_packages()?;
        let redirects = storage.read_redirects()?;
        debug!(
            "Loaded {} packages and {} redirects",
            packages.len(),
            redirects.len()
        );
        Ok(Self::new(PackageDatabase::new(packages, redirects)))
    }

    pub fn database(&self) -> &PackageDatabase {
        &self.database
    }

    pub fn get(&self, identity: &RepositoryIdentity) -> Result<Option<&Package>, RedirectError> {
        self.database.get(identity)
    }

    pub fn all(&self) -> impl Iterator<Item = &Package> {
        self.database.all()
    }

    /// Store `package` under its canonical identity.
    ///
    /// Fails with `Duplicate` if a different package already occupies the slot
    /// and `overwrite` is false.
    pub fn put(&mut self, mut package: Package, overwrite: bool) -> Result<PutOutcome, StoreError> {
        let canonical = self.database.canonical(&package.identity)?;
        package.identity = canonical.clone();

        let outcome = match self.database.packages.get(&canonical) {
            Some(existing) if *existing == package => return Ok(PutOutcome::Unchanged),
            Some(_) if !overwrite => {
                return Err(StoreError::Duplicate {
                    identity: canonical,
                });
            }
            Some(_) => PutOutcome::Replaced,
            None => PutOutcome::Inserted,
        };

        debug!("Storing package {} ({:?})", canonical, outcome);
        self.removed.shift_remove(&canonical);
        self.written.insert(canonical.clone());
        self.database.packages.insert(canonical, package);
        Ok(outcome)
    }

    /// Remove the package stored under `identity`, or under its canonical identity
    /// when nothing is stored at `identity` itself.
    pub fn remove(&mut self, identity: &RepositoryIdentity) -> Result<Option<Package>, StoreError> {
        let canonical = if self.database.packages.contains_key(identity) {
            identity.clone()
        } else {
            self.database.canonical(identity)?
        };
        let removed = self.database.packages.remove(&canonical);
        if removed.is_some() {
            debug!("Removing package {}", canonical);
            self.written.shift_remove(&canonical);
            self.removed.insert(canonical);
        }
        Ok(removed)
    }

    /// Record `from -> to`.
    ///
    /// A package stored under `from` would become unreachable, so it moves to the
    /// new canonical identity. Fails with `Duplicate` if a different package
    /// already lives there. A failed call changes nothing.
    pub fn add_redirect(
        &mut self,
        from: RepositoryIdentity,
        to: RepositoryIdentity,
    ) -> Result<RedirectOutcome, StoreError> {
        if self.database.redirects.target_of(&from).is_some() {
            // Unchanged or Conflict, never a new edge
            let outcome = self.database.redirects.add(from, to)?;
            return Ok(RedirectOutcome {
                outcome,
                moved_to: None,
            });
        }

        // Stored keys are canonical, so `from` is the only key the new edge orphans
        let moved = match self.database.packages.get(&from) {
            Some(package) => {
                let canonical = self.database.canonical(&to)?;
                let mut moved = package.clone();
                moved.identity = canonical.clone();
                match self.database.packages.get(&canonical) {
                    Some(existing) if *existing != moved => {
                        return Err(StoreError::Duplicate {
                            identity: canonical,
                        });
                    }
                    _ => Some(moved),
                }
            }
            None => None,
        };

        let outcome = self.database.redirects.add(from.clone(), to)?;
        self.redirects_dirty = true;

        let moved_to = moved.map(|package| {
            let canonical = package.identity.clone();
            debug!("Moving package {} to {}", from, canonical);
            self.database.packages.remove(&from);
            self.written.shift_remove(&from);
            self.removed.insert(from);
            self.removed.shift_remove(&canonical);
            self.written.insert(canonical.clone());
            self.database.packages.insert(canonical.clone(), package);
            canonical
        });

        Ok(RedirectOutcome { outcome, moved_to })
    }

    pub fn remove_redirect(&mut self, from: &RepositoryIdentity) -> Option<RepositoryIdentity> {
        let removed = self.database.redirects.remove(from);
        if removed.is_some() {
            self.redirects_dirty = true;
        }
        removed
    }

    pub fn is_dirty(&self) -> bool {
        self.redirects_dirty || !self.written.is_empty() || !self.removed.is_empty()
    }

    /// Persist every change made since the store was loaded or last committed.
    pub fn commit(&mut self, storage: &dyn Storage) -> Result<(), StorageError> {
        if !self.is_dirty() {
            return Ok(());
        }

        let written: Vec<Package> = self
            .written
            .iter()
            .filter_map(|identity| self.database.packages.get(identity).cloned())
            .collect();
        storage.write_packages(&written)?;

        for identity in &self.removed {
            storage.delete_package(identity)?;
        }

        if self.redirects_dirty {
            storage.write_redirects(&self.database.redirects)?;
        }

        info!(
            "Committed {} written and {} removed packages",
            written.len(),
            self.removed.len()
        );
        self.written.clear();
        self.removed.clear();
        self.redirects_dirty = false;
        Ok(())
    }
}
