//! Catalog operations
//!
//! Each operation loads what it needs from storage, applies its change in memory
//! and writes the result back unless it is a dry run. Mutating operations attach
//! a validation report of the resulting database; only `validate` lets that
//! report decide success.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::Config;
use crate::error::{CatalogError, FetchError};
use crate::hosting::{GitHubApi, HostingApi};
use crate::fetcher::RepositoryFetcher;
use crate::identity::RepositoryIdentity;
use crate::model::RegistryList;
use crate::redirect::AddOutcome;
use crate::report::{Change, OperationReport};
use crate::retry::RetryPolicy;
use crate::storage::{FsStorage, Storage};
use crate::store::PackageStore;
use crate::sync::{ReleaseOutcome, Synchronizer};
use crate::validate::validate;

pub struct Catalog {
    storage: Arc<dyn Storage>,
    synchronizer: Synchronizer,
}

impl Catalog {
    pub fn new(storage: Arc<dyn Storage>, synchronizer: Synchronizer) -> Self {
        Self {
            storage,
            synchronizer,
        }
    }

    /// Wire the catalog to an injected hosting API using the fetch settings of `config`
    pub fn with_hosting(
        storage: Arc<dyn Storage>,
        hosting: Arc<dyn HostingApi>,
        config: &Config,
    ) -> Self {
        let retry = RetryPolicy::new(
            config.fetch.max_attempts,
            Duration::from_millis(config.fetch.retry_base_delay_ms),
        );
        let fetcher = RepositoryFetcher::new(hosting, retry, config.fetch.hash_assets);
        let synchronizer =
            Synchronizer::new(Arc::new(fetcher), config.fetch.max_concurrent_fetches);
        Self::new(storage, synchronizer)
    }

    /// Filesystem storage and the GitHub API, as configured
    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        let storage = FsStorage::new(&config.paths.registry, &config.paths.package_db);
        let hosting = GitHubApi::new(
            &config.github.api_url,
            &config.github.raw_url,
            config.github.token.clone(),
        )?
        .with_host(&config.github.host);
        Ok(Self::with_hosting(
            Arc::new(storage),
            Arc::new(hosting),
            config,
        ))
    }

    fn load_store(&self) -> Result<PackageStore, CatalogError> {
        Ok(PackageStore::load(self.storage.as_ref())?)
    }

    /// Write back the store and, if given, the registry list
    fn finish(
        &self,
        store: &mut PackageStore,
        list: Option<&RegistryList>,
        dry_run: bool,
    ) -> Result<(), CatalogError> {
        if dry_run {
            info!("Dry run: nothing written");
            return Ok(());
        }
        store.commit(self.storage.as_ref())?;
        if let Some(list) = list {
            self.storage.write_registry_list(list)?;
        }
        Ok(())
    }

    fn register(list: &mut RegistryList, identity: &RepositoryIdentity) -> Change {
        if list.insert(identity.clone()) {
            Change::Registered {
                identity: identity.clone(),
            }
        } else {
            Change::AlreadyRegistered {
                identity: identity.clone(),
            }
        }
    }

    /// Append `identity` to the registry list without fetching anything
    pub async fn register_in_list(
        &self,
        identity: &RepositoryIdentity,
        dry_run: bool,
    ) -> Result<OperationReport, CatalogError> {
        let mut list = self.storage.read_registry_list()?;
        let change = Self::register(&mut list, identity);

        if !dry_run && matches!(change, Change::Registered { .. }) {
            self.storage.write_registry_list(&list)?;
        }
        Ok(OperationReport::new("register", dry_run).with_change(change))
    }

    /// Fetch one package and store it without touching the registry list
    pub async fn fetch_and_store(
        &self,
        identity: &RepositoryIdentity,
        dry_run: bool,
    ) -> Result<OperationReport, CatalogError> {
        let mut store = self.load_store()?;
        let fetched = self
            .synchronizer
            .fetch_and_store(&mut store, identity, dry_run)
            .await?;
        self.finish(&mut store, None, dry_run)?;

        let mut report = OperationReport::new("fetch-and-store", dry_run).with_change(
            Change::PackageStored {
                identity: fetched.package.identity.clone(),
                releases: fetched.package.releases().len(),
            },
        );
        report.skipped_releases = fetched.skipped;
        Ok(report.with_validation(validate(store.database())))
    }

    /// Fetch a package, store it and add it to the registry list
    pub async fn add_package(
        &self,
        repo_url: &str,
        dry_run: bool,
    ) -> Result<OperationReport, CatalogError> {
        let identity = RepositoryIdentity::parse(repo_url)?;
        let mut list = self.storage.read_registry_list()?;
        let mut store = self.load_store()?;

        let fetched = self
            .synchronizer
            .fetch_and_store(&mut store, &identity, dry_run)
            .await?;
        let registered = Self::register(&mut list, &identity);
        self.finish(&mut store, Some(&list), dry_run)?;

        let mut report = OperationReport::new("add-package", dry_run)
            .with_change(Change::PackageStored {
                identity: fetched.package.identity.clone(),
                releases: fetched.package.releases().len(),
            })
            .with_change(registered);
        report.skipped_releases = fetched.skipped;
        Ok(report.with_validation(validate(store.database())))
    }

    /// Merge one release of a registered package
    pub async fn add_package_release(
        &self,
        repo_url: &str,
        tag: &str,
        dry_run: bool,
    ) -> Result<OperationReport, CatalogError> {
        let identity = RepositoryIdentity::parse(repo_url)?;
        let list = self.storage.read_registry_list()?;
        let mut store = self.load_store()?;

        let canonical = store.database().canonical(&identity)?;
        let registered = list.iter().any(|entry| {
            entry == &identity
                || store
                    .database()
                    .canonical(entry)
                    .is_ok_and(|resolved| resolved == canonical)
        });
        if !registered {
            return Err(CatalogError::NotRegistered(identity));
        }

        let outcome = self
            .synchronizer
            .add_release(&mut store, &identity, tag, dry_run)
            .await?;
        self.finish(&mut store, None, dry_run)?;

        let mut report = OperationReport::new("add-package-release", dry_run);
        match outcome {
            ReleaseOutcome::Added => {
                report = report.with_change(Change::ReleaseAdded {
                    identity: canonical,
                    tag: tag.to_string(),
                });
            }
            ReleaseOutcome::AlreadyPresent => {
                report = report.with_change(Change::ReleaseAlreadyPresent {
                    identity: canonical,
                    tag: tag.to_string(),
                });
            }
            ReleaseOutcome::PackageFetched(fetched) => {
                report = report.with_change(Change::PackageStored {
                    identity: fetched.package.identity.clone(),
                    releases: fetched.package.releases().len(),
                });
                report.skipped_releases = fetched.skipped;
            }
        }
        Ok(report.with_validation(validate(store.database())))
    }

    /// Drop a package from the registry list and the package database
    pub async fn remove_package(
        &self,
        repo_url: &str,
        dry_run: bool,
    ) -> Result<OperationReport, CatalogError> {
        let identity = RepositoryIdentity::parse(repo_url)?;
        let mut list = self.storage.read_registry_list()?;
        let mut store = self.load_store()?;

        let unregistered = list.remove(&identity);
        let removed = store.remove(&identity)?;
        if !unregistered && removed.is_none() {
            return Err(CatalogError::NotTracked(identity));
        }
        self.finish(&mut store, unregistered.then_some(&list), dry_run)?;

        let mut report = OperationReport::new("remove", dry_run);
        if unregistered {
            report = report.with_change(Change::Unregistered {
                identity: identity.clone(),
            });
        }
        if let Some(package) = removed {
            report = report.with_change(Change::PackageRemoved {
                identity: package.identity,
            });
        }
        Ok(report.with_validation(validate(store.database())))
    }

    /// Reconcile the package database with the registry list
    pub async fn process_registry_updates(
        &self,
        dry_run: bool,
    ) -> Result<OperationReport, CatalogError> {
        let list = self.storage.read_registry_list()?;
        let mut store = self.load_store()?;

        let sync = self.synchronizer.sync(&mut store, &list, dry_run).await;
        self.finish(&mut store, None, dry_run)?;

        Ok(OperationReport::new("process-registry-updates", dry_run)
            .with_sync(sync)
            .with_validation(validate(store.database())))
    }

    /// Check every dependency in the persisted package database
    pub fn validate(&self) -> Result<OperationReport, CatalogError> {
        let store = self.load_store()?;
        Ok(OperationReport::new("validate", false)
            .with_validation_outcome(validate(store.database())))
    }

    pub async fn add_redirect(
        &self,
        from: &str,
        to: &str,
        dry_run: bool,
    ) -> Result<OperationReport, CatalogError> {
        let from = RepositoryIdentity::parse(from)?;
        let to = RepositoryIdentity::parse(to)?;
        let mut store = self.load_store()?;

        let added = store.add_redirect(from.clone(), to.clone())?;
        let mut report = OperationReport::new("redirect add", dry_run);
        if let Some(moved_to) = added.moved_to {
            report = report.with_change(Change::PackageMoved {
                from: from.clone(),
                to: moved_to,
            });
        }
        let change = match added.outcome {
            AddOutcome::Added => Change::RedirectAdded { from, to },
            AddOutcome::Unchanged => Change::RedirectUnchanged { from, to },
        };
        self.finish(&mut store, None, dry_run)?;

        Ok(report
            .with_change(change)
            .with_validation(validate(store.database())))
    }

    pub async fn remove_redirect(
        &self,
        from: &str,
        dry_run: bool,
    ) -> Result<OperationReport, CatalogError> {
        let from = RepositoryIdentity::parse(from)?;
        let mut store = self.load_store()?;

        let to = store
            .remove_redirect(&from)
            .ok_or_else(|| CatalogError::NoRedirect(from.clone()))?;
        self.finish(&mut store, None, dry_run)?;

        Ok(OperationReport::new("redirect remove", dry_run)
            .with_change(Change::RedirectRemoved { from, to })
            .with_validation(validate(store.database())))
    }
}
