//! Registry synchronization
//!
//! Reconciles the declared registry list with the package store: packages for
//! newly listed repositories are fetched, packages no longer listed are dropped.
//! Fetches run concurrently; the store is only touched once all of them finish.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use indexmap::{IndexMap, IndexSet};
use tracing::{debug, error, info};

use crate::error::{CatalogError, FetchError};
use crate::fetcher::{FetchedPackage, RepositoryFetcher};
use crate::identity::RepositoryIdentity;
use crate::model::RegistryList;
use crate::report::{SyncFailure, SyncReport};
use crate::store::PackageStore;
use crate::version::parse_version;

pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 8;

/// Result of merging a single release into the store
#[derive(Debug, Clone, PartialEq)]
pub enum ReleaseOutcome {
    Added,
    AlreadyPresent,
    /// The package was not stored yet, so every release was fetched
    PackageFetched(FetchedPackage),
}

pub struct Synchronizer {
    fetcher: Arc<RepositoryFetcher>,
    max_concurrent_fetches: usize,
}

impl Synchronizer {
    pub fn new(fetcher: Arc<RepositoryFetcher>, max_concurrent_fetches: usize) -> Self {
        Self {
            fetcher,
            max_concurrent_fetches: max_concurrent_fetches.max(1),
        }
    }

    /// Bring `store` in line with `registry`.
    ///
    /// A failed fetch leaves that identity absent and is reported; successful
    /// additions are kept either way. In a dry run every fetch still happens but
    /// the store is left untouched.
    pub async fn sync(
        &self,
        store: &mut PackageStore,
        registry: &RegistryList,
        dry_run: bool,
    ) -> SyncReport {
        let mut report = SyncReport {
            dry_run,
            ..SyncReport::default()
        };

        let mut resolved = IndexSet::new();
        // Everything on a chain that failed to resolve may be the listed package
        let mut unresolved = IndexSet::new();
        for identity in registry.iter() {
            match store.database().canonical(identity) {
                Ok(canonical) => {
                    resolved.insert(canonical);
                }
                Err(e) => {
                    error!("Failed to resolve {}: {}", identity, e);
                    unresolved.extend(store.database().redirects().chain(identity));
                    report
                        .failures
                        .push(SyncFailure::other(identity.clone(), e.to_string()));
                }
            }
        }

        let to_add: Vec<RepositoryIdentity> = resolved
            .iter()
            .filter(|identity| !store.database().identities().any(|stored| stored == *identity))
            .cloned()
            .collect();
        let mut to_remove: Vec<RepositoryIdentity> = store
            .database()
            .identities()
            .filter(|stored| !resolved.contains(*stored) && !unresolved.contains(*stored))
            .cloned()
            .collect();
        to_remove.sort();

        info!(
            "Registry sync: {} to add, {} to remove",
            to_add.len(),
            to_remove.len()
        );

        let fetched = self.fetch_all(&to_add).await;

        for identity in &to_add {
            let Some(result) = fetched.get(identity) else {
                continue;
            };
            match result {
                Ok(fetched) => {
                    report.skipped_releases.extend(fetched.skipped.iter().cloned());
                    if !dry_run
                        && let Err(e) = store.put(fetched.package.clone(), false)
                    {
                        error!("Failed to store {}: {}", identity, e);
                        report
                            .failures
                            .push(SyncFailure::other(identity.clone(), e.to_string()));
                        continue;
                    }
                    report.added.push(identity.clone());
                }
                Err(e) => {
                    error!("Failed to fetch {}: {}", identity, e);
                    report
                        .failures
                        .push(SyncFailure::from_fetch(identity.clone(), e.clone()));
                }
            }
        }

        for identity in to_remove {
            if !dry_run
                && let Err(e) = store.remove(&identity)
            {
                error!("Failed to remove {}: {}", identity, e);
                report
                    .failures
                    .push(SyncFailure::other(identity.clone(), e.to_string()));
                continue;
            }
            report.removed.push(identity);
        }

        report
    }

    /// Fetch packages with at most `max_concurrent_fetches` in flight. Each
    /// identity lands in the result map exactly once.
    async fn fetch_all(
        &self,
        identities: &[RepositoryIdentity],
    ) -> IndexMap<RepositoryIdentity, Result<FetchedPackage, FetchError>> {
        stream::iter(identities.iter().cloned())
            .map(|identity| {
                let fetcher = Arc::clone(&self.fetcher);
                async move {
                    let result = fetcher.fetch_package(&identity).await;
                    (identity, result)
                }
            })
            .buffer_unordered(self.max_concurrent_fetches)
            .fold(IndexMap::new(), |mut results, (identity, result)| async move {
                results.entry(identity).or_insert(result);
                results
            })
            .await
    }

    /// Fetch one package and store it, replacing the stored record for the same
    /// canonical identity so a re-fetch picks up new upstream releases. Fails
    /// outright if the fetch fails.
    pub async fn fetch_and_store(
        &self,
        store: &mut PackageStore,
        identity: &RepositoryIdentity,
        dry_run: bool,
    ) -> Result<FetchedPackage, CatalogError> {
        let canonical = store.database().canonical(identity)?;
        let fetched = self
            .fetcher
            .fetch_package(&canonical)
            .await
            .map_err(|source| CatalogError::Fetch {
                identity: canonical.clone(),
                source,
            })?;

        if !dry_run {
            store.put(fetched.package.clone(), true)?;
        }
        Ok(fetched)
    }

    /// Merge a single release of an already tracked package.
    ///
    /// A version the store already holds is reported as present without
    /// fetching. An untracked package is fetched in full instead.
    pub async fn add_release(
        &self,
        store: &mut PackageStore,
        identity: &RepositoryIdentity,
        tag: &str,
        dry_run: bool,
    ) -> Result<ReleaseOutcome, CatalogError> {
        let version = parse_version(tag)?;
        let canonical = store.database().canonical(identity)?;

        let Some(existing) = store.get(&canonical)?.cloned() else {
            info!(
                "Package {} not found in the store, fetching all releases",
                canonical
            );
            let fetched = self.fetch_and_store(store, &canonical, dry_run).await?;
            return Ok(ReleaseOutcome::PackageFetched(fetched));
        };

        if existing.has_version(&version) {
            debug!("Release {} of {} is already present", tag, canonical);
            return Ok(ReleaseOutcome::AlreadyPresent);
        }

        let release = self
            .fetcher
            .fetch_release(&canonical, tag)
            .await
            .map_err(|source| CatalogError::Fetch {
                identity: canonical.clone(),
                source,
            })?;

        if !dry_run {
            store.put(existing.with_release(release), true)?;
        }
        Ok(ReleaseOutcome::Added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use rstest::rstest;

    use crate::error::FetchErrorKind;
    use crate::hosting::{HostingApi, MockHostingApi, RawAsset, RawRelease};
    use crate::model::Package;
    use crate::redirect::RedirectTable;
    use crate::retry::RetryPolicy;
    use crate::store::PackageDatabase;

    const MANIFEST: &[u8] = br#"{"name": "Mod", "type": "Client"}"#;

    fn id(s: &str) -> RepositoryIdentity {
        RepositoryIdentity::parse(s).unwrap()
    }

    fn release_with_pak(tag: &str) -> RawRelease {
        RawRelease::new(tag).with_asset(RawAsset::new("Mod.pak", "https://example.com/Mod.pak"))
    }

    fn synchronizer(mock: MockHostingApi) -> Synchronizer {
        let fetcher = RepositoryFetcher::new(Arc::new(mock), RetryPolicy::none(), false);
        Synchronizer::new(Arc::new(fetcher), 4)
    }

    fn hosting_with(repos: &'static [(&'static str, &'static [&'static str])]) -> MockHostingApi {
        let mut mock = MockHostingApi::new();
        mock.expect_list_releases().returning(move |identity| {
            repos
                .iter()
                .find(|(repo, _)| identity.index_entry() == *repo)
                .map(|(_, tags)| tags.iter().map(|t| release_with_pak(t)).collect())
                .ok_or_else(|| FetchError::not_found(format!("{} not found", identity)))
        });
        mock.expect_get_release()
            .returning(|_, tag| Ok(release_with_pak(tag)));
        mock.expect_fetch_manifest()
            .returning(|_, _| Ok(MANIFEST.to_vec()));
        mock
    }

    fn registry(entries: &[&str]) -> RegistryList {
        entries.iter().map(|e| id(e)).collect()
    }

    #[tokio::test]
    async fn sync_adds_listed_packages_and_second_run_is_empty() {
        let sync = synchronizer(hosting_with(&[("Org/ModA", &["v1.0.0", "v1.1.0"])]));
        let mut store = PackageStore::default();
        let list = registry(&["Org/ModA"]);

        let first = sync.sync(&mut store, &list, false).await;
        let second = sync.sync(&mut store, &list, false).await;

        assert_eq!(first.added, vec![id("Org/ModA")]);
        assert!(first.is_success());
        let stored = store.get(&id("Org/ModA")).unwrap().unwrap();
        assert_eq!(stored.releases().len(), 2);
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn sync_removes_unlisted_packages() {
        let sync = synchronizer(MockHostingApi::new());
        let mut store = PackageStore::default();
        store.put(Package::new(id("org/gone"), vec![]), false).unwrap();

        let report = sync.sync(&mut store, &RegistryList::new(), false).await;

        assert_eq!(report.removed, vec![id("org/gone")]);
        assert!(store.get(&id("org/gone")).unwrap().is_none());
    }

    #[tokio::test]
    async fn sync_keeps_successes_when_some_fetches_fail() {
        let sync = synchronizer(hosting_with(&[("org/ok", &["1.0.0"])]));
        let mut store = PackageStore::default();

        let report = sync
            .sync(&mut store, &registry(&["org/ok", "org/missing"]), false)
            .await;

        assert!(!report.is_success());
        assert_eq!(report.added, vec![id("org/ok")]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].identity, id("org/missing"));
        assert_eq!(report.failures[0].kind, Some(FetchErrorKind::NotFound));
        assert!(store.get(&id("org/ok")).unwrap().is_some());
        assert!(store.get(&id("org/missing")).unwrap().is_none());
    }

    #[tokio::test]
    async fn sync_dry_run_reports_without_mutating() {
        let sync = synchronizer(hosting_with(&[("org/new", &["1.0.0"])]));
        let mut store = PackageStore::default();
        store.put(Package::new(id("org/gone"), vec![]), false).unwrap();
        store.commit(&crate::storage::MemoryStorage::new()).unwrap();

        let report = sync.sync(&mut store, &registry(&["org/new"]), true).await;

        assert!(report.dry_run);
        assert_eq!(report.added, vec![id("org/new")]);
        assert_eq!(report.removed, vec![id("org/gone")]);
        assert!(!store.is_dirty());
        assert!(store.get(&id("org/new")).unwrap().is_none());
    }

    #[tokio::test]
    async fn sync_resolves_listed_identities_through_redirects() {
        let sync = synchronizer(hosting_with(&[("NewOrg/ModB", &["1.0.0"])]));
        let mut store = PackageStore::default();
        store.add_redirect(id("OldOrg/ModB"), id("NewOrg/ModB")).unwrap();

        let report = sync.sync(&mut store, &registry(&["OldOrg/ModB"]), false).await;

        assert_eq!(report.added, vec![id("NewOrg/ModB")]);
        assert!(store.get(&id("OldOrg/ModB")).unwrap().is_some());
    }

    #[rstest]
    #[case("a/x")]
    #[case("c/x")]
    #[tokio::test]
    async fn sync_never_removes_package_behind_redirect_cycle(#[case] listed: &str) {
        let sync = synchronizer(MockHostingApi::new());
        let redirects =
            RedirectTable::parse("c/x -> a/x\na/x -> b/x\nb/x -> a/x\n", "redirects.txt")
                .unwrap();
        let mut store = PackageStore::new(PackageDatabase::new(
            vec![Package::new(id("a/x"), vec![])],
            redirects,
        ));

        let report = sync.sync(&mut store, &registry(&[listed]), false).await;

        assert!(!report.is_success());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].identity, id(listed));
        assert!(report.removed.is_empty());
        assert!(report.added.is_empty());
        assert_eq!(store.database().len(), 1);
        assert!(!store.is_dirty());
    }

    /// Tracks the largest number of overlapping `list_releases` calls
    #[derive(Default)]
    struct SlowHosting {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl HostingApi for SlowHosting {
        async fn list_releases(
            &self,
            _identity: &RepositoryIdentity,
        ) -> Result<Vec<RawRelease>, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![release_with_pak("v1.0.0")])
        }

        async fn get_release(
            &self,
            _identity: &RepositoryIdentity,
            tag: &str,
        ) -> Result<RawRelease, FetchError> {
            Ok(release_with_pak(tag))
        }

        async fn fetch_manifest(
            &self,
            _identity: &RepositoryIdentity,
            _tag: &str,
        ) -> Result<Vec<u8>, FetchError> {
            Ok(MANIFEST.to_vec())
        }

        async fn download_asset(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn sync_bounds_concurrent_fetches() {
        let hosting = Arc::new(SlowHosting::default());
        let fetcher = RepositoryFetcher::new(hosting.clone(), RetryPolicy::none(), false);
        let sync = Synchronizer::new(Arc::new(fetcher), 2);
        let mut store = PackageStore::default();
        let list = registry(&["org/a", "org/b", "org/c", "org/d", "org/e", "org/f"]);

        let report = sync.sync(&mut store, &list, false).await;

        assert_eq!(report.added.len(), 6);
        assert_eq!(hosting.peak.load(Ordering::SeqCst), 2);
        assert_eq!(store.database().len(), 6);
    }

    #[tokio::test]
    async fn add_release_of_present_version_does_not_fetch() {
        let sync = synchronizer(hosting_with(&[("org/a", &["v1.0.0"])]));
        let mut store = PackageStore::default();
        sync.sync(&mut store, &registry(&["org/a"]), false).await;

        let outcome = sync
            .add_release(&mut store, &id("org/a"), "1.0.0", false)
            .await
            .unwrap();

        assert_eq!(outcome, ReleaseOutcome::AlreadyPresent);
    }

    #[tokio::test]
    async fn add_release_merges_new_release() {
        let sync = synchronizer(hosting_with(&[("org/a", &["v1.0.0"])]));
        let mut store = PackageStore::default();
        sync.sync(&mut store, &registry(&["org/a"]), false).await;

        let outcome = sync
            .add_release(&mut store, &id("org/a"), "v1.1.0", false)
            .await
            .unwrap();

        assert_eq!(outcome, ReleaseOutcome::Added);
        let package = store.get(&id("org/a")).unwrap().unwrap();
        assert_eq!(package.latest().unwrap().tag, "v1.1.0");
    }

    #[tokio::test]
    async fn add_release_for_untracked_package_fetches_everything() {
        let sync = synchronizer(hosting_with(&[("org/a", &["v1.0.0", "v0.9.0"])]));
        let mut store = PackageStore::default();

        let outcome = sync
            .add_release(&mut store, &id("org/a"), "v1.0.0", false)
            .await
            .unwrap();

        assert!(matches!(outcome, ReleaseOutcome::PackageFetched(_)));
        assert_eq!(store.get(&id("org/a")).unwrap().unwrap().releases().len(), 2);
    }

    #[tokio::test]
    async fn add_release_rejects_invalid_tag() {
        let sync = synchronizer(MockHostingApi::new());
        let mut store = PackageStore::default();

        let result = sync
            .add_release(&mut store, &id("org/a"), "nightly", false)
            .await;

        assert!(matches!(result, Err(CatalogError::Parse(_))));
    }
}
