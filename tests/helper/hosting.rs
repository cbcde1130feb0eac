//! Hosting test utilities

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use mod_registry::RepositoryIdentity;
use mod_registry::error::{FetchError, FetchErrorKind};
use mod_registry::hosting::{HostingApi, RawAsset, RawRelease};

struct FakeRelease {
    tag: String,
    manifest: Value,
    draft: bool,
}

/// In-memory hosting service keyed by `owner/name`
#[derive(Default)]
pub struct FakeHosting {
    repos: HashMap<String, Vec<FakeRelease>>,
    failures: HashMap<String, FetchErrorKind>,
    list_calls: AtomicUsize,
}

impl FakeHosting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_release(mut self, repo: &str, tag: &str, manifest: Value) -> Self {
        self.repos.entry(repo.to_string()).or_default().push(FakeRelease {
            tag: tag.to_string(),
            manifest,
            draft: false,
        });
        self
    }

    pub fn with_draft(mut self, repo: &str, tag: &str, manifest: Value) -> Self {
        self.repos.entry(repo.to_string()).or_default().push(FakeRelease {
            tag: tag.to_string(),
            manifest,
            draft: true,
        });
        self
    }

    /// Every call for `repo` fails with `kind`
    pub fn with_failure(mut self, repo: &str, kind: FetchErrorKind) -> Self {
        self.failures.insert(repo.to_string(), kind);
        self
    }

    /// Number of `list_releases` calls so far
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn releases(&self, identity: &RepositoryIdentity) -> Result<&[FakeRelease], FetchError> {
        let key = identity.index_entry();
        if let Some(kind) = self.failures.get(&key) {
            return Err(FetchError::new(*kind, format!("{} is unavailable", key)));
        }
        self.repos
            .get(&key)
            .map(Vec::as_slice)
            .ok_or_else(|| FetchError::not_found(format!("{} not found", key)))
    }

    fn release(
        &self,
        identity: &RepositoryIdentity,
        tag: &str,
    ) -> Result<&FakeRelease, FetchError> {
        self.releases(identity)?
            .iter()
            .find(|release| release.tag == tag)
            .ok_or_else(|| FetchError::not_found(format!("release {} not found", tag)))
    }
}

fn raw_release(identity: &RepositoryIdentity, release: &FakeRelease) -> RawRelease {
    let mut raw = RawRelease::new(&release.tag).with_asset(RawAsset::new(
        format!("{}.pak", identity.name()),
        format!(
            "https://example.com/{}/{}.pak",
            identity.index_entry(),
            release.tag
        ),
    ));
    raw.draft = release.draft;
    raw
}

#[async_trait]
impl HostingApi for FakeHosting {
    async fn list_releases(
        &self,
        identity: &RepositoryIdentity,
    ) -> Result<Vec<RawRelease>, FetchError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .releases(identity)?
            .iter()
            .rev()
            .map(|release| raw_release(identity, release))
            .collect())
    }

    async fn get_release(
        &self,
        identity: &RepositoryIdentity,
        tag: &str,
    ) -> Result<RawRelease, FetchError> {
        let release = self.release(identity, tag)?;
        Ok(raw_release(identity, release))
    }

    async fn fetch_manifest(
        &self,
        identity: &RepositoryIdentity,
        tag: &str,
    ) -> Result<Vec<u8>, FetchError> {
        let release = self.release(identity, tag)?;
        Ok(serde_json::to_vec(&release.manifest).unwrap())
    }

    async fn download_asset(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        Ok(url.as_bytes().to_vec())
    }
}
