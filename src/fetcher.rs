//! Repository fetcher
//!
//! Turns hosting API results into catalog records. A release is recorded only if
//! its tag is a semantic version, it carries exactly one `.pak` asset and its
//! `mod.json` passes manifest validation; anything else is skipped and reported.

use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha512};
use tracing::{debug, info, warn};

use crate::error::{FetchError, FetchErrorKind};
use crate::hosting::{HostingApi, RawRelease};
use crate::identity::RepositoryIdentity;
use crate::model::{Dependency, Manifest, Package, Release, ReleaseAsset};
use crate::retry::RetryPolicy;
use crate::version::parse_version;

const PAK_EXTENSION: &str = ".pak";

/// A release that was seen but not recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRelease {
    pub identity: RepositoryIdentity,
    pub tag: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPackage {
    pub package: Package,
    pub skipped: Vec<SkippedRelease>,
}

pub struct RepositoryFetcher {
    hosting: Arc<dyn HostingApi>,
    retry: RetryPolicy,
    hash_assets: bool,
}

impl RepositoryFetcher {
    pub fn new(hosting: Arc<dyn HostingApi>, retry: RetryPolicy, hash_assets: bool) -> Self {
        Self {
            hosting,
            retry,
            hash_assets,
        }
    }

    /// Published releases of the repository. Drafts are dropped.
    pub async fn list_releases(
        &self,
        identity: &RepositoryIdentity,
    ) -> Result<Vec<RawRelease>, FetchError> {
        let releases = self
            .retry
            .run("Listing releases", || self.hosting.list_releases(identity))
            .await?;
        Ok(releases.into_iter().filter(|r| !r.draft).collect())
    }

    /// Dependencies declared by the manifest at `tag`
    pub async fn fetch_dependency_manifest(
        &self,
        identity: &RepositoryIdentity,
        tag: &str,
    ) -> Result<Vec<Dependency>, FetchError> {
        Ok(self.fetch_manifest(identity, tag).await?.dependencies)
    }

    /// Fetch and validate a single release by tag
    pub async fn fetch_release(
        &self,
        identity: &RepositoryIdentity,
        tag: &str,
    ) -> Result<Release, FetchError> {
        let raw = self
            .retry
            .run("Fetching release", || self.hosting.get_release(identity, tag))
            .await?;
        self.build_release(identity, raw).await
    }

    /// Fetch every valid release of a repository.
    ///
    /// Invalid releases are skipped. Fails if the release list cannot be read,
    /// if a release fails for a reason other than its own content, or if no
    /// release is valid.
    pub async fn fetch_package(
        &self,
        identity: &RepositoryIdentity,
    ) -> Result<FetchedPackage, FetchError> {
        info!("Getting all releases for {}", identity);
        let raw_releases = self.list_releases(identity).await?;
        debug!("Found {} releases for {}", raw_releases.len(), identity);

        let mut releases = Vec::new();
        let mut skipped = Vec::new();

        for raw in raw_releases {
            let tag = raw.tag_name.clone();
            match self.build_release(identity, raw).await {
                Ok(release) => releases.push(release),
                Err(e) if matches!(e.kind, FetchErrorKind::Malformed | FetchErrorKind::NotFound) => {
                    warn!("Skipping release {} {}: {}", identity, tag, e.message);
                    skipped.push(SkippedRelease {
                        identity: identity.clone(),
                        tag,
                        reason: e.message,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        if releases.is_empty() {
            return Err(FetchError::malformed(format!(
                "{} has no valid releases",
                identity
            )));
        }

        info!(
            "Successfully processed {} releases for {}",
            releases.len(),
            identity
        );
        Ok(FetchedPackage {
            package: Package::new(identity.clone(), releases),
            skipped,
        })
    }

    async fn fetch_manifest(
        &self,
        identity: &RepositoryIdentity,
        tag: &str,
    ) -> Result<Manifest, FetchError> {
        let bytes = self
            .retry
            .run("Fetching manifest", || self.hosting.fetch_manifest(identity, tag))
            .await
            .map_err(|e| match e.kind {
                FetchErrorKind::NotFound => {
                    FetchError::not_found("mod.json does not exist for this release")
                }
                _ => e,
            })?;

        let manifest = Manifest::from_slice(&bytes)
            .map_err(|e| FetchError::malformed(format!("invalid mod.json: {}", e)))?;

        let problems = manifest.problems();
        if !problems.is_empty() {
            return Err(FetchError::malformed(format!(
                "mod.json failed validation: {}",
                problems.join("; ")
            )));
        }
        Ok(manifest)
    }

    async fn build_release(
        &self,
        identity: &RepositoryIdentity,
        raw: RawRelease,
    ) -> Result<Release, FetchError> {
        let version = parse_version(&raw.tag_name).map_err(|e| FetchError::malformed(e.to_string()))?;

        let paks: Vec<_> = raw
            .assets
            .iter()
            .filter(|asset| asset.name.ends_with(PAK_EXTENSION))
            .collect();
        let pak = match paks.as_slice() {
            [pak] => *pak,
            [] => {
                return Err(FetchError::malformed(format!(
                    "no pak file found for release {}",
                    raw.tag_name
                )));
            }
            _ => {
                return Err(FetchError::malformed(format!(
                    "multiple pak files found for release {}",
                    raw.tag_name
                )));
            }
        };

        let manifest = self.fetch_manifest(identity, &raw.tag_name).await?;

        let sha512 = if self.hash_assets {
            let url = pak.browser_download_url.as_str();
            let bytes = self
                .retry
                .run("Downloading asset", || self.hosting.download_asset(url))
                .await?;
            Some(hex::encode(Sha512::digest(&bytes)))
        } else {
            None
        };

        Ok(Release {
            tag: raw.tag_name.clone(),
            version,
            release_date: pak.updated_at.or(raw.published_at),
            asset: Some(ReleaseAsset {
                file_name: pak.name.clone(),
                download_url: pak.browser_download_url.clone(),
                sha512,
                updated_at: pak.updated_at,
            }),
            manifest,
        })
    }
}
