//! Source-control hosting API used to discover releases
//!
//! # Implementations
//!
//! - [`GitHubApi`]: GitHub REST API plus the raw content host for `mod.json`

pub mod github;

use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;

use crate::error::FetchError;
use crate::identity::RepositoryIdentity;

pub use self::github::GitHubApi;

/// Name of the manifest file read from each release's tag
pub const MANIFEST_FILE: &str = "mod.json";

/// A release as reported by the hosting API, before validation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawRelease {
    pub tag_name: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub assets: Vec<RawAsset>,
}

impl RawRelease {
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            published_at: None,
            draft: false,
            assets: Vec::new(),
        }
    }

    pub fn with_asset(mut self, asset: RawAsset) -> Self {
        self.assets.push(asset);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RawAsset {
    pub fn new(name: impl Into<String>, browser_download_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            browser_download_url: browser_download_url.into(),
            updated_at: None,
        }
    }
}

/// Trait for reading repository releases from a hosting service
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait HostingApi: Send + Sync {
    /// Every release of the repository, newest first as the host reports them
    async fn list_releases(
        &self,
        identity: &RepositoryIdentity,
    ) -> Result<Vec<RawRelease>, FetchError>;

    async fn get_release(
        &self,
        identity: &RepositoryIdentity,
        tag: &str,
    ) -> Result<RawRelease, FetchError>;

    /// Raw bytes of the manifest file at `tag`
    async fn fetch_manifest(
        &self,
        identity: &RepositoryIdentity,
        tag: &str,
    ) -> Result<Vec<u8>, FetchError>;

    async fn download_asset(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}
