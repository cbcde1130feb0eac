//! Catalog records: packages, releases, manifests and dependencies

use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ParseError, StorageError};
use crate::identity::RepositoryIdentity;
use crate::lines::LineFiles;
use crate::storage::REGISTRY_LIST_FILE;
use crate::version::semver::{compare, same_version};
use crate::version::Constraint;

pub const VALID_TAGS: &[&str] = &[
    "Mutator", "Map", "Cosmetic", "Audio", "Model", "Weapon", "Doodad", "Explicit",
];

pub const VALID_MOD_TYPES: &[&str] = &["Client", "Server", "Shared"];

/// A release's reference to another package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    #[serde(rename = "repo_url")]
    pub repository: RepositoryIdentity,
    /// Constraint text as written by the mod author
    pub version: String,
}

impl Dependency {
    pub fn new(repository: RepositoryIdentity, version: impl Into<String>) -> Self {
        Self {
            repository,
            version: version.into(),
        }
    }

    pub fn constraint(&self) -> Result<Constraint, ParseError> {
        Constraint::parse(&self.version)
    }
}

/// Contents of a release's `mod.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(rename = "type")]
    pub mod_type: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    /// Fields this catalog does not interpret, kept verbatim
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl Manifest {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Check the manifest against the catalog's rules, returning every violation.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let invalid_tags: Vec<&str> = self
            .tags
            .iter()
            .map(String::as_str)
            .filter(|tag| !VALID_TAGS.contains(tag))
            .collect();
        if !invalid_tags.is_empty() {
            problems.push(format!(
                "invalid tags {:?}; valid tags are {:?}",
                invalid_tags, VALID_TAGS
            ));
        }

        if !VALID_MOD_TYPES.contains(&self.mod_type.as_str()) {
            problems.push(format!(
                "invalid mod type '{}'; valid types are {:?}",
                self.mod_type, VALID_MOD_TYPES
            ));
        }

        problems.extend(self.dependencies.iter().filter_map(|dependency| {
            dependency.constraint().err().map(|e| {
                format!("dependency {}: {}", dependency.repository.index_entry(), e)
            })
        }));

        problems
    }
}

/// The `.pak` asset attached to a release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub file_name: String,
    pub download_url: String,
    /// Hex SHA-512 of the asset, absent when hashing is disabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha512: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub tag: String,
    pub version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<ReleaseAsset>,
    pub manifest: Manifest,
}

impl Release {
    pub fn dependencies(&self) -> &[Dependency] {
        &self.manifest.dependencies
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    #[serde(rename = "repo_url")]
    pub identity: RepositoryIdentity,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Newest first, one release per version
    releases: Vec<Release>,
}

impl Package {
    /// Build a package, ordering releases newest first and keeping the first
    /// release seen for each version. Display metadata comes from the newest release.
    pub fn new(identity: RepositoryIdentity, releases: Vec<Release>) -> Self {
        let mut unique: Vec<Release> = Vec::with_capacity(releases.len());
        for release in releases {
            if !unique
                .iter()
                .any(|kept| same_version(&kept.version, &release.version))
            {
                unique.push(release);
            }
        }
        unique.sort_by(|a, b| compare(&b.version, &a.version));

        let (name, description) = unique
            .first()
            .map(|latest| {
                (
                    latest.manifest.name.clone(),
                    latest.manifest.description.clone(),
                )
            })
            .unwrap_or_else(|| (identity.name().to_string(), None));

        Self {
            identity,
            name,
            description,
            releases: unique,
        }
    }

    pub fn releases(&self) -> &[Release] {
        &self.releases
    }

    pub fn latest(&self) -> Option<&Release> {
        self.releases.first()
    }

    pub fn has_version(&self, version: &Version) -> bool {
        self.releases
            .iter()
            .any(|release| same_version(&release.version, version))
    }

    /// A new package containing this one's releases plus `release`
    pub fn with_release(&self, release: Release) -> Self {
        let mut releases = self.releases.clone();
        releases.push(release);
        Self::new(self.identity.clone(), releases)
    }

    pub fn from_json(bytes: &[u8], location: &str) -> Result<Self, StorageError> {
        let package: Package =
            serde_json::from_slice(bytes).map_err(|e| StorageError::Malformed {
                location: location.to_string(),
                reason: e.to_string(),
            })?;
        // Re-normalize release order in case the record was edited by hand
        let mut normalized = Self::new(package.identity, package.releases);
        normalized.name = package.name;
        normalized.description = package.description;
        Ok(normalized)
    }

    pub fn to_json(&self) -> Result<String, StorageError> {
        let mut json =
            serde_json::to_string_pretty(self).map_err(|e| StorageError::Malformed {
                location: self.identity.to_string(),
                reason: e.to_string(),
            })?;
        json.push('\n');
        Ok(json)
    }
}

/// Declared set of repositories the catalog should track, in declaration order.
///
/// The list may be spread over several files. Their comments, blank lines and
/// entry spelling survive a rewrite; new entries go to [`REGISTRY_LIST_FILE`].
#[derive(Debug, Clone)]
pub struct RegistryList {
    entries: IndexSet<RepositoryIdentity>,
    files: LineFiles<RepositoryIdentity>,
}

impl Default for RegistryList {
    fn default() -> Self {
        Self {
            entries: IndexSet::new(),
            files: LineFiles::new(REGISTRY_LIST_FILE),
        }
    }
}

impl PartialEq for RegistryList {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for RegistryList {}

impl RegistryList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a single file of the list
    pub fn parse(text: &str, file: &str) -> Result<Self, StorageError> {
        Self::parse_files([(file, text)])
    }

    /// Parse one locator per line from each `(file, text)` pair in order.
    /// Blank lines and `#` comments are kept but carry no entry.
    pub fn parse_files<'a>(
        files: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, StorageError> {
        let mut list = Self::new();
        for (file, text) in files {
            list.files.touch(file);
            for (index, raw) in text.lines().enumerate() {
                let line = raw.trim();
                if line.is_empty() || line.starts_with('#') {
                    list.files.push_verbatim(file, raw);
                    continue;
                }
                let identity =
                    RepositoryIdentity::parse(line).map_err(|e| StorageError::Malformed {
                        location: format!("{}:{}", file, index + 1),
                        reason: e.to_string(),
                    })?;
                list.files.push_entry(file, identity.clone(), raw);
                list.entries.insert(identity);
            }
        }
        Ok(list)
    }

    /// Contents of every file backing the list, as `(file, text)` pairs
    pub fn render_files(&self) -> Vec<(String, String)> {
        self.files.render(&self.entries, |identity| identity.url())
    }

    /// Returns false if the identity was already listed
    pub fn insert(&mut self, identity: RepositoryIdentity) -> bool {
        self.entries.insert(identity)
    }

    pub fn remove(&mut self, identity: &RepositoryIdentity) -> bool {
        self.entries.shift_remove(identity)
    }

    pub fn contains(&self, identity: &RepositoryIdentity) -> bool {
        self.entries.contains(identity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RepositoryIdentity> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<RepositoryIdentity> for RegistryList {
    fn from_iter<T: IntoIterator<Item = RepositoryIdentity>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
            ..Self::default()
        }
    }
}
