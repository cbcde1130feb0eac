use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::hosting::github::{DEFAULT_API_URL, DEFAULT_RAW_URL};
use crate::identity::DEFAULT_HOST;
use crate::retry::{DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS};
use crate::sync::DEFAULT_MAX_CONCURRENT_FETCHES;

/// Default registry directory, relative to the working directory
pub const DEFAULT_REGISTRY_PATH: &str = "./registry";

/// Default package database directory, relative to the working directory
pub const DEFAULT_PACKAGE_DB_PATH: &str = "./package_db";

/// Application configuration structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub paths: PathsConfig,
    pub github: GitHubConfig,
    pub fetch: FetchConfig,
}

/// Where the catalog's artifacts live
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PathsConfig {
    pub registry: PathBuf,
    pub package_db: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            registry: PathBuf::from(DEFAULT_REGISTRY_PATH),
            package_db: PathBuf::from(DEFAULT_PACKAGE_DB_PATH),
        }
    }
}

/// GitHub endpoints and credentials
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct GitHubConfig {
    /// Repository host served by the API, e.g. a GitHub Enterprise hostname
    pub host: String,
    pub api_url: String,
    pub raw_url: String,
    pub token: Option<String>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            raw_url: DEFAULT_RAW_URL.to_string(),
            token: None,
        }
    }
}

/// Fetch concurrency and retry settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct FetchConfig {
    pub max_concurrent_fetches: usize,
    pub max_attempts: u32,
    /// Initial backoff in milliseconds; doubles after each failed attempt
    pub retry_base_delay_ms: u64,
    /// Download each `.pak` asset to record its SHA-512
    pub hash_assets: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_BASE_DELAY_MS,
            hash_assets: true,
        }
    }
}

impl Config {
    /// Load configuration from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Returns the path to the default config file.
/// Uses $XDG_CONFIG_HOME/mod-registry/config.json if XDG_CONFIG_HOME is set,
/// otherwise falls back to ~/.config/mod-registry/config.json,
/// or ./mod-registry/config.json if neither is available.
pub fn config_path() -> PathBuf {
    config_dir_with_env(std::env::var("XDG_CONFIG_HOME").ok(), dirs::home_dir()).join("config.json")
}

fn config_dir_with_env(xdg_config_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let config_dir = xdg_config_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));

    config_dir.join("mod-registry")
}
