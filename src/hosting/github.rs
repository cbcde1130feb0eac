//! GitHub Releases API and raw content host

use reqwest::{Response, StatusCode};
use tracing::{debug, warn};

use crate::error::{FetchError, FetchErrorKind};
use crate::hosting::{HostingApi, MANIFEST_FILE, RawRelease};
use crate::identity::{DEFAULT_HOST, RepositoryIdentity};

/// Default base URL for GitHub API
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Default base URL for raw repository contents
pub const DEFAULT_RAW_URL: &str = "https://raw.githubusercontent.com";

const PER_PAGE: usize = 100;

/// Limit to 10 pages (1000 releases) so a misbehaving server cannot loop forever
const MAX_PAGES: usize = 10;

pub struct GitHubApi {
    client: reqwest::Client,
    /// Repository host these endpoints serve; other hosts are never queried
    host: String,
    api_url: String,
    raw_url: String,
    token: Option<String>,
}

impl GitHubApi {
    pub fn new(
        api_url: &str,
        raw_url: &str,
        token: Option<String>,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("mod-registry/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            host: DEFAULT_HOST.to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
            raw_url: raw_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    /// Serve repositories on `host` instead of github.com, e.g. a GitHub
    /// Enterprise instance
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_ascii_lowercase();
        self
    }

    fn ensure_host(&self, identity: &RepositoryIdentity) -> Result<(), FetchError> {
        if identity.host() == self.host {
            return Ok(());
        }
        warn!("Refusing to query {} for {}", self.host, identity);
        Err(FetchError::not_found(format!(
            "{} is not hosted on {}",
            identity, self.host
        )))
    }

    async fn get(&self, url: &str, accept: &str) -> Result<Response, FetchError> {
        let mut request = self.client.get(url).header("Accept", accept);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        check_status(response, url)
    }

    async fn get_api(&self, url: &str) -> Result<Response, FetchError> {
        self.get(url, "application/vnd.github+json").await
    }
}

fn retry_after(response: &Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

fn rate_limit_exhausted(response: &Response) -> bool {
    response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0")
}

/// Map an HTTP status onto the fetch error taxonomy
fn check_status(response: Response, url: &str) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error = match status {
        StatusCode::NOT_FOUND => FetchError::not_found(format!("{} returned 404", url)),
        StatusCode::UNAUTHORIZED => FetchError::new(
            FetchErrorKind::Unauthorized,
            "invalid or missing GitHub token",
        ),
        StatusCode::TOO_MANY_REQUESTS => {
            FetchError::rate_limited("too many requests", retry_after(&response))
        }
        StatusCode::FORBIDDEN if rate_limit_exhausted(&response) => FetchError::rate_limited(
            "GitHub API rate limit exceeded; set GITHUB_TOKEN to raise it",
            retry_after(&response),
        ),
        StatusCode::FORBIDDEN => FetchError::new(
            FetchErrorKind::Unauthorized,
            format!("access to {} is forbidden", url),
        ),
        s if s.is_server_error() => FetchError::transient(format!("{} returned {}", url, s)),
        s => FetchError::malformed(format!("unexpected status {} from {}", s, url)),
    };

    warn!("GitHub request failed: {}", error);
    Err(error)
}

#[async_trait::async_trait]
impl HostingApi for GitHubApi {
    #[tracing::instrument(skip(self, identity), fields(repo = %identity))]
    async fn list_releases(
        &self,
        identity: &RepositoryIdentity,
    ) -> Result<Vec<RawRelease>, FetchError> {
        self.ensure_host(identity)?;
        let base = format!(
            "{}/repos/{}/{}/releases",
            self.api_url,
            identity.owner(),
            identity.name()
        );
        let mut releases = Vec::new();

        for page in 1..=MAX_PAGES {
            let url = format!("{}?per_page={}&page={}", base, PER_PAGE, page);
            debug!("Fetching releases page {} from {}", page, url);

            let parsed: Vec<RawRelease> = self.get_api(&url).await?.json().await?;
            let len = parsed.len();
            releases.extend(parsed);

            if len < PER_PAGE {
                break;
            }
        }

        Ok(releases)
    }

    #[tracing::instrument(skip(self, identity), fields(repo = %identity))]
    async fn get_release(
        &self,
        identity: &RepositoryIdentity,
        tag: &str,
    ) -> Result<RawRelease, FetchError> {
        self.ensure_host(identity)?;
        let url = format!(
            "{}/repos/{}/{}/releases/tags/{}",
            self.api_url,
            identity.owner(),
            identity.name(),
            tag
        );
        Ok(self.get_api(&url).await?.json().await?)
    }

    #[tracing::instrument(skip(self, identity), fields(repo = %identity))]
    async fn fetch_manifest(
        &self,
        identity: &RepositoryIdentity,
        tag: &str,
    ) -> Result<Vec<u8>, FetchError> {
        self.ensure_host(identity)?;
        let url = format!(
            "{}/{}/{}/{}/{}",
            self.raw_url,
            identity.owner(),
            identity.name(),
            tag,
            MANIFEST_FILE
        );
        let bytes = self.get(&url, "*/*").await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    #[tracing::instrument(skip(self))]
    async fn download_asset(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let bytes = self
            .get(url, "application/octet-stream")
            .await?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}
