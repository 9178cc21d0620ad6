//! GitHub zipball fetcher.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use tracing::{debug, info};

use super::{SourceError, SourceFetcher, SourceResult};
use crate::archive::Archive;

/// Default GitHub REST endpoint.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Default timeout for zipball downloads in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Fetches repository subtrees from GitHub zipballs.
#[derive(Debug)]
pub struct GitHubFetcher {
    client: Client,
    api_url: String,
    token: Option<String>,
}

impl GitHubFetcher {
    /// Create a fetcher against the public GitHub API.
    pub fn new(token: Option<String>) -> SourceResult<Self> {
        Self::with_api_url(GITHUB_API_URL, token)
    }

    /// Create a fetcher against a custom API root (GitHub Enterprise).
    pub fn with_api_url(api_url: impl Into<String>, token: Option<String>) -> SourceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .user_agent(concat!("packcraft/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Zipball URL for a repository at a ref.
    pub fn zipball_url(&self, owner: &str, repo: &str, git_ref: Option<&str>) -> String {
        match git_ref {
            Some(r) => format!("{}/repos/{}/{}/zipball/{}", self.api_url, owner, repo, r),
            None => format!("{}/repos/{}/{}/zipball", self.api_url, owner, repo),
        }
    }

    fn download(&self, url: &str) -> SourceResult<Vec<u8>> {
        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().map_err(|e| SourceError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| SourceError::Fetch {
                url: url.to_string(),
                reason: format!("failed to read response: {}", e),
            })
    }
}

impl SourceFetcher for GitHubFetcher {
    fn fetch(
        &self,
        owner: &str,
        repo: &str,
        subfolder: &str,
        git_ref: Option<&str>,
    ) -> SourceResult<Archive> {
        let url = self.zipball_url(owner, repo, git_ref);
        info!(
            repo = %format!("{}/{}", owner, repo),
            subfolder,
            git_ref = git_ref.unwrap_or("default branch"),
            "Downloading repository subfolder"
        );
        let bytes = self.download(&url)?;
        debug!(bytes = bytes.len(), "Downloaded zipball");

        let archive = extract_subfolder(&bytes, subfolder)?;
        if archive.is_empty() {
            return Err(SourceError::SubfolderNotFound {
                owner: owner.to_string(),
                repo: repo.to_string(),
                subfolder: subfolder.to_string(),
            });
        }
        Ok(archive)
    }
}

/// Take `subfolder` out of a zipball whose entries share one top-level
/// directory (`owner-repo-sha/`).
pub fn extract_subfolder(zipball: &[u8], subfolder: &str) -> SourceResult<Archive> {
    let archive = Archive::from_zip_bytes(zipball)?;
    let unwrapped = archive.map_entries(|name, content| {
        let inner = name.split_once('/').map(|(_, rest)| rest).unwrap_or("");
        (inner.to_string(), content.to_vec())
    });

    let mut cleaned = Archive::new();
    for (name, content) in unwrapped.entries() {
        if !name.is_empty() {
            cleaned.insert(name, content);
        }
    }
    Ok(cleaned.subtree(subfolder))
}
