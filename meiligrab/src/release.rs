//! Release resolution against a GitHub-style release host.
//!
//! A version selector is either a literal tag (`v1.12.0`), used as-is, or the
//! `latest` sentinel, resolved with a single call to the releases API:
//!
//! ```text
//! GET {api_base}/repos/{owner}/{repo}/releases/latest   -> { "tag_name": "v1.12.1", ... }
//! GET {download_base}/{owner}/{repo}/releases/download/{tag}/{artifact}
//! ```

use std::fmt;

use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Selector resolved through the releases API.
pub const LATEST: &str = "latest";

/// User agent sent to the release host (the GitHub API rejects requests without one).
pub const DEFAULT_USER_AGENT: &str = concat!("meiligrab/", env!("CARGO_PKG_VERSION"));

/// Whether a selector is the `latest` sentinel.
pub fn is_latest(selector: &str) -> bool {
    selector.eq_ignore_ascii_case(LATEST)
}

/// Where releases are published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSource {
    /// Base of the release API, e.g. `https://api.github.com`.
    pub api_base: String,
    /// Base of the asset download host, e.g. `https://github.com`.
    pub download_base: String,
    /// `owner/repo`.
    pub repository: String,
}

impl Default for ReleaseSource {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            download_base: "https://github.com".to_string(),
            repository: "meilisearch/meilisearch".to_string(),
        }
    }
}

impl ReleaseSource {
    /// URL of the "latest release" endpoint.
    pub fn latest_url(&self) -> String {
        format!(
            "{}/repos/{}/releases/latest",
            self.api_base.trim_end_matches('/'),
            self.repository
        )
    }

    /// URL of a release asset, optionally rewritten through a proxy prefix.
    ///
    /// # Example
    ///
    /// ```
    /// use meiligrab::release::ReleaseSource;
    ///
    /// let source = ReleaseSource::default();
    /// assert_eq!(
    ///     source.asset_url("v1.12.0", "meilisearch-linux-amd64", None),
    ///     "https://github.com/meilisearch/meilisearch/releases/download/v1.12.0/meilisearch-linux-amd64"
    /// );
    /// assert_eq!(
    ///     source.asset_url("v1.12.0", "meilisearch-linux-amd64", Some("https://ghfast.top/")),
    ///     "https://ghfast.top/https://github.com/meilisearch/meilisearch/releases/download/v1.12.0/meilisearch-linux-amd64"
    /// );
    /// ```
    pub fn asset_url(&self, tag: &str, artifact: &str, proxy: Option<&str>) -> String {
        let url = format!(
            "{}/{}/releases/download/{}/{}",
            self.download_base.trim_end_matches('/'),
            self.repository,
            tag,
            artifact
        );
        match proxy {
            Some(prefix) if !prefix.is_empty() => format!("{}{}", prefix, url),
            _ => url,
        }
    }
}

/// Diagnostic payload of a failed API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorDetail {
    /// Structured `{ message, documentation_url }` body.
    Api {
        message: String,
        documentation_url: Option<String>,
    },
    /// Body that was not the structured error shape.
    Raw(String),
}

impl ErrorDetail {
    /// Parse an error body, falling back to its raw text.
    pub fn from_body(body: &str) -> Self {
        #[derive(Deserialize)]
        struct ApiError {
            message: String,
            documentation_url: Option<String>,
        }

        match serde_json::from_str::<ApiError>(body) {
            Ok(api) => ErrorDetail::Api {
                message: api.message,
                documentation_url: api.documentation_url,
            },
            Err(_) => ErrorDetail::Raw(body.trim().to_string()),
        }
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorDetail::Api {
                message,
                documentation_url: Some(docs),
            } => write!(f, "{} (see {})", message, docs),
            ErrorDetail::Api { message, .. } => f.write_str(message),
            ErrorDetail::Raw(body) if body.is_empty() => f.write_str("empty response body"),
            ErrorDetail::Raw(body) => f.write_str(body),
        }
    }
}

/// Errors resolving a release tag.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("release lookup at {url} failed with {status} {status_text}: {detail}")]
    Status {
        url: String,
        status: u16,
        status_text: String,
        detail: ErrorDetail,
    },

    #[error("release lookup at {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("release lookup at {url} returned no tag_name")]
    MissingTag { url: String },

    #[error("release lookup cancelled")]
    Cancelled,
}

/// A concrete release tag and how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTag {
    pub tag: String,
    /// True when the tag came from the releases API.
    pub from_latest: bool,
}

/// Resolves version selectors to concrete tags.
#[derive(Debug, Clone)]
pub struct ReleaseResolver {
    client: Client,
    source: ReleaseSource,
}

impl ReleaseResolver {
    pub fn new(client: Client, source: ReleaseSource) -> Self {
        Self { client, source }
    }

    pub fn source(&self) -> &ReleaseSource {
        &self.source
    }

    /// Resolve a selector. Literal tags are returned as given and never touch
    /// the network.
    pub async fn resolve_tag(
        &self,
        selector: &str,
        cancel: &CancellationToken,
    ) -> Result<ResolvedTag, ResolutionError> {
        if !is_latest(selector) {
            debug!(tag = selector, "Using literal release tag");
            return Ok(ResolvedTag {
                tag: selector.to_string(),
                from_latest: false,
            });
        }

        let url = self.source.latest_url();
        let tag = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ResolutionError::Cancelled),
            result = self.fetch_latest(&url) => result?,
        };

        info!(tag = %tag, repository = %self.source.repository, "Resolved latest release");
        Ok(ResolvedTag {
            tag,
            from_latest: true,
        })
    }

    async fn fetch_latest(&self, url: &str) -> Result<String, ResolutionError> {
        let request_error = |e: reqwest::Error| ResolutionError::Request {
            url: url.to_string(),
            source: e,
        };

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, DEFAULT_USER_AGENT)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let body = response.text().await.map_err(request_error)?;

        if !status.is_success() {
            return Err(ResolutionError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                status_text: status_text(status),
                detail: ErrorDetail::from_body(&body),
            });
        }

        #[derive(Deserialize)]
        struct LatestRelease {
            tag_name: Option<String>,
        }

        serde_json::from_str::<LatestRelease>(&body)
            .ok()
            .and_then(|r| r.tag_name)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ResolutionError::MissingTag {
                url: url.to_string(),
            })
    }
}

/// Canonical reason phrase for a status, empty when unknown.
pub(crate) fn status_text(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("").to_string()
}
