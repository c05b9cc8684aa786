pub mod azure;
pub mod github;

#[cfg(any(test, feature = "test-util"))]
pub mod memory;

pub use azure::{AzureDevOpsBackend, AzureRepo};
pub use github::{GitHubBackend, GitHubRepo};

use async_trait::async_trait;
use ingest::{DocError, Result};
use serde::{Deserialize, Serialize};

/// One row of a repository listing, already filtered for eligibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    /// The host's own blob id, if the listing carries one
    pub object_id: Option<String>,
}

impl FileEntry {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            object_id: None,
        }
    }
}

/// A previously generated document as stored in the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingDocument {
    pub body: String,
    /// Revision token the store wants back when the document is replaced
    pub version: Option<String>,
}

/// Everything the pipeline needs from a hosting platform: listing, content
/// retrieval, and reading/writing documents.
#[async_trait]
pub trait RepositoryBackend: Send + Sync {
    /// Human readable `owner/repo@branch` style label for logs
    fn describe(&self) -> String;

    async fn list_files(&self) -> Result<Vec<FileEntry>>;

    /// Bytes exactly as stored; decoding is left to the caller.
    async fn fetch_content(&self, path: &str) -> Result<Vec<u8>>;

    /// `Ok(None)` when no document exists yet.
    async fn fetch_doc(&self, md_path: &str) -> Result<Option<ExistingDocument>>;

    /// Create or replace `md_path`. Writing the same text twice must leave
    /// the same stored content.
    async fn persist_doc(&self, md_path: &str, content: &str, version: Option<&str>) -> Result<()>;
}

/// Turn a `NotFound` into `None`, keep every other outcome.
pub(crate) fn optional<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Append `/`-separated segments to `base`, percent-encoding each one.
pub(crate) fn join_url<'a>(
    base: &str,
    segments: impl IntoIterator<Item = &'a str>,
) -> Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(base)
        .map_err(|e| DocError::InvalidConfiguration(format!("invalid base url {}: {}", base, e)))?;
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            DocError::InvalidConfiguration(format!("base url cannot be a base: {}", base))
        })?;
        path.pop_if_empty();
        for segment in segments {
            path.extend(segment.split('/').filter(|s| !s.is_empty()));
        }
    }
    Ok(url)
}

pub(crate) fn transport(what: &str, error: reqwest::Error) -> DocError {
    DocError::Transport(format!("{}: {}", what, error))
}

/// Like [`check_status`], but a 404 means the path does not exist yet.
/// Only lookups of individual files use this.
pub(crate) async fn check_found(
    response: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response> {
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(DocError::NotFound(what.to_string()));
    }
    check_status(response, what).await
}

/// Every non-success status is a transport failure.
pub(crate) async fn check_status(
    response: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response> {
    let status = response.status();
    if !status.is_success() {
        let detail: String = response
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(200)
            .collect();
        return Err(DocError::Transport(format!("{} failed: {} {}", what, status, detail)));
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url_encodes_segments() {
        let url = join_url("https://api.github.com/", ["repos", "octo/app", "contents", "src/My File.cs"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/octo/app/contents/src/My%20File.cs"
        );
    }

    #[test]
    fn test_join_url_rejects_garbage() {
        assert!(matches!(
            join_url("not a url", ["x"]),
            Err(DocError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_optional_maps_not_found() {
        assert_eq!(optional::<u8>(Err(DocError::NotFound("x".into()))).unwrap(), None);
        assert_eq!(optional(Ok(3)).unwrap(), Some(3));
        assert!(optional::<u8>(Err(DocError::Transport("x".into()))).is_err());
    }
}
