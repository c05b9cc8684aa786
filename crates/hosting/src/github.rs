use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ingest::{DocError, FileFilter, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    ExistingDocument, FileEntry, RepositoryBackend, check_found, check_status, join_url, optional, transport,
};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRepo {
    /// `owner/name`
    #[serde(alias = "Repo")]
    pub repo: String,
    #[serde(alias = "Branch")]
    pub branch: String,
}

pub struct GitHubBackend {
    api_base: String,
    target: GitHubRepo,
    token: String,
    filter: FileFilter,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    entry_type: String,
    sha: Option<String>,
}

#[derive(Deserialize)]
struct ContentResponse {
    /// Empty or absent for files above the inline size limit
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
    sha: String,
}

#[derive(Serialize)]
struct PutContent<'a> {
    message: String,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

impl GitHubBackend {
    pub fn new(api_base: String, target: GitHubRepo, token: String, filter: FileFilter) -> Self {
        Self {
            api_base,
            target,
            token,
            filter,
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, url: reqwest::Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, format!("token {}", self.token))
            .header(reqwest::header::USER_AGENT, "repo-docs-pipeline")
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
    }

    async fn get_contents(&self, path: &str) -> Result<ContentResponse> {
        let url = join_url(&self.api_base, ["repos", self.target.repo.as_str(), "contents", path])?;
        let what = format!("GitHub contents {}", path);

        let response = self
            .request(reqwest::Method::GET, url)
            .query(&[("ref", self.target.branch.as_str())])
            .send()
            .await
            .map_err(|e| transport(&what, e))?;

        check_found(response, &what)
            .await?
            .json()
            .await
            .map_err(|e| transport(&what, e))
    }
}

/// GitHub wraps base64 content at 60 columns. Large files come back with
/// `encoding: "none"` and no inline content, which is an error rather than
/// an empty file.
fn decode_content(contents: &ContentResponse, path: &str) -> Result<Vec<u8>> {
    let encoded = match (contents.encoding.as_deref(), contents.content.as_deref()) {
        (Some("base64") | None, Some(encoded)) => encoded,
        (encoding, _) => {
            return Err(DocError::Transport(format!(
                "GitHub contents {}: no inline content (encoding {})",
                path,
                encoding.unwrap_or("missing")
            )));
        }
    };
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| DocError::Transport(format!("invalid base64 content for {}: {}", path, e)))
}

#[async_trait]
impl RepositoryBackend for GitHubBackend {
    fn describe(&self) -> String {
        format!("github:{}@{}", self.target.repo, self.target.branch)
    }

    async fn list_files(&self) -> Result<Vec<FileEntry>> {
        let url = join_url(
            &self.api_base,
            ["repos", self.target.repo.as_str(), "git", "trees", self.target.branch.as_str()],
        )?;
        let what = format!("GitHub tree {}", self.describe());

        let response = self
            .request(reqwest::Method::GET, url)
            .query(&[("recursive", "1")])
            .send()
            .await
            .map_err(|e| transport(&what, e))?;

        let tree: TreeResponse = check_status(response, &what)
            .await?
            .json()
            .await
            .map_err(|e| transport(&what, e))?;

        if tree.truncated {
            warn!(repo = %self.target.repo, "GitHub tree listing was truncated");
        }

        let files: Vec<FileEntry> = tree
            .tree
            .into_iter()
            .filter(|entry| entry.entry_type == "blob")
            .filter(|entry| self.filter.is_eligible(&entry.path))
            .map(|entry| FileEntry {
                path: entry.path,
                object_id: entry.sha,
            })
            .collect();

        info!(repo = %self.target.repo, files = files.len(), "Listed eligible files");
        Ok(files)
    }

    async fn fetch_content(&self, path: &str) -> Result<Vec<u8>> {
        let contents = self.get_contents(path).await?;
        decode_content(&contents, path)
    }

    async fn fetch_doc(&self, md_path: &str) -> Result<Option<ExistingDocument>> {
        let Some(contents) = optional(self.get_contents(md_path).await)? else {
            return Ok(None);
        };
        let body = decode_content(&contents, md_path)?;
        Ok(Some(ExistingDocument {
            body: String::from_utf8_lossy(&body).into_owned(),
            version: Some(contents.sha),
        }))
    }

    async fn persist_doc(&self, md_path: &str, content: &str, version: Option<&str>) -> Result<()> {
        let url = join_url(&self.api_base, ["repos", self.target.repo.as_str(), "contents", md_path])?;
        let what = format!("GitHub upload {}", md_path);

        let body = PutContent {
            message: format!("docs: update documentation for {}", md_path),
            content: STANDARD.encode(content.as_bytes()),
            branch: &self.target.branch,
            sha: version,
        };

        let response = self
            .request(reqwest::Method::PUT, url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport(&what, e))?;
        check_status(response, &what).await?;

        info!(path = md_path, "Document uploaded");
        Ok(())
    }
}
