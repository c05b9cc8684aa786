use async_trait::async_trait;
use ingest::{DocError, FileFilter, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    ExistingDocument, FileEntry, RepositoryBackend, check_found, check_status, join_url, optional, transport,
};

pub const DEFAULT_BASE_URL: &str = "https://dev.azure.com";
const API_VERSION: &str = "7.1";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureRepo {
    #[serde(alias = "Org")]
    pub org: String,
    #[serde(alias = "Project")]
    pub project: String,
    #[serde(alias = "RepoId")]
    pub repo_id: String,
    #[serde(alias = "Branch")]
    pub branch: String,
}

pub struct AzureDevOpsBackend {
    base_url: String,
    target: AzureRepo,
    pat: String,
    filter: FileFilter,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ValueList<T> {
    value: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Item {
    path: String,
    #[serde(default)]
    is_folder: Option<bool>,
    #[serde(default)]
    git_object_type: Option<String>,
    #[serde(default)]
    object_id: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

impl Item {
    fn is_file(&self) -> bool {
        match (self.is_folder, self.git_object_type.as_deref()) {
            (Some(is_folder), _) => !is_folder,
            (None, Some(kind)) => kind == "blob",
            (None, None) => false,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GitRef {
    object_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Push<'a> {
    ref_updates: Vec<RefUpdate>,
    commits: Vec<Commit<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefUpdate {
    name: String,
    old_object_id: String,
}

#[derive(Serialize)]
struct Commit<'a> {
    comment: String,
    changes: Vec<Change<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Change<'a> {
    change_type: &'static str,
    item: ChangeItem,
    new_content: NewContent<'a>,
}

#[derive(Serialize)]
struct ChangeItem {
    path: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewContent<'a> {
    content: &'a str,
    content_type: &'static str,
}

impl AzureDevOpsBackend {
    pub fn new(base_url: String, target: AzureRepo, pat: String, filter: FileFilter) -> Self {
        Self {
            base_url,
            target,
            pat,
            filter,
            client: reqwest::Client::new(),
        }
    }

    fn repo_url(&self, resource: &str) -> Result<reqwest::Url> {
        join_url(
            &self.base_url,
            [
                self.target.org.as_str(),
                self.target.project.as_str(),
                "_apis/git/repositories",
                self.target.repo_id.as_str(),
                resource,
            ],
        )
    }

    fn get(&self, url: reqwest::Url) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .basic_auth("", Some(&self.pat))
            .query(&[("api-version", API_VERSION)])
    }

    async fn get_item(&self, path: &str) -> Result<Item> {
        let url = self.repo_url("items")?;
        let what = format!("Azure DevOps item {}", path);

        let response = self
            .get(url)
            .query(&[
                ("path", path),
                ("versionDescriptor.version", self.target.branch.as_str()),
                ("includeContent", "true"),
                ("$format", "json"),
            ])
            .send()
            .await
            .map_err(|e| transport(&what, e))?;

        check_found(response, &what)
            .await?
            .json()
            .await
            .map_err(|e| transport(&what, e))
    }

    /// Item body as an octet stream, without any text decoding.
    async fn get_item_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.repo_url("items")?;
        let what = format!("Azure DevOps item {}", path);

        let response = self
            .get(url)
            .query(&[
                ("path", path),
                ("versionDescriptor.version", self.target.branch.as_str()),
                ("download", "true"),
                ("$format", "octetStream"),
            ])
            .send()
            .await
            .map_err(|e| transport(&what, e))?;

        let bytes = check_found(response, &what)
            .await?
            .bytes()
            .await
            .map_err(|e| transport(&what, e))?;
        Ok(bytes.to_vec())
    }

    async fn branch_head(&self) -> Result<String> {
        let url = self.repo_url("refs")?;
        let what = format!("Azure DevOps ref heads/{}", self.target.branch);

        let response = self
            .get(url)
            .query(&[("filter", format!("heads/{}", self.target.branch))])
            .send()
            .await
            .map_err(|e| transport(&what, e))?;

        let refs: ValueList<GitRef> = check_status(response, &what)
            .await?
            .json()
            .await
            .map_err(|e| transport(&what, e))?;

        refs.value
            .into_iter()
            .next()
            .map(|r| r.object_id)
            .ok_or_else(|| DocError::Transport(format!("{}: branch has no head", what)))
    }
}

/// Azure DevOps item paths are rooted at `/`.
fn rooted(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

#[async_trait]
impl RepositoryBackend for AzureDevOpsBackend {
    fn describe(&self) -> String {
        format!(
            "azure:{}/{}/{}@{}",
            self.target.org, self.target.project, self.target.repo_id, self.target.branch
        )
    }

    async fn list_files(&self) -> Result<Vec<FileEntry>> {
        let url = self.repo_url("items")?;
        let what = format!("Azure DevOps listing {}", self.describe());

        let response = self
            .get(url)
            .query(&[
                ("scopePath", "/"),
                ("recursionLevel", "Full"),
                ("versionDescriptor.version", self.target.branch.as_str()),
            ])
            .send()
            .await
            .map_err(|e| transport(&what, e))?;

        let items: ValueList<Item> = check_status(response, &what)
            .await?
            .json()
            .await
            .map_err(|e| transport(&what, e))?;

        let files: Vec<FileEntry> = items
            .value
            .into_iter()
            .filter(|item| item.is_file() && self.filter.is_eligible(&item.path))
            .map(|item| FileEntry {
                path: item.path,
                object_id: item.object_id,
            })
            .collect();

        info!(repo = %self.target.repo_id, files = files.len(), "Listed eligible files");
        Ok(files)
    }

    async fn fetch_content(&self, path: &str) -> Result<Vec<u8>> {
        self.get_item_bytes(&rooted(path)).await
    }

    async fn fetch_doc(&self, md_path: &str) -> Result<Option<ExistingDocument>> {
        let Some(item) = optional(self.get_item(&rooted(md_path)).await)? else {
            return Ok(None);
        };
        let Some(body) = item.content else {
            return Err(DocError::Transport(format!(
                "Azure DevOps item {}: response has no content",
                md_path
            )));
        };
        Ok(Some(ExistingDocument {
            body,
            version: item.object_id,
        }))
    }

    async fn persist_doc(&self, md_path: &str, content: &str, version: Option<&str>) -> Result<()> {
        let old_object_id = self.branch_head().await?;
        let path = rooted(md_path);
        let what = format!("Azure DevOps push {}", path);

        let push = Push {
            ref_updates: vec![RefUpdate {
                name: format!("refs/heads/{}", self.target.branch),
                old_object_id,
            }],
            commits: vec![Commit {
                comment: format!("docs: update documentation for {}", path),
                changes: vec![Change {
                    change_type: if version.is_some() { "edit" } else { "add" },
                    item: ChangeItem { path },
                    new_content: NewContent {
                        content,
                        content_type: "rawtext",
                    },
                }],
            }],
        };

        let url = self.repo_url("pushes")?;
        let response = self
            .client
            .post(url)
            .basic_auth("", Some(&self.pat))
            .query(&[("api-version", API_VERSION)])
            .json(&push)
            .send()
            .await
            .map_err(|e| transport(&what, e))?;
        check_status(response, &what).await?;

        info!(path = md_path, "Document pushed");
        Ok(())
    }
}
