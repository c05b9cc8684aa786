use async_trait::async_trait;
use ingest::{DocError, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::{ExistingDocument, FileEntry, RepositoryBackend};

#[derive(Default)]
struct State {
    files: Vec<(String, Vec<u8>)>,
    docs: HashMap<String, (String, u64)>,
    persisted: Vec<(String, Option<String>)>,
    next_version: u64,
}

/// Repository held in memory. Listing order is insertion order; document
/// versions are `v1`, `v2`, ... in write order.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
    failing_fetch: Vec<String>,
    failing_persist: Vec<String>,
    failing_doc_fetch: Vec<String>,
    failing_listing: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, content: impl AsRef<[u8]>) -> Self {
        self.set_content(path, content);
        self
    }

    pub fn with_doc(self, md_path: &str, body: &str) -> Self {
        {
            let mut state = self.lock();
            state.next_version += 1;
            let version = state.next_version;
            state.docs.insert(md_path.to_string(), (body.to_string(), version));
        }
        self
    }

    pub fn failing_fetch(mut self, path: &str) -> Self {
        self.failing_fetch.push(path.to_string());
        self
    }

    pub fn failing_persist(mut self, md_path: &str) -> Self {
        self.failing_persist.push(md_path.to_string());
        self
    }

    pub fn failing_doc_fetch(mut self, md_path: &str) -> Self {
        self.failing_doc_fetch.push(md_path.to_string());
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.failing_listing = true;
        self
    }

    /// Add or replace a source file, keeping its listing position.
    pub fn set_content(&self, path: &str, content: impl AsRef<[u8]>) {
        let content = content.as_ref().to_vec();
        let mut state = self.lock();
        match state.files.iter_mut().find(|(p, _)| p == path) {
            Some(entry) => entry.1 = content,
            None => state.files.push((path.to_string(), content)),
        }
    }

    pub fn doc(&self, md_path: &str) -> Option<String> {
        self.lock().docs.get(md_path).map(|(body, _)| body.clone())
    }

    /// Every persist call as `(md_path, version passed in)`.
    pub fn persisted(&self) -> Vec<(String, Option<String>)> {
        self.lock().persisted.clone()
    }

    pub fn persist_count(&self) -> usize {
        self.lock().persisted.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RepositoryBackend for MemoryBackend {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn list_files(&self) -> Result<Vec<FileEntry>> {
        if self.failing_listing {
            return Err(DocError::Transport("listing unavailable".to_string()));
        }
        Ok(self.lock().files.iter().map(|(path, _)| FileEntry::new(path.clone())).collect())
    }

    async fn fetch_content(&self, path: &str) -> Result<Vec<u8>> {
        if self.failing_fetch.iter().any(|p| p == path) {
            return Err(DocError::Transport(format!("fetch of {} failed", path)));
        }
        self.lock()
            .files
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| DocError::NotFound(path.to_string()))
    }

    async fn fetch_doc(&self, md_path: &str) -> Result<Option<ExistingDocument>> {
        if self.failing_doc_fetch.iter().any(|p| p == md_path) {
            return Err(DocError::Transport(format!("read of {} failed", md_path)));
        }
        Ok(self.lock().docs.get(md_path).map(|(body, version)| ExistingDocument {
            body: body.clone(),
            version: Some(format!("v{}", version)),
        }))
    }

    async fn persist_doc(&self, md_path: &str, content: &str, version: Option<&str>) -> Result<()> {
        let mut state = self.lock();
        state.persisted.push((md_path.to_string(), version.map(str::to_string)));

        if self.failing_persist.iter().any(|p| p == md_path) {
            return Err(DocError::Transport(format!("upload of {} failed", md_path)));
        }

        state.next_version += 1;
        let version = state.next_version;
        state.docs.insert(md_path.to_string(), (content.to_string(), version));
        Ok(())
    }
}
