use serde::{Deserialize, Serialize};

use crate::identity;

/// A source file fetched fresh for the current pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    /// Digest of the bytes exactly as stored, before any decoding
    pub content_identity: String,
    /// Text sent to the model; invalid UTF-8 is replaced with U+FFFD
    pub raw_content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        Self {
            path: path.into(),
            content_identity: identity::compute(&bytes),
            raw_content: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }
}

/// Which repository paths are worth documenting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileFilter {
    /// Extensions without the dot, compared case-insensitively
    pub extensions: Vec<String>,
    /// Directory names that exclude everything below them
    pub denied_dirs: Vec<String>,
    /// File name suffixes that are never documented
    pub denied_suffixes: Vec<String>,
}

impl Default for FileFilter {
    fn default() -> Self {
        Self {
            extensions: vec!["cs".into(), "js".into(), "html".into()],
            denied_dirs: vec![
                "bin".into(),
                "obj".into(),
                ".git".into(),
                ".vs".into(),
                "debug".into(),
                "release".into(),
            ],
            denied_suffixes: vec!["assemblyinfo.cs".into()],
        }
    }
}

impl FileFilter {
    pub fn is_eligible(&self, path: &str) -> bool {
        let lower = path.to_lowercase();
        let mut segments: Vec<&str> = lower.split('/').filter(|s| !s.is_empty()).collect();

        let file_name = match segments.pop() {
            Some(name) => name,
            None => return false,
        };

        let extension = match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext,
            _ => return false,
        };

        if !self.extensions.iter().any(|e| e.eq_ignore_ascii_case(extension)) {
            return false;
        }

        if segments
            .iter()
            .any(|dir| self.denied_dirs.iter().any(|d| d.eq_ignore_ascii_case(dir)))
        {
            return false;
        }

        !self
            .denied_suffixes
            .iter()
            .any(|suffix| file_name.ends_with(&suffix.to_lowercase()))
    }
}

/// Where the Markdown for `source_path` lives: the same relative path under
/// `docs_dir`, extension swapped for `.md`.
pub fn doc_path(docs_dir: &str, source_path: &str) -> String {
    let relative = source_path.trim_start_matches('/');
    let (dir, file_name) = match relative.rsplit_once('/') {
        Some((dir, name)) => (Some(dir), name),
        None => (None, relative),
    };

    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    };

    let docs_dir = docs_dir.trim_end_matches('/');
    match dir {
        Some(dir) => format!("{}/{}/{}.md", docs_dir, dir, stem),
        None => format!("{}/{}.md", docs_dir, stem),
    }
}
