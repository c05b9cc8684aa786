use crate::error::{DocError, Result};
use crate::fragment::Fragment;

/// Default bound used by the hosted pipelines, in chars.
pub const DEFAULT_MAX_FRAGMENT_LENGTH: usize = 15_000;

#[derive(Debug, Clone, Copy)]
pub struct Fragmenter {
    max_fragment_length: usize,
}

impl Default for Fragmenter {
    fn default() -> Self {
        Self {
            max_fragment_length: DEFAULT_MAX_FRAGMENT_LENGTH,
        }
    }
}

impl Fragmenter {
    pub fn new(max_fragment_length: usize) -> Result<Self> {
        if max_fragment_length == 0 {
            return Err(DocError::InvalidConfiguration(
                "max fragment length must be greater than zero".to_string(),
            ));
        }
        Ok(Self { max_fragment_length })
    }

    /// Number of fragments `content` splits into. Empty content still
    /// yields one (empty) fragment so indexing stays well-defined.
    pub fn fragment_count(&self, content: &str) -> usize {
        let len = content.chars().count();
        len.div_ceil(self.max_fragment_length).max(1)
    }

    /// Lazily slice `content` into consecutive windows of at most
    /// `max_fragment_length` chars. The iterator is `Clone` and
    /// calling `split` again recomputes the same sequence.
    pub fn split<'a>(&self, content: &'a str, source_path: &'a str) -> Fragments<'a> {
        Fragments {
            rest: content,
            source_path,
            max: self.max_fragment_length,
            next_index: 1,
            total: self.fragment_count(content),
        }
    }
}

/// Eager helper for callers that just want the whole list.
pub fn split(content: &str, max_fragment_length: usize, source_path: &str) -> Result<Vec<Fragment>> {
    let fragmenter = Fragmenter::new(max_fragment_length)?;
    Ok(fragmenter.split(content, source_path).collect())
}

#[derive(Debug, Clone)]
pub struct Fragments<'a> {
    rest: &'a str,
    source_path: &'a str,
    max: usize,
    next_index: usize,
    total: usize,
}

impl Fragments<'_> {
    pub fn total(&self) -> usize {
        self.total
    }
}

impl Iterator for Fragments<'_> {
    type Item = Fragment;

    fn next(&mut self) -> Option<Fragment> {
        if self.next_index > self.total {
            return None;
        }

        // Byte offset just past the `max`-th char (or end of input)
        let cut = self
            .rest
            .char_indices()
            .nth(self.max)
            .map(|(offset, _)| offset)
            .unwrap_or(self.rest.len());
        let (head, tail) = self.rest.split_at(cut);
        self.rest = tail;

        let fragment = Fragment::new(
            self.next_index,
            self.total,
            head.to_string(),
            self.source_path.to_string(),
        );
        self.next_index += 1;
        Some(fragment)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total + 1 - self.next_index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Fragments<'_> {}
