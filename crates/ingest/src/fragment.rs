use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub index: usize, // 1-based
    pub total: usize,
    pub text: String,
    pub source_path: String,
}

impl Fragment {
    pub fn new(index: usize, total: usize, text: String, source_path: String) -> Self {
        Self {
            index,
            total,
            text,
            source_path,
        }
    }

    /// Length in chars, the unit every fragment bound is measured in
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_first(&self) -> bool {
        self.index == 1
    }

    pub fn is_only(&self) -> bool {
        self.total == 1
    }
}
