use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFile {
    pub path: String,
    pub reason: String,
}

/// Outcome of one run, every list in listing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub processed: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<FailedFile>,
    /// Where the repository report was written, when full analysis ran
    pub aggregate: Option<String>,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.processed.len() + self.skipped.len() + self.failed.len()
    }

    pub fn record_failure(&mut self, path: impl Into<String>, reason: impl Into<String>) {
        self.failed.push(FailedFile {
            path: path.into(),
            reason: reason.into(),
        });
    }
}
