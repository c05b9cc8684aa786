use thiserror::Error;

/// Failure taxonomy shared by every stage of a documentation run.
///
/// `InvalidConfiguration` is fatal and raised before any I/O. `Transport`
/// and `Generation` are recorded per file and never abort a run on their
/// own. `NotFound` is mostly informational: a missing document just means
/// the file has not been documented yet.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DocError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("generation failure: {0}")]
    Generation(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl DocError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DocError::NotFound(_))
    }
}

pub type Result<T, E = DocError> = std::result::Result<T, E>;
