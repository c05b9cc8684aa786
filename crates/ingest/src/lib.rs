pub mod error;
pub mod fragment;
pub mod fragmenter;
pub mod identity;
pub mod source;

pub use error::{DocError, Result};
pub use fragment::Fragment;
pub use fragmenter::{Fragmenter, Fragments, DEFAULT_MAX_FRAGMENT_LENGTH};
pub use source::{doc_path, FileFilter, SourceFile};
