pub mod gate;
pub mod report;
pub mod runner;

pub use gate::{decide, extract_identity, stamp, Decision};
pub use report::{FailedFile, RunReport};
pub use runner::{PipelineConfig, RepositoryPipeline};
