pub mod generator;
pub mod llm;
pub mod prompt;
pub mod retry;
pub mod schema;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use generator::{DocumentationGenerator, GeneratorConfig};
pub use llm::{AuthStyle, ChatCompletionsClient, OllamaClient, TextGeneration};
pub use prompt::PromptBuilder;
pub use retry::{RetryConfig, RetryPolicy, RetryingGeneration};
pub use schema::{GenerationRequest, SamplingParams};
