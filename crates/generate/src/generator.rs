use futures::future::try_join_all;
use ingest::{DocError, Fragment, Fragmenter, Result, DEFAULT_MAX_FRAGMENT_LENGTH};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::llm::TextGeneration;
use crate::prompt::PromptBuilder;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub max_fragment_length: usize,
    /// Issue all fragment calls of a file at once. Outputs are still
    /// concatenated by fragment index.
    pub parallel_fragments: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_fragment_length: DEFAULT_MAX_FRAGMENT_LENGTH,
            parallel_fragments: false,
        }
    }
}

/// Turns one source file into one Markdown document, fragment by fragment.
#[derive(Clone)]
pub struct DocumentationGenerator {
    backend: Arc<dyn TextGeneration>,
    fragmenter: Fragmenter,
    prompts: PromptBuilder,
    parallel_fragments: bool,
}

impl DocumentationGenerator {
    pub fn new(backend: Arc<dyn TextGeneration>, config: GeneratorConfig) -> Result<Self> {
        Ok(Self {
            backend,
            fragmenter: Fragmenter::new(config.max_fragment_length)?,
            prompts: PromptBuilder::default(),
            parallel_fragments: config.parallel_fragments,
        })
    }

    pub fn with_prompts(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn fragmenter(&self) -> Fragmenter {
        self.fragmenter
    }

    pub fn backend(&self) -> Arc<dyn TextGeneration> {
        Arc::clone(&self.backend)
    }

    /// Generate the Markdown body for `path`. Any failing fragment fails the
    /// whole file and nothing from earlier fragments is returned.
    pub async fn generate(&self, path: &str, content: &str) -> Result<String> {
        let fragments = self.fragmenter.split(content, path);
        info!(path, fragments = fragments.total(), "Generating documentation");

        let sections = if self.parallel_fragments {
            try_join_all(fragments.map(|fragment| self.generate_fragment(path, fragment))).await?
        } else {
            let mut sections = Vec::with_capacity(fragments.len());
            for fragment in fragments {
                sections.push(self.generate_fragment(path, fragment).await?);
            }
            sections
        };

        Ok(sections.join("\n\n"))
    }

    async fn generate_fragment(&self, path: &str, fragment: Fragment) -> Result<String> {
        let request = self.prompts.build(path, &fragment);
        debug!(
            path,
            fragment = fragment.index,
            total = fragment.total,
            "Requesting fragment documentation"
        );

        let text = self.backend.complete(&request).await.map_err(|e| {
            let reason = match e {
                DocError::Generation(msg) => msg,
                other => other.to_string(),
            };
            DocError::Generation(format!(
                "{} fragment {} of {}: {}",
                path, fragment.index, fragment.total, reason
            ))
        })?;

        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedGeneration;

    fn generator(backend: Arc<ScriptedGeneration>, max: usize, parallel: bool) -> DocumentationGenerator {
        DocumentationGenerator::new(
            backend,
            GeneratorConfig {
                max_fragment_length: max,
                parallel_fragments: parallel,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_zero_fragment_length_is_invalid() {
        let result = DocumentationGenerator::new(
            Arc::new(ScriptedGeneration::new()),
            GeneratorConfig {
                max_fragment_length: 0,
                parallel_fragments: false,
            },
        );
        assert!(matches!(result, Err(DocError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_single_fragment_makes_one_call() {
        let backend = Arc::new(ScriptedGeneration::new());
        let body = generator(backend.clone(), 100, false)
            .generate("src/A.cs", "class A {}")
            .await
            .unwrap();

        assert_eq!(backend.call_count(), 1);
        assert_eq!(body, "response 1");
        assert!(!body.contains("Fragment"));
    }

    #[tokio::test]
    async fn test_fragments_are_requested_and_joined_in_order() {
        let backend = Arc::new(ScriptedGeneration::new());
        let content = "a".repeat(25);
        let body = generator(backend.clone(), 10, false)
            .generate("big.js", &content)
            .await
            .unwrap();

        assert_eq!(body, "response 1\n\nresponse 2\n\nresponse 3");

        let prompts: Vec<String> = backend.requests().into_iter().map(|r| r.user_prompt).collect();
        assert!(prompts[0].contains("Fragment 1 of 3"));
        assert!(prompts[1].contains("Fragment 2 of 3"));
        assert!(prompts[2].contains("Fragment 3 of 3"));
    }

    #[tokio::test]
    async fn test_failure_on_second_fragment_fails_file() {
        let backend = Arc::new(ScriptedGeneration::new().failing_on_call(2));
        let content = "b".repeat(30);
        let err = generator(backend.clone(), 10, false)
            .generate("big.js", &content)
            .await
            .unwrap_err();

        match err {
            DocError::Generation(msg) => assert!(msg.contains("fragment 2 of 3")),
            other => panic!("unexpected error: {:?}", other),
        }
        // Sequential mode stops at the failing fragment
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_parallel_fragments_keep_index_order() {
        let backend = Arc::new(ScriptedGeneration::new().with_responder(|request| {
            let marker = request
                .user_prompt
                .lines()
                .find(|line| line.starts_with("Fragment "))
                .unwrap_or_default()
                .to_string();
            format!("doc for {}", marker)
        }));
        let content = "c".repeat(35);
        let body = generator(backend.clone(), 10, true)
            .generate("big.js", &content)
            .await
            .unwrap();

        assert_eq!(
            body,
            "doc for Fragment 1 of 4\n\ndoc for Fragment 2 of 4\n\ndoc for Fragment 3 of 4\n\ndoc for Fragment 4 of 4"
        );
        assert_eq!(backend.call_count(), 4);
    }
}
