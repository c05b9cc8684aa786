//! Repository-wide architecture narrative built from per-file digests.

use generate::{GenerationRequest, SamplingParams, TextGeneration};
use ingest::{DocError, Fragmenter, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

const SUMMARY_SYSTEM_INSTRUCTION: &str =
    "You are a software architect who writes compact, factual digests of source files.";

const REPORT_SYSTEM_INSTRUCTION: &str =
    "You are a software architect who documents whole repositories for new contributors.";

/// Digest of one file, kept in listing order for the synthesis prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSummary {
    pub path: String,
    pub summary: String,
}

#[derive(Clone)]
pub struct RepoSummarySynthesizer {
    backend: Arc<dyn TextGeneration>,
    fragmenter: Fragmenter,
    sampling: SamplingParams,
}

impl RepoSummarySynthesizer {
    pub fn new(backend: Arc<dyn TextGeneration>, fragmenter: Fragmenter) -> Self {
        Self {
            backend,
            fragmenter,
            sampling: SamplingParams::default(),
        }
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    /// One generation call producing a compact structured digest of a file.
    /// Only the first fragment is sent so the request stays bounded.
    pub async fn summarize_file(&self, path: &str, content: &str) -> Result<FileSummary> {
        let head = self
            .fragmenter
            .split(content, path)
            .next()
            .map(|fragment| fragment.text)
            .unwrap_or_default();

        let request = GenerationRequest {
            system_instruction: SUMMARY_SYSTEM_INSTRUCTION.to_string(),
            user_prompt: build_file_summary_prompt(path, &head),
            sampling: self.sampling,
        };

        let summary = self
            .backend
            .complete(&request)
            .await
            .map_err(|e| generation_failure(&format!("summary of {}", path), e))?;

        Ok(FileSummary {
            path: path.to_string(),
            summary: summary.trim().to_string(),
        })
    }

    /// Single call turning every file digest into one architecture report.
    pub async fn synthesize(&self, summaries: &[FileSummary]) -> Result<String> {
        if summaries.is_empty() {
            return Err(DocError::Generation(
                "no file summaries to synthesize".to_string(),
            ));
        }

        info!(files = summaries.len(), "Synthesizing repository report");

        let request = GenerationRequest {
            system_instruction: REPORT_SYSTEM_INSTRUCTION.to_string(),
            user_prompt: build_report_prompt(summaries),
            sampling: self.sampling,
        };

        let report = self
            .backend
            .complete(&request)
            .await
            .map_err(|e| generation_failure("repository synthesis", e))?;

        Ok(report.trim().to_string())
    }
}

fn generation_failure(step: &str, error: DocError) -> DocError {
    let reason = match error {
        DocError::Generation(msg) => msg,
        other => other.to_string(),
    };
    DocError::Generation(format!("{}: {}", step, reason))
}

pub fn build_file_summary_prompt(path: &str, code: &str) -> String {
    format!(
        r#"Summarize the following source file as a compact digest.

FORMAT (plain text, one item per line):
- Purpose: one sentence describing what the file is for
- Symbols: the classes, functions and methods it declares
- Dependencies: external libraries, services or files it relies on
- Pattern: the architectural role or pattern it follows (controller, service, repository, view, utility...)

Keep it under 120 words. Do NOT document each function in detail.

File: {}

CODE:
{}

DIGEST:"#,
        path, code
    )
}

pub fn build_report_prompt(summaries: &[FileSummary]) -> String {
    let mut prompt = String::from(
        "You are given digests of every documented file in a repository.\n\nFILE DIGESTS:\n\n",
    );

    for summary in summaries {
        prompt.push_str(&format!("### {}\n{}\n\n", summary.path, summary.summary));
    }

    prompt.push_str(
        "TASK: Write a Markdown architecture report with these sections:\n\
        1. Overview: what the system does\n\
        2. Components: the main modules and their responsibilities\n\
        3. Data flow: how requests and data move between components\n\
        4. External dependencies\n\
        5. Diagram: a Mermaid diagram of the components\n\n\
        DIAGRAM RULES:\n\
        - Use only `graph TD` with plain nodes and `-->` edges\n\
        - Do NOT use `subgraph`, `style`, `classDef`, `class` or `linkStyle`\n\
        - Node ids must be alphanumeric; put readable names in square brackets\n\n\
        REPORT:",
    );

    prompt
}
