use futures::stream::{self, StreamExt, TryStreamExt};
use generate::DocumentationGenerator;
use hosting::{FileEntry, RepositoryBackend};
use ingest::{doc_path, DocError, Result, SourceFile};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use synthesis::{FileSummary, RepoSummarySynthesizer};
use tracing::{debug, info, warn};

use crate::gate::{self, Decision};
use crate::report::RunReport;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory that mirrors the source tree with one `.md` per file
    pub docs_dir: String,
    /// Files processed at once; 1 keeps the run strictly sequential
    pub max_concurrent_files: usize,
    /// Also build the repository-wide architecture report
    pub full_analysis: bool,
    pub architecture_path: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            docs_dir: "docs".to_string(),
            max_concurrent_files: 1,
            full_analysis: false,
            architecture_path: "docs/ARCHITECTURE.md".to_string(),
        }
    }
}

enum Outcome {
    Processed,
    Skipped,
    Failed(String),
}

struct FileResult {
    path: String,
    outcome: Outcome,
    /// Kept for the repository report when full analysis is on
    source: Option<SourceFile>,
}

impl FileResult {
    fn failed(path: String, error: DocError) -> Self {
        Self {
            path,
            outcome: Outcome::Failed(error.to_string()),
            source: None,
        }
    }
}

/// Drives one documentation pass over a repository backend.
pub struct RepositoryPipeline {
    backend: Arc<dyn RepositoryBackend>,
    generator: DocumentationGenerator,
    synthesizer: Option<RepoSummarySynthesizer>,
    config: PipelineConfig,
}

impl RepositoryPipeline {
    pub fn new(
        backend: Arc<dyn RepositoryBackend>,
        generator: DocumentationGenerator,
        config: PipelineConfig,
    ) -> Self {
        Self {
            backend,
            generator,
            synthesizer: None,
            config,
        }
    }

    pub fn with_synthesizer(mut self, synthesizer: RepoSummarySynthesizer) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.config.max_concurrent_files == 0 {
            return Err(DocError::InvalidConfiguration(
                "max_concurrent_files must be at least 1".to_string(),
            ));
        }
        if self.config.docs_dir.trim_matches('/').is_empty() {
            return Err(DocError::InvalidConfiguration(
                "docs_dir must not be empty".to_string(),
            ));
        }
        if self.config.full_analysis && self.synthesizer.is_none() {
            return Err(DocError::InvalidConfiguration(
                "full analysis requested without a summary synthesizer".to_string(),
            ));
        }
        Ok(())
    }

    /// List eligible files and document the ones whose content changed.
    pub async fn run(&self) -> Result<RunReport> {
        self.validate()?;

        let files = self.backend.list_files().await?;
        self.run_files(files).await
    }

    /// Same as [`run`](Self::run) over an explicit listing.
    pub async fn run_files(&self, files: Vec<FileEntry>) -> Result<RunReport> {
        self.validate()?;

        let started = Instant::now();
        info!(
            repo = %self.backend.describe(),
            files = files.len(),
            full_analysis = self.config.full_analysis,
            "Starting documentation run"
        );

        // `buffered` yields in input order regardless of completion order
        let results: Vec<FileResult> = stream::iter(files)
            .map(|entry| self.process_file(entry))
            .buffered(self.config.max_concurrent_files)
            .collect()
            .await;

        let mut report = RunReport::default();
        let mut sources = Vec::new();

        for result in results {
            match result.outcome {
                Outcome::Processed => report.processed.push(result.path),
                Outcome::Skipped => report.skipped.push(result.path),
                Outcome::Failed(reason) => report.record_failure(result.path, reason),
            }
            sources.extend(result.source);
        }

        info!(
            processed = report.processed.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Per-file documentation finished"
        );

        if self.config.full_analysis {
            let unchanged = report.processed.is_empty() && report.failed.is_empty();
            report.aggregate = self.write_architecture_report(sources, unchanged).await?;
        }

        Ok(report)
    }

    async fn process_file(&self, entry: FileEntry) -> FileResult {
        let path = entry.path;

        let content = match self.backend.fetch_content(&path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path, error = %e, "Failed to fetch source");
                return FileResult::failed(path, e);
            }
        };

        let source = SourceFile::new(path, content);

        let outcome = match self.document(&source).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(path = %source.path, error = %e, "Documentation failed");
                Outcome::Failed(e.to_string())
            }
        };

        FileResult {
            path: source.path.clone(),
            outcome,
            source: self.config.full_analysis.then_some(source),
        }
    }

    async fn document(&self, source: &SourceFile) -> Result<Outcome> {
        let md_path = doc_path(&self.config.docs_dir, &source.path);
        let existing = self.backend.fetch_doc(&md_path).await?;

        let decision = gate::decide(
            &source.content_identity,
            existing.as_ref().map(|doc| doc.body.as_str()),
        );
        debug!(path = %source.path, ?decision, "Change gate");

        if decision == Decision::Skip {
            info!(path = %source.path, "Unchanged, skipping");
            return Ok(Outcome::Skipped);
        }

        let body = self
            .generator
            .generate(&source.path, &source.raw_content)
            .await?;
        let document = gate::stamp(&body, &source.content_identity);

        let version = existing.as_ref().and_then(|doc| doc.version.as_deref());
        self.backend.persist_doc(&md_path, &document, version).await?;

        info!(path = %source.path, doc = %md_path, "Documentation updated");
        Ok(Outcome::Processed)
    }

    /// Summarize every fetched file in listing order, then synthesize and
    /// persist the report. A run where every file was skipped keeps the
    /// existing report and makes no calls.
    async fn write_architecture_report(
        &self,
        sources: Vec<SourceFile>,
        unchanged: bool,
    ) -> Result<Option<String>> {
        let Some(synthesizer) = &self.synthesizer else {
            return Ok(None);
        };
        let path = &self.config.architecture_path;

        let existing = self.backend.fetch_doc(path).await?;
        if unchanged && existing.is_some() {
            info!(path = %path, "Sources unchanged, repository report kept");
            return Ok(Some(path.clone()));
        }
        if sources.is_empty() {
            warn!("No files fetched, repository report not written");
            return Ok(None);
        }

        let pending: Vec<_> = sources
            .iter()
            .map(|source| synthesizer.summarize_file(&source.path, &source.raw_content))
            .collect();
        let summaries: Vec<FileSummary> = stream::iter(pending)
            .buffered(self.config.max_concurrent_files)
            .try_collect()
            .await
            .inspect_err(|e| warn!(error = %e, "Repository report aborted"))?;

        let report = synthesizer.synthesize(&summaries).await?;

        let version = existing.as_ref().and_then(|doc| doc.version.as_deref());
        self.backend
            .persist_doc(path, &format!("{}\n", report), version)
            .await?;

        info!(path = %path, files = summaries.len(), "Repository report written");
        Ok(Some(path.clone()))
    }
}
