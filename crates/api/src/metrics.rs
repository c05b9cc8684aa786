use async_trait::async_trait;
use generate::{GenerationRequest, TextGeneration};
use ingest::Result;
use pipeline::RunReport;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

pub struct Metrics {
    // Runs
    total_runs: AtomicUsize,
    successful_runs: AtomicUsize,
    failed_runs: AtomicUsize,

    // Files, accumulated over all completed runs
    files_processed: AtomicUsize,
    files_skipped: AtomicUsize,
    files_failed: AtomicUsize,

    // Model calls
    generation_calls: AtomicUsize,
    generation_failures: AtomicUsize,

    // Timing (in microseconds)
    total_run_time_us: AtomicU64,
    total_generation_time_us: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            total_runs: AtomicUsize::new(0),
            successful_runs: AtomicUsize::new(0),
            failed_runs: AtomicUsize::new(0),
            files_processed: AtomicUsize::new(0),
            files_skipped: AtomicUsize::new(0),
            files_failed: AtomicUsize::new(0),
            generation_calls: AtomicUsize::new(0),
            generation_failures: AtomicUsize::new(0),
            total_run_time_us: AtomicU64::new(0),
            total_generation_time_us: AtomicU64::new(0),
        })
    }

    pub fn record_run(&self, report: &RunReport, duration: Duration) {
        self.total_runs.fetch_add(1, Ordering::Relaxed);
        self.successful_runs.fetch_add(1, Ordering::Relaxed);
        self.files_processed.fetch_add(report.processed.len(), Ordering::Relaxed);
        self.files_skipped.fetch_add(report.skipped.len(), Ordering::Relaxed);
        self.files_failed.fetch_add(report.failed.len(), Ordering::Relaxed);
        self.total_run_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// A run that aborted before producing a report.
    pub fn record_run_failure(&self, duration: Duration) {
        self.total_runs.fetch_add(1, Ordering::Relaxed);
        self.failed_runs.fetch_add(1, Ordering::Relaxed);
        self.total_run_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_generation(&self, duration: Duration, success: bool) {
        self.generation_calls.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.generation_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.total_generation_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_runs: self.total_runs.load(Ordering::Relaxed),
            successful_runs: self.successful_runs.load(Ordering::Relaxed),
            failed_runs: self.failed_runs.load(Ordering::Relaxed),
            files_processed: self.files_processed.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            generation_calls: self.generation_calls.load(Ordering::Relaxed),
            generation_failures: self.generation_failures.load(Ordering::Relaxed),
            avg_run_time_ms: avg_time_ms(&self.total_run_time_us, &self.total_runs),
            avg_generation_time_ms: avg_time_ms(&self.total_generation_time_us, &self.generation_calls),
        }
    }
}

fn avg_time_ms(total_us: &AtomicU64, count: &AtomicUsize) -> f64 {
    let total = total_us.load(Ordering::Relaxed) as f64;
    let cnt = count.load(Ordering::Relaxed) as f64;
    if cnt > 0.0 {
        total / cnt / 1000.0 // Convert to ms
    } else {
        0.0
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_runs: usize,
    pub successful_runs: usize,
    pub failed_runs: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub generation_calls: usize,
    pub generation_failures: usize,
    pub avg_run_time_ms: f64,
    pub avg_generation_time_ms: f64,
}

/// Counts and times every call that reaches the wrapped backend.
pub struct MeteredGeneration<G> {
    inner: G,
    metrics: Arc<Metrics>,
}

impl<G> MeteredGeneration<G> {
    pub fn new(inner: G, metrics: Arc<Metrics>) -> Self {
        Self { inner, metrics }
    }
}

#[async_trait]
impl<G: TextGeneration> TextGeneration for MeteredGeneration<G> {
    async fn complete(&self, request: &GenerationRequest) -> Result<String> {
        let start = Instant::now();
        let result = self.inner.complete(request).await;
        self.metrics.record_generation(start.elapsed(), result.is_ok());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use generate::PromptBuilder;
    use generate::mock::ScriptedGeneration;
    use ingest::Fragment;
    use pipeline::FailedFile;

    #[test]
    fn test_snapshot_accumulates_reports() {
        let metrics = Metrics::new();
        let report = RunReport {
            processed: vec!["a.cs".to_string(), "b.cs".to_string()],
            skipped: vec!["c.cs".to_string()],
            failed: vec![FailedFile {
                path: "d.cs".to_string(),
                reason: "boom".to_string(),
            }],
            aggregate: None,
        };

        metrics.record_run(&report, Duration::from_millis(4));
        metrics.record_run_failure(Duration::from_millis(2));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_runs, 2);
        assert_eq!(snapshot.successful_runs, 1);
        assert_eq!(snapshot.failed_runs, 1);
        assert_eq!(snapshot.files_processed, 2);
        assert_eq!(snapshot.files_skipped, 1);
        assert_eq!(snapshot.files_failed, 1);
        assert!((snapshot.avg_run_time_ms - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_snapshot_has_zero_averages() {
        let snapshot = Metrics::new().snapshot();
        assert_eq!(snapshot.avg_run_time_ms, 0.0);
        assert_eq!(snapshot.avg_generation_time_ms, 0.0);
    }

    #[tokio::test]
    async fn test_metered_generation_counts_failures() {
        let metrics = Metrics::new();
        let metered = MeteredGeneration::new(ScriptedGeneration::new().failing_on_call(2), metrics.clone());
        let request = PromptBuilder::default().build("a.cs", &Fragment::new(1, 1, "x".to_string(), "a.cs".to_string()));

        assert!(metered.complete(&request).await.is_ok());
        assert!(metered.complete(&request).await.is_err());

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.generation_calls, 2);
        assert_eq!(snapshot.generation_failures, 1);
    }
}
