mod config;
mod metrics;

use anyhow::{Context, ensure};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use generate::prompt::DEFAULT_SYSTEM_INSTRUCTION;
use generate::{
    ChatCompletionsClient, DocumentationGenerator, OllamaClient, PromptBuilder, RetryingGeneration,
    TextGeneration,
};
use hosting::{AzureDevOpsBackend, AzureRepo, GitHubBackend, GitHubRepo, RepositoryBackend};
use ingest::DocError;
use pipeline::{RepositoryPipeline, RunReport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use synthesis::RepoSummarySynthesizer;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, error, info, info_span};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::config::{AppConfig, LlmProvider, LogFormat};
use crate::metrics::{MeteredGeneration, Metrics, MetricsSnapshot};

#[derive(Clone)]
struct AppState {
    config: Arc<AppConfig>,
    generator: DocumentationGenerator,
    synthesizer: RepoSummarySynthesizer,
    metrics: Arc<Metrics>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    provider: LlmProvider,
    model: String,
}

#[derive(Deserialize)]
struct GitHubRunRequest {
    #[serde(flatten)]
    target: GitHubRepo,
    #[serde(default, alias = "FullAnalysis", alias = "fullAnalysis")]
    full_analysis: Option<bool>,
}

#[derive(Deserialize)]
struct AzureRunRequest {
    #[serde(flatten)]
    target: AzureRepo,
    #[serde(default, alias = "FullAnalysis", alias = "fullAnalysis")]
    full_analysis: Option<bool>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Run-level failures surfaced to the caller.
struct ApiError(DocError);

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            DocError::InvalidConfiguration(_) => StatusCode::BAD_REQUEST,
            DocError::NotFound(_) => StatusCode::NOT_FOUND,
            DocError::Transport(_) | DocError::Generation(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    init_tracing(config.log_format);

    let metrics = Metrics::new();
    let state = build_state(config, metrics)?;
    let bind_addr = state.config.bind_addr.clone();

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr.as_str())
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

fn build_state(config: AppConfig, metrics: Arc<Metrics>) -> anyhow::Result<AppState> {
    let backend = text_generation(&config, metrics.clone())?;
    let prompts = PromptBuilder::new(DEFAULT_SYSTEM_INSTRUCTION.to_string(), config.llm.sampling);
    let generator = DocumentationGenerator::new(backend.clone(), config.generator)
        .context("Invalid generator configuration")?
        .with_prompts(prompts);
    let synthesizer =
        RepoSummarySynthesizer::new(backend, generator.fragmenter()).with_sampling(config.llm.sampling);

    Ok(AppState {
        config: Arc::new(config),
        generator,
        synthesizer,
        metrics,
    })
}

/// Provider client, metered per attempt and wrapped in retries.
fn text_generation(config: &AppConfig, metrics: Arc<Metrics>) -> anyhow::Result<Arc<dyn TextGeneration>> {
    let llm = &config.llm;
    let backend: Arc<dyn TextGeneration> = match llm.provider {
        LlmProvider::Azure => {
            ensure!(!llm.endpoint.is_empty(), "OPENAI_URL is required for the azure provider");
            let client = ChatCompletionsClient::azure(&llm.endpoint, &llm.model, &llm.api_version, llm.api_key.clone());
            Arc::new(RetryingGeneration::from_config(
                MeteredGeneration::new(client, metrics),
                &config.retry,
            ))
        }
        LlmProvider::OpenAi => {
            let client = ChatCompletionsClient::openai(&llm.endpoint, llm.model.clone(), llm.api_key.clone());
            Arc::new(RetryingGeneration::from_config(
                MeteredGeneration::new(client, metrics),
                &config.retry,
            ))
        }
        LlmProvider::Ollama => {
            let client = OllamaClient::new(llm.endpoint.clone(), llm.model.clone());
            Arc::new(RetryingGeneration::from_config(
                MeteredGeneration::new(client, metrics),
                &config.retry,
            ))
        }
    };

    info!(provider = ?llm.provider, model = %llm.model, "Text generation backend ready");
    Ok(backend)
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .route("/github/docs", post(document_github))
        .route("/azure/docs", post(document_azure))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        provider: state.config.llm.provider,
        model: state.config.llm.model.clone(),
    })
}

async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

async fn document_github(
    State(state): State<AppState>,
    Json(req): Json<GitHubRunRequest>,
) -> Result<Json<RunReport>, ApiError> {
    let backend = GitHubBackend::new(
        state.config.github.api_base.clone(),
        req.target,
        state.config.github.token.clone(),
        state.config.filter.clone(),
    );
    run_pipeline(&state, Arc::new(backend), req.full_analysis).await
}

async fn document_azure(
    State(state): State<AppState>,
    Json(req): Json<AzureRunRequest>,
) -> Result<Json<RunReport>, ApiError> {
    let backend = AzureDevOpsBackend::new(
        state.config.azure.base_url.clone(),
        req.target,
        state.config.azure.token.clone(),
        state.config.filter.clone(),
    );
    run_pipeline(&state, Arc::new(backend), req.full_analysis).await
}

async fn run_pipeline(
    state: &AppState,
    backend: Arc<dyn RepositoryBackend>,
    full_analysis: Option<bool>,
) -> Result<Json<RunReport>, ApiError> {
    let mut config = state.config.pipeline.clone();
    if let Some(full_analysis) = full_analysis {
        config.full_analysis = full_analysis;
    }

    let run_id = Uuid::new_v4();
    let span = info_span!("documentation_run", %run_id, repo = %backend.describe());
    let pipeline = RepositoryPipeline::new(backend, state.generator.clone(), config)
        .with_synthesizer(state.synthesizer.clone());

    let start = Instant::now();
    match pipeline.run().instrument(span).await {
        Ok(report) => {
            state.metrics.record_run(&report, start.elapsed());
            Ok(Json(report))
        }
        Err(e) => {
            error!(%run_id, "Documentation run failed: {}", e);
            state.metrics.record_run_failure(start.elapsed());
            Err(ApiError(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use generate::mock::ScriptedGeneration;
    use mockito::Matcher;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn test_state(github_url: String, llm: Arc<ScriptedGeneration>) -> AppState {
        let mut config = AppConfig::default();
        config.github.api_base = github_url;
        config.github.token = "t0ken".to_string();

        let generator = DocumentationGenerator::new(llm.clone(), config.generator).unwrap();
        let synthesizer = RepoSummarySynthesizer::new(llm, generator.fragmenter());
        AppState {
            config: Arc::new(config),
            generator,
            synthesizer,
            metrics: Metrics::new(),
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_error_status_mapping() {
        let status = |e: DocError| ApiError(e).status();

        assert_eq!(status(DocError::InvalidConfiguration("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(DocError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(DocError::Transport("x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(status(DocError::Generation("x".into())), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_azure_request_accepts_pascal_case() {
        let req: AzureRunRequest = serde_json::from_value(json!({
            "Org": "contoso",
            "Project": "web",
            "RepoId": "r1",
            "Branch": "main",
            "FullAnalysis": true
        }))
        .unwrap();

        assert_eq!(req.target.org, "contoso");
        assert_eq!(req.target.repo_id, "r1");
        assert_eq!(req.full_analysis, Some(true));
    }

    #[tokio::test]
    async fn test_health_reports_provider() {
        let app = router(test_state("http://unused".to_string(), Arc::new(ScriptedGeneration::new())));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["provider"], "azure");
    }

    #[tokio::test]
    async fn test_github_run_documents_new_file() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/octo/app/git/trees/main")
            .match_query(Matcher::UrlEncoded("recursive".into(), "1".into()))
            .with_status(200)
            .with_body(
                json!({"tree": [{"path": "src/A.cs", "type": "blob", "sha": "s1"}], "truncated": false})
                    .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", "/repos/octo/app/contents/src/A.cs")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"content": STANDARD.encode("class A {}"), "sha": "s1"}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/repos/octo/app/contents/docs/src/A.md")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;
        let upload = server
            .mock("PUT", "/repos/octo/app/contents/docs/src/A.md")
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;

        let llm = Arc::new(ScriptedGeneration::new());
        let state = test_state(server.url(), llm.clone());
        let metrics = state.metrics.clone();

        let response = router(state)
            .oneshot(post_json("/github/docs", json!({"repo": "octo/app", "branch": "main"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["processed"], json!(["src/A.cs"]));
        assert_eq!(body["skipped"], json!([]));
        assert_eq!(body["failed"], json!([]));

        upload.assert_async().await;
        assert_eq!(llm.call_count(), 1);
        assert_eq!(metrics.snapshot().files_processed, 1);
    }

    #[tokio::test]
    async fn test_listing_failure_is_bad_gateway() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/octo/app/git/trees/main")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let state = test_state(server.url(), Arc::new(ScriptedGeneration::new()));
        let metrics = state.metrics.clone();

        let response = router(state)
            .oneshot(post_json("/github/docs", json!({"repo": "octo/app", "branch": "main"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("transport error"));
        assert_eq!(metrics.snapshot().failed_runs, 1);
    }

    #[tokio::test]
    async fn test_unknown_branch_is_bad_gateway() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/octo/app/git/trees/nope")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(json!({"message": "Not Found"}).to_string())
            .create_async()
            .await;

        let state = test_state(server.url(), Arc::new(ScriptedGeneration::new()));
        let response = router(state)
            .oneshot(post_json("/github/docs", json!({"repo": "octo/app", "branch": "nope"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
