use anyhow::{Context, Result};
use generate::{GeneratorConfig, RetryConfig, SamplingParams};
use ingest::FileFilter;
use pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub bind_addr: String,
    pub log_format: LogFormat,
    pub llm: LlmConfig,
    pub generator: GeneratorConfig,
    pub retry: RetryConfig,
    pub pipeline: PipelineConfig,
    pub filter: FileFilter,
    pub github: GitHubConfig,
    pub azure: AzureConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Azure,   // Azure OpenAI deployment
    OpenAi,  // OpenAI-compatible /chat/completions
    Ollama,  // Local Ollama server
}

impl FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "azure" | "azure-openai" => Ok(Self::Azure),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => anyhow::bail!("unknown LLM provider: {}", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub endpoint: String,
    /// Deployment name (Azure) or model name (OpenAI, Ollama)
    pub model: String,
    pub api_version: String,
    #[serde(skip_serializing, default)]
    pub api_key: String,
    pub sampling: SamplingParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    pub api_base: String,
    #[serde(skip_serializing, default)]
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureConfig {
    pub base_url: String,
    #[serde(skip_serializing, default)]
    pub token: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            log_format: LogFormat::Pretty,
            llm: LlmConfig {
                provider: LlmProvider::Azure,
                endpoint: String::new(),
                model: "gpt-4o".to_string(),
                api_version: "2024-04-01-preview".to_string(),
                api_key: String::new(),
                sampling: SamplingParams::default(),
            },
            generator: GeneratorConfig::default(),
            retry: RetryConfig::default(),
            pipeline: PipelineConfig::default(),
            filter: FileFilter::default(),
            github: GitHubConfig {
                api_base: hosting::github::DEFAULT_API_BASE.to_string(),
                token: String::new(),
            },
            azure: AzureConfig {
                base_url: hosting::azure::DEFAULT_BASE_URL.to_string(),
                token: String::new(),
            },
        }
    }
}

impl AppConfig {
    /// Load `.env` (if present) and then read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key/value source. Unset keys keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(addr) = get("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(format) = get("LOG_FORMAT") {
            config.log_format = match format.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            };
        }

        if let Some(provider) = get("LLM_PROVIDER") {
            config.llm.provider = provider.parse()?;
        }
        match config.llm.provider {
            LlmProvider::Ollama => {
                config.llm.endpoint =
                    get("OLLAMA_URL").unwrap_or_else(|| "http://localhost:11434".to_string());
                config.llm.model = get("OLLAMA_MODEL").unwrap_or_else(|| "llama3".to_string());
            }
            LlmProvider::Azure | LlmProvider::OpenAi => {
                if let Some(endpoint) = get("OPENAI_URL") {
                    config.llm.endpoint = endpoint;
                } else if config.llm.provider == LlmProvider::OpenAi {
                    config.llm.endpoint = "https://api.openai.com/v1".to_string();
                }
                if let Some(model) = get("OPENAI_DEPLOYMENT") {
                    config.llm.model = model;
                }
                if let Some(version) = get("OPENAI_API_VERSION") {
                    config.llm.api_version = version;
                }
                config.llm.api_key = get("OPENAI_API_KEY").unwrap_or_default();
            }
        }
        if let Some(value) = get("LLM_TEMPERATURE") {
            config.llm.sampling.temperature = parse("LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = get("LLM_MAX_TOKENS") {
            config.llm.sampling.max_tokens = parse("LLM_MAX_TOKENS", &value)?;
        }

        if let Some(value) = get("MAX_FRAGMENT_LENGTH") {
            config.generator.max_fragment_length = parse("MAX_FRAGMENT_LENGTH", &value)?;
        }
        if let Some(value) = get("PARALLEL_FRAGMENTS") {
            config.generator.parallel_fragments = parse("PARALLEL_FRAGMENTS", &value)?;
        }

        if let Some(value) = get("LLM_MAX_RETRIES") {
            config.retry.max_retries = parse("LLM_MAX_RETRIES", &value)?;
        }
        if let Some(value) = get("LLM_TIMEOUT_SECS") {
            config.retry.request_timeout_secs = parse("LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(dir) = get("DOCS_DIR") {
            config.pipeline.architecture_path = format!("{}/ARCHITECTURE.md", dir.trim_end_matches('/'));
            config.pipeline.docs_dir = dir;
        }
        if let Some(path) = get("ARCHITECTURE_PATH") {
            config.pipeline.architecture_path = path;
        }
        if let Some(value) = get("MAX_CONCURRENT_FILES") {
            config.pipeline.max_concurrent_files = parse("MAX_CONCURRENT_FILES", &value)?;
        }
        if let Some(value) = get("FULL_ANALYSIS") {
            config.pipeline.full_analysis = parse("FULL_ANALYSIS", &value)?;
        }

        if let Some(list) = get("FILE_EXTENSIONS") {
            config.filter.extensions = split_list(&list);
        }
        if let Some(list) = get("EXCLUDED_DIRS") {
            config.filter.denied_dirs = split_list(&list);
        }

        if let Some(base) = get("GITHUB_API_URL") {
            config.github.api_base = base;
        }
        config.github.token = get("GITHUB_TOKEN").unwrap_or_default();
        if let Some(base) = get("AZURE_DEVOPS_URL") {
            config.azure.base_url = base;
        }
        config.azure.token = get("AZURE_TOKEN").unwrap_or_default();

        Ok(config)
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid value for {}: {:?}", key, value))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().trim_start_matches('.').to_string())
        .filter(|item| !item.is_empty())
        .collect()
}
