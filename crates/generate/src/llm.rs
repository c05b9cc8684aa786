use async_trait::async_trait;
use ingest::{DocError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::schema::GenerationRequest;

/// Black-box text generation backend.
#[async_trait]
pub trait TextGeneration: Send + Sync {
    async fn complete(&self, request: &GenerationRequest) -> Result<String>;
}

#[async_trait]
impl<T: TextGeneration + ?Sized> TextGeneration for Arc<T> {
    async fn complete(&self, request: &GenerationRequest) -> Result<String> {
        (**self).complete(request).await
    }
}

/// How the API key travels with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
    Bearer,
    ApiKeyHeader,
}

/// OpenAI-compatible chat completions endpoint (Azure OpenAI deployments or
/// the public OpenAI API).
#[derive(Clone)]
pub struct ChatCompletionsClient {
    url: String,
    model: Option<String>,
    api_key: String,
    auth: AuthStyle,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

impl ChatCompletionsClient {
    pub fn new(url: String, model: Option<String>, api_key: String, auth: AuthStyle) -> Self {
        Self {
            url,
            model,
            api_key,
            auth,
            client: reqwest::Client::new(),
        }
    }

    /// Azure OpenAI deployment, e.g. `https://<resource>.openai.azure.com/`.
    pub fn azure(endpoint: &str, deployment: &str, api_version: &str, api_key: String) -> Self {
        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            endpoint.trim_end_matches('/'),
            deployment,
            api_version
        );
        Self::new(url, None, api_key, AuthStyle::ApiKeyHeader)
    }

    /// Plain OpenAI-style API rooted at `base_url` (e.g. `https://api.openai.com/v1`).
    pub fn openai(base_url: &str, model: String, api_key: String) -> Self {
        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        Self::new(url, Some(model), api_key, AuthStyle::Bearer)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TextGeneration for ChatCompletionsClient {
    async fn complete(&self, request: &GenerationRequest) -> Result<String> {
        let body = ChatRequest {
            model: self.model.as_deref(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_instruction,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            temperature: request.sampling.temperature,
            top_p: request.sampling.top_p,
            max_tokens: request.sampling.max_tokens,
        };

        let builder = self.client.post(&self.url).json(&body);
        let builder = match self.auth {
            AuthStyle::Bearer => builder.bearer_auth(&self.api_key),
            AuthStyle::ApiKeyHeader => builder.header("api-key", &self.api_key),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| DocError::Generation(format!("failed to send chat request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DocError::Generation(format!(
                "chat request failed: {} {}",
                status,
                truncate(&detail, 200)
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| DocError::Generation(format!("failed to parse chat response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| DocError::Generation("chat response had no content".to_string()))
    }
}

#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url,
            model,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl TextGeneration for OllamaClient {
    async fn complete(&self, request: &GenerationRequest) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let body = OllamaRequest {
            model: &self.model,
            system: &request.system_instruction,
            prompt: &request.user_prompt,
            stream: false,
            options: OllamaOptions {
                temperature: request.sampling.temperature,
                top_p: request.sampling.top_p,
                num_predict: request.sampling.max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DocError::Generation(format!("failed to send request to Ollama: {}", e)))?;

        if !response.status().is_success() {
            return Err(DocError::Generation(format!(
                "Ollama request failed: {}",
                response.status()
            )));
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| DocError::Generation(format!("failed to parse Ollama response: {}", e)))?;

        Ok(ollama_response.response)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SamplingParams;
    use mockito::Matcher;
    use serde_json::json;

    fn request() -> GenerationRequest {
        GenerationRequest {
            system_instruction: "sys".to_string(),
            user_prompt: "document this".to_string(),
            sampling: SamplingParams::default(),
        }
    }

    #[test]
    fn test_azure_url_layout() {
        let client = ChatCompletionsClient::azure(
            "https://example.openai.azure.com/",
            "gpt-4o",
            "2024-04-01-preview",
            "key".to_string(),
        );
        assert_eq!(
            client.url(),
            "https://example.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-04-01-preview"
        );
    }

    #[tokio::test]
    async fn test_chat_completion_returns_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer secret")
            .match_body(Matcher::PartialJson(json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "document this"}
                ],
                "max_tokens": 16000
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"choices": [{"message": {"content": "# Docs"}}]}).to_string())
            .create_async()
            .await;

        let client = ChatCompletionsClient::openai(&server.url(), "gpt-4o".to_string(), "secret".to_string());
        let text = client.complete(&request()).await.unwrap();

        assert_eq!(text, "# Docs");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_azure_deployment_uses_api_key_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/openai/deployments/gpt-4o/chat/completions")
            .match_query(Matcher::UrlEncoded("api-version".into(), "2024-04-01-preview".into()))
            .match_header("api-key", "secret")
            .with_status(200)
            .with_body(json!({"choices": [{"message": {"content": "azure docs"}}]}).to_string())
            .create_async()
            .await;

        let client = ChatCompletionsClient::azure(&server.url(), "gpt-4o", "2024-04-01-preview", "secret".to_string());
        assert_eq!(client.complete(&request()).await.unwrap(), "azure docs");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_chat_completion_error_status_is_generation_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("rate limited")
            .create_async()
            .await;

        let client = ChatCompletionsClient::openai(&server.url(), "gpt-4o".to_string(), "k".to_string());
        let err = client.complete(&request()).await.unwrap_err();

        match err {
            DocError::Generation(msg) => assert!(msg.contains("429")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_chat_completion_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(json!({"choices": []}).to_string())
            .create_async()
            .await;

        let client = ChatCompletionsClient::openai(&server.url(), "m".to_string(), "k".to_string());
        let err = client.complete(&request()).await.unwrap_err();
        assert!(matches!(err, DocError::Generation(_)));
    }

    #[tokio::test]
    async fn test_ollama_generate() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/generate")
            .match_body(Matcher::PartialJson(json!({
                "model": "llama3",
                "system": "sys",
                "prompt": "document this",
                "stream": false
            })))
            .with_status(200)
            .with_body(json!({"response": "ollama docs"}).to_string())
            .create_async()
            .await;

        let client = OllamaClient::new(server.url(), "llama3".to_string());
        assert_eq!(client.complete(&request()).await.unwrap(), "ollama docs");
        mock.assert_async().await;
    }
}
