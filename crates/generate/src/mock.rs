use async_trait::async_trait;
use ingest::{DocError, Result};
use std::sync::Mutex;

use crate::llm::TextGeneration;
use crate::schema::GenerationRequest;

type Responder = Box<dyn Fn(&GenerationRequest) -> String + Send + Sync>;

/// In-memory backend that records every request. Calls are numbered from 1;
/// by default call `n` answers `"response n"`.
#[derive(Default)]
pub struct ScriptedGeneration {
    requests: Mutex<Vec<GenerationRequest>>,
    failing_calls: Vec<usize>,
    failing_marker: Option<String>,
    responder: Option<Responder>,
}

impl ScriptedGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on_call(mut self, call: usize) -> Self {
        self.failing_calls.push(call);
        self
    }

    /// Fail every request whose user prompt contains `marker`.
    pub fn failing_when_prompt_contains(mut self, marker: &str) -> Self {
        self.failing_marker = Some(marker.to_string());
        self
    }

    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&GenerationRequest) -> String + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    pub fn call_count(&self) -> usize {
        self.lock().len()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<GenerationRequest>> {
        self.requests.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TextGeneration for ScriptedGeneration {
    async fn complete(&self, request: &GenerationRequest) -> Result<String> {
        let call = {
            let mut requests = self.lock();
            requests.push(request.clone());
            requests.len()
        };

        if self.failing_calls.contains(&call) {
            return Err(DocError::Generation(format!("scripted failure on call {}", call)));
        }
        if let Some(marker) = &self.failing_marker {
            if request.user_prompt.contains(marker.as_str()) {
                return Err(DocError::Generation(format!("scripted failure for '{}'", marker)));
            }
        }

        Ok(match &self.responder {
            Some(responder) => responder(request),
            None => format!("response {}", call),
        })
    }
}
