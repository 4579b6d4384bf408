//! Completion Service Abstraction
//!
//! Text in, text out. The classifier owns all JSON handling; backends only
//! return whatever the model generated. Supports Ollama-style and
//! OpenAI-compatible HTTP endpoints, plus a scripted fake for testing.

use crate::config::ModelConfig;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

/// Generation parameters for one completion call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub do_sample: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: 200,
            temperature: 0.1,
            do_sample: false,
        }
    }
}

impl From<&ModelConfig> for GenerationOptions {
    fn from(config: &ModelConfig) -> Self {
        Self {
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
            do_sample: config.do_sample,
        }
    }
}

/// Completion errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("Completion service returned empty response")]
    EmptyResponse,
}

/// Opaque completion service
pub trait CompletionService: Send + Sync {
    /// Generate a continuation for `prompt`
    fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, LlmError>;

    /// Verify the backend is reachable (startup only)
    fn health_check(&self) -> Result<(), LlmError> {
        Ok(())
    }
}

/// HTTP completion backend
pub struct HttpCompletionService {
    config: ModelConfig,
    client: reqwest::blocking::Client,
}

impl HttpCompletionService {
    pub fn new(config: ModelConfig) -> Result<Self, LlmError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::HttpError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Check if endpoint is Ollama-style
    fn is_ollama_endpoint(&self) -> bool {
        self.config.endpoint.contains("11434") || self.config.endpoint.contains("ollama")
    }

    fn map_send_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.config.timeout_secs)
        } else {
            LlmError::HttpError(format!("Request failed: {}", e))
        }
    }

    /// Call Ollama `/api/generate`
    fn call_ollama(&self, prompt: &str, options: &GenerationOptions) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.config.endpoint.trim_end_matches('/'));

        // Greedy decoding when sampling is off
        let temperature = if options.do_sample { options.temperature } else { 0.0 };
        let request_body = serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "num_predict": options.max_new_tokens,
                "temperature": temperature,
            },
        });

        let response = self
            .client
            .post(&url)
            .json(&request_body)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(LlmError::HttpError(format!(
                "HTTP {} from Ollama",
                response.status()
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        response_json
            .get("response")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or(LlmError::EmptyResponse)
    }

    /// Call OpenAI-compatible `/v1/completions`
    fn call_openai_compatible(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        let url = format!("{}/v1/completions", self.config.endpoint.trim_end_matches('/'));

        let temperature = if options.do_sample { options.temperature } else { 0.0 };
        let request_body = serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "max_tokens": options.max_new_tokens,
            "temperature": temperature,
        });

        let mut request = self.client.post(&url).json(&request_body);

        if let Some(api_key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(LlmError::HttpError(format!(
                "HTTP {} from OpenAI-compatible API",
                response.status()
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        response_json
            .get("choices")
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("text"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or(LlmError::EmptyResponse)
    }
}

impl CompletionService for HttpCompletionService {
    fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, LlmError> {
        // Try Ollama-style API first
        if self.is_ollama_endpoint() {
            match self.call_ollama(prompt, options) {
                Ok(text) => return Ok(text),
                Err(e) => {
                    tracing::debug!("Ollama API failed, trying OpenAI-compatible: {}", e);
                }
            }
        }

        self.call_openai_compatible(prompt, options)
    }

    fn health_check(&self) -> Result<(), LlmError> {
        let url = if self.is_ollama_endpoint() {
            format!("{}/api/tags", self.config.endpoint.trim_end_matches('/'))
        } else {
            format!("{}/v1/models", self.config.endpoint.trim_end_matches('/'))
        };

        let response = self.client.get(&url).send().map_err(|e| self.map_send_error(e))?;
        if response.status().is_server_error() {
            return Err(LlmError::HttpError(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }
        Ok(())
    }
}

/// Fake completion service for testing
pub struct FakeCompletionService {
    responses: Mutex<Vec<Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
}

impl FakeCompletionService {
    /// Create a fake service with pre-defined responses
    pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always return the same text
    pub fn always(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    /// Always fail with the same error
    pub fn always_error(error: LlmError) -> Self {
        Self::new(vec![Err(error)])
    }

    /// Get the number of calls made
    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Prompt of the most recent call
    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().ok().and_then(|p| p.last().cloned())
    }
}

impl CompletionService for FakeCompletionService {
    fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<String, LlmError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let mut responses = match self.responses.lock() {
            Ok(r) => r,
            Err(_) => return Err(LlmError::EmptyResponse),
        };

        match responses.len() {
            0 => Err(LlmError::EmptyResponse),
            // Keep returning the last response
            1 => responses[0].clone(),
            _ => responses.remove(0),
        }
    }
}
