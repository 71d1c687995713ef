//! Ollama HTTP generation client
//!
//! Calls `POST /api/generate` with streaming disabled. The client owns a
//! small single-threaded runtime so synchronous callers can block on it.

use super::{GenerationError, Generator};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection and sampling settings
#[derive(Debug, Clone)]
pub struct OllamaSettings {
    /// Server URL (e.g., "localhost:11434" or "http://localhost:11434")
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: usize,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

pub struct OllamaGenerator {
    runtime: tokio::runtime::Runtime,
    client: Client,
    url: String,
    settings: OllamaSettings,
}

impl OllamaGenerator {
    pub fn new(settings: OllamaSettings) -> Result<Self, GenerationError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| GenerationError::InitializationError(e.to_string()))?;

        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| GenerationError::InitializationError(e.to_string()))?;

        let url = generate_url(&settings.endpoint);
        tracing::info!("Using Ollama model {} at {}", settings.model, url);

        Ok(Self {
            runtime,
            client,
            url,
            settings,
        })
    }

    async fn request(
        &self,
        prompt: &str,
        max_new_tokens: usize,
    ) -> Result<String, GenerationError> {
        let body = GenerateRequest {
            model: &self.settings.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                num_predict: max_new_tokens,
                temperature: self.settings.temperature,
                top_p: self.settings.top_p,
            },
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout
                } else if e.is_connect() {
                    GenerationError::RequestError(format!(
                        "Cannot connect to Ollama at {}",
                        self.settings.endpoint
                    ))
                } else {
                    GenerationError::RequestError(e.to_string())
                }
            })?;

        let response = response.error_for_status().map_err(|e| {
            GenerationError::RequestError(format!(
                "Ollama returned error: {}",
                e.status().map_or("unknown".to_string(), |s| s.to_string())
            ))
        })?;

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        Ok(parsed.response.trim().to_string())
    }
}

impl Generator for OllamaGenerator {
    fn generate(&self, prompt: &str, max_new_tokens: usize) -> Result<String, GenerationError> {
        self.runtime.block_on(self.request(prompt, max_new_tokens))
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }
}

/// Normalize URL - add http:// if not present
fn generate_url(endpoint: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    if base.starts_with("http://") || base.starts_with("https://") {
        format!("{base}/api/generate")
    } else {
        format!("http://{base}/api/generate")
    }
}
