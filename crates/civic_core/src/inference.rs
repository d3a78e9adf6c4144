use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::InferenceError;

/// One structured-inference call: document text plus the JSON Schema the
/// answer must follow.
#[derive(Debug, Clone)]
pub struct InferenceRequest<'a> {
    pub text: &'a str,
    pub schema: &'a serde_json::Value,
    pub instructions: &'a str,
    pub timeout: Duration,
}

/// External text-to-structure service. Returns the raw response body; the
/// caller parses and validates it.
pub trait InferenceService: Send + Sync {
    fn infer(&self, request: &InferenceRequest<'_>) -> Result<String, InferenceError>;
}

/// Client for an Ollama-compatible `/api/generate` endpoint.
pub struct OllamaInference {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl OllamaInference {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, InferenceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InferenceError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        })
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    format: &'a serde_json::Value,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl InferenceService for OllamaInference {
    fn infer(&self, request: &InferenceRequest<'_>) -> Result<String, InferenceError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt: request.text,
            system: request.instructions,
            format: request.schema,
            stream: false,
            options: GenerateOptions { temperature: 0.0 },
        };

        let response = self
            .client
            .post(&url)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout(request.timeout.as_secs())
                } else if e.is_connect() {
                    InferenceError::Connection(self.base_url.clone())
                } else {
                    InferenceError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response.json().map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout(request.timeout.as_secs())
            } else {
                InferenceError::Malformed(e.to_string())
            }
        })?;
        Ok(parsed.response)
    }
}
