//! Model runtime client
//!
//! `ModelClient` is the seam between the service and whatever serves the
//! model. `OllamaClient` talks to an Ollama-compatible `/api/generate`
//! endpoint; tests substitute their own implementations.

use crate::config::Config;
use crate::error::{AiError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send `prompt` to `model` and return its text output.
    ///
    /// Connection failures map to `AiError::ModelUnavailable` and timeouts to
    /// `AiError::ModelTimeout`; nothing is retried.
    async fn generate(&self, model: &str, prompt: &str) -> Result<String>;
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
    temperature: f64,
    seed: u64,
}

#[derive(Clone)]
pub struct OllamaClient {
    endpoint: String,
    http: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AiError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: format!("{}/api/generate", base_url.trim_end_matches('/')),
            http,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.ollama_base_url, config.request_timeout)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ModelClient for OllamaClient {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        let body = GenerateRequest {
            model,
            prompt,
            stream: false,
            // Deterministic output for identical prompts
            options: GenerateOptions {
                temperature: 0.0,
                seed: 42,
            },
        };

        debug!(model, prompt_chars = prompt.len(), "calling model runtime");

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(classify_transport_error)?;

        if !status.is_success() {
            return Err(AiError::Model(format!(
                "Model runtime returned {}: {}",
                status, text
            )));
        }

        Ok(extract_completion(&text))
    }
}

fn classify_transport_error(e: reqwest::Error) -> AiError {
    if e.is_timeout() {
        warn!("model runtime timed out: {}", e);
        AiError::ModelTimeout(e.to_string())
    } else if e.is_connect() {
        warn!("model runtime unreachable: {}", e);
        AiError::ModelUnavailable(e.to_string())
    } else {
        AiError::Model(format!("Model runtime request failed: {}", e))
    }
}

/// Pick the completion out of a response body.
///
/// Understands `{"response": "..."}` and `{"results": [{"content": "..."}]}`;
/// anything else is returned as the raw body.
pub fn extract_completion(body: &str) -> String {
    let json: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return body.to_string(),
    };

    if let Some(text) = json.get("response").and_then(|r| r.as_str()) {
        return text.to_string();
    }

    json.get("results")
        .and_then(|r| r.as_array())
        .and_then(|results| results.first())
        .and_then(|first| first.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_response_field() {
        assert_eq!(
            extract_completion(r#"{"model":"sqlcoder:7b","response":" DeviceName FROM t","done":true}"#),
            " DeviceName FROM t"
        );
    }

    #[test]
    fn test_extract_results_content() {
        assert_eq!(
            extract_completion(r#"{"results":[{"content":"hello"},{"content":"ignored"}]}"#),
            "hello"
        );
    }

    #[test]
    fn test_extract_falls_back_to_body() {
        assert_eq!(extract_completion("plain text"), "plain text");
        assert_eq!(extract_completion(r#"{"other":1}"#), r#"{"other":1}"#);
        assert_eq!(extract_completion(r#"{"results":[]}"#), r#"{"results":[]}"#);
    }

    #[test]
    fn test_endpoint_normalised() {
        let client = OllamaClient::new("http://localhost:11434/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:11434/api/generate");
    }
}
