//! Text generation module for Vigil — Gemini-backed summarization
//!
//! Provides a `TextGenerator` trait with a Gemini `generateContent`
//! implementation. The reporting pipeline drives it with a structured prompt
//! and treats every failure mode (transport error, API error, empty
//! candidates, retry exhaustion) the same way: no summary this tick.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

// ============================================================================
// TextGenerator trait
// ============================================================================

/// Abstraction over text-generation providers.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt` under `system_instruction`.
    /// An empty completion is an error, never an empty string.
    async fn generate(
        &self,
        prompt: &str,
        system_instruction: &str,
        temperature: f32,
    ) -> Result<String, GenerationError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

/// Text generation errors
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Empty response from generation API")]
    EmptyResponse,

    #[error("Missing API key")]
    MissingApiKey,

    #[error("All {attempts} retry attempts failed")]
    RetryExhausted { attempts: usize },
}

// ============================================================================
// Config types
// ============================================================================

/// Gemini generation client configuration
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub api_key: String,
    pub model: String,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl GenerationConfig {
    pub fn new(api_key: Option<String>, model: String) -> Self {
        let api_key = api_key
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .unwrap_or_default();

        Self {
            api_key,
            model,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

// ============================================================================
// Gemini API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationSettings>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationSettings {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    code: u16,
    message: String,
}

// ============================================================================
// GeminiGenerationClient
// ============================================================================

/// Gemini generation client — calls the `generateContent` API.
#[derive(Debug, Clone)]
pub struct GeminiGenerationClient {
    client: Client,
    config: GenerationConfig,
    base_url: String,
}

impl GeminiGenerationClient {
    pub fn new(config: GenerationConfig) -> Result<Self, GenerationError> {
        if config.api_key.is_empty() {
            return Err(GenerationError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            config,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        })
    }

    /// Create a client with a custom base URL (for testing / integration)
    pub fn with_base_url(
        config: GenerationConfig,
        base_url: String,
    ) -> Result<Self, GenerationError> {
        if config.api_key.is_empty() {
            return Err(GenerationError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    /// Generate a completion with retry and exponential backoff
    pub async fn generate_raw(
        &self,
        prompt: &str,
        system_instruction: &str,
        temperature: f32,
    ) -> Result<String, GenerationError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        let result = Retry::spawn(retry_strategy, || {
            self.generate_once(prompt, system_instruction, temperature)
        })
        .await;

        match result {
            Ok(text) => Ok(text),
            Err(e) => {
                tracing::error!(
                    attempts = self.config.max_retries,
                    error = %e,
                    "All generation retry attempts failed"
                );
                Err(GenerationError::RetryExhausted {
                    attempts: self.config.max_retries,
                })
            }
        }
    }

    async fn generate_once(
        &self,
        prompt: &str,
        system_instruction: &str,
        temperature: f32,
    ) -> Result<String, GenerationError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.config.model, self.config.api_key
        );

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            system_instruction: Some(GeminiContent {
                parts: vec![GeminiPart {
                    text: system_instruction.to_string(),
                }],
            }),
            generation_config: Some(GeminiGenerationSettings { temperature }),
        };

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let error_detail = serde_json::from_str::<GeminiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error);

            let (code, message) = error_detail
                .map(|e| (e.code, e.message))
                .unwrap_or((status.as_u16(), error_body));

            tracing::error!(code = code, message = %message, "Gemini API error");

            return Err(GenerationError::Api { code, message });
        }

        let gemini_response: GeminiResponse = response.json().await?;

        let text: String = gemini_response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }

        Ok(text)
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerationClient {
    async fn generate(
        &self,
        prompt: &str,
        system_instruction: &str,
        temperature: f32,
    ) -> Result<String, GenerationError> {
        self.generate_raw(prompt, system_instruction, temperature)
            .await
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(api_key: &str) -> GenerationConfig {
        GenerationConfig {
            api_key: api_key.to_string(),
            model: "gemini-2.0-flash".to_string(),
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }

    fn mock_generation_response(text: &str) -> serde_json::Value {
        serde_json::json!({
            "candidates": [{
                "content": {
                    "parts": [{ "text": text }],
                    "role": "model"
                },
                "finishReason": "STOP"
            }]
        })
    }

    #[tokio::test]
    async fn test_generate_calls_api_and_returns_text() {
        let mock_server = MockServer::start().await;
        let config = test_config("test-api-key");
        let client = GeminiGenerationClient::with_base_url(config, mock_server.uri())
            .expect("Failed to create client");

        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({
                "contents": [{ "parts": [{ "text": "how is the team doing" }] }],
                "systemInstruction": { "parts": [{ "text": "you summarize moods" }] },
                "generationConfig": { "temperature": 0.5 }
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(mock_generation_response("The team seems upbeat today.")),
            )
            .mount(&mock_server)
            .await;

        let result = client
            .generate_raw("how is the team doing", "you summarize moods", 0.5)
            .await;

        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result.err());
        assert_eq!(result.unwrap(), "The team seems upbeat today.");
    }

    #[tokio::test]
    async fn test_generate_returns_error_on_api_500() {
        let mock_server = MockServer::start().await;
        let config = test_config("test-api-key");
        let client = GeminiGenerationClient::with_base_url(config, mock_server.uri())
            .expect("Failed to create client");

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": { "code": 500, "message": "Internal server error" }
            })))
            .mount(&mock_server)
            .await;

        let result = client.generate_raw("prompt", "system", 0.5).await;

        assert!(result.is_err(), "Expected error on 500 response");
        match result {
            Err(GenerationError::RetryExhausted { attempts }) => {
                assert_eq!(attempts, 3, "Expected 3 retry attempts");
            }
            _ => panic!("Expected RetryExhausted error"),
        }
    }

    #[tokio::test]
    async fn test_generate_retries_on_429_then_succeeds() {
        let mock_server = MockServer::start().await;
        let config = test_config("test-api-key");
        let client = GeminiGenerationClient::with_base_url(config, mock_server.uri())
            .expect("Failed to create client");

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": { "code": 429, "message": "Rate limit exceeded" }
            })))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(mock_generation_response("Calm week.")),
            )
            .mount(&mock_server)
            .await;

        let result = client.generate_raw("prompt", "system", 0.5).await;

        assert!(result.is_ok(), "Expected success after retry");
        assert_eq!(result.unwrap(), "Calm week.");
    }

    #[tokio::test]
    async fn test_generate_fails_with_missing_api_key() {
        let config = test_config("");
        let result = GeminiGenerationClient::new(config);

        assert!(result.is_err(), "Expected error with missing API key");
        match result {
            Err(GenerationError::MissingApiKey) => {}
            _ => panic!("Expected MissingApiKey error"),
        }
    }

    #[tokio::test]
    async fn test_generate_treats_empty_candidates_as_error() {
        let mock_server = MockServer::start().await;
        let config = GenerationConfig {
            max_retries: 1,
            retry_delay_ms: 10,
            ..test_config("test-api-key")
        };
        let client = GeminiGenerationClient::with_base_url(config, mock_server.uri())
            .expect("Failed to create client");

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "candidates": [] })),
            )
            .mount(&mock_server)
            .await;

        let result = client.generate_raw("prompt", "system", 0.5).await;

        assert!(result.is_err(), "Empty candidate list must not yield text");
        match result {
            Err(GenerationError::RetryExhausted { .. }) => {}
            Err(GenerationError::EmptyResponse) => {}
            other => panic!("Expected EmptyResponse or RetryExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_treats_blank_text_as_error() {
        let mock_server = MockServer::start().await;
        let config = GenerationConfig {
            max_retries: 1,
            retry_delay_ms: 10,
            ..test_config("test-api-key")
        };
        let client = GeminiGenerationClient::with_base_url(config, mock_server.uri())
            .expect("Failed to create client");

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(mock_generation_response("   \n ")),
            )
            .mount(&mock_server)
            .await;

        let result = client.generate_raw("prompt", "system", 0.5).await;

        assert!(result.is_err(), "Whitespace-only text must not yield a summary");
    }

    // --- TextGenerator trait tests ---

    #[tokio::test]
    async fn test_generator_trait_object() {
        let mock_server = MockServer::start().await;
        let config = test_config("test-api-key");
        let backend: Box<dyn TextGenerator> = Box::new(
            GeminiGenerationClient::with_base_url(config, mock_server.uri()).unwrap(),
        );

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(mock_generation_response("Morale is steady.")),
            )
            .mount(&mock_server)
            .await;

        let result = backend.generate("prompt", "system", 0.5).await.unwrap();
        assert_eq!(result, "Morale is steady.");
        assert_eq!(backend.name(), "gemini");
    }

    #[tokio::test]
    async fn test_generate_joins_multipart_candidates() {
        let mock_server = MockServer::start().await;
        let config = test_config("test-api-key");
        let client = GeminiGenerationClient::with_base_url(config, mock_server.uri())
            .expect("Failed to create client");

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": {
                        "parts": [{ "text": "Mood is " }, { "text": "improving." }]
                    }
                }]
            })))
            .mount(&mock_server)
            .await;

        let result = client.generate_raw("prompt", "system", 0.5).await;
        assert_eq!(result.unwrap(), "Mood is improving.");
    }
}
