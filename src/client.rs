use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, InferenceFailure, Result};
use crate::observability::{
    INFERENCE_DURATION, INFERENCE_ERRORS, INFERENCE_REQUESTS, INFERENCE_RETRIES,
};
use crate::prompt::Prompt;

/// Default llama.cpp server address.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8080";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default maximum tokens per response.
pub const DEFAULT_MAX_TOKENS: u32 = 256;

/// Sampling options sent with every generation request.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationOptions {
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Sampling temperature; `None` leaves the server default.
    pub temperature: Option<f32>,
    /// Generation stops as soon as one of these is produced.
    pub stop_sequences: Vec<String>,
}

impl GenerationOptions {
    /// Creates options with the default token cap and no stop sequences.
    pub fn new() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
            stop_sequences: Vec::new(),
        }
    }

    /// Sets the maximum tokens per response.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the stop sequences.
    pub fn with_stop_sequences(mut self, stop_sequences: Vec<String>) -> Self {
        self.stop_sequences = stop_sequences;
        self
    }

    /// Checks that the options describe a request the server will accept.
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(Error::invalid_input(
                "max_tokens must be positive",
                Some("max_tokens".to_string()),
            ));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(Error::invalid_input(
                    format!("temperature {t} is outside 0.0..=2.0"),
                    Some("temperature".to_string()),
                ));
            }
        }
        if self.stop_sequences.iter().any(|s| s.is_empty()) {
            return Err(Error::invalid_input(
                "stop sequences must not be empty",
                Some("stop_sequences".to_string()),
            ));
        }
        Ok(())
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// A text generation backend.
#[async_trait::async_trait]
pub trait Inference: Send + Sync {
    /// Generate a response to `prompt`.
    async fn generate(&self, prompt: &Prompt, options: &GenerationOptions) -> Result<String>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    content: String,
}

/// Client for a llama.cpp server's completion endpoint.
#[derive(Debug, Clone)]
pub struct LlamaClient {
    api_key: Option<String>,
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
}

impl LlamaClient {
    /// Create a client for a server on the default local port.
    pub fn new() -> Result<Self> {
        Self::with_options(None, None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        base_url: Option<&str>,
        api_key: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut base_url = Url::parse(base_url.unwrap_or(DEFAULT_ENDPOINT))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e), None))?;

        Ok(Self {
            api_key,
            client,
            base_url,
            timeout,
        })
    }

    /// The configured request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|_| {
                Error::config(
                    "API key contains characters not allowed in a header",
                    Some("api_key".to_string()),
                )
            })?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Process error responses and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        #[derive(Deserialize)]
        struct ErrorResponse {
            error: Option<ErrorDetail>,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            message: Option<String>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::inference(
                    format!("Failed to read error response: {}", e),
                    InferenceFailure::Status(status_code),
                    Some(Box::new(e)),
                );
            }
        };

        let error_message = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .and_then(|e| e.error)
            .and_then(|e| e.message)
            .unwrap_or(error_body);

        let kind = match status_code {
            408 | 504 => InferenceFailure::Timeout,
            _ => InferenceFailure::Status(status_code),
        };
        Error::inference(error_message, kind, None)
    }

    async fn complete(&self, prompt: &Prompt, options: &GenerationOptions) -> Result<String> {
        let url = self.base_url.join("completion")?;
        let body = CompletionRequest {
            prompt: prompt.as_str(),
            n_predict: options.max_tokens,
            temperature: options.temperature,
            stop: &options.stop_sequences,
            stream: false,
        };

        let response = self
            .client
            .post(url)
            .headers(self.default_headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::inference(
                        format!("Request timed out after {:?}", self.timeout),
                        InferenceFailure::Timeout,
                        Some(Box::new(e)),
                    )
                } else {
                    Error::inference(
                        format!("Request failed: {}", e),
                        InferenceFailure::Unreachable,
                        Some(Box::new(e)),
                    )
                }
            })?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        let text = response.text().await.map_err(|e| {
            let kind = if e.is_timeout() {
                InferenceFailure::Timeout
            } else {
                InferenceFailure::Malformed
            };
            Error::inference(
                format!("Failed to read response: {}", e),
                kind,
                Some(Box::new(e)),
            )
        })?;
        let completion: CompletionResponse = serde_json::from_str(&text).map_err(|e| {
            Error::inference(
                format!("Failed to parse response: {}", e),
                InferenceFailure::Malformed,
                Some(Box::new(e)),
            )
        })?;
        Ok(completion.content.trim().to_string())
    }
}

#[async_trait::async_trait]
impl Inference for LlamaClient {
    async fn generate(&self, prompt: &Prompt, options: &GenerationOptions) -> Result<String> {
        options.validate()?;
        INFERENCE_REQUESTS.click();
        let start = Instant::now();

        // One immediate retry; a timed-out request is not repeated.
        let result = match self.complete(prompt, options).await {
            Err(err) if err.is_retryable() && !err.is_timeout() => {
                warn!(error = %err, "inference request failed, retrying once");
                INFERENCE_RETRIES.click();
                self.complete(prompt, options).await
            }
            result => result,
        };

        let elapsed = start.elapsed().as_secs_f64();
        INFERENCE_DURATION.add(elapsed);
        match &result {
            Ok(text) => debug!(elapsed, chars = text.len(), "inference complete"),
            Err(_) => INFERENCE_ERRORS.click(),
        }
        result
    }
}
