//! Generation Client Adapter: one `generateContent` call against the Gemini REST API.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const MODEL_NAME: &str = "gemini-pro";
pub const TEMPERATURE: f32 = 0.5;

const X_GOOG_API_KEY: &str = "x-goog-api-key";

/// Generation parameters, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub model_name: String,
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub max_output_tokens: Option<u32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_name: MODEL_NAME.to_string(),
            temperature: TEMPERATURE,
            top_p: None,
            top_k: None,
            max_output_tokens: None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0}")]
    QuotaExceeded(String),

    #[error("{0}")]
    SafetyBlocked(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    ResponseExtractionFailed(String),

    #[error("{0}")]
    Unknown(String),
}

impl GenerationError {
    pub fn status_code(&self) -> u16 {
        match self {
            GenerationError::PermissionDenied(_) => 403,
            GenerationError::QuotaExceeded(_) => 429,
            GenerationError::SafetyBlocked(_) | GenerationError::InvalidArgument(_) => 400,
            GenerationError::ResponseExtractionFailed(_) | GenerationError::Unknown(_) => 500,
        }
    }

    /// Label used for the outcome metric.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::PermissionDenied(_) => "permission_denied",
            GenerationError::QuotaExceeded(_) => "quota_exceeded",
            GenerationError::SafetyBlocked(_) => "safety_blocked",
            GenerationError::InvalidArgument(_) => "invalid_argument",
            GenerationError::ResponseExtractionFailed(_) => "response_extraction_failed",
            GenerationError::Unknown(_) => "unknown",
        }
    }
}

/// Anything that can turn an assembled prompt into report text.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

#[derive(Clone)]
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    config: ModelConfig,
    http: Client,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("config", &self.config)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, config: ModelConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: GEMINI_BASE_URL.to_string(),
            api_key: api_key.into(),
            config,
            http,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn generate_url(&self) -> String {
        let model = self.config.model_name.trim();
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model.strip_prefix("models/").unwrap_or(model)
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

impl From<&ModelConfig> for GenerationConfig {
    fn from(config: &ModelConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

/// Non-text parts (function calls, inline data) deserialize with `text: None`.
#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
    error: GoogleErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorDetail {
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<GoogleErrorInfo>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorInfo {
    #[serde(default)]
    reason: Option<String>,
}

fn is_blocked_finish_reason(reason: &str) -> bool {
    matches!(
        reason,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII"
    )
}

// Older API versions only report safety blocks inside the error message.
fn mentions_safety_block(message: &str) -> bool {
    message.contains("candidate.safety_ratings") || message.contains("blocked due to safety")
}

fn classify_error(status: StatusCode, body: &str) -> GenerationError {
    let detail = serde_json::from_str::<GoogleErrorResponse>(body)
        .ok()
        .map(|response| response.error);

    let Some(detail) = detail else {
        let message = format!("HTTP {}: {}", status, body);
        return match status.as_u16() {
            401 | 403 => GenerationError::PermissionDenied(message),
            429 => GenerationError::QuotaExceeded(message),
            400 => GenerationError::InvalidArgument(message),
            _ => GenerationError::Unknown(message),
        };
    };

    let key_rejected = detail
        .details
        .iter()
        .any(|info| info.reason.as_deref() == Some("API_KEY_INVALID"));
    let message = detail.message;

    match detail.status.as_deref() {
        Some("PERMISSION_DENIED" | "UNAUTHENTICATED") => GenerationError::PermissionDenied(message),
        _ if key_rejected => GenerationError::PermissionDenied(message),
        Some("RESOURCE_EXHAUSTED") => GenerationError::QuotaExceeded(message),
        Some("INVALID_ARGUMENT" | "FAILED_PRECONDITION" | "OUT_OF_RANGE") => {
            if mentions_safety_block(&message) {
                GenerationError::SafetyBlocked(message)
            } else {
                GenerationError::InvalidArgument(message)
            }
        }
        Some(_) => GenerationError::Unknown(message),
        None => match status.as_u16() {
            401 | 403 => GenerationError::PermissionDenied(message),
            429 => GenerationError::QuotaExceeded(message),
            400 if mentions_safety_block(&message) => GenerationError::SafetyBlocked(message),
            400 => GenerationError::InvalidArgument(message),
            _ => GenerationError::Unknown(message),
        },
    }
}

/// Whole-response text: defined only for a single candidate whose parts are all text.
fn primary_text(response: &GenerateContentResponse) -> Option<String> {
    let [candidate] = response.candidates.as_slice() else {
        return None;
    };
    let parts = &candidate.content.as_ref()?.parts;
    if parts.is_empty() {
        return None;
    }
    parts
        .iter()
        .map(|part| part.text.as_deref())
        .collect::<Option<Vec<_>>>()
        .map(|texts| texts.concat())
}

/// First content segment of the first candidate.
fn first_segment_text(response: &GenerateContentResponse) -> Option<String> {
    response
        .candidates
        .first()?
        .content
        .as_ref()?
        .parts
        .first()?
        .text
        .clone()
}

fn extract_text(response: &GenerateContentResponse) -> Result<String, GenerationError> {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.as_deref())
    {
        return Err(GenerationError::SafetyBlocked(format!(
            "Prompt blocked: {}",
            reason
        )));
    }

    if let Some(text) = primary_text(response) {
        return Ok(text);
    }

    if let Some(text) = first_segment_text(response) {
        info!("Report extracted from the first content segment");
        return Ok(text);
    }

    match response
        .candidates
        .first()
        .and_then(|candidate| candidate.finish_reason.as_deref())
    {
        Some(reason) if is_blocked_finish_reason(reason) => Err(GenerationError::SafetyBlocked(
            format!("Generation blocked: {}", reason),
        )),
        reason => {
            warn!(
                candidates = response.candidates.len(),
                finish_reason = reason.unwrap_or("UNKNOWN"),
                "No text in generation response"
            );
            Err(GenerationError::ResponseExtractionFailed(format!(
                "No text in response ({} candidates)",
                response.candidates.len()
            )))
        }
    }
}

#[async_trait]
impl ReportGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: GenerationConfig::from(&self.config),
        };

        let response = self
            .http
            .post(self.generate_url())
            .header(X_GOOG_API_KEY, &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| GenerationError::Unknown(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| GenerationError::Unknown(err.to_string()))?;

        if !status.is_success() {
            return Err(classify_error(status, &body));
        }

        let response = serde_json::from_str::<GenerateContentResponse>(&body).map_err(|err| {
            GenerationError::Unknown(format!("Malformed generation response: {}", err))
        })?;

        extract_text(&response)
    }
}
