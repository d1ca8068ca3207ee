//! Minimal Gemini client for our use-cases.
//!
//! We only call `models/{model}:generateContent` and request either plain text or
//! schema-constrained JSON. Calls are instrumented and log model names, latencies,
//! and response sizes (not contents).
//!
//! NOTE: We never log the API key; it travels only in the `x-goog-api-key` header.

use std::{future::Future, time::Duration};

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::config::Settings;

const API_KEY_HEADER: &str = "x-goog-api-key";
const API_KEY_INVALID_REASON: &str = "API_KEY_INVALID";

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
  /// The backend refused the key (wrong, revoked, or not allowed for this API).
  #[error("credential rejected (HTTP {status}): {message}")]
  InvalidCredential { status: u16, message: String },
  #[error("backend HTTP {status}: {message}")]
  Http { status: u16, message: String },
  #[error("transport error: {0}")]
  Transport(#[from] reqwest::Error),
  #[error("could not decode backend response: {0}")]
  Decode(String),
}

/// Anything that can run a `generateContent` call. `GeminiClient` in production,
/// scripted fakes in tests. Returns the concatenated candidate text ("" when empty).
pub trait GenerativeBackend: Send + Sync {
  fn generate_content(
    &self,
    api_key: &str,
    request: &GenerateContentRequest,
  ) -> impl Future<Output = Result<String, BackendError>> + Send;
}

#[derive(Clone)]
pub struct GeminiClient {
  pub client: reqwest::Client,
  pub base_url: String,
  pub model: String,
}

impl GeminiClient {
  pub fn from_settings(settings: &Settings) -> Result<Self, BackendError> {
    let client = reqwest::Client::builder()
      .timeout(settings.gemini_timeout)
      .connect_timeout(Duration::from_secs(10))
      .build()?;
    Ok(Self {
      client,
      base_url: settings.gemini_base_url.clone(),
      model: settings.gemini_model.clone(),
    })
  }

  fn endpoint(&self) -> String {
    format!("{}/models/{}:generateContent", self.base_url, self.model)
  }
}

impl GenerativeBackend for GeminiClient {
  #[instrument(
    level = "info",
    skip(self, api_key, request),
    fields(model = %self.model, contents = request.contents.len(), json = request.generation_config.is_some())
  )]
  async fn generate_content(&self, api_key: &str, request: &GenerateContentRequest) -> Result<String, BackendError> {
    let start = std::time::Instant::now();
    let res = self
      .client
      .post(self.endpoint())
      .header(USER_AGENT, "physimind-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(API_KEY_HEADER, api_key)
      .json(request)
      .send()
      .await?;

    let status = res.status();
    if !status.is_success() {
      let body = res.text().await.unwrap_or_default();
      let err = classify_error(status.as_u16(), &body);
      error!(elapsed = ?start.elapsed(), error = %err, "Gemini call failed");
      return Err(err);
    }

    let body: GenerateContentResponse = res.json().await.map_err(|e| BackendError::Decode(e.to_string()))?;
    if let Some(usage) = &body.usage_metadata {
      info!(
        prompt_tokens = ?usage.prompt_token_count,
        candidates_tokens = ?usage.candidates_token_count,
        total_tokens = ?usage.total_token_count,
        "Gemini usage"
      );
    }
    let text = body.text();
    if text.is_empty() {
      warn!(finish_reason = ?body.finish_reason(), "Gemini returned no text");
    }
    info!(elapsed = ?start.elapsed(), text_len = text.len(), "Gemini response received");
    Ok(text)
  }
}

/// Map a non-2xx response to a typed error using the structured error envelope.
pub fn classify_error(status: u16, body: &str) -> BackendError {
  let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok().map(|e| e.error);
  let message = parsed
    .as_ref()
    .map(|e| e.message.clone())
    .filter(|m| !m.is_empty())
    .unwrap_or_else(|| crate::util::trunc_for_log(body, 200));

  let key_rejected = matches!(status, 401 | 403)
    || parsed
      .as_ref()
      .map(|e| e.details.iter().any(|d| d.reason.as_deref() == Some(API_KEY_INVALID_REASON)))
      .unwrap_or(false);

  if key_rejected {
    BackendError::InvalidCredential { status, message }
  } else {
    BackendError::Http { status, message }
  }
}

// --- Request DTOs ---

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
  pub contents: Vec<Content>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub system_instruction: Option<Content>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub generation_config: Option<GenerationConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub role: Option<String>,
  #[serde(default)]
  pub parts: Vec<Part>,
}

impl Content {
  pub fn new(role: &str, parts: Vec<Part>) -> Self {
    Self { role: Some(role.to_string()), parts }
  }

  /// Role-less content, used for `systemInstruction`.
  pub fn instruction(text: &str) -> Self {
    Self { role: None, parts: vec![Part::text(text)] }
  }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub text: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub inline_data: Option<InlineData>,
}

impl Part {
  pub fn text(text: impl Into<String>) -> Self {
    Self { text: Some(text.into()), inline_data: None }
  }

  pub fn inline(mime_type: &str, base64_data: impl Into<String>) -> Self {
    Self {
      text: None,
      inline_data: Some(InlineData { mime_type: mime_type.to_string(), data: base64_data.into() }),
    }
  }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
  pub mime_type: String,
  pub data: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub response_mime_type: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub response_schema: Option<Value>,
}

// --- Response DTOs ---

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
  #[serde(default)]
  pub candidates: Vec<Candidate>,
  #[serde(default)]
  pub usage_metadata: Option<UsageMetadata>,
}

impl GenerateContentResponse {
  /// Concatenated text of the first candidate; empty if there is none.
  pub fn text(&self) -> String {
    self
      .candidates
      .first()
      .and_then(|c| c.content.as_ref())
      .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect::<String>())
      .unwrap_or_default()
  }

  /// Why the first candidate stopped (e.g. "SAFETY" when a reply was blocked).
  pub fn finish_reason(&self) -> Option<&str> {
    self.candidates.first().and_then(|c| c.finish_reason.as_deref())
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
  #[serde(default)]
  pub content: Option<Content>,
  #[serde(default)]
  pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
  #[serde(default)]
  pub prompt_token_count: Option<u32>,
  #[serde(default)]
  pub candidates_token_count: Option<u32>,
  #[serde(default)]
  pub total_token_count: Option<u32>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
  error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
  #[serde(default)]
  message: String,
  #[serde(default)]
  details: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
  #[serde(default)]
  reason: Option<String>,
}
