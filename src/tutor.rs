//! The tutoring orchestrator: shapes the three backend calls (chat, solve, quiz)
//! and turns every outcome into a typed result.
//!
//! Classification is uniform: an unresolvable or rejected key is
//! `TutorError::MissingCredential`; everything else from the backend is a
//! backend failure; content that fails validation is a malformed response.
//! Chat and solve resolve these into reply enums the screens render directly.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};

use crate::config::Prompts;
use crate::domain::{ConversationTurn, QuizQuestion};
use crate::error::{Result, TutorError};
use crate::gemini::{Content, GenerateContentRequest, GenerationConfig, GenerativeBackend, Part};
use crate::keystore::KeyStore;
use crate::util::{fill_template, trunc_for_log};

/// Outbound chat context is capped to this many prior turns.
pub const CHAT_HISTORY_LIMIT: usize = 10;
/// Questions per generated quiz.
pub const QUIZ_LENGTH: usize = 5;
/// Uploaded images are always declared as JPEG.
pub const IMAGE_MIME_TYPE: &str = "image/jpeg";

pub const CHAT_EMPTY_FALLBACK: &str = "Xin lỗi, tôi không thể tạo câu trả lời lúc này.";
pub const CHAT_MISSING_KEY_MESSAGE: &str = "⚠️ Bạn chưa nhập API Key. Vui lòng bấm vào biểu tượng Chìa khóa (🔑) ở góc trên bên phải màn hình để nhập mã Key của bạn.";
pub const CHAT_FAILURE_MESSAGE: &str = "Có lỗi xảy ra khi kết nối với AI. Vui lòng kiểm tra kết nối mạng hoặc thử lại sau.";
pub const SOLVE_EMPTY_FALLBACK: &str = "Không thể giải bài tập này.";
pub const SOLVE_MISSING_KEY_MESSAGE: &str = "⚠️ LỖI: Bạn chưa nhập API Key. Vui lòng bấm vào nút Chìa khóa (🔑) ở góc trên bên phải để nhập Key.";
pub const SOLVE_FAILURE_MESSAGE: &str = "Xin lỗi, không thể xử lý bài toán này. Vui lòng thử lại.";

/// Result of a chat call. Never an error: every failure is an expected reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatReply {
  Text(String),
  MissingCredential,
  Failed,
}

impl ChatReply {
  pub fn is_error(&self) -> bool {
    !matches!(self, ChatReply::Text(_))
  }

  /// The text the chat screen shows for this reply.
  pub fn display_text(&self) -> &str {
    match self {
      ChatReply::Text(t) => t,
      ChatReply::MissingCredential => CHAT_MISSING_KEY_MESSAGE,
      ChatReply::Failed => CHAT_FAILURE_MESSAGE,
    }
  }
}

/// Successful (non-thrown) outcomes of a solve call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SolveReply {
  Solution(String),
  MissingCredential,
}

impl SolveReply {
  pub fn display_text(&self) -> &str {
    match self {
      SolveReply::Solution(t) => t,
      SolveReply::MissingCredential => SOLVE_MISSING_KEY_MESSAGE,
    }
  }
}

pub struct Tutor<B> {
  backend: B,
  key_store: Arc<dyn KeyStore>,
  prompts: Prompts,
}

impl<B: GenerativeBackend> Tutor<B> {
  pub fn new(backend: B, key_store: Arc<dyn KeyStore>, prompts: Prompts) -> Self {
    Self { backend, key_store, prompts }
  }

  #[cfg(test)]
  pub fn backend(&self) -> &B {
    &self.backend
  }

  pub fn key_store(&self) -> &Arc<dyn KeyStore> {
    &self.key_store
  }

  fn api_key(&self) -> Result<String> {
    self.key_store.get().ok_or(TutorError::MissingCredential)
  }

  async fn call(&self, request: &GenerateContentRequest) -> Result<String> {
    let key = self.api_key()?;
    Ok(self.backend.generate_content(&key, request).await?)
  }

  /// Build the outbound chat request: the last `CHAT_HISTORY_LIMIT` turns, oldest
  /// first, followed by the new user message.
  pub fn chat_request(&self, history: &[ConversationTurn], message: &str) -> GenerateContentRequest {
    let skip = history.len().saturating_sub(CHAT_HISTORY_LIMIT);
    let mut contents: Vec<Content> = history[skip..]
      .iter()
      .map(|t| Content::new(t.role.as_backend_role(), vec![Part::text(t.text.clone())]))
      .collect();
    contents.push(Content::new("user", vec![Part::text(message)]));

    GenerateContentRequest {
      contents,
      system_instruction: Some(Content::instruction(&self.prompts.chat_system)),
      generation_config: None,
    }
  }

  #[instrument(level = "info", target = "chat", skip(self, history, message), fields(history_len = history.len(), message_len = message.len()))]
  pub async fn chat(&self, history: &[ConversationTurn], message: &str) -> ChatReply {
    let request = self.chat_request(history, message);
    match self.call(&request).await {
      Ok(text) if text.trim().is_empty() => {
        warn!(target: "chat", "Empty reply; using fallback text");
        ChatReply::Text(CHAT_EMPTY_FALLBACK.into())
      }
      Ok(text) => {
        info!(target: "chat", preview = %trunc_for_log(&text, 60), "Chat reply generated");
        ChatReply::Text(text)
      }
      Err(TutorError::MissingCredential) => {
        warn!(target: "chat", "No usable API key");
        ChatReply::MissingCredential
      }
      Err(e) => {
        error!(target: "chat", error = %e, "Chat call failed");
        ChatReply::Failed
      }
    }
  }

  /// Build the solver request. The image part, if any, precedes the text part.
  pub fn solve_request(&self, text: &str, image: Option<&str>) -> Result<GenerateContentRequest> {
    let image = image.map(crate::util::strip_data_url).filter(|d| !d.is_empty());
    if text.trim().is_empty() && image.is_none() {
      return Err(TutorError::EmptyProblem);
    }

    let mut parts = Vec::with_capacity(2);
    if let Some(data) = image {
      let bytes = STANDARD.decode(data).map_err(|e| TutorError::InvalidImage(e.to_string()))?;
      if bytes.is_empty() {
        return Err(TutorError::InvalidImage("decoded image is empty".into()));
      }
      parts.push(Part::inline(IMAGE_MIME_TYPE, STANDARD.encode(&bytes)));
    }
    parts.push(Part::text(fill_template(&self.prompts.solver_user_template, &[("text", text)])));

    Ok(GenerateContentRequest {
      contents: vec![Content::new("user", parts)],
      system_instruction: Some(Content::instruction(&self.prompts.solver_system)),
      generation_config: None,
    })
  }

  #[instrument(level = "info", target = "solver", skip(self, text, image), fields(text_len = text.len(), has_image = image.is_some()))]
  pub async fn solve(&self, text: &str, image: Option<&str>) -> Result<SolveReply> {
    let request = self.solve_request(text, image)?;
    match self.call(&request).await {
      Ok(t) if t.trim().is_empty() => {
        warn!(target: "solver", "Empty solution; using fallback text");
        Ok(SolveReply::Solution(SOLVE_EMPTY_FALLBACK.into()))
      }
      Ok(t) => {
        info!(target: "solver", solution_len = t.len(), "Solution generated");
        Ok(SolveReply::Solution(t))
      }
      Err(TutorError::MissingCredential) => {
        warn!(target: "solver", "No usable API key");
        Ok(SolveReply::MissingCredential)
      }
      Err(e) => {
        error!(target: "solver", error = %e, "Solve call failed");
        Err(e)
      }
    }
  }

  pub fn quiz_request(&self, topic: &str) -> GenerateContentRequest {
    let count = QUIZ_LENGTH.to_string();
    let prompt = fill_template(&self.prompts.quiz_user_template, &[("count", &count), ("topic", topic)]);
    GenerateContentRequest {
      contents: vec![Content::new("user", vec![Part::text(prompt)])],
      system_instruction: None,
      generation_config: Some(GenerationConfig {
        response_mime_type: Some("application/json".into()),
        response_schema: Some(quiz_schema()),
      }),
    }
  }

  #[instrument(level = "info", target = "quiz", skip(self), fields(%topic))]
  pub async fn generate_quiz(&self, topic: &str) -> Result<Vec<QuizQuestion>> {
    let request = self.quiz_request(topic);
    let result = match self.call(&request).await {
      Ok(text) => parse_quiz(&text),
      Err(e) => Err(e),
    };
    match &result {
      Ok(qs) => info!(target: "quiz", questions = qs.len(), "Quiz generated"),
      Err(e) => error!(target: "quiz", kind = ?e.kind(), error = %e, "Quiz generation failed"),
    }
    result
  }
}

/// Response schema for quiz generation: an array of fully-required question objects.
pub fn quiz_schema() -> Value {
  json!({
    "type": "ARRAY",
    "items": {
      "type": "OBJECT",
      "properties": {
        "question": { "type": "STRING" },
        "options": { "type": "ARRAY", "items": { "type": "STRING" } },
        "correctIndex": { "type": "INTEGER", "description": "Zero-based index of the correct option (0-3)" },
        "explanation": { "type": "STRING", "description": "Short explanation of why the answer is correct" }
      },
      "required": ["question", "options", "correctIndex", "explanation"]
    }
  })
}

/// Parse and validate a quiz body. All-or-nothing: any defect rejects the quiz.
pub fn parse_quiz(text: &str) -> Result<Vec<QuizQuestion>> {
  let text = text.trim();
  if text.is_empty() {
    return Err(TutorError::malformed("empty response"));
  }
  let questions: Vec<QuizQuestion> =
    serde_json::from_str(text).map_err(|e| TutorError::malformed(format!("JSON parse error: {e}")))?;
  if questions.len() != QUIZ_LENGTH {
    return Err(TutorError::malformed(format!(
      "expected {} questions, got {}",
      QUIZ_LENGTH,
      questions.len()
    )));
  }
  for (i, q) in questions.iter().enumerate() {
    q.validate().map_err(|e| TutorError::malformed(format!("question {}: {}", i + 1, e)))?;
  }
  Ok(questions)
}
