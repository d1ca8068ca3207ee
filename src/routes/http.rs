//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs basic result info (never the key).

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::{info, instrument, warn};

use crate::domain::PhysicsTopic;
use crate::error::ErrorKind;
use crate::gemini::GenerativeBackend;
use crate::logic::*;
use crate::protocol::*;
use crate::session::PendingChat;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true })
}

#[instrument(level = "info")]
pub async fn http_topics() -> impl IntoResponse {
  let topics: Vec<TopicOut> = PhysicsTopic::ALL
    .iter()
    .map(|t| TopicOut { id: *t, label: t.label().to_string() })
    .collect();
  Json(topics)
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_key<B: GenerativeBackend>(State(state): State<Arc<AppState<B>>>) -> impl IntoResponse {
  Json(key_status(&state))
}

#[instrument(level = "info", skip(state, body), fields(key_len = body.api_key.trim().len()))]
pub async fn http_post_key<B: GenerativeBackend>(
  State(state): State<Arc<AppState<B>>>,
  Json(body): Json<KeyIn>,
) -> axum::response::Response {
  match save_key(&state, &body.api_key) {
    Ok(status) => {
      info!(target: "physimind_backend", "HTTP api key saved");
      Json(status).into_response()
    }
    Err(SaveKeyError::Blank) => (
      StatusCode::BAD_REQUEST,
      Json(ErrorOut { error: "API Key trống.".into(), kind: ErrorKind::MissingCredential }),
    )
      .into_response(),
    Err(e) => {
      warn!(target: "physimind_backend", error = %e, "HTTP api key save failed");
      (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorOut { error: "Không thể lưu API Key.".into(), kind: ErrorKind::BackendFailure }),
      )
        .into_response()
    }
  }
}

#[instrument(level = "info", skip(state, body), fields(history_len = body.history.len(), message_len = body.message.len()))]
pub async fn http_post_chat<B: GenerativeBackend>(
  State(state): State<Arc<AppState<B>>>,
  Json(body): Json<ChatIn>,
) -> impl IntoResponse {
  let pending = PendingChat { history: body.history, message: body.message };
  let out = do_chat(&state, &pending).await;
  info!(target: "chat", is_error = out.is_error, missing_key = out.missing_key, "HTTP chat served");
  Json(out)
}

#[instrument(level = "info", skip(state, body), fields(text_len = body.text.len(), has_image = body.image.is_some()))]
pub async fn http_post_solve<B: GenerativeBackend>(
  State(state): State<Arc<AppState<B>>>,
  Json(body): Json<SolveIn>,
) -> impl IntoResponse {
  let out = do_solve(&state, &body.text, body.image.as_deref()).await;
  info!(target: "solver", is_error = out.is_error, "HTTP solve served");
  Json(out)
}

#[instrument(level = "info", skip(state, body), fields(topic = ?body.topic))]
pub async fn http_post_quiz<B: GenerativeBackend>(
  State(state): State<Arc<AppState<B>>>,
  Json(body): Json<QuizIn>,
) -> axum::response::Response {
  match do_quiz(&state, body.topic).await {
    Ok(out) => {
      info!(target: "quiz", questions = out.questions.len(), "HTTP quiz served");
      Json(out).into_response()
    }
    Err(e) => {
      let kind = e.kind();
      let (status, message) = match kind {
        ErrorKind::MissingCredential => (StatusCode::FAILED_DEPENDENCY, crate::quiz::RETRY_KEY_PROMPT),
        ErrorKind::BackendFailure | ErrorKind::MalformedResponse => (StatusCode::BAD_GATEWAY, crate::quiz::RETRY_PROMPT),
      };
      (status, Json(ErrorOut { error: message.into(), kind })).into_response()
    }
  }
}
