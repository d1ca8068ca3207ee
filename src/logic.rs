//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Key status / save (masked, never echoing the key)
//!   - Stateless chat, solve and quiz calls for the HTTP API
//!   - The backend half of a WebSocket screen's pending call

use tracing::{info, instrument, warn};

use crate::domain::PhysicsTopic;
use crate::error::TutorError;
use crate::gemini::GenerativeBackend;
use crate::keystore::KeyStoreError;
use crate::protocol::{ChatOut, KeyStatusOut, QuizOut, SolveOut};
use crate::quiz::QuizAction;
use crate::session::PendingChat;
use crate::state::AppState;
use crate::tutor::{ChatReply, SolveReply, SOLVE_FAILURE_MESSAGE};
use crate::util::mask_secret;

#[derive(Debug, thiserror::Error)]
pub enum SaveKeyError {
  #[error("API key is empty")]
  Blank,
  #[error(transparent)]
  Store(#[from] KeyStoreError),
}

pub fn key_status<B: GenerativeBackend>(state: &AppState<B>) -> KeyStatusOut {
  let key = state.key_store().get();
  KeyStatusOut { has_key: key.is_some(), hint: key.as_deref().map(mask_secret) }
}

#[instrument(level = "info", skip(state, raw), fields(raw_len = raw.len()))]
pub fn save_key<B: GenerativeBackend>(state: &AppState<B>, raw: &str) -> Result<KeyStatusOut, SaveKeyError> {
  if raw.trim().is_empty() {
    return Err(SaveKeyError::Blank);
  }
  state.key_store().set(raw)?;
  Ok(key_status(state))
}

#[instrument(level = "info", skip(state, pending), fields(history_len = pending.history.len()))]
pub async fn do_chat<B: GenerativeBackend>(state: &AppState<B>, pending: &PendingChat) -> ChatOut {
  let reply = run_chat(state, pending).await;
  ChatOut {
    text: reply.display_text().to_string(),
    is_error: reply.is_error(),
    missing_key: matches!(reply, ChatReply::MissingCredential),
  }
}

#[instrument(level = "info", skip(state, text, image), fields(text_len = text.len(), has_image = image.is_some()))]
pub async fn do_solve<B: GenerativeBackend>(state: &AppState<B>, text: &str, image: Option<&str>) -> SolveOut {
  match run_solve(state, text, image).await {
    Ok(reply) => SolveOut {
      is_error: !matches!(reply, SolveReply::Solution(_)),
      text: reply.display_text().to_string(),
    },
    Err(_) => SolveOut { text: SOLVE_FAILURE_MESSAGE.into(), is_error: true },
  }
}

#[instrument(level = "info", skip(state))]
pub async fn do_quiz<B: GenerativeBackend>(state: &AppState<B>, topic: PhysicsTopic) -> Result<QuizOut, TutorError> {
  let questions = state.tutor.generate_quiz(topic.label()).await?;
  Ok(QuizOut { questions })
}

/// Backend half of a chat send started with `ChatScreen::begin_send`.
pub async fn run_chat<B: GenerativeBackend>(state: &AppState<B>, pending: &PendingChat) -> ChatReply {
  state.tutor.chat(&pending.history, &pending.message).await
}

/// Backend half of a solve started with `SolverScreen::begin`.
pub async fn run_solve<B: GenerativeBackend>(
  state: &AppState<B>,
  text: &str,
  image: Option<&str>,
) -> Result<SolveReply, TutorError> {
  let outcome = state.tutor.solve(text, image).await;
  if let Err(e) = &outcome {
    warn!(target: "solver", kind = ?e.kind(), error = %e, "Solve failed");
  }
  outcome
}

/// Generate questions for a quiz in `Loading`, as the action that settles it.
#[instrument(level = "info", skip(state))]
pub async fn run_quiz_generation<B: GenerativeBackend>(state: &AppState<B>, topic: PhysicsTopic) -> QuizAction {
  let action = match state.tutor.generate_quiz(topic.label()).await {
    Ok(questions) => QuizAction::Generated(questions),
    Err(e) => QuizAction::GenerationFailed(e.kind()),
  };
  info!(target: "quiz", generated = matches!(action, QuizAction::Generated(_)), "Quiz generation settled");
  action
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::config::Prompts;
  use crate::gemini::BackendError;
  use crate::keystore::{DefaultCredential, KeyStore, MemoryKeyStore};
  use crate::tutor::testing::{quiz_json, ScriptedBackend};
  use crate::error::ErrorKind;
  use crate::quiz::QuizPhase;
  use crate::session::{ChatScreen, QuizScreen, SolverScreen};
  use crate::tutor::{Tutor, CHAT_MISSING_KEY_MESSAGE, SOLVE_MISSING_KEY_MESSAGE};

  fn state(replies: Vec<Result<String, BackendError>>, key: Option<&str>) -> AppState<ScriptedBackend> {
    let store: Arc<dyn KeyStore> = match key {
      Some(k) => Arc::new(MemoryKeyStore::with_key(k)),
      None => Arc::new(MemoryKeyStore::new(DefaultCredential::new(Some("Thay_Doan_Nay".into())))),
    };
    AppState::new(Tutor::new(ScriptedBackend::replying(replies), store, Prompts::default()))
  }

  #[test]
  fn key_status_masks_and_save_trims() {
    let st = state(vec![], None);
    assert!(!key_status(&st).has_key);
    assert!(matches!(save_key(&st, "   "), Err(SaveKeyError::Blank)));

    let out = save_key(&st, "  AIzaSyMyOwnKey987 ").unwrap();
    assert!(out.has_key);
    assert_eq!(out.hint.as_deref(), Some("AIza…987"));
    assert_eq!(st.key_store().get().as_deref(), Some("AIzaSyMyOwnKey987"));
  }

  #[tokio::test]
  async fn missing_key_scenario_across_all_three_screens() {
    let st = state(vec![], None);

    let mut chat = ChatScreen::default();
    let pending = chat.begin_send("Xin chào").unwrap();
    let reply = run_chat(&st, &pending).await;
    chat.finish_send(&reply);
    assert_eq!(chat.transcript().last().unwrap().text, CHAT_MISSING_KEY_MESSAGE);

    let mut solver = SolverScreen::default();
    solver.begin("Bài tập", None).unwrap();
    let outcome = run_solve(&st, "Bài tập", None).await;
    solver.finish(&outcome);
    assert!(solver.solution().unwrap().starts_with("⚠️ LỖI"));
    assert_eq!(solver.solution(), Some(SOLVE_MISSING_KEY_MESSAGE));

    let mut quiz = QuizScreen::default();
    quiz.apply(QuizAction::Start);
    let action = run_quiz_generation(&st, quiz.session().topic()).await;
    assert!(matches!(action, QuizAction::GenerationFailed(ErrorKind::MissingCredential)));
    quiz.apply(action);
    assert_eq!(quiz.session().phase(), QuizPhase::Setup);
    assert_eq!(st.tutor.backend().calls(), 0);
  }

  #[tokio::test]
  async fn quiz_generation_success_and_malformed() {
    let st = state(vec![Ok(quiz_json(5)), Ok("{not json".into())], Some("k"));

    let mut quiz = QuizScreen::default();
    quiz.apply(QuizAction::ChooseTopic(PhysicsTopic::Thermodynamics));
    quiz.apply(QuizAction::Start);
    let action = run_quiz_generation(&st, PhysicsTopic::Thermodynamics).await;
    quiz.apply(action);
    assert_eq!(quiz.session().phase(), QuizPhase::Active);
    assert_eq!(quiz.session().current_index(), 0);
    assert_eq!(quiz.session().total(), 5);
    let prompt = st.tutor.backend().last_request().contents[0].parts[0].text.clone().unwrap();
    assert!(prompt.contains("Nhiệt học"));

    let mut broken = QuizScreen::default();
    broken.apply(QuizAction::Start);
    let action = run_quiz_generation(&st, broken.session().topic()).await;
    assert!(matches!(action, QuizAction::GenerationFailed(ErrorKind::MalformedResponse)));
    broken.apply(action);
    assert_eq!(broken.session().phase(), QuizPhase::Setup);
    assert!(broken.session().last_error().is_some());
    assert!(broken.session().questions().is_empty());
  }

  #[tokio::test]
  async fn stateless_chat_flags_missing_key() {
    let st = state(vec![], None);
    let out = do_chat(&st, &PendingChat { history: vec![], message: "hi".into() }).await;
    assert!(out.missing_key && out.is_error);
  }

  #[tokio::test]
  async fn stateless_solve_maps_failure_to_generic_message() {
    let st = state(vec![Err(BackendError::Http { status: 500, message: "x".into() })], Some("k"));
    let out = do_solve(&st, "bài", None).await;
    assert!(out.is_error);
    assert_eq!(out.text, SOLVE_FAILURE_MESSAGE);
  }
}
