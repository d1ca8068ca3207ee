//! WebSocket upgrade + message loop. Each connection owns one `Connection`
//! (its `ClientSession` plus a completion channel). Messages are answered
//! immediately; backend calls run as spawned tasks and their results come back
//! through the channel, so the socket keeps serving other screens meanwhile.
//! A screen's `pending` flag keeps it to one call in flight.

use std::sync::Arc;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::View;
use crate::error::TutorError;
use crate::gemini::GenerativeBackend;
use crate::logic::*;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::quiz::{QuizAction, QuizPhase};
use crate::session::{ClientSession, ScreenError};
use crate::state::AppState;
use crate::tutor::{ChatReply, SolveReply};

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade<B: GenerativeBackend + 'static>(
  ws: WebSocketUpgrade,
  State(state): State<Arc<AppState<B>>>,
) -> impl IntoResponse {
  info!(target: "physimind_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws<B: GenerativeBackend + 'static>(mut socket: WebSocket, state: Arc<AppState<B>>) {
  info!(target: "physimind_backend", "WebSocket connected");
  let (mut conn, mut completions) = Connection::new(state);

  loop {
    tokio::select! {
      incoming = socket.recv() => {
        let replies = match incoming {
          Some(Ok(Message::Text(txt))) => match serde_json::from_str::<ClientWsMessage>(&txt) {
            Ok(msg) => {
              debug!(target: "physimind_backend", "WS received: {:?}", &msg);
              conn.handle(msg)
            }
            Err(e) => vec![ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) }],
          },
          Some(Ok(Message::Ping(payload))) => {
            let _ = socket.send(Message::Pong(payload)).await;
            continue;
          }
          Some(Ok(Message::Close(_))) | None => break,
          Some(Ok(_)) => continue,
          Some(Err(e)) => {
            debug!(target: "physimind_backend", error = %e, "WebSocket error");
            break;
          }
        };
        if let Err(e) = send_all(&mut socket, &replies).await {
          error!(target: "physimind_backend", error = %e, "WS send error");
          break;
        }
      }

      Some(done) = completions.recv() => {
        let reply = conn.complete(done);
        if let Err(e) = send_all(&mut socket, std::slice::from_ref(&reply)).await {
          error!(target: "physimind_backend", error = %e, "WS send error");
          break;
        }
      }
    }
  }
  info!(target: "physimind_backend", "WebSocket disconnected; session state dropped");
}

async fn send_all(socket: &mut WebSocket, msgs: &[ServerWsMessage]) -> Result<(), axum::Error> {
  for msg in msgs {
    let out = serde_json::to_string(msg).unwrap_or_else(|e| {
      serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
    });
    socket.send(Message::Text(out)).await?;
  }
  Ok(())
}

/// Result of a spawned backend call, applied to the screen that started it.
#[derive(Debug)]
pub(crate) enum Completion {
  Chat(ChatReply),
  Solve(Result<SolveReply, TutorError>),
  Quiz(QuizAction),
}

/// One client's session plus the sender its spawned calls report back on.
pub(crate) struct Connection<B> {
  state: Arc<AppState<B>>,
  session: ClientSession,
  done_tx: mpsc::UnboundedSender<Completion>,
}

impl<B: GenerativeBackend + 'static> Connection<B> {
  pub(crate) fn new(state: Arc<AppState<B>>) -> (Self, mpsc::UnboundedReceiver<Completion>) {
    let (done_tx, done_rx) = mpsc::unbounded_channel();
    (Self { state, session: ClientSession::default(), done_tx }, done_rx)
  }

  /// Answer one client message. Never waits on the backend.
  pub(crate) fn handle(&mut self, msg: ClientWsMessage) -> Vec<ServerWsMessage> {
    let session = &mut self.session;
    match msg {
      ClientWsMessage::Ping => vec![ServerWsMessage::Pong],

      ClientWsMessage::Navigate { view } => {
        session.navigate(view);
        // Follow with the screen's current snapshot so the client can render it.
        let snapshot = match view {
          View::Home => ServerWsMessage::KeyStatus { status: key_status(&self.state) },
          View::Chat => ServerWsMessage::transcript(&session.chat),
          View::Solver => ServerWsMessage::solution(&session.solver),
          View::Quiz => ServerWsMessage::quiz(session.quiz.session()),
        };
        vec![ServerWsMessage::View { view }, snapshot]
      }

      ClientWsMessage::KeyStatus => vec![ServerWsMessage::KeyStatus { status: key_status(&self.state) }],

      ClientWsMessage::SaveKey { api_key } => match save_key(&self.state, &api_key) {
        Ok(status) => vec![ServerWsMessage::KeyStatus { status }],
        Err(SaveKeyError::Blank) => vec![ServerWsMessage::Error { message: "API Key trống.".into() }],
        Err(e) => {
          warn!(target: "physimind_backend", error = %e, "WS save_key failed");
          vec![ServerWsMessage::Error { message: "Không thể lưu API Key.".into() }]
        }
      },

      ClientWsMessage::ChatSend { text } => match session.chat.begin_send(&text) {
        Ok(pending) => {
          self.spawn(|state| async move { Completion::Chat(run_chat(&state, &pending).await) });
          vec![ServerWsMessage::transcript(&self.session.chat)]
        }
        Err(e) => vec![ServerWsMessage::Error { message: e.to_string() }],
      },

      ClientWsMessage::Solve { text, image } => match session.solver.begin(&text, image.as_deref()) {
        Ok(()) => {
          self.spawn(|state| async move { Completion::Solve(run_solve(&state, &text, image.as_deref()).await) });
          vec![ServerWsMessage::solution(&self.session.solver)]
        }
        Err(e) => vec![ServerWsMessage::Error { message: e.to_string() }],
      },

      ClientWsMessage::QuizChooseTopic { topic } => vec![self.quiz_step(QuizAction::ChooseTopic(topic))],

      ClientWsMessage::QuizStart => {
        if !session.quiz.apply(QuizAction::Start) {
          let message = if session.quiz.session().phase() == QuizPhase::Loading {
            ScreenError::Busy.to_string()
          } else {
            "Không thể bắt đầu bài kiểm tra lúc này.".to_string()
          };
          return vec![ServerWsMessage::Error { message }];
        }
        let topic = session.quiz.session().topic();
        self.spawn(move |state| async move { Completion::Quiz(run_quiz_generation(&state, topic).await) });
        vec![ServerWsMessage::quiz(self.session.quiz.session())]
      }

      ClientWsMessage::QuizSelect { index } => vec![self.quiz_step(QuizAction::Select(index))],
      ClientWsMessage::QuizNext => vec![self.quiz_step(QuizAction::Advance)],
      ClientWsMessage::QuizRestart => vec![self.quiz_step(QuizAction::Restart)],
    }
  }

  /// Settle the screen a finished call belongs to and return its new snapshot.
  pub(crate) fn complete(&mut self, done: Completion) -> ServerWsMessage {
    match done {
      Completion::Chat(reply) => {
        self.session.chat.finish_send(&reply);
        info!(target: "chat", turns = self.session.chat.transcript().len(), "WS chat reply appended");
        ServerWsMessage::transcript(&self.session.chat)
      }
      Completion::Solve(outcome) => {
        self.session.solver.finish(&outcome);
        info!(target: "solver", is_error = self.session.solver.is_error(), "WS solution served");
        ServerWsMessage::solution(&self.session.solver)
      }
      Completion::Quiz(action) => {
        self.session.quiz.apply(action);
        info!(target: "quiz", phase = ?self.session.quiz.session().phase(), "WS quiz generation settled");
        ServerWsMessage::quiz(self.session.quiz.session())
      }
    }
  }

  fn spawn<F, Fut>(&self, call: F)
  where
    F: FnOnce(Arc<AppState<B>>) -> Fut,
    Fut: std::future::Future<Output = Completion> + Send + 'static,
  {
    let fut = call(self.state.clone());
    let done_tx = self.done_tx.clone();
    tokio::spawn(async move {
      // The receiver is gone only if the client already disconnected.
      let _ = done_tx.send(fut.await);
    });
  }

  /// Apply a local quiz transition and reply with the (possibly unchanged) snapshot.
  /// Rejected actions are no-ops, not errors.
  fn quiz_step(&mut self, action: QuizAction) -> ServerWsMessage {
    let accepted = self.session.quiz.apply(action);
    let quiz = self.session.quiz.session();
    debug!(target: "quiz", accepted, phase = ?quiz.phase(), index = quiz.current_index(), score = quiz.score(), "WS quiz action");
    ServerWsMessage::quiz(quiz)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Prompts;
  use crate::domain::PhysicsTopic;
  use crate::gemini::BackendError;
  use crate::keystore::{DefaultCredential, KeyStore, MemoryKeyStore};
  use crate::tutor::testing::{quiz_json, ScriptedBackend};
  use crate::tutor::Tutor;

  fn connection(
    replies: Vec<Result<String, BackendError>>,
    key: Option<&str>,
  ) -> (Connection<ScriptedBackend>, mpsc::UnboundedReceiver<Completion>) {
    let store: Arc<dyn KeyStore> = match key {
      Some(k) => Arc::new(MemoryKeyStore::with_key(k)),
      None => Arc::new(MemoryKeyStore::new(DefaultCredential::default())),
    };
    let state = AppState::new(Tutor::new(ScriptedBackend::replying(replies), store, Prompts::default()));
    Connection::new(Arc::new(state))
  }

  fn quiz_phase(msg: &ServerWsMessage) -> QuizPhase {
    match msg {
      ServerWsMessage::Quiz { quiz } => quiz.phase,
      other => panic!("expected quiz snapshot, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn chat_in_flight_does_not_block_other_messages() {
    let (mut conn, mut done) = connection(vec![Ok("Lực là tương tác giữa các vật.".into())], Some("k"));

    let out = conn.handle(ClientWsMessage::ChatSend { text: "Lực là gì?".into() });
    assert!(matches!(&out[..], [ServerWsMessage::ChatTranscript { pending: true, turns }] if turns.len() == 2));

    // The call has not been applied yet: other screens still answer at once.
    let out = conn.handle(ClientWsMessage::Navigate { view: View::Solver });
    assert!(matches!(&out[..], [ServerWsMessage::View { view: View::Solver }, ServerWsMessage::Solution { pending: false, .. }]));
    assert!(matches!(&conn.handle(ClientWsMessage::Ping)[..], [ServerWsMessage::Pong]));

    // Same screen is busy until its call settles.
    let out = conn.handle(ClientWsMessage::ChatSend { text: "Còn khối lượng?".into() });
    assert!(matches!(&out[..], [ServerWsMessage::Error { message }] if *message == ScreenError::Busy.to_string()));

    let reply = conn.complete(done.recv().await.unwrap());
    match reply {
      ServerWsMessage::ChatTranscript { turns, pending } => {
        assert!(!pending);
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[2].text, "Lực là tương tác giữa các vật.");
      }
      other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(&conn.handle(ClientWsMessage::ChatSend { text: "Tiếp".into() })[..], [ServerWsMessage::ChatTranscript { pending: true, .. }]));
  }

  #[tokio::test]
  async fn quiz_start_sends_loading_then_active() {
    let (mut conn, mut done) = connection(vec![Ok(quiz_json(5))], Some("k"));

    conn.handle(ClientWsMessage::QuizChooseTopic { topic: PhysicsTopic::Optics });
    let out = conn.handle(ClientWsMessage::QuizStart);
    assert_eq!(out.len(), 1);
    assert_eq!(quiz_phase(&out[0]), QuizPhase::Loading);

    let out = conn.handle(ClientWsMessage::QuizStart);
    assert!(matches!(&out[..], [ServerWsMessage::Error { message }] if *message == ScreenError::Busy.to_string()));

    let settled = conn.complete(done.recv().await.unwrap());
    match &settled {
      ServerWsMessage::Quiz { quiz } => {
        assert_eq!(quiz.phase, QuizPhase::Active);
        assert_eq!(quiz.total, 5);
        assert_eq!(quiz.current_index, 0);
        assert!(quiz.correct_index.is_none());
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[tokio::test]
  async fn quiz_start_with_malformed_reply_returns_to_setup_with_error() {
    let (mut conn, mut done) = connection(vec![Ok("{not json".into())], Some("k"));

    assert_eq!(quiz_phase(&conn.handle(ClientWsMessage::QuizStart)[0]), QuizPhase::Loading);
    match conn.complete(done.recv().await.unwrap()) {
      ServerWsMessage::Quiz { quiz } => {
        assert_eq!(quiz.phase, QuizPhase::Setup);
        assert_eq!(quiz.last_error.as_deref(), Some(crate::quiz::RETRY_PROMPT));
        assert_eq!(quiz.total, 0);
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[tokio::test]
  async fn rejected_quiz_select_returns_unchanged_snapshot() {
    let (mut conn, _done) = connection(vec![], Some("k"));
    let out = conn.handle(ClientWsMessage::QuizSelect { index: 0 });
    match &out[..] {
      [ServerWsMessage::Quiz { quiz }] => {
        assert_eq!(quiz.phase, QuizPhase::Setup);
        assert_eq!(quiz.selected_option, None);
        assert_eq!(quiz.score, 0);
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[tokio::test]
  async fn solve_without_key_settles_with_key_prompt() {
    let (mut conn, mut done) = connection(vec![], None);
    let out = conn.handle(ClientWsMessage::Solve { text: "Tính gia tốc".into(), image: None });
    assert!(matches!(&out[..], [ServerWsMessage::Solution { pending: true, text: None, .. }]));

    match conn.complete(done.recv().await.unwrap()) {
      ServerWsMessage::Solution { text, is_error, pending } => {
        assert!(is_error && !pending);
        assert_eq!(text.as_deref(), Some(crate::tutor::SOLVE_MISSING_KEY_MESSAGE));
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[tokio::test]
  async fn navigate_home_reports_key_status() {
    let (mut conn, _done) = connection(vec![], None);
    let out = conn.handle(ClientWsMessage::Navigate { view: View::Home });
    assert!(matches!(
      &out[..],
      [ServerWsMessage::View { view: View::Home }, ServerWsMessage::KeyStatus { status }] if !status.has_key
    ));
  }
}
