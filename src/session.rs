//! Per-connection client state: the current view and each screen's private
//! interaction state. Nothing here is shared between connections.

use crate::domain::{ConversationTurn, View};
use crate::error::TutorError;
use crate::quiz::{QuizAction, QuizSession};
use crate::tutor::{ChatReply, SolveReply, SOLVE_FAILURE_MESSAGE};

pub const GREETING: &str = "Chào bạn! Mình là trợ lý Vật lý ảo (PhysiMind). Bạn đang thắc mắc về định luật Newton, thuyết tương đối hay bài tập nào đó? Hãy hỏi mình nhé!";

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ScreenError {
  #[error("Đang xử lý yêu cầu trước, vui lòng đợi.")]
  Busy,
  #[error("Nội dung trống.")]
  Empty,
}

/// What a chat send needs once the user turn has been recorded.
#[derive(Debug)]
pub struct PendingChat {
  /// Transcript as it was before this message.
  pub history: Vec<ConversationTurn>,
  pub message: String,
}

#[derive(Debug)]
pub struct ChatScreen {
  transcript: Vec<ConversationTurn>,
  pending: bool,
}

impl Default for ChatScreen {
  fn default() -> Self {
    Self { transcript: vec![ConversationTurn::assistant(GREETING)], pending: false }
  }
}

impl ChatScreen {
  pub fn transcript(&self) -> &[ConversationTurn] {
    &self.transcript
  }

  pub fn is_pending(&self) -> bool {
    self.pending
  }

  /// Append the user turn and mark the screen busy until `finish_send`.
  pub fn begin_send(&mut self, text: &str) -> Result<PendingChat, ScreenError> {
    if self.pending {
      return Err(ScreenError::Busy);
    }
    if text.trim().is_empty() {
      return Err(ScreenError::Empty);
    }
    let history = self.transcript.clone();
    self.transcript.push(ConversationTurn::user(text));
    self.pending = true;
    Ok(PendingChat { history, message: text.to_string() })
  }

  pub fn finish_send(&mut self, reply: &ChatReply) {
    let turn = match reply {
      ChatReply::Text(t) => ConversationTurn::assistant(t.clone()),
      other => ConversationTurn::assistant_error(other.display_text()),
    };
    self.transcript.push(turn);
    self.pending = false;
  }
}

#[derive(Debug, Default)]
pub struct SolverScreen {
  solution: Option<String>,
  is_error: bool,
  pending: bool,
}

impl SolverScreen {
  pub fn solution(&self) -> Option<&str> {
    self.solution.as_deref()
  }

  pub fn is_error(&self) -> bool {
    self.is_error
  }

  pub fn is_pending(&self) -> bool {
    self.pending
  }

  /// Clear the previous solution and mark the screen busy.
  pub fn begin(&mut self, text: &str, image: Option<&str>) -> Result<(), ScreenError> {
    if self.pending {
      return Err(ScreenError::Busy);
    }
    let has_image = image.map(|i| !i.trim().is_empty()).unwrap_or(false);
    if text.trim().is_empty() && !has_image {
      return Err(ScreenError::Empty);
    }
    self.solution = None;
    self.is_error = false;
    self.pending = true;
    Ok(())
  }

  pub fn finish(&mut self, outcome: &Result<SolveReply, TutorError>) {
    let (text, is_error) = match outcome {
      Ok(SolveReply::Solution(t)) => (t.as_str(), false),
      Ok(reply @ SolveReply::MissingCredential) => (reply.display_text(), true),
      Err(_) => (SOLVE_FAILURE_MESSAGE, true),
    };
    self.solution = Some(text.to_string());
    self.is_error = is_error;
    self.pending = false;
  }
}

#[derive(Debug, Default)]
pub struct QuizScreen {
  session: QuizSession,
}

impl QuizScreen {
  pub fn session(&self) -> &QuizSession {
    &self.session
  }

  /// Apply a transition; returns whether it was accepted.
  pub fn apply(&mut self, action: QuizAction) -> bool {
    match self.session.apply(action) {
      Some(next) => {
        self.session = next;
        true
      }
      None => false,
    }
  }
}

/// Everything one connected client sees.
#[derive(Debug, Default)]
pub struct ClientSession {
  pub view: View,
  pub chat: ChatScreen,
  pub solver: SolverScreen,
  pub quiz: QuizScreen,
}

impl ClientSession {
  pub fn navigate(&mut self, view: View) {
    self.view = view;
  }
}
