//! Quiz lifecycle as a pure value: Setup → Loading → Active → Result.
//!
//! `QuizSession::apply` is the only way to move between states. It returns the
//! next session, or `None` when the action is not accepted in the current state
//! (double answer, advancing before answering, restart during loading, ...).

use serde::Serialize;

use crate::domain::{PhysicsTopic, QuizQuestion};
use crate::error::ErrorKind;

pub const RETRY_PROMPT: &str = "Không thể tạo câu hỏi. Vui lòng thử lại sau.";
pub const RETRY_KEY_PROMPT: &str = "⚠️ Bạn chưa nhập API Key. Vui lòng bấm vào nút Chìa khóa (🔑) ở góc trên để cài đặt.";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizPhase {
  #[default]
  Setup,
  Loading,
  Active,
  Result,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QuizAction {
  ChooseTopic(PhysicsTopic),
  Start,
  Generated(Vec<QuizQuestion>),
  GenerationFailed(ErrorKind),
  Select(usize),
  Advance,
  Restart,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuizSession {
  topic: PhysicsTopic,
  questions: Vec<QuizQuestion>,
  current_index: usize,
  score: usize,
  selected_option: Option<usize>,
  phase: QuizPhase,
  last_error: Option<String>,
}

impl QuizSession {
  pub fn new(topic: PhysicsTopic) -> Self {
    Self { topic, ..Self::default() }
  }

  pub fn apply(&self, action: QuizAction) -> Option<QuizSession> {
    use QuizAction::*;
    use QuizPhase::*;

    match (self.phase, action) {
      (Setup, ChooseTopic(topic)) => Some(Self { topic, ..self.clone() }),
      (Setup, Start) => Some(Self { phase: Loading, ..Self::new(self.topic) }),

      (Loading, Generated(questions)) if !questions.is_empty() => Some(Self {
        topic: self.topic,
        questions,
        current_index: 0,
        score: 0,
        selected_option: None,
        phase: Active,
        last_error: None,
      }),
      (Loading, Generated(_)) => Some(self.back_to_setup(ErrorKind::MalformedResponse)),
      (Loading, GenerationFailed(kind)) => Some(self.back_to_setup(kind)),

      (Active, Select(option)) => {
        if self.selected_option.is_some() {
          return None;
        }
        let question = self.current_question()?;
        if option >= question.options.len() {
          return None;
        }
        let gained = usize::from(question.is_correct(option));
        Some(Self { selected_option: Some(option), score: self.score + gained, ..self.clone() })
      }
      (Active, Advance) => {
        self.selected_option?;
        if self.current_index + 1 < self.questions.len() {
          Some(Self { current_index: self.current_index + 1, selected_option: None, ..self.clone() })
        } else {
          Some(Self { phase: Result, ..self.clone() })
        }
      }

      (Active | Result, Restart) => Some(Self::new(self.topic)),

      _ => None,
    }
  }

  fn back_to_setup(&self, kind: ErrorKind) -> Self {
    let prompt = match kind {
      ErrorKind::MissingCredential => RETRY_KEY_PROMPT,
      ErrorKind::BackendFailure | ErrorKind::MalformedResponse => RETRY_PROMPT,
    };
    Self { last_error: Some(prompt.into()), ..Self::new(self.topic) }
  }

  pub fn topic(&self) -> PhysicsTopic {
    self.topic
  }

  pub fn phase(&self) -> QuizPhase {
    self.phase
  }

  #[cfg(test)]
  pub fn questions(&self) -> &[QuizQuestion] {
    &self.questions
  }

  pub fn total(&self) -> usize {
    self.questions.len()
  }

  pub fn current_index(&self) -> usize {
    self.current_index
  }

  pub fn score(&self) -> usize {
    self.score
  }

  pub fn selected_option(&self) -> Option<usize> {
    self.selected_option
  }

  pub fn last_error(&self) -> Option<&str> {
    self.last_error.as_deref()
  }

  pub fn is_answered(&self) -> bool {
    self.selected_option.is_some()
  }

  pub fn is_last_question(&self) -> bool {
    self.current_index + 1 == self.questions.len()
  }

  pub fn current_question(&self) -> Option<&QuizQuestion> {
    match self.phase {
      QuizPhase::Active => self.questions.get(self.current_index),
      _ => None,
    }
  }

  pub fn percentage(&self) -> f32 {
    if self.questions.is_empty() {
      0.0
    } else {
      self.score as f32 * 100.0 / self.questions.len() as f32
    }
  }

  /// Grade message shown on the result screen.
  pub fn verdict(&self) -> Option<&'static str> {
    if self.phase != QuizPhase::Result {
      return None;
    }
    let pct = self.percentage();
    Some(if self.score == self.questions.len() {
      "Xuất sắc! Bạn là thiên tài vật lý!"
    } else if pct >= 80.0 {
      "Rất tốt! Kiến thức vững vàng."
    } else if pct >= 50.0 {
      "Khá tốt, hãy cố gắng thêm nhé."
    } else {
      "Cần ôn tập lại kiến thức cơ bản."
    })
  }
}
