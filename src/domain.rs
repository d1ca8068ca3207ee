//! Domain models: transcript turns, quiz questions, topics and views.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who spoke a transcript turn. On the wire the assistant is "model",
/// matching the generative backend's role names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
  #[serde(rename = "user")]
  User,
  #[serde(rename = "model", alias = "assistant")]
  Assistant,
}

impl Role {
  pub fn as_backend_role(self) -> &'static str {
    match self {
      Role::User => "user",
      Role::Assistant => "model",
    }
  }
}

/// One message in the chat transcript. Never mutated once appended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
  #[serde(default = "new_turn_id")]
  pub id: String,
  pub role: Role,
  pub text: String,
  #[serde(default)]
  pub is_error: bool,
}

fn new_turn_id() -> String {
  Uuid::new_v4().to_string()
}

impl ConversationTurn {
  pub fn user(text: impl Into<String>) -> Self {
    Self { id: new_turn_id(), role: Role::User, text: text.into(), is_error: false }
  }

  pub fn assistant(text: impl Into<String>) -> Self {
    Self { id: new_turn_id(), role: Role::Assistant, text: text.into(), is_error: false }
  }

  pub fn assistant_error(text: impl Into<String>) -> Self {
    Self { id: new_turn_id(), role: Role::Assistant, text: text.into(), is_error: true }
  }
}

/// Number of options every generated question must carry.
pub const OPTIONS_PER_QUESTION: usize = 4;

/// A generated multiple-choice question. Field names follow the JSON schema
/// sent to the backend (`correctIndex` is zero-based).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
  pub question: String,
  pub options: Vec<String>,
  pub correct_index: usize,
  pub explanation: String,
}

impl QuizQuestion {
  /// Structural check applied to every generated question.
  pub fn validate(&self) -> Result<(), String> {
    if self.question.trim().is_empty() {
      return Err("question text is empty".into());
    }
    if self.options.len() != OPTIONS_PER_QUESTION {
      return Err(format!(
        "expected {} options, got {}",
        OPTIONS_PER_QUESTION,
        self.options.len()
      ));
    }
    if self.correct_index >= self.options.len() {
      return Err(format!(
        "correctIndex {} out of range 0..{}",
        self.correct_index,
        self.options.len()
      ));
    }
    Ok(())
  }

  pub fn is_correct(&self, option: usize) -> bool {
    option == self.correct_index
  }
}

/// The fixed set of quiz topics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhysicsTopic {
  #[default]
  Mechanics,
  Thermodynamics,
  Electromagnetism,
  Optics,
  Quantum,
  Relativity,
}

impl PhysicsTopic {
  pub const ALL: [PhysicsTopic; 6] = [
    PhysicsTopic::Mechanics,
    PhysicsTopic::Thermodynamics,
    PhysicsTopic::Electromagnetism,
    PhysicsTopic::Optics,
    PhysicsTopic::Quantum,
    PhysicsTopic::Relativity,
  ];

  /// Display label; also what the quiz prompt is filled with.
  pub fn label(self) -> &'static str {
    match self {
      PhysicsTopic::Mechanics => "Cơ học",
      PhysicsTopic::Thermodynamics => "Nhiệt học",
      PhysicsTopic::Electromagnetism => "Điện từ học",
      PhysicsTopic::Optics => "Quang học",
      PhysicsTopic::Quantum => "Vật lý lượng tử",
      PhysicsTopic::Relativity => "Thuyết tương đối",
    }
  }
}

/// Top-level screens of the client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
  #[default]
  Home,
  Chat,
  Solver,
  Quiz,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn question(correct_index: usize, options: usize) -> QuizQuestion {
    QuizQuestion {
      question: "Đơn vị của lực là gì?".into(),
      options: (0..options).map(|i| format!("Đáp án {i}")).collect(),
      correct_index,
      explanation: "Newton (N).".into(),
    }
  }

  #[test]
  fn question_deserializes_camel_case_fields() {
    let q: QuizQuestion = serde_json::from_str(
      r#"{"question":"Q","options":["a","b","c","d"],"correctIndex":2,"explanation":"E"}"#,
    )
    .unwrap();
    assert_eq!(q.correct_index, 2);
    assert!(q.validate().is_ok());
  }

  #[test]
  fn question_with_missing_field_fails_to_parse() {
    let res = serde_json::from_str::<QuizQuestion>(r#"{"question":"Q","options":["a"],"explanation":"E"}"#);
    assert!(res.is_err());
  }

  #[test]
  fn negative_correct_index_fails_to_parse() {
    let res = serde_json::from_str::<QuizQuestion>(
      r#"{"question":"Q","options":["a","b","c","d"],"correctIndex":-1,"explanation":"E"}"#,
    );
    assert!(res.is_err());
  }

  #[test]
  fn validate_rejects_out_of_range_index_and_wrong_option_count() {
    assert!(question(4, 4).validate().is_err());
    assert!(question(0, 3).validate().is_err());
    assert!(question(3, 4).validate().is_ok());
  }

  #[test]
  fn role_uses_backend_spelling() {
    assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), r#""model""#);
    let r: Role = serde_json::from_str(r#""assistant""#).unwrap();
    assert_eq!(r, Role::Assistant);
    assert_eq!(Role::User.as_backend_role(), "user");
  }

  #[test]
  fn topics_are_six_with_vietnamese_labels() {
    assert_eq!(PhysicsTopic::ALL.len(), 6);
    assert_eq!(PhysicsTopic::Optics.label(), "Quang học");
    let t: PhysicsTopic = serde_json::from_str(r#""quantum""#).unwrap();
    assert_eq!(t, PhysicsTopic::Quantum);
  }

  #[test]
  fn turn_without_id_gets_one() {
    let t: ConversationTurn = serde_json::from_str(r#"{"role":"user","text":"hi"}"#).unwrap();
    assert!(!t.id.is_empty());
    assert!(!t.is_error);
  }
}
