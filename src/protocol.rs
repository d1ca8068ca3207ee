//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{ConversationTurn, PhysicsTopic, QuizQuestion, View};
use crate::error::ErrorKind;
use crate::quiz::{QuizPhase, QuizSession};
use crate::session::{ChatScreen, SolverScreen};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Navigate {
        view: View,
    },
    KeyStatus,
    SaveKey {
        #[serde(rename = "apiKey")]
        api_key: String,
    },
    ChatSend {
        text: String,
    },
    Solve {
        #[serde(default)]
        text: String,
        #[serde(default)]
        image: Option<String>,
    },
    QuizChooseTopic {
        topic: PhysicsTopic,
    },
    QuizStart,
    QuizSelect {
        index: usize,
    },
    QuizNext,
    QuizRestart,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    View {
        view: View,
    },
    KeyStatus {
        #[serde(flatten)]
        status: KeyStatusOut,
    },
    ChatTranscript {
        turns: Vec<ConversationTurn>,
        pending: bool,
    },
    Solution {
        text: Option<String>,
        #[serde(rename = "isError")]
        is_error: bool,
        pending: bool,
    },
    Quiz {
        quiz: QuizView,
    },
    Error {
        message: String,
    },
}

impl ServerWsMessage {
    pub fn transcript(chat: &ChatScreen) -> Self {
        ServerWsMessage::ChatTranscript { turns: chat.transcript().to_vec(), pending: chat.is_pending() }
    }

    pub fn solution(solver: &SolverScreen) -> Self {
        ServerWsMessage::Solution {
            text: solver.solution().map(str::to_string),
            is_error: solver.is_error(),
            pending: solver.is_pending(),
        }
    }

    pub fn quiz(session: &QuizSession) -> Self {
        ServerWsMessage::Quiz { quiz: QuizView::from(session) }
    }
}

/// Question as shown before it is answered (no answer key).
#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub question: String,
    pub options: Vec<String>,
}

/// Render-ready snapshot of a quiz session. The correct index and explanation
/// are only revealed once the current question has been answered.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizView {
    pub phase: QuizPhase,
    pub topic: PhysicsTopic,
    pub topic_label: &'static str,
    pub current_index: usize,
    pub total: usize,
    pub score: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionView>,
    pub selected_option: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub is_last_question: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl From<&QuizSession> for QuizView {
    fn from(s: &QuizSession) -> Self {
        let current = s.current_question();
        let revealed = current.filter(|_| s.is_answered());
        let finished = s.phase() == QuizPhase::Result;
        QuizView {
            phase: s.phase(),
            topic: s.topic(),
            topic_label: s.topic().label(),
            current_index: s.current_index(),
            total: s.total(),
            score: s.score(),
            question: current.map(|q| QuestionView { question: q.question.clone(), options: q.options.clone() }),
            selected_option: s.selected_option(),
            correct_index: revealed.map(|q| q.correct_index),
            explanation: revealed.map(|q| q.explanation.clone()),
            is_last_question: s.phase() == QuizPhase::Active && s.is_last_question(),
            percentage: finished.then(|| s.percentage()),
            verdict: s.verdict(),
            last_error: s.last_error().map(str::to_string),
        }
    }
}

//
// HTTP request/response DTOs
//

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TopicOut {
    pub id: PhysicsTopic,
    pub label: String,
}

#[derive(Deserialize)]
pub struct KeyIn {
    #[serde(rename = "apiKey")]
    pub api_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeyStatusOut {
    #[serde(rename = "hasKey")]
    pub has_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Deserialize)]
pub struct ChatIn {
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatOut {
    pub text: String,
    #[serde(rename = "isError")]
    pub is_error: bool,
    #[serde(rename = "missingKey")]
    pub missing_key: bool,
}

#[derive(Deserialize)]
pub struct SolveIn {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SolveOut {
    pub text: String,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

#[derive(Deserialize)]
pub struct QuizIn {
    pub topic: PhysicsTopic,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuizOut {
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub error: String,
    pub kind: ErrorKind,
}
