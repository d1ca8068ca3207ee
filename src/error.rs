//! Error types for tutoring operations.
//!
//! Every failure a screen can see is one of three kinds (`ErrorKind`); the
//! variants below carry the detail that only goes to the logs.

use serde::Serialize;

use crate::gemini::BackendError;
use crate::keystore::KeyStoreError;

pub type Result<T> = std::result::Result<T, TutorError>;

#[derive(Debug, thiserror::Error)]
pub enum TutorError {
  /// No key resolvable, or the backend rejected the one we sent.
  #[error("missing or invalid API key")]
  MissingCredential,

  #[error("backend failure: {0}")]
  Backend(BackendError),

  /// Content came back but failed validation (empty, bad JSON, bad schema).
  #[error("malformed response: {0}")]
  MalformedResponse(String),

  #[error("invalid image payload: {0}")]
  InvalidImage(String),

  #[error("nothing to solve: both text and image are empty")]
  EmptyProblem,

  #[error("credential storage error: {0}")]
  KeyStore(#[from] KeyStoreError),
}

impl From<BackendError> for TutorError {
  fn from(e: BackendError) -> Self {
    match e {
      BackendError::InvalidCredential { .. } => TutorError::MissingCredential,
      other => TutorError::Backend(other),
    }
  }
}

/// The classification screens act on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  MissingCredential,
  BackendFailure,
  MalformedResponse,
}

impl TutorError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      TutorError::MissingCredential => ErrorKind::MissingCredential,
      TutorError::MalformedResponse(_) => ErrorKind::MalformedResponse,
      TutorError::Backend(_)
      | TutorError::InvalidImage(_)
      | TutorError::EmptyProblem
      | TutorError::KeyStore(_) => ErrorKind::BackendFailure,
    }
  }

  pub fn malformed(msg: impl Into<String>) -> Self {
    TutorError::MalformedResponse(msg.into())
  }
}
