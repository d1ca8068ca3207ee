//! Application state shared by every connection: the orchestrator (which owns
//! the backend client, the key store and the prompts).
//!
//! Per-client interaction state lives in `session::ClientSession`, owned by
//! each WebSocket task; nothing mutable is shared here except the key slot.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::config::{load_prompts_from_env, Settings};
use crate::gemini::{BackendError, GeminiClient, GenerativeBackend};
use crate::keystore::{DefaultCredential, FileKeyStore, KeyStore};
use crate::tutor::Tutor;

pub struct AppState<B = GeminiClient> {
    pub tutor: Tutor<B>,
}

impl AppState<GeminiClient> {
    /// Build state from settings + env: prompts (TOML or defaults), key file, Gemini client.
    #[instrument(level = "info", skip_all)]
    pub fn from_settings(settings: &Settings) -> Result<Self, BackendError> {
        let prompts = load_prompts_from_env();

        let default_key = DefaultCredential::from_env();
        let store = FileKeyStore::new(&settings.key_file, default_key.clone());
        info!(
            target: "physimind_backend",
            key_file = %store.path().display(),
            has_default_key = default_key.get().is_some(),
            "Key store ready"
        );

        let gemini = GeminiClient::from_settings(settings)?;
        info!(target: "physimind_backend", base_url = %gemini.base_url, model = %gemini.model, "Gemini client ready");

        Ok(Self::new(Tutor::new(gemini, Arc::new(store), prompts)))
    }
}

impl<B: GenerativeBackend> AppState<B> {
    pub fn new(tutor: Tutor<B>) -> Self {
        Self { tutor }
    }

    pub fn key_store(&self) -> &Arc<dyn KeyStore> {
        self.tutor.key_store()
    }
}
