//! PhysiMind · Physics Tutor Backend
//!
//! - Axum HTTP + WebSocket API
//! - Gemini `generateContent` integration (key supplied by the user or API_KEY)
//! - Static SPA fallback (STATIC_DIR/index.html)
//!
//! Important env variables:
//!   PORT                   : u16 (default 3000)
//!   API_KEY                : default credential used when no key was saved
//!   GEMINI_BASE_URL        : default "https://generativelanguage.googleapis.com/v1beta"
//!   GEMINI_MODEL           : default "gemini-2.5-flash"
//!   GEMINI_TIMEOUT_SECS    : request timeout (default 60)
//!   PHYSIMIND_KEY_FILE     : where a saved key is persisted (default "./data/credentials.json")
//!   PHYSIMIND_CONFIG_PATH  : path to TOML prompt overrides
//!   STATIC_DIR             : client assets (default "./static")
//!   LOG_LEVEL              : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT             : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod error;
mod keystore;
mod gemini;
mod tutor;
mod quiz;
mod session;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::config::Settings;
use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let settings = Settings::from_env();

  // Shared state: Gemini client, key store, prompts.
  let state = Arc::new(AppState::from_settings(&settings)?);

  let app = build_router(state, &settings.static_dir);

  let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
  let listener = TcpListener::bind(addr).await?;
  info!(target: "physimind_backend", %addr, static_dir = %settings.static_dir.display(), "HTTP server listening");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
  info!(target: "physimind_backend", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "physimind_backend", error = %e, "Failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  info!(target: "physimind_backend", "Shutdown signal received");
}
