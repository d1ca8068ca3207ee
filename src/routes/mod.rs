//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::{path::Path, sync::Arc};

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::gemini::GenerativeBackend;
use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws` (stateful client session)
/// - REST-ish API under `/api/v1/...` (stateless)
/// - Static client from `static_dir` with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router<B: GenerativeBackend + 'static>(state: Arc<AppState<B>>, static_dir: &Path) -> Router {
    let static_service = ServeDir::new(static_dir)
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new(static_dir.join("index.html")));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade::<B>))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/topics", get(http::http_topics))
        .route("/api/v1/key", get(http::http_get_key::<B>).post(http::http_post_key::<B>))
        .route("/api/v1/chat", post(http::http_post_chat::<B>))
        .route("/api/v1/solve", post(http::http_post_solve::<B>))
        .route("/api/v1/quiz", post(http::http_post_quiz::<B>))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
    };
    use serde_json::Value;
    use tower::util::ServiceExt;

    use super::*;
    use crate::config::Prompts;
    use crate::gemini::BackendError;
    use crate::keystore::{DefaultCredential, KeyStore, MemoryKeyStore};
    use crate::tutor::testing::{quiz_json, ScriptedBackend};
    use crate::tutor::Tutor;

    fn router_with(replies: Vec<Result<String, BackendError>>, key: Option<&str>) -> Router {
        let store: Arc<dyn KeyStore> = match key {
            Some(k) => Arc::new(MemoryKeyStore::with_key(k)),
            None => Arc::new(MemoryKeyStore::new(DefaultCredential::default())),
        };
        let state = AppState::new(Tutor::new(ScriptedBackend::replying(replies), store, Prompts::default()));
        build_router(Arc::new(state), Path::new("./static"))
    }

    async fn call(router: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let response = router.oneshot(req.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn health_and_topics() {
        let (status, body) = call(router_with(vec![], None), Method::GET, "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);

        let (_, body) = call(router_with(vec![], None), Method::GET, "/api/v1/topics", None).await;
        let topics = body.as_array().unwrap();
        assert_eq!(topics.len(), 6);
        assert_eq!(topics[0]["id"], "mechanics");
        assert_eq!(topics[0]["label"], "Cơ học");
    }

    #[tokio::test]
    async fn key_roundtrip_never_echoes_secret() {
        let router = router_with(vec![], None);
        let (_, body) = call(router.clone(), Method::GET, "/api/v1/key", None).await;
        assert_eq!(body["hasKey"], false);

        let (status, _) = call(router.clone(), Method::POST, "/api/v1/key", Some(serde_json::json!({"apiKey": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) =
            call(router.clone(), Method::POST, "/api/v1/key", Some(serde_json::json!({"apiKey": " AIzaSySecretValue42 "}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hasKey"], true);
        assert!(!body.to_string().contains("SecretValue"));
    }

    #[tokio::test]
    async fn chat_without_key_reports_missing_key() {
        let (status, body) = call(
            router_with(vec![], None),
            Method::POST,
            "/api/v1/chat",
            Some(serde_json::json!({"history": [{"role": "model", "text": "Chào bạn!"}], "message": "F=ma là gì?"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["missingKey"], true);
        assert_eq!(body["isError"], true);
    }

    #[tokio::test]
    async fn solve_returns_solution_text() {
        let (_, body) = call(
            router_with(vec![Ok("Tóm tắt... Đáp án: 20 N".into())], Some("k")),
            Method::POST,
            "/api/v1/solve",
            Some(serde_json::json!({"text": "Tính lực"})),
        )
        .await;
        assert_eq!(body["text"], "Tóm tắt... Đáp án: 20 N");
        assert_eq!(body["isError"], false);
    }

    #[tokio::test]
    async fn quiz_success_and_classified_failures() {
        let (status, body) = call(
            router_with(vec![Ok(quiz_json(5))], Some("k")),
            Method::POST,
            "/api/v1/quiz",
            Some(serde_json::json!({"topic": "optics"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["questions"].as_array().unwrap().len(), 5);
        assert!(body["questions"][0]["correctIndex"].is_u64());

        let (status, body) =
            call(router_with(vec![], None), Method::POST, "/api/v1/quiz", Some(serde_json::json!({"topic": "optics"}))).await;
        assert_eq!(status, StatusCode::FAILED_DEPENDENCY);
        assert_eq!(body["kind"], "missing_credential");

        let (status, body) = call(
            router_with(vec![Ok("[]".into())], Some("k")),
            Method::POST,
            "/api/v1/quiz",
            Some(serde_json::json!({"topic": "optics"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["kind"], "malformed_response");
    }
}
