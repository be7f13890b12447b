//! JSON-over-HTTP surface.
//!
//! `POST /api/check-url` runs the fast check, `POST /api/analyze` the deep
//! analysis, `GET /api/health` reports liveness.

use crate::config::ServerConfig;
use crate::error::AssessError;
use crate::orchestrator::VerdictOrchestrator;
use crate::request::AssessmentRequest;
use crate::verdict::FastVerdict;
use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub const INVALID_URL_REASON: &str = "Invalid URL format provided.";

pub fn router(orchestrator: Arc<VerdictOrchestrator>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/api/check-url", post(check_url))
        .route("/api/analyze", post(analyze))
        .route("/api/health", get(health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(orchestrator)
}

/// Serve until Ctrl-C, purging the analysis cache in the background.
pub async fn serve(config: &ServerConfig, orchestrator: Arc<VerdictOrchestrator>) -> Result<()> {
    let addr: SocketAddr = config
        .listen_address
        .parse()
        .with_context(|| format!("Invalid listen address: {}", config.listen_address))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    let purge_task = spawn_cache_purge(
        Arc::clone(&orchestrator),
        Duration::from_secs(config.cache_purge_interval_seconds.max(1)),
    );

    log::info!("API server listening on {addr}");
    let app = router(Arc::clone(&orchestrator), config.max_body_bytes);
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed");

    purge_task.abort();
    orchestrator.shutdown().await;
    log::info!("API server stopped");
    result
}

fn spawn_cache_purge(
    orchestrator: Arc<VerdictOrchestrator>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = orchestrator.cache().purge_expired().await;
            if removed > 0 {
                log::debug!("Purged {removed} expired analysis cache entries");
            }
        }
    })
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("Received Ctrl-C, shutting down"),
        Err(e) => log::error!("Failed to listen for Ctrl-C: {e}"),
    }
}

async fn check_url(
    State(orchestrator): State<Arc<VerdictOrchestrator>>,
    body: Bytes,
) -> Response {
    let request = match decode_request(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let url = match request.require_url() {
        Ok(url) => url,
        Err(e) => return client_error(&e),
    };

    match orchestrator.fast_check(url).await {
        Ok(verdict) => Json(verdict).into_response(),
        Err(e) if e.is_format_error() => {
            log::debug!("Rejected fast check: {e}");
            let verdict = FastVerdict {
                safe: false,
                reasons: vec![INVALID_URL_REASON.to_string()],
            };
            (StatusCode::BAD_REQUEST, Json(verdict)).into_response()
        }
        Err(e) => client_error(&e),
    }
}

async fn analyze(
    State(orchestrator): State<Arc<VerdictOrchestrator>>,
    body: Bytes,
) -> Response {
    let request = match decode_request(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let (url, content) = match request.require_url().and_then(|url| {
        request.require_content().map(|content| (url, content))
    }) {
        Ok(fields) => fields,
        Err(e) => return client_error(&e),
    };

    match orchestrator.deep_analysis(url, content).await {
        Ok(verdict) => Json(verdict).into_response(),
        Err(e) => client_error(&e),
    }
}

async fn health(State(orchestrator): State<Arc<VerdictOrchestrator>>) -> Response {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "cache_entries": orchestrator.cache().len().await,
    }))
    .into_response()
}

fn decode_request(body: &[u8]) -> Result<AssessmentRequest, Response> {
    serde_json::from_slice(body).map_err(|e| {
        log::debug!("Rejected request body: {e}");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Request body must be a JSON object" })),
        )
            .into_response()
    })
}

fn client_error(error: &AssessError) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": error.to_string() })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::content_analyzer::{ContentAnalysisError, ContentModel};
    use crate::threat_intel::DisabledThreatIntel;
    use async_trait::async_trait;
    use serde_json::Value;

    struct FixedModel;

    #[async_trait]
    impl ContentModel for FixedModel {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn generate(&self, _prompt: &str) -> Result<String, ContentAnalysisError> {
            Ok(r#"{"score": 90, "vulnerabilities": []}"#.to_string())
        }
    }

    async fn spawn_app(max_body_bytes: usize) -> String {
        let orchestrator = VerdictOrchestrator::new(
            &Config::default(),
            Arc::new(DisabledThreatIntel),
            Arc::new(FixedModel),
        );
        let app = router(Arc::new(orchestrator), max_body_bytes);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    async fn post_json(url: String, body: Value) -> (u16, Value) {
        let response = reqwest::Client::new()
            .post(url)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    #[tokio::test]
    async fn test_check_url_requires_url() {
        let base = spawn_app(1024).await;
        let (status, body) = post_json(format!("{base}/api/check-url"), json!({})).await;
        assert_eq!(status, 400);
        assert_eq!(body, json!({"error": "URL is required"}));
    }

    #[tokio::test]
    async fn test_check_url_invalid_format() {
        let base = spawn_app(1024).await;
        let (status, body) =
            post_json(format!("{base}/api/check-url"), json!({"url": "not a url"})).await;
        assert_eq!(status, 400);
        assert_eq!(body, json!({"safe": false, "reasons": [INVALID_URL_REASON]}));
    }

    #[tokio::test]
    async fn test_analyze_requires_content() {
        let base = spawn_app(1024).await;
        let (status, body) = post_json(
            format!("{base}/api/analyze"),
            json!({"url": "https://example.com/"}),
        )
        .await;
        assert_eq!(status, 400);
        assert_eq!(body, json!({"error": "Content is required"}));
    }

    #[tokio::test]
    async fn test_analyze_returns_deep_verdict() {
        let base = spawn_app(1024).await;
        let (status, body) = post_json(
            format!("{base}/api/analyze"),
            json!({"url": "https://example.com/", "content": "<html></html>"}),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["safe"], false);
        assert_eq!(body["score"], 90);
        assert_eq!(body["vulnerabilities"], json!([]));
    }

    #[tokio::test]
    async fn test_rejects_non_json_body() {
        let base = spawn_app(1024).await;
        let response = reqwest::Client::new()
            .post(format!("{base}/api/check-url"))
            .body("url=https://example.com/")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn test_body_limit() {
        let base = spawn_app(64).await;
        let response = reqwest::Client::new()
            .post(format!("{base}/api/analyze"))
            .json(&json!({"url": "https://example.com/", "content": "x".repeat(1024)}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 413);
    }

    #[tokio::test]
    async fn test_health() {
        let base = spawn_app(1024).await;
        let body: Value = reqwest::get(format!("{base}/api/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["cache_entries"], 0);
    }
}
