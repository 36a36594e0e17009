//! HTTP gateway: POST /chat → relay turn → `{reply}` JSON.
//!
//! Access control (origin allow-list, bearer token) runs before the body is
//! looked at and before any upstream call. Each turn runs on its own task whose
//! cancellation token is dropped with the request, so a disconnect stops polling.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, Method, header},
    routing::{get, post},
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::webhook::handle_call_booked;
use crate::config::{AccessPolicy, RelayConfig};
use crate::error::RelayError;
use crate::relay::{ChatRequest, RelayService};

/// Response body for POST /chat.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct GatewayHealthResponse {
    pub status: &'static str,
    pub backend: &'static str,
    pub functions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_requests: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_flight_requests: Option<usize>,
}

/// Shared state for the HTTP server: relay + access policy + optional concurrency limit.
#[derive(Clone)]
pub struct GatewayState {
    pub relay: Arc<RelayService>,
    pub access: Arc<AccessPolicy>,
    pub webhook_secret: Option<Arc<str>>,
    /// When Some, limits concurrent upstream turns; excess requests wait for a slot.
    pub concurrency_semaphore: Option<Arc<Semaphore>>,
    pub max_concurrent_requests: Option<usize>,
}

/// Reject disallowed origins and bad bearer tokens.
///
/// A request without `Origin` is a server-to-server call and passes the origin check.
pub fn authorize_request(headers: &HeaderMap, access: &AccessPolicy) -> Result<(), RelayError> {
    if !access.allowed_origins.is_empty() {
        if let Some(origin) = headers.get(header::ORIGIN) {
            let origin = origin.to_str().unwrap_or_default();
            if !access.allowed_origins.iter().any(|allowed| allowed == origin) {
                return Err(RelayError::Unauthorized(format!(
                    "origin `{origin}` is not allowed"
                )));
            }
        }
    }
    if let Some(expected) = access.auth_token.as_deref() {
        let provided = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token);
        match provided {
            None => {
                return Err(RelayError::Unauthorized(
                    "missing bearer token".to_string(),
                ));
            }
            Some(token) if !constant_time_eq(token.as_bytes(), expected.as_bytes()) => {
                return Err(RelayError::Unauthorized("invalid bearer token".to_string()));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Token from an `Authorization` value; the scheme matches case-insensitively.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|token| !token.is_empty())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

async fn handle_chat(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, RelayError> {
    if let Err(error) = authorize_request(&headers, &state.access) {
        tracing::warn!(
            event = "relay.chat.rejected",
            kind = error.kind(),
            error = %error,
            "chat request rejected"
        );
        return Err(error);
    }
    let Json(body) = body.map_err(|rejection| RelayError::InvalidRequest(rejection.body_text()))?;
    let messages = body.normalize()?;

    let _permit = if let Some(ref sem) = state.concurrency_semaphore {
        Some(
            sem.acquire()
                .await
                .map_err(|_| RelayError::Internal("concurrency limit closed".to_string()))?,
        )
    } else {
        None
    };

    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();
    match state.relay.spawn_reply(messages, cancel).await {
        Ok(reply) => Ok(Json(ChatResponse { reply: reply.text })),
        Err(error) => {
            tracing::error!(
                event = "relay.chat.failed",
                kind = error.kind(),
                status = error.status_code().as_u16(),
                error = %error,
                "chat turn failed"
            );
            Err(error)
        }
    }
}

async fn handle_health(State(state): State<GatewayState>) -> Json<GatewayHealthResponse> {
    let in_flight_requests = state.max_concurrent_requests.and_then(|max| {
        state
            .concurrency_semaphore
            .as_ref()
            .map(|sem| max.saturating_sub(sem.available_permits()))
    });
    Json(GatewayHealthResponse {
        status: "healthy",
        backend: state.relay.backend_kind().as_str(),
        functions: state.relay.functions().len(),
        max_concurrent_requests: state.max_concurrent_requests,
        in_flight_requests,
    })
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allowed_headers = [header::CONTENT_TYPE, header::AUTHORIZATION];

    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(allowed_headers);
    }

    let parsed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(parsed))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(allowed_headers)
}

/// Build the gateway router (POST /chat, GET /health, POST /webhook/call-booked).
pub fn router(relay: RelayService, config: &RelayConfig) -> Router {
    let concurrency_semaphore = config
        .max_concurrent_requests
        .map(|n| Arc::new(Semaphore::new(n)));
    let state = GatewayState {
        relay: Arc::new(relay),
        access: Arc::new(config.access.clone()),
        webhook_secret: config.webhook_secret.as_deref().map(Arc::from),
        concurrency_semaphore,
        max_concurrent_requests: config.max_concurrent_requests,
    };
    let mut app = Router::new()
        .route("/health", get(handle_health))
        .route("/chat", post(handle_chat));
    if config.webhook_enabled {
        app = app.route("/webhook/call-booked", post(handle_call_booked));
    }
    app.layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&config.access.allowed_origins))
        .with_state(state)
}

/// Run the HTTP server on `config.bind`.
/// Graceful shutdown on Ctrl+C (SIGINT) and SIGTERM (Unix); in-flight requests complete before exit.
pub async fn run_http(relay: RelayService, config: &RelayConfig) -> Result<()> {
    let app = router(relay, config);
    let listener = TcpListener::bind(&config.bind).await?;
    let max_str = config
        .max_concurrent_requests
        .map(|n| n.to_string())
        .unwrap_or_else(|| "unlimited".to_string());
    tracing::info!(
        "gateway listening on {} ({}, max_concurrent={}, Ctrl+C/SIGTERM to stop)",
        config.bind,
        config.describe(),
        max_str
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let ctrl_c = tokio::signal::ctrl_c();
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(error) => {
                tracing::warn!(error = %error, "failed to listen for SIGTERM; Ctrl+C only");
                let _ = ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %error, "failed to listen for Ctrl+C");
        }
    }
}
