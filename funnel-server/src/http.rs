//! Funnel HTTP API
//!
//! Axum server for the voice-agent webhook and the browser-facing AI proxies.
//!
//! Each endpoint has a thin axum handler that delegates to an inner function
//! returning `(StatusCode, serde_json::Value)`, so the logic is testable
//! without going through the router.
//!
//! Endpoints:
//! - ANY  /api/elevenlabs-webhook: post-call webhook (POST only is accepted)
//! - POST /api/chat: chat completion proxy
//! - POST /api/realtime-session: OpenAI realtime session token
//! - POST /api/gemini-session: Gemini Live ephemeral token
//! - GET  /health: which sinks and proxies are configured
//! - GET  /version: server version info

use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{any, get, post};
use axum::{Json, Router};
use bytes::Bytes;
use funnel_core::ai::{GeminiLiveClient, OpenAiClient, ProxyError};
use funnel_core::FunnelConfig;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::subsystems::assistant::{self, ChatRequest};
use crate::subsystems::dispatch::Dispatcher;
use crate::subsystems::webhook::{self, WebhookOutcome};

/// Shared state for all HTTP handlers
pub struct HttpState {
    pub config: Arc<FunnelConfig>,
    pub dispatcher: Arc<Dispatcher>,
    pub openai: Option<OpenAiClient>,
    pub gemini: Option<GeminiLiveClient>,
}

impl HttpState {
    /// Proxy clients are built from config; a proxy without an API key stays
    /// disabled and its route answers with a configuration error.
    pub fn new(config: FunnelConfig, dispatcher: Dispatcher) -> Self {
        let openai = proxy_client("openai", OpenAiClient::new(config.openai.clone()));
        let gemini = proxy_client("gemini", GeminiLiveClient::new(config.gemini.clone()));

        Self {
            config: Arc::new(config),
            dispatcher: Arc::new(dispatcher),
            openai,
            gemini,
        }
    }

    pub fn from_config(config: FunnelConfig) -> Result<Self> {
        let dispatcher = Dispatcher::from_config(&config)?;
        Ok(Self::new(config, dispatcher))
    }
}

fn proxy_client<T>(name: &str, built: Result<T, ProxyError>) -> Option<T> {
    match built {
        Ok(client) => Some(client),
        Err(ProxyError::MissingApiKey) => {
            tracing::info!(proxy = name, "API key not set, proxy disabled");
            None
        }
        Err(e) => {
            tracing::warn!(proxy = name, error = %e, "Failed to build proxy client");
            None
        }
    }
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    let cors = cors_layer(&state.config.http.allowed_origins);

    Router::new()
        .route("/api/elevenlabs-webhook", any(webhook_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/realtime-session", post(realtime_session_handler))
        .route("/api/gemini-session", post(gemini_session_handler))
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Allow the configured origins, or any origin when none are listed.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(state: HttpState, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);

    let app = build_router(Arc::new(state));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Funnel HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct RealtimeSessionRequest {
    pub voice: Option<String>,
    pub instructions: Option<String>,
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

fn configuration_error() -> (StatusCode, Value) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "error": "Server configuration error" }),
    )
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Value) {
    (StatusCode::BAD_REQUEST, json!({ "error": message.into() }))
}

fn upstream_error(proxy: &str, e: ProxyError) -> (StatusCode, Value) {
    if let ProxyError::MissingApiKey = e {
        return configuration_error();
    }
    tracing::error!(proxy = proxy, error = %e, "Upstream AI request failed");
    (
        StatusCode::BAD_GATEWAY,
        json!({ "error": "Upstream request failed" }),
    )
}

/// Inner webhook: method check, then verify, parse, route and fan out.
pub async fn webhook_inner(
    state: &HttpState,
    method: &Method,
    headers: &HeaderMap,
    body: &[u8],
) -> (StatusCode, Value) {
    if method != Method::POST {
        return WebhookOutcome::MethodNotAllowed.encode();
    }

    let header_name = state.config.webhook.signature_header.to_ascii_lowercase();
    // A present but non-ASCII header is treated as an invalid signature, not a missing one.
    let signature = headers
        .get(header_name.as_str())
        .map(|value| value.to_str().unwrap_or_default());

    webhook::process_webhook(
        state.config.webhook.secret(),
        signature,
        body,
        &state.dispatcher,
    )
    .await
    .encode()
}

/// Inner chat: validates the history and proxies it to the chat model.
pub async fn chat_inner(state: &HttpState, body: &[u8]) -> (StatusCode, Value) {
    let Some(client) = &state.openai else {
        tracing::error!("Chat requested but OpenAI API key is not configured");
        return configuration_error();
    };

    let req: ChatRequest = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(e) => return bad_request(format!("Invalid request body: {}", e)),
    };

    let messages = match assistant::prepare_messages(req, client.config()) {
        Ok(m) => m,
        Err(reason) => return bad_request(reason),
    };

    match client.chat(&messages).await {
        Ok(reply) => (
            StatusCode::OK,
            json!({
                "message": reply,
                "model": client.config().chat_model,
            }),
        ),
        Err(e) => upstream_error("openai", e),
    }
}

/// Inner realtime session: mints an OpenAI realtime token for the browser.
pub async fn realtime_session_inner(state: &HttpState, body: &[u8]) -> (StatusCode, Value) {
    let Some(client) = &state.openai else {
        tracing::error!("Realtime session requested but OpenAI API key is not configured");
        return configuration_error();
    };

    let req: RealtimeSessionRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RealtimeSessionRequest::default()
    } else {
        match serde_json::from_slice(body) {
            Ok(r) => r,
            Err(e) => return bad_request(format!("Invalid request body: {}", e)),
        }
    };

    match client
        .create_realtime_session(req.voice.as_deref(), req.instructions.as_deref())
        .await
    {
        Ok(session) => (StatusCode::OK, session),
        Err(e) => upstream_error("openai", e),
    }
}

/// Inner Gemini session: mints a single-use Live API token.
pub async fn gemini_session_inner(state: &HttpState) -> (StatusCode, Value) {
    let Some(client) = &state.gemini else {
        tracing::error!("Gemini session requested but Gemini API key is not configured");
        return configuration_error();
    };

    match client.create_ephemeral_token().await {
        Ok(token) => (
            StatusCode::OK,
            json!({
                "token": token.token,
                "model": token.model,
                "expires_at": token.expires_at,
            }),
        ),
        Err(e) => upstream_error("gemini", e),
    }
}

/// Inner health: reports configuration only; never calls a downstream service.
pub fn health_inner(state: &HttpState) -> (StatusCode, Value) {
    let config = &state.config;
    (
        StatusCode::OK,
        json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "webhook": {
                "secret_configured": config.webhook.secret().is_some(),
                "signature_header": config.webhook.signature_header,
            },
            "sinks": {
                "store": {
                    "backend": format!("{:?}", config.store.backend).to_lowercase(),
                    "configured": config.store.is_configured(),
                },
                "email": { "configured": config.email.is_configured() },
                "chat": { "configured": config.chat.is_configured() },
            },
            "proxies": {
                "openai": state.openai.is_some(),
                "gemini": state.gemini.is_some(),
            },
        }),
    )
}

/// Inner version: returns version info (pure, no IO).
pub fn version_inner() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "funnel/1",
    })
}

// ============================================================================
// Axum handlers (thin wrappers around inner functions)
// ============================================================================

async fn webhook_handler(
    State(state): State<Arc<HttpState>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let (status, body) = webhook_inner(&state, &method, &headers, &body).await;
    (status, Json(body))
}

async fn chat_handler(
    State(state): State<Arc<HttpState>>,
    body: Bytes,
) -> impl IntoResponse {
    let (status, body) = chat_inner(&state, &body).await;
    (status, Json(body))
}

async fn realtime_session_handler(
    State(state): State<Arc<HttpState>>,
    body: Bytes,
) -> impl IntoResponse {
    let (status, body) = realtime_session_inner(&state, &body).await;
    (status, Json(body))
}

async fn gemini_session_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = gemini_session_inner(&state).await;
    (status, Json(body))
}

async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state);
    (status, Json(body))
}

async fn version_handler() -> impl IntoResponse {
    Json(version_inner())
}

// ============================================================================
// Tests
// ============================================================================
