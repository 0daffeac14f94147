//! Webhook contract tests
//!
//! Drive the full axum router with `oneshot`, using in-memory sinks that record
//! every delivery. Covers authentication, routing, fan-out selection and the
//! always-acknowledge response policy.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use funnel_core::{signature, FunnelConfig, LeadSink, SinkError, SinkOutcome, WebhookEvent};
use funnel_server::http::{build_router, HttpState};
use funnel_server::subsystems::dispatch::Dispatcher;
use serde_json::{json, Value};
use tower::ServiceExt;

const SECRET: &str = "whsec_integration";
const WEBHOOK: &str = "/api/elevenlabs-webhook";

/// Records the conversation id of every delivery; optionally fails afterwards.
struct RecordingSink {
    name: &'static str,
    fail: bool,
    seen: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn new(name: &'static str, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            name,
            fail,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl LeadSink for RecordingSink {
    async fn deliver(&self, event: &WebhookEvent) -> Result<SinkOutcome, SinkError> {
        self.seen.lock().unwrap().push(event.conversation_id.clone());
        if self.fail {
            return Err(SinkError::Api {
                code: 500,
                message: "insert failed".to_string(),
            });
        }
        Ok(SinkOutcome::Delivered)
    }

    fn name(&self) -> &str {
        self.name
    }
}

struct Harness {
    app: Router,
    store: Arc<RecordingSink>,
    email: Arc<RecordingSink>,
    chat: Arc<RecordingSink>,
}

impl Harness {
    fn sink_calls(&self) -> (usize, usize, usize) {
        (
            self.store.seen().len(),
            self.email.seen().len(),
            self.chat.seen().len(),
        )
    }
}

fn config_with_secret() -> FunnelConfig {
    let mut config = FunnelConfig::default();
    config.webhook.secret = Some(SECRET.to_string());
    config
}

fn harness_with(config: FunnelConfig, store_fails: bool) -> Harness {
    let store = RecordingSink::new("store", store_fails);
    let email = RecordingSink::new("email", false);
    let chat = RecordingSink::new("chat", false);

    let dispatcher = Dispatcher::new(
        store.clone(),
        email.clone(),
        chat.clone(),
        Duration::from_secs(2),
    );
    let state = Arc::new(HttpState::new(config, dispatcher));

    Harness {
        app: build_router(state),
        store,
        email,
        chat,
    }
}

fn harness() -> Harness {
    harness_with(config_with_secret(), false)
}

fn payload(status: &str, data_collection: Value) -> Vec<u8> {
    json!({
        "conversation_id": "conv_8f2a",
        "agent_id": "agent_site",
        "status": status,
        "transcript": [
            { "role": "agent", "message": "Hi, what are you building?", "time_in_call_secs": 0 },
            { "role": "user", "message": "A booking app for clinics.", "time_in_call_secs": 4 }
        ],
        "analysis": {
            "call_successful": "success",
            "transcript_summary": "Visitor wants a booking app.",
            "data_collection": data_collection
        },
        "metadata": { "start_time_unix_secs": 1_718_000_000, "call_duration_secs": 95 }
    })
    .to_string()
    .into_bytes()
}

fn signed_post(body: Vec<u8>) -> Request<Body> {
    let sig = signature::sign(&body, SECRET);
    Request::builder()
        .method("POST")
        .uri(WEBHOOK)
        .header("content-type", "application/json")
        .header("x-elevenlabs-signature", sig)
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

// ===========================================================================
// TEST 1: missing signature → 401, nothing parsed or dispatched
// ===========================================================================
#[tokio::test]
async fn test_missing_signature_rejected() {
    let h = harness();
    let req = Request::builder()
        .method("POST")
        .uri(WEBHOOK)
        .body(Body::from(payload("done", json!({ "user_email": "a@b.com" }))))
        .unwrap();

    let (status, body) = send(h.app.clone(), req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Missing signature");
    assert_eq!(h.sink_calls(), (0, 0, 0));
}

// ===========================================================================
// TEST 2: signature from the wrong secret → 401
// ===========================================================================
#[tokio::test]
async fn test_wrong_secret_rejected() {
    let h = harness();
    let body = payload("done", json!({}));
    let req = Request::builder()
        .method("POST")
        .uri(WEBHOOK)
        .header("x-elevenlabs-signature", signature::sign(&body, "not-the-secret"))
        .body(Body::from(body))
        .unwrap();

    let (status, body) = send(h.app.clone(), req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid signature");
    assert_eq!(h.sink_calls(), (0, 0, 0));
}

// ===========================================================================
// TEST 3: body altered after signing → 401
// ===========================================================================
#[tokio::test]
async fn test_reserialized_body_rejected() {
    let h = harness();
    let original = payload("done", json!({}));
    let sig = signature::sign(&original, SECRET);

    // Same JSON value, different bytes.
    let reparsed: Value = serde_json::from_slice(&original).unwrap();
    let pretty = serde_json::to_vec_pretty(&reparsed).unwrap();

    let req = Request::builder()
        .method("POST")
        .uri(WEBHOOK)
        .header("x-elevenlabs-signature", sig)
        .body(Body::from(pretty))
        .unwrap();

    let (status, _) = send(h.app.clone(), req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(h.sink_calls(), (0, 0, 0));
}

// ===========================================================================
// TEST 4: GET → 405
// ===========================================================================
#[tokio::test]
async fn test_get_not_allowed() {
    let h = harness();
    let req = Request::builder()
        .method("GET")
        .uri(WEBHOOK)
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(h.app.clone(), req).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"], "Method not allowed");
}

// ===========================================================================
// TEST 5: secret not configured → 500, even with a plausible signature
// ===========================================================================
#[tokio::test]
async fn test_missing_secret_is_server_error() {
    let h = harness_with(FunnelConfig::default(), false);

    let (status, body) = send(h.app.clone(), signed_post(payload("done", json!({})))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Server configuration error");
    assert_eq!(h.sink_calls(), (0, 0, 0));
}

// ===========================================================================
// TEST 6: non-terminal status → 200 "not complete", no sinks
// ===========================================================================
#[tokio::test]
async fn test_in_progress_acknowledged_without_fanout() {
    for status_value in ["initiated", "in-progress", "processing", "failed", "brand-new-status"] {
        let h = harness();
        let body = payload(status_value, json!({ "user_email": "a@b.com", "interest_level": "high" }));

        let (status, resp) = send(h.app.clone(), signed_post(body)).await;
        assert_eq!(status, StatusCode::OK, "status {}", status_value);
        assert_eq!(resp, json!({ "message": "Conversation not complete yet" }));
        assert_eq!(h.sink_calls(), (0, 0, 0), "status {}", status_value);
    }
}

// ===========================================================================
// TEST 7: done without email → only the store
// ===========================================================================
#[tokio::test]
async fn test_done_without_email_stores_only() {
    let h = harness();
    let body = payload("done", json!({ "user_name": "Ana", "interest_level": "high" }));

    let (status, resp) = send(h.app.clone(), signed_post(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["success"], true);
    assert_eq!(resp["conversation_id"], "conv_8f2a");
    assert_eq!(resp["email_collected"], false);
    assert_eq!(h.store.seen(), vec!["conv_8f2a".to_string()]);
    assert_eq!(h.sink_calls(), (1, 0, 0));
}

// ===========================================================================
// TEST 8: done + email + high → all three sinks
// ===========================================================================
#[tokio::test]
async fn test_done_with_email_reaches_every_sink() {
    let h = harness();
    let body = payload(
        "done",
        json!({
            "user_email": "ana@acme.test",
            "user_name": "Ana Ruiz",
            "company_name": "Acme",
            "interest_level": "high"
        }),
    );

    let (status, resp) = send(h.app.clone(), signed_post(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["success"], true);
    assert_eq!(resp["message"], "Webhook processed successfully");
    assert_eq!(resp["email_collected"], true);
    assert_eq!(h.sink_calls(), (1, 1, 1));
}

// ===========================================================================
// TEST 9: store failure is invisible to the vendor
// ===========================================================================
#[tokio::test]
async fn test_store_failure_still_succeeds() {
    let h = harness_with(config_with_secret(), true);
    let body = payload("done", json!({ "user_email": "a@b.com" }));

    let (status, resp) = send(h.app.clone(), signed_post(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["success"], true);
    assert_eq!(h.sink_calls(), (1, 1, 1));
}

// ===========================================================================
// TEST 10: malformed JSON (validly signed) → 200 success:false
// ===========================================================================
#[tokio::test]
async fn test_malformed_payload_acknowledged() {
    let h = harness();

    let (status, resp) = send(h.app.clone(), signed_post(b"{\"conversation_id\": ".to_vec())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["success"], false);
    assert_eq!(resp["message"], "Invalid webhook payload");
    assert!(resp["error"].is_string());
    assert_eq!(h.sink_calls(), (0, 0, 0));
}

// ===========================================================================
// TEST 11: required field missing → 200 success:false naming the field
// ===========================================================================
#[tokio::test]
async fn test_missing_metadata_acknowledged() {
    let h = harness();
    let body = json!({ "conversation_id": "conv_1", "status": "done" })
        .to_string()
        .into_bytes();

    let (status, resp) = send(h.app.clone(), signed_post(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["success"], false);
    assert!(resp["error"].as_str().unwrap().contains("metadata"));
    assert_eq!(h.sink_calls(), (0, 0, 0));
}

// ===========================================================================
// TEST 12: custom signature header and sha256= prefix
// ===========================================================================
#[tokio::test]
async fn test_custom_header_with_prefix() {
    let mut config = config_with_secret();
    config.webhook.signature_header = "X-Voice-Signature".to_string();
    let h = harness_with(config, false);

    let body = payload("done", json!({}));
    let req = Request::builder()
        .method("POST")
        .uri(WEBHOOK)
        .header("x-voice-signature", format!("sha256={}", signature::sign(&body, SECRET)))
        .body(Body::from(body))
        .unwrap();

    let (status, resp) = send(h.app.clone(), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["success"], true);
    assert_eq!(h.sink_calls(), (1, 0, 0));
}

// ===========================================================================
// TEST 13: duplicate deliveries are processed independently
// ===========================================================================
#[tokio::test]
async fn test_duplicate_delivery_processed_twice() {
    let h = harness();
    let body = payload("done", json!({}));

    for _ in 0..2 {
        let (status, _) = send(h.app.clone(), signed_post(body.clone())).await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(h.store.seen().len(), 2);
}

// ===========================================================================
// TEST 14: GET /version and /health via oneshot
// ===========================================================================
#[tokio::test]
async fn test_version_and_health_routes() {
    let h = harness();

    let req = Request::builder()
        .uri("/version")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(h.app.clone(), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["protocol"], "funnel/1");

    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(h.app.clone(), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["webhook"]["secret_configured"], true);
}
