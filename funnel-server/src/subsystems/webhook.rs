//! Post-call webhook processing
//!
//! `process_webhook` authenticates the raw body, parses it, and hands terminal
//! conversations to the dispatcher. `WebhookOutcome::encode` turns the result
//! into the HTTP status and JSON body the vendor sees.

use axum::http::StatusCode;
use funnel_core::{signature, WebhookError, WebhookEvent};
use serde_json::{json, Value};

use super::dispatch::{DispatchReport, Dispatcher};

/// Status for every request that passed authentication. The vendor disables
/// a webhook after repeated non-2xx responses, so downstream and payload
/// problems are reported in the body only.
pub const ACK_STATUS: StatusCode = StatusCode::OK;

/// Longest slice of a rejected payload written to the log.
const LOGGED_PAYLOAD_BYTES: usize = 2048;

#[derive(Debug)]
pub enum WebhookOutcome {
    MethodNotAllowed,
    MissingSecret,
    MissingSignature,
    InvalidSignature,
    Malformed(WebhookError),
    NotComplete,
    Processed {
        conversation_id: String,
        email_collected: bool,
        report: DispatchReport,
    },
}

/// Verify, parse and route one webhook delivery.
///
/// The dispatcher is only reached for an authenticated, well-formed payload
/// whose status is `done`.
pub async fn process_webhook(
    secret: Option<&str>,
    signature_header: Option<&str>,
    body: &[u8],
    dispatcher: &Dispatcher,
) -> WebhookOutcome {
    let Some(secret) = secret else {
        tracing::error!("Webhook secret is not configured");
        return WebhookOutcome::MissingSecret;
    };

    let Some(signature_header) = signature_header else {
        tracing::warn!("Webhook request without signature header");
        return WebhookOutcome::MissingSignature;
    };

    if !signature::verify(body, signature_header, secret) {
        tracing::warn!(body_len = body.len(), "Webhook signature mismatch");
        return WebhookOutcome::InvalidSignature;
    }

    let event = match WebhookEvent::parse(body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(
                error = %e,
                payload = %payload_preview(body),
                "Rejected malformed webhook payload"
            );
            return WebhookOutcome::Malformed(e);
        }
    };

    if !event.is_terminal() {
        tracing::info!(
            conversation_id = %event.conversation_id,
            status = %event.status,
            "Conversation not complete, nothing to do"
        );
        return WebhookOutcome::NotComplete;
    }

    let email_collected = event.collected_email().is_some();
    tracing::info!(
        conversation_id = %event.conversation_id,
        email_collected,
        interest_level = event.interest_level().map(|l| l.as_str()).unwrap_or("unknown"),
        "Processing completed conversation"
    );

    let report = dispatcher.dispatch(&event).await;

    WebhookOutcome::Processed {
        conversation_id: event.conversation_id,
        email_collected,
        report,
    }
}

impl WebhookOutcome {
    pub fn encode(self) -> (StatusCode, Value) {
        match self {
            WebhookOutcome::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                json!({ "error": "Method not allowed" }),
            ),
            WebhookOutcome::MissingSecret => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Server configuration error" }),
            ),
            WebhookOutcome::MissingSignature => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Missing signature" }),
            ),
            WebhookOutcome::InvalidSignature => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Invalid signature" }),
            ),
            WebhookOutcome::Malformed(e) => (
                ACK_STATUS,
                json!({
                    "success": false,
                    "message": "Invalid webhook payload",
                    "error": e.to_string(),
                }),
            ),
            WebhookOutcome::NotComplete => (
                ACK_STATUS,
                json!({ "message": "Conversation not complete yet" }),
            ),
            // Sink failures are in the report and the logs, never in the response.
            WebhookOutcome::Processed {
                conversation_id,
                email_collected,
                report: _,
            } => (
                ACK_STATUS,
                json!({
                    "success": true,
                    "message": "Webhook processed successfully",
                    "conversation_id": conversation_id,
                    "email_collected": email_collected,
                }),
            ),
        }
    }
}

fn payload_preview(body: &[u8]) -> String {
    let end = body.len().min(LOGGED_PAYLOAD_BYTES);
    let mut preview = String::from_utf8_lossy(&body[..end]).into_owned();
    if body.len() > end {
        preview.push('…');
    }
    preview
}
