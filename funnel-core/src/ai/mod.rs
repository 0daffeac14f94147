//! Clients for the AI APIs the site proxies
//!
//! - **OpenAI**: chat completions and realtime voice session tokens
//! - **Gemini**: ephemeral Live API tokens
//!
//! Browsers never see the API keys; they only get the proxied reply or a
//! short-lived token.

use serde::Deserialize;
use thiserror::Error;

pub mod gemini;
pub mod openai;

pub use gemini::{EphemeralToken, GeminiLiveClient};
pub use openai::{ChatMessage, ChatRole, OpenAiClient};

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Missing API key")]
    MissingApiKey,

    #[error("All {attempts} attempts failed")]
    RetryExhausted { attempts: usize },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProxyError {
    /// Network failures, rate limits and upstream 5xx are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            ProxyError::Http(e) => e.is_timeout() || e.is_connect(),
            ProxyError::Api { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

// Both OpenAI and Google wrap failures as {"error": {"message": ...}}.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

pub(crate) async fn api_error(response: reqwest::Response) -> ProxyError {
    let code = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .ok()
        .and_then(|e| e.error)
        .map(|e| e.message)
        .unwrap_or(body);

    tracing::error!(code = code, message = %message, "Upstream AI API error");
    ProxyError::Api { code, message }
}
