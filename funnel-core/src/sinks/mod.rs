//! Downstream sinks for completed conversations
//!
//! A sink receives a terminal `WebhookEvent` and performs one side effect:
//! - **store**: insert a `ConversationRecord` (PostgREST or direct Postgres)
//! - **email**: send a follow-up through EmailJS
//! - **chat**: post high-interest leads to a Slack incoming webhook
//!
//! Sinks that are not configured return `SinkOutcome::Skipped` rather than an error.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{FunnelConfig, StoreBackend};
use crate::models::WebhookEvent;

pub mod chat;
pub mod email;
pub mod store;

pub use chat::SlackNotifier;
pub use email::EmailNotifier;
pub use store::{PostgresStore, RestStore};

#[async_trait]
pub trait LeadSink: Send + Sync {
    /// Perform this sink's side effect for a terminal event.
    async fn deliver(&self, event: &WebhookEvent) -> Result<SinkOutcome, SinkError>;

    /// Sink name for logging.
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOutcome {
    Delivered,
    Skipped(&'static str),
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid sink configuration: {0}")]
    InvalidConfig(String),
}

/// Shared outbound client. The timeout bounds every sink request.
pub fn http_client(timeout_secs: u64) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("funnel/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Pick the persistence backend named by `store.backend`.
pub fn create_store(config: &FunnelConfig, client: Client) -> Result<Arc<dyn LeadSink>, SinkError> {
    match config.store.backend {
        StoreBackend::Rest => Ok(Arc::new(RestStore::new(config.store.clone(), client))),
        StoreBackend::Postgres => Ok(Arc::new(PostgresStore::from_config(&config.store)?)),
    }
}

/// Turn a non-2xx response into `SinkError::Api`, keeping the body for the log.
pub(crate) async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, SinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(SinkError::Api {
        code: status.as_u16(),
        message,
    })
}
