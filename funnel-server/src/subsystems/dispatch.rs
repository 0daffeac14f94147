//! Fan-out dispatcher: runs the sinks for a completed conversation
//!
//! - The store sink always runs.
//! - Email and chat sinks run only when the agent collected an email address.
//! - Invoked sinks run concurrently and every one is awaited to completion
//!   (settle-all, never fail-fast). A failed or timed-out sink is logged and
//!   recorded in the `DispatchReport`; it never affects its siblings.

use std::sync::Arc;
use std::time::Duration;

use funnel_core::{
    sinks::{self, EmailNotifier, SlackNotifier},
    FunnelConfig, LeadSink, SinkOutcome, SinkTarget, WebhookEvent,
};

/// How one sink invocation settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkResult {
    Delivered,
    Skipped(&'static str),
    Failed(String),
    TimedOut,
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub results: Vec<(String, SinkResult)>,
}

impl DispatchReport {
    /// Names of the sinks that were invoked, in invocation order.
    pub fn invoked(&self) -> Vec<&str> {
        self.results.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn get(&self, sink: &str) -> Option<&SinkResult> {
        self.results
            .iter()
            .find(|(name, _)| name == sink)
            .map(|(_, result)| result)
    }

    pub fn failures(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, r)| matches!(r, SinkResult::Failed(_) | SinkResult::TimedOut))
            .count()
    }
}

pub struct Dispatcher {
    store: Arc<dyn LeadSink>,
    email: Arc<dyn LeadSink>,
    chat: Arc<dyn LeadSink>,
    sink_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn LeadSink>,
        email: Arc<dyn LeadSink>,
        chat: Arc<dyn LeadSink>,
        sink_timeout: Duration,
    ) -> Self {
        Self {
            store,
            email,
            chat,
            sink_timeout,
        }
    }

    /// Build the real sinks from config, sharing one HTTP client.
    pub fn from_config(config: &FunnelConfig) -> anyhow::Result<Self> {
        let client = sinks::http_client(config.dispatch.http_timeout_secs)?;
        let store = sinks::create_store(config, client.clone())?;
        let email = Arc::new(EmailNotifier::new(config.email.clone(), client.clone()));
        let chat = Arc::new(SlackNotifier::new(config.chat.clone(), client));

        Ok(Self::new(
            store,
            email,
            chat,
            Duration::from_secs(config.dispatch.sink_timeout_secs),
        ))
    }

    fn sink(&self, target: SinkTarget) -> Arc<dyn LeadSink> {
        match target {
            SinkTarget::Store => self.store.clone(),
            SinkTarget::Email => self.email.clone(),
            SinkTarget::Chat => self.chat.clone(),
        }
    }

    pub async fn dispatch(&self, event: &WebhookEvent) -> DispatchReport {
        let shared = Arc::new(event.clone());

        let handles: Vec<_> = event
            .sink_targets()
            .into_iter()
            .map(|target| {
                let sink = self.sink(target);
                let name = sink.name().to_string();
                let handle = tokio::spawn(run_sink(sink, shared.clone(), self.sink_timeout));
                (name, handle)
            })
            .collect();

        let joined = futures::future::join_all(handles.into_iter().map(|(name, handle)| async move {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(
                        conversation_id = %event.conversation_id,
                        sink = %name,
                        error = %e,
                        "Sink task aborted"
                    );
                    SinkResult::Failed(format!("sink task aborted: {}", e))
                }
            };
            (name, result)
        }))
        .await;

        let report = DispatchReport { results: joined };

        tracing::info!(
            conversation_id = %event.conversation_id,
            sinks = ?report.invoked(),
            failures = report.failures(),
            "Fan-out settled"
        );

        report
    }
}

async fn run_sink(
    sink: Arc<dyn LeadSink>,
    event: Arc<WebhookEvent>,
    sink_timeout: Duration,
) -> SinkResult {
    match tokio::time::timeout(sink_timeout, sink.deliver(&event)).await {
        Ok(Ok(SinkOutcome::Delivered)) => SinkResult::Delivered,
        Ok(Ok(SinkOutcome::Skipped(reason))) => SinkResult::Skipped(reason),
        Ok(Err(e)) => SinkResult::Failed(e.to_string()),
        Err(_) => {
            tracing::warn!(
                conversation_id = %event.conversation_id,
                sink = %sink.name(),
                timeout_secs = sink_timeout.as_secs_f64(),
                "Sink timed out"
            );
            SinkResult::TimedOut
        }
    }
}
