//! Slack alert for high-interest leads.
//!
//! Only `interest_level == high` is posted. Everything else is skipped to keep
//! the channel quiet.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{error_for_status, LeadSink, SinkError, SinkOutcome};
use crate::config::ChatConfig;
use crate::models::{InterestLevel, WebhookEvent};

pub struct SlackNotifier {
    client: Client,
    config: ChatConfig,
}

impl SlackNotifier {
    pub fn new(config: ChatConfig, client: Client) -> Self {
        Self { client, config }
    }

    async fn post(&self, url: &str, message: &Value) -> Result<(), SinkError> {
        let response = self.client.post(url).json(message).send().await?;
        error_for_status(response).await?;
        Ok(())
    }
}

/// Slack incoming-webhook body: a plain `text` fallback plus Block Kit layout.
pub fn lead_message(event: &WebhookEvent) -> Value {
    let lead = event.data_collection();
    let or_dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "—".to_string());

    let name = or_dash(&lead.user_name);
    let company = or_dash(&lead.company_name);
    let interest = lead
        .interest_level
        .map(|l| l.to_string())
        .unwrap_or_else(|| "—".to_string());

    let field = |label: &str, value: String| {
        json!({ "type": "mrkdwn", "text": format!("*{}:*\n{}", label, value) })
    };

    let mut blocks = vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": "New high-interest lead" }
        }),
        json!({
            "type": "section",
            "fields": [
                field("Name", name.clone()),
                field("Email", or_dash(&lead.user_email)),
                field("Company", company.clone()),
                field("Phone", or_dash(&lead.phone_number)),
                field("Budget", or_dash(&lead.budget_range)),
                field("Timeline", or_dash(&lead.timeline)),
                field("Interest", interest),
                field("Page section", or_dash(&lead.page_section)),
            ]
        }),
    ];

    if let Some(specific) = &lead.specific_interest {
        blocks.push(json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": format!("*Looking for:*\n{}", specific) }
        }));
    }

    blocks.push(json!({
        "type": "context",
        "elements": [{
            "type": "mrkdwn",
            "text": format!(
                "Conversation `{}` · {} call",
                event.conversation_id,
                format_duration(event.metadata.call_duration_secs)
            )
        }]
    }));

    json!({
        "text": format!("New high-interest lead: {} ({})", name, company),
        "blocks": blocks
    })
}

fn format_duration(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    match (total / 60, total % 60) {
        (0, s) => format!("{}s", s),
        (m, s) => format!("{}m {}s", m, s),
    }
}

#[async_trait]
impl LeadSink for SlackNotifier {
    async fn deliver(&self, event: &WebhookEvent) -> Result<SinkOutcome, SinkError> {
        if event.interest_level() != Some(InterestLevel::High) {
            tracing::debug!(
                conversation_id = %event.conversation_id,
                "Lead interest below high, no Slack alert"
            );
            return Ok(SinkOutcome::Skipped("interest below high"));
        }

        let Some(url) = self.config.webhook_url.as_deref().filter(|u| !u.is_empty()) else {
            tracing::debug!(
                conversation_id = %event.conversation_id,
                "Slack webhook not configured, no alert"
            );
            return Ok(SinkOutcome::Skipped("chat webhook not configured"));
        };

        match self.post(url, &lead_message(event)).await {
            Ok(()) => {
                tracing::info!(conversation_id = %event.conversation_id, "Slack lead alert sent");
                Ok(SinkOutcome::Delivered)
            }
            Err(e) => {
                tracing::error!(
                    conversation_id = %event.conversation_id,
                    error = %e,
                    "Failed to send Slack lead alert"
                );
                Err(e)
            }
        }
    }

    fn name(&self) -> &str {
        "chat"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::http_client;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn event(interest: &str) -> WebhookEvent {
        let payload = json!({
            "conversation_id": "conv_slack",
            "status": "done",
            "analysis": {
                "data_collection": {
                    "user_email": "grace@navy.test",
                    "user_name": "Grace",
                    "company_name": "Compilers Inc",
                    "interest_level": interest,
                    "specific_interest": "An AI assistant for support"
                }
            },
            "metadata": { "start_time_unix_secs": 1_700_000_000, "call_duration_secs": 125 }
        });
        WebhookEvent::parse(payload.to_string().as_bytes()).unwrap()
    }

    fn notifier(webhook_url: Option<String>) -> SlackNotifier {
        SlackNotifier::new(ChatConfig { webhook_url }, http_client(5).unwrap())
    }

    #[test]
    fn test_lead_message_layout() {
        let message = lead_message(&event("high"));
        assert_eq!(message["text"], "New high-interest lead: Grace (Compilers Inc)");

        let blocks = message["blocks"].as_array().unwrap();
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[0]["type"], "header");
        assert_eq!(blocks[1]["fields"].as_array().unwrap().len(), 8);
        assert_eq!(blocks[1]["fields"][1]["text"], "*Email:*\ngrace@navy.test");
        assert_eq!(blocks[1]["fields"][3]["text"], "*Phone:*\n—");
        assert_eq!(
            blocks[3]["elements"][0]["text"],
            "Conversation `conv_slack` · 2m 5s call"
        );
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "0s");
        assert_eq!(format_duration(59.4), "59s");
        assert_eq!(format_duration(60.0), "1m 0s");
        assert_eq!(format_duration(-3.0), "0s");
    }

    #[tokio::test]
    async fn test_posts_high_interest_lead() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/T000/B000/XXX"))
            .and(body_partial_json(json!({
                "text": "New high-interest lead: Grace (Compilers Inc)"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = format!("{}/services/T000/B000/XXX", mock_server.uri());
        let outcome = notifier(Some(url)).deliver(&event("high")).await.unwrap();
        assert_eq!(outcome, SinkOutcome::Delivered);
    }

    #[tokio::test]
    async fn test_other_interest_levels_skipped() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let sink = notifier(Some(mock_server.uri()));
        for level in ["medium", "low", "none"] {
            let outcome = sink.deliver(&event(level)).await.unwrap();
            assert_eq!(outcome, SinkOutcome::Skipped("interest below high"));
        }
    }

    #[tokio::test]
    async fn test_unconfigured_webhook_skipped() {
        let outcome = notifier(None).deliver(&event("high")).await.unwrap();
        assert_eq!(outcome, SinkOutcome::Skipped("chat webhook not configured"));
    }

    #[tokio::test]
    async fn test_slack_error_surfaces() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no_service"))
            .mount(&mock_server)
            .await;

        let result = notifier(Some(mock_server.uri())).deliver(&event("high")).await;
        assert!(matches!(result, Err(SinkError::Api { code: 404, .. })));
    }
}
