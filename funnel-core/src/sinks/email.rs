//! Follow-up email through the EmailJS REST API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{error_for_status, LeadSink, SinkError, SinkOutcome};
use crate::config::EmailConfig;
use crate::models::WebhookEvent;

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    service_id: &'a str,
    template_id: &'a str,
    user_id: &'a str,
    #[serde(rename = "accessToken", skip_serializing_if = "Option::is_none")]
    access_token: Option<&'a str>,
    template_params: TemplateParams<'a>,
}

#[derive(Debug, Serialize)]
struct TemplateParams<'a> {
    to_email: &'a str,
    to_name: &'a str,
    company_name: &'a str,
    interest_level: &'a str,
    specific_interest: &'a str,
    budget_range: &'a str,
    timeline: &'a str,
    conversation_id: &'a str,
}

pub struct EmailNotifier {
    client: Client,
    config: EmailConfig,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig, client: Client) -> Self {
        Self { client, config }
    }

    /// `(service_id, template_id, public_key)` when all three are set.
    fn identifiers(&self) -> Option<(&str, &str, &str)> {
        Some((
            non_empty(&self.config.service_id)?,
            non_empty(&self.config.template_id)?,
            non_empty(&self.config.public_key)?,
        ))
    }

    async fn send(&self, url: &str, request: &SendRequest<'_>) -> Result<(), SinkError> {
        let response = self.client.post(url).json(request).send().await?;
        error_for_status(response).await?;
        Ok(())
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

#[async_trait]
impl LeadSink for EmailNotifier {
    async fn deliver(&self, event: &WebhookEvent) -> Result<SinkOutcome, SinkError> {
        let lead = event.data_collection();
        let Some(to_email) = lead.user_email.as_deref() else {
            return Ok(SinkOutcome::Skipped("no email collected"));
        };

        let Some((service_id, template_id, public_key)) = self.identifiers() else {
            tracing::warn!(
                conversation_id = %event.conversation_id,
                "EmailJS identifiers not configured, follow-up email not sent"
            );
            return Ok(SinkOutcome::Skipped("email service not configured"));
        };

        let request = SendRequest {
            service_id,
            template_id,
            user_id: public_key,
            access_token: non_empty(&self.config.private_key),
            template_params: TemplateParams {
                to_email,
                to_name: lead.user_name.as_deref().unwrap_or("there"),
                company_name: lead.company_name.as_deref().unwrap_or(""),
                interest_level: lead.interest_level.map(|l| l.as_str()).unwrap_or(""),
                specific_interest: lead.specific_interest.as_deref().unwrap_or(""),
                budget_range: lead.budget_range.as_deref().unwrap_or(""),
                timeline: lead.timeline.as_deref().unwrap_or(""),
                conversation_id: &event.conversation_id,
            },
        };

        let url = format!(
            "{}/api/v1.0/email/send",
            self.config.api_url.trim_end_matches('/')
        );

        match self.send(&url, &request).await {
            Ok(()) => {
                tracing::info!(conversation_id = %event.conversation_id, "Follow-up email sent");
                Ok(SinkOutcome::Delivered)
            }
            Err(e) => {
                tracing::error!(
                    conversation_id = %event.conversation_id,
                    error = %e,
                    "Failed to send follow-up email"
                );
                Err(e)
            }
        }
    }

    fn name(&self) -> &str {
        "email"
    }
}
