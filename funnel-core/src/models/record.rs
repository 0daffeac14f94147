use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::WebhookEvent;

/// Flat row written to the `voice_conversations` table for every terminal webhook.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ConversationRecord {
    pub conversation_id: String,
    pub agent_id: String,
    pub status: String,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    pub company_name: Option<String>,
    pub phone_number: Option<String>,
    pub interest_level: Option<String>,
    pub budget_range: Option<String>,
    pub timeline: Option<String>,
    pub specific_interest: Option<String>,
    pub page_section: Option<String>,
    pub call_duration_secs: i32,
    pub message_count: i32,
    pub call_successful: Option<bool>,
    pub termination_reason: Option<String>,
    pub language: Option<String>,
    pub transcript: serde_json::Value,
    pub data_collection: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ConversationRecord {
    pub fn from_event(event: &WebhookEvent) -> Self {
        let lead = event.data_collection();
        let data_collection = event
            .analysis
            .as_ref()
            .map(|a| a.raw_data_collection.clone())
            .unwrap_or(serde_json::Value::Null);

        Self {
            conversation_id: event.conversation_id.clone(),
            agent_id: event.agent_id.clone(),
            status: event.status.to_string(),
            user_email: lead.user_email.clone(),
            user_name: lead.user_name.clone(),
            company_name: lead.company_name.clone(),
            phone_number: lead.phone_number.clone(),
            interest_level: lead.interest_level.map(|l| l.to_string()),
            budget_range: lead.budget_range.clone(),
            timeline: lead.timeline.clone(),
            specific_interest: lead.specific_interest.clone(),
            page_section: lead.page_section.clone(),
            call_duration_secs: event.metadata.call_duration_secs.round() as i32,
            message_count: event.transcript.len().try_into().unwrap_or(i32::MAX),
            call_successful: event.call_successful(),
            termination_reason: event.metadata.termination_reason.clone(),
            language: event.metadata.language.clone(),
            transcript: serde_json::to_value(&event.transcript)
                .unwrap_or(serde_json::Value::Array(Vec::new())),
            data_collection,
            created_at: started_at(event.metadata.start_time_unix_secs),
        }
    }
}

/// Call start time, or now when the vendor sent no usable timestamp.
fn started_at(unix_secs: i64) -> DateTime<Utc> {
    if unix_secs <= 0 {
        return Utc::now();
    }
    DateTime::from_timestamp(unix_secs, 0).unwrap_or_else(Utc::now)
}
