//! Voice-agent webhook payloads.
//!
//! One `WebhookEvent` is parsed per request and dropped when the handler
//! returns. Only `ConversationRecord`s derived from it are persisted.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// Conversation lifecycle as reported by the vendor. Only `Done` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Initiated,
    InProgress,
    Processing,
    Done,
    Failed,
    #[serde(other)]
    Unknown,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Initiated => "initiated",
            CallStatus::InProgress => "in-progress",
            CallStatus::Processing => "processing",
            CallStatus::Done => "done",
            CallStatus::Failed => "failed",
            CallStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Agent,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub role: Speaker,
    /// `None` for audio-only turns that were never transcribed.
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub time_in_call_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallMetadata {
    #[serde(default)]
    pub start_time_unix_secs: i64,
    #[serde(default)]
    pub call_duration_secs: f64,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub termination_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterestLevel {
    High,
    Medium,
    Low,
    None,
}

impl InterestLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterestLevel::High => "high",
            InterestLevel::Medium => "medium",
            InterestLevel::Low => "low",
            InterestLevel::None => "none",
        }
    }
}

impl fmt::Display for InterestLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterestLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(InterestLevel::High),
            "medium" => Ok(InterestLevel::Medium),
            "low" => Ok(InterestLevel::Low),
            "none" => Ok(InterestLevel::None),
            other => Err(format!("unknown interest level '{}'", other)),
        }
    }
}

/// A downstream sink a completed conversation is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkTarget {
    Store,
    Email,
    Chat,
}

impl SinkTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkTarget::Store => "store",
            SinkTarget::Email => "email",
            SinkTarget::Chat => "chat",
        }
    }
}

impl fmt::Display for SinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lead fields extracted by the voice agent. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataCollection {
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    pub company_name: Option<String>,
    pub phone_number: Option<String>,
    pub interest_level: Option<InterestLevel>,
    pub budget_range: Option<String>,
    pub timeline: Option<String>,
    pub specific_interest: Option<String>,
    pub page_section: Option<String>,
}

static EMPTY_COLLECTION: DataCollection = DataCollection {
    user_email: None,
    user_name: None,
    company_name: None,
    phone_number: None,
    interest_level: None,
    budget_range: None,
    timeline: None,
    specific_interest: None,
    page_section: None,
};

impl DataCollection {
    /// Read lead fields out of the vendor's `data_collection` object.
    ///
    /// Values may be bare scalars or wrapped as `{"value": ..., "rationale": ...}`.
    /// Blank strings count as absent.
    pub fn from_value(raw: &Value) -> Self {
        let field = |keys: &[&str]| keys.iter().find_map(|k| collected_string(raw.get(*k)));

        Self {
            user_email: field(&["user_email", "email"]),
            user_name: field(&["user_name", "name"]),
            company_name: field(&["company_name", "company"]),
            phone_number: field(&["phone_number", "phone"]),
            interest_level: field(&["interest_level"]).and_then(|s| s.parse().ok()),
            budget_range: field(&["budget_range", "budget"]),
            timeline: field(&["timeline"]),
            specific_interest: field(&["specific_interest"]),
            page_section: field(&["page_section"]),
        }
    }
}

fn collected_string(value: Option<&Value>) -> Option<String> {
    let value = match value? {
        Value::Object(wrapped) => wrapped.get("value")?,
        bare => bare,
    };

    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };

    (!text.is_empty()).then_some(text)
}

#[derive(Debug, Clone)]
pub struct Analysis {
    pub call_successful: Option<bool>,
    pub summary: Option<String>,
    pub data_collection: DataCollection,
    /// The `data_collection` object exactly as received.
    pub raw_data_collection: Value,
}

#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub conversation_id: String,
    pub agent_id: String,
    pub status: CallStatus,
    pub transcript: Vec<TranscriptTurn>,
    pub analysis: Option<Analysis>,
    pub metadata: CallMetadata,
}

#[derive(Deserialize)]
struct RawEvent {
    conversation_id: Option<String>,
    agent_id: Option<String>,
    status: Option<CallStatus>,
    transcript: Option<Vec<TranscriptTurn>>,
    analysis: Option<RawAnalysis>,
    metadata: Option<CallMetadata>,
}

#[derive(Deserialize)]
struct RawAnalysis {
    call_successful: Option<Value>,
    transcript_summary: Option<String>,
    data_collection: Option<Value>,
}

impl WebhookEvent {
    /// Parse a verified request body.
    pub fn parse(body: &[u8]) -> Result<Self, WebhookError> {
        let raw: RawEvent = serde_json::from_slice(body)?;

        let conversation_id = raw
            .conversation_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(WebhookError::MissingField("conversation_id"))?;
        let status = raw.status.ok_or(WebhookError::MissingField("status"))?;
        let metadata = raw.metadata.ok_or(WebhookError::MissingField("metadata"))?;

        let analysis = raw.analysis.map(|a| {
            let raw_data_collection = a.data_collection.unwrap_or(Value::Null);
            Analysis {
                call_successful: a.call_successful.as_ref().and_then(success_flag),
                summary: a.transcript_summary,
                data_collection: DataCollection::from_value(&raw_data_collection),
                raw_data_collection,
            }
        });

        Ok(Self {
            conversation_id,
            agent_id: raw.agent_id.unwrap_or_default(),
            status,
            transcript: raw.transcript.unwrap_or_default(),
            analysis,
            metadata,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.status == CallStatus::Done
    }

    pub fn data_collection(&self) -> &DataCollection {
        self.analysis
            .as_ref()
            .map(|a| &a.data_collection)
            .unwrap_or(&EMPTY_COLLECTION)
    }

    pub fn collected_email(&self) -> Option<&str> {
        self.data_collection().user_email.as_deref()
    }

    pub fn interest_level(&self) -> Option<InterestLevel> {
        self.data_collection().interest_level
    }

    pub fn call_successful(&self) -> Option<bool> {
        self.analysis.as_ref().and_then(|a| a.call_successful)
    }

    /// Sinks a completed conversation fans out to: the store always,
    /// email and chat only when an address was collected.
    pub fn sink_targets(&self) -> Vec<SinkTarget> {
        let mut targets = vec![SinkTarget::Store];
        if self.collected_email().is_some() {
            targets.push(SinkTarget::Email);
            targets.push(SinkTarget::Chat);
        }
        targets
    }
}

/// The vendor reports success as `"success" | "failure" | "unknown"`; plain booleans are accepted too.
fn success_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "success" | "true" => Some(true),
            "failure" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
