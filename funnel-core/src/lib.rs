pub mod ai;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod signature;
pub mod sinks;

pub use config::FunnelConfig;
pub use error::FunnelError;
pub use models::{
    CallStatus, ConversationRecord, DataCollection, InterestLevel, SinkTarget, WebhookError,
    WebhookEvent,
};
pub use sinks::{create_store, LeadSink, SinkError, SinkOutcome};
