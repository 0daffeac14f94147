pub mod event;
pub mod record;

pub use event::{
    Analysis, CallMetadata, CallStatus, DataCollection, InterestLevel, SinkTarget, Speaker, TranscriptTurn,
    WebhookError, WebhookEvent,
};
pub use record::ConversationRecord;
