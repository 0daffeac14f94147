//! Site chat assistant: validates the browser's history before it is proxied.

use funnel_core::ai::{ChatMessage, ChatRole};
use funnel_core::config::OpenAiConfig;
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct ChatRequest {
    pub messages: Option<Vec<IncomingMessage>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IncomingMessage {
    pub role: Option<String>,
    pub content: Option<String>,
}

impl IncomingMessage {
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: Some(role.to_string()),
            content: Some(content.to_string()),
        }
    }
}

/// Validate the conversation and build the message list sent upstream:
/// the configured system prompt followed by the most recent
/// `max_history` turns.
pub fn prepare_messages(
    request: ChatRequest,
    config: &OpenAiConfig,
) -> Result<Vec<ChatMessage>, String> {
    let incoming = match request.messages {
        Some(messages) if !messages.is_empty() => messages,
        _ => return Err("messages must be a non-empty array".to_string()),
    };

    let mut history = Vec::with_capacity(incoming.len());
    for (i, message) in incoming.into_iter().enumerate() {
        let role = match message.role.as_deref() {
            Some("user") => ChatRole::User,
            Some("assistant") => ChatRole::Assistant,
            _ => return Err(format!("messages[{}].role must be 'user' or 'assistant'", i)),
        };

        let content = match message.content {
            Some(c) if !c.trim().is_empty() => c,
            _ => return Err(format!("messages[{}].content is required", i)),
        };

        if content.chars().count() > config.max_message_chars {
            return Err(format!(
                "messages[{}].content exceeds {} characters",
                i, config.max_message_chars
            ));
        }

        history.push(ChatMessage { role, content });
    }

    let skip = history.len().saturating_sub(config.max_history);

    let mut messages = Vec::with_capacity(history.len() - skip + 1);
    messages.push(ChatMessage::system(config.system_prompt.clone()));
    messages.extend(history.into_iter().skip(skip));
    Ok(messages)
}
