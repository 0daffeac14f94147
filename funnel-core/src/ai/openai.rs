use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use super::{api_error, ProxyError};
use crate::config::OpenAiConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct RealtimeSessionRequest<'a> {
    model: &'a str,
    voice: &'a str,
    instructions: &'a str,
}

/// OpenAI REST client for chat completions and realtime sessions.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    config: OpenAiConfig,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, ProxyError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(ProxyError::MissingApiKey)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    /// Run a chat completion and return the assistant's reply.
    ///
    /// Transient failures are retried with exponential backoff; other errors
    /// return immediately.
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<String, ProxyError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(self.config.max_retries);

        let result = RetryIf::spawn(
            retry_strategy,
            || self.chat_once(messages),
            |e: &ProxyError| e.is_transient(),
        )
        .await;

        match result {
            Ok(reply) => Ok(reply),
            Err(e) if e.is_transient() => {
                let attempts = self.config.max_retries + 1;
                tracing::error!(attempts = attempts, error = %e, "All chat completion attempts failed");
                Err(ProxyError::RetryExhausted { attempts })
            }
            Err(e) => Err(e),
        }
    }

    async fn chat_once(&self, messages: &[ChatMessage]) -> Result<String, ProxyError> {
        let request = CompletionRequest {
            model: &self.config.chat_model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let completion: CompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProxyError::InvalidResponse("completion has no content".to_string()))
    }

    /// Mint a realtime voice session. The upstream JSON, including its
    /// ephemeral `client_secret`, is returned as-is.
    pub async fn create_realtime_session(
        &self,
        voice: Option<&str>,
        instructions: Option<&str>,
    ) -> Result<Value, ProxyError> {
        let request = RealtimeSessionRequest {
            model: &self.config.realtime_model,
            voice: voice.unwrap_or(&self.config.voice),
            instructions: instructions.unwrap_or(&self.config.system_prompt),
        };

        let response = self
            .client
            .post(self.url("realtime/sessions"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let session: Value = response.json().await?;
        if session.get("client_secret").is_none() {
            return Err(ProxyError::InvalidResponse(
                "realtime session has no client_secret".to_string(),
            ));
        }
        Ok(session)
    }
}
