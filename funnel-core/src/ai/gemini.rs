use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{api_error, ProxyError};
use crate::config::GeminiConfig;

/// How long a minted token may be used to open a new Live session.
const NEW_SESSION_WINDOW_SECS: i64 = 60;

/// Upper bound on a minted token's lifetime (20 hours).
const MAX_TOKEN_TTL_SECS: i64 = 20 * 60 * 60;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthTokenRequest {
    uses: u32,
    expire_time: String,
    new_session_expire_time: String,
}

#[derive(Debug, Deserialize)]
struct AuthTokenResponse {
    name: Option<String>,
}

/// Single-use token handed to the browser for a Gemini Live session.
#[derive(Debug, Clone, Serialize)]
pub struct EphemeralToken {
    pub token: String,
    pub model: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct GeminiLiveClient {
    client: Client,
    config: GeminiConfig,
    api_key: String,
}

impl GeminiLiveClient {
    pub fn new(config: GeminiConfig) -> Result<Self, ProxyError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(ProxyError::MissingApiKey)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    pub async fn create_ephemeral_token(&self) -> Result<EphemeralToken, ProxyError> {
        let (expires_at, new_session_deadline) =
            token_deadlines(Utc::now(), self.config.token_ttl_secs);

        let request = AuthTokenRequest {
            uses: 1,
            expire_time: expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            new_session_expire_time: new_session_deadline.to_rfc3339_opts(SecondsFormat::Secs, true),
        };

        let url = format!(
            "{}/v1alpha/auth_tokens",
            self.config.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body: AuthTokenResponse = response.json().await?;
        let token = body
            .name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ProxyError::InvalidResponse("auth token has no name".to_string()))?;

        Ok(EphemeralToken {
            token,
            model: self.config.live_model.clone(),
            expires_at,
        })
    }
}

/// Token expiry and new-session deadline for a configured TTL, clamped to
/// `1..=MAX_TOKEN_TTL_SECS`.
fn token_deadlines(now: DateTime<Utc>, ttl_secs: i64) -> (DateTime<Utc>, DateTime<Utc>) {
    let ttl = ChronoDuration::seconds(ttl_secs.clamp(1, MAX_TOKEN_TTL_SECS));
    let expires_at = now + ttl;
    let new_session_deadline =
        (now + ChronoDuration::seconds(NEW_SESSION_WINDOW_SECS)).min(expires_at);
    (expires_at, new_session_deadline)
}
