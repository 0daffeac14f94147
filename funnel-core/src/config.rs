use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Plain vendor environment variables (as set on the hosting platform), mapped onto
/// config keys. These win over both the TOML file and `FUNNEL_*` variables.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("ELEVENLABS_WEBHOOK_SECRET", "webhook.secret"),
    ("SUPABASE_URL", "store.url"),
    ("SUPABASE_SERVICE_ROLE_KEY", "store.service_key"),
    ("DATABASE_URL", "store.database_url"),
    ("EMAILJS_SERVICE_ID", "email.service_id"),
    ("EMAILJS_TEMPLATE_ID", "email.template_id"),
    ("EMAILJS_PUBLIC_KEY", "email.public_key"),
    ("EMAILJS_PRIVATE_KEY", "email.private_key"),
    ("SLACK_WEBHOOK_URL", "chat.webhook_url"),
    ("OPENAI_API_KEY", "openai.api_key"),
    ("GEMINI_API_KEY", "gemini.api_key"),
];

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct FunnelConfig {
    pub http: HttpConfig,
    pub webhook: WebhookConfig,
    pub dispatch: DispatchConfig,
    pub store: StoreConfig,
    pub email: EmailConfig,
    pub chat: ChatConfig,
    pub openai: OpenAiConfig,
    pub gemini: GeminiConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Browser origins allowed to call the proxy routes. Empty means any.
    pub allowed_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WebhookConfig {
    pub secret: Option<String>,
    pub signature_header: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: None,
            signature_header: "x-elevenlabs-signature".to_string(),
        }
    }
}

impl WebhookConfig {
    /// The shared secret, treating an empty string as unset.
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DispatchConfig {
    pub sink_timeout_secs: u64,
    pub http_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            sink_timeout_secs: 8,
            http_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Rest,
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub url: Option<String>,
    pub service_key: Option<String>,
    pub table: String,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Rest,
            url: None,
            service_key: None,
            table: "voice_conversations".to_string(),
            database_url: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmailConfig {
    pub api_url: String,
    pub service_id: Option<String>,
    pub template_id: Option<String>,
    pub public_key: Option<String>,
    pub private_key: Option<String>,
}

impl StoreConfig {
    pub fn is_configured(&self) -> bool {
        match self.backend {
            StoreBackend::Rest => is_set(&self.url) && is_set(&self.service_key),
            StoreBackend::Postgres => is_set(&self.database_url),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.emailjs.com".to_string(),
            service_id: None,
            template_id: None,
            public_key: None,
            private_key: None,
        }
    }
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        is_set(&self.service_id) && is_set(&self.template_id) && is_set(&self.public_key)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ChatConfig {
    pub webhook_url: Option<String>,
}

impl ChatConfig {
    pub fn is_configured(&self) -> bool {
        is_set(&self.webhook_url)
    }
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub chat_model: String,
    pub realtime_model: String,
    pub voice: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_history: usize,
    pub max_message_chars: usize,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            realtime_model: "gpt-4o-realtime-preview".to_string(),
            voice: "alloy".to_string(),
            system_prompt: "You are the studio's assistant. Answer questions about our \
                            services, case studies and engagement process in a friendly, \
                            concise way. When a visitor shows interest in a project, ask \
                            for their name, company and email so the team can follow up."
                .to_string(),
            temperature: 0.7,
            max_tokens: 500,
            max_history: 20,
            max_message_chars: 4000,
            max_retries: 3,
            retry_delay_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub live_model: String,
    pub token_ttl_secs: i64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            live_model: "gemini-2.0-flash-live-001".to_string(),
            token_ttl_secs: 1800,
        }
    }
}

impl FunnelConfig {
    /// Load from an optional TOML file, `FUNNEL_*` env vars and the vendor env vars.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    pub fn load_with_env<F>(path: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("FUNNEL")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("http.allowed_origins"),
            );

        for (var, key) in ENV_OVERRIDES {
            let value = lookup(var).filter(|v| !v.trim().is_empty());
            builder = builder.set_override_option(*key, value)?;
        }

        builder.build()?.try_deserialize()
    }
}
