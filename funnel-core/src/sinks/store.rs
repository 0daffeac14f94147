//! Persistence sink: one `voice_conversations` row per terminal webhook.
//!
//! Every delivery is a plain insert. Repeated `done` webhooks for the same
//! conversation produce repeated rows.

use async_trait::async_trait;
use reqwest::Client;
use sqlx::PgPool;
use uuid::Uuid;

use super::{error_for_status, LeadSink, SinkError, SinkOutcome};
use crate::config::StoreConfig;
use crate::db;
use crate::models::{ConversationRecord, WebhookEvent};

// ============================================================================
// RestStore (PostgREST / Supabase)
// ============================================================================

pub struct RestStore {
    client: Client,
    config: StoreConfig,
}

impl RestStore {
    pub fn new(config: StoreConfig, client: Client) -> Self {
        Self { client, config }
    }

    fn endpoint(&self) -> Option<(String, &str)> {
        let url = self.config.url.as_deref().filter(|u| !u.is_empty())?;
        let key = self.config.service_key.as_deref().filter(|k| !k.is_empty())?;
        let endpoint = format!("{}/rest/v1/{}", url.trim_end_matches('/'), self.config.table);
        Some((endpoint, key))
    }

    async fn insert(
        &self,
        endpoint: &str,
        key: &str,
        record: &ConversationRecord,
    ) -> Result<(), SinkError> {
        let response = self
            .client
            .post(endpoint)
            .header("apikey", key)
            .bearer_auth(key)
            .header("Prefer", "return=minimal")
            .json(record)
            .send()
            .await?;
        error_for_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl LeadSink for RestStore {
    async fn deliver(&self, event: &WebhookEvent) -> Result<SinkOutcome, SinkError> {
        let Some((endpoint, key)) = self.endpoint() else {
            tracing::warn!(
                conversation_id = %event.conversation_id,
                "Store URL or service key not configured, conversation not persisted"
            );
            return Ok(SinkOutcome::Skipped("store not configured"));
        };

        let record = ConversationRecord::from_event(event);

        if let Err(e) = self.insert(&endpoint, key, &record).await {
            tracing::error!(
                conversation_id = %event.conversation_id,
                error = %e,
                "Failed to store conversation"
            );
            return Err(e);
        }

        tracing::info!(conversation_id = %event.conversation_id, "Conversation stored");
        Ok(SinkOutcome::Delivered)
    }

    fn name(&self) -> &str {
        "store"
    }
}

// ============================================================================
// PostgresStore (direct sqlx insert)
// ============================================================================

pub struct PostgresStore {
    pool: PgPool,
    insert_sql: String,
}

impl PostgresStore {
    pub fn new(pool: PgPool, table: &str) -> Result<Self, SinkError> {
        if !db::is_valid_identifier(table) {
            return Err(SinkError::InvalidConfig(format!(
                "'{}' is not a valid table name",
                table
            )));
        }

        let insert_sql = format!(
            r#"
            INSERT INTO {} (
                conversation_id, agent_id, status,
                user_email, user_name, company_name, phone_number,
                interest_level, budget_range, timeline, specific_interest, page_section,
                call_duration_secs, message_count, call_successful,
                termination_reason, language,
                transcript, data_collection, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            RETURNING id
            "#,
            table
        );

        Ok(Self { pool, insert_sql })
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self, SinkError> {
        let pool = db::create_lazy_pool(config)
            .map_err(|e| SinkError::InvalidConfig(e.to_string()))?;
        Self::new(pool, &config.table)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn insert(&self, record: &ConversationRecord) -> Result<Uuid, sqlx::Error> {
        let row: (Uuid,) = sqlx::query_as(&self.insert_sql)
            .bind(&record.conversation_id)
            .bind(&record.agent_id)
            .bind(&record.status)
            .bind(&record.user_email)
            .bind(&record.user_name)
            .bind(&record.company_name)
            .bind(&record.phone_number)
            .bind(&record.interest_level)
            .bind(&record.budget_range)
            .bind(&record.timeline)
            .bind(&record.specific_interest)
            .bind(&record.page_section)
            .bind(record.call_duration_secs)
            .bind(record.message_count)
            .bind(record.call_successful)
            .bind(&record.termination_reason)
            .bind(&record.language)
            .bind(&record.transcript)
            .bind(&record.data_collection)
            .bind(record.created_at)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}

#[async_trait]
impl LeadSink for PostgresStore {
    async fn deliver(&self, event: &WebhookEvent) -> Result<SinkOutcome, SinkError> {
        let record = ConversationRecord::from_event(event);
        match self.insert(&record).await {
            Ok(id) => {
                tracing::info!(
                    conversation_id = %event.conversation_id,
                    row_id = %id,
                    "Conversation stored"
                );
                Ok(SinkOutcome::Delivered)
            }
            Err(e) => {
                tracing::error!(
                    conversation_id = %event.conversation_id,
                    error = %e,
                    "Failed to store conversation"
                );
                Err(e.into())
            }
        }
    }

    fn name(&self) -> &str {
        "store"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::http_client;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn done_event() -> WebhookEvent {
        let payload = json!({
            "conversation_id": "conv_store",
            "agent_id": "agent_x",
            "status": "done",
            "analysis": { "data_collection": { "user_email": "a@b.com", "interest_level": "low" } },
            "metadata": { "start_time_unix_secs": 1_700_000_000, "call_duration_secs": 30 }
        });
        WebhookEvent::parse(payload.to_string().as_bytes()).unwrap()
    }

    fn rest_config(url: Option<String>) -> StoreConfig {
        StoreConfig {
            url,
            service_key: Some("service-role-key".to_string()),
            ..StoreConfig::default()
        }
    }

    #[tokio::test]
    async fn test_rest_store_inserts_row() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/voice_conversations"))
            .and(header("apikey", "service-role-key"))
            .and(header("authorization", "Bearer service-role-key"))
            .and(header("prefer", "return=minimal"))
            .and(body_partial_json(json!({
                "conversation_id": "conv_store",
                "agent_id": "agent_x",
                "user_email": "a@b.com",
                "interest_level": "low",
                "call_duration_secs": 30
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = RestStore::new(rest_config(Some(mock_server.uri())), http_client(5).unwrap());
        let outcome = store.deliver(&done_event()).await.unwrap();
        assert_eq!(outcome, SinkOutcome::Delivered);
    }

    #[tokio::test]
    async fn test_rest_store_surfaces_api_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_string("duplicate key"))
            .mount(&mock_server)
            .await;

        let store = RestStore::new(rest_config(Some(mock_server.uri())), http_client(5).unwrap());
        match store.deliver(&done_event()).await {
            Err(SinkError::Api { code, message }) => {
                assert_eq!(code, 409);
                assert_eq!(message, "duplicate key");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rest_store_skips_when_unconfigured() {
        let store = RestStore::new(rest_config(None), http_client(5).unwrap());
        let outcome = store.deliver(&done_event()).await.unwrap();
        assert!(matches!(outcome, SinkOutcome::Skipped(_)));
    }

    #[tokio::test]
    async fn test_postgres_store_rejects_bad_table() {
        let config = StoreConfig {
            database_url: Some("postgresql://u:p@127.0.0.1:1/db".to_string()),
            table: "leads; drop table users".to_string(),
            ..StoreConfig::default()
        };
        assert!(matches!(
            PostgresStore::from_config(&config),
            Err(SinkError::InvalidConfig(_))
        ));
    }

    /// Runs against a live database when `DATABASE_URL` points at one with the migration applied.
    #[tokio::test]
    async fn test_postgres_store_inserts_row() {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("Skipping test_postgres_store_inserts_row: DATABASE_URL unset");
            return;
        };
        let pool = match PgPool::connect(&url).await {
            Ok(p) => p,
            Err(_) => {
                eprintln!("Skipping test_postgres_store_inserts_row: DB unavailable");
                return;
            }
        };

        let store = PostgresStore::new(pool.clone(), "voice_conversations").unwrap();
        let record = ConversationRecord::from_event(&done_event());
        let id = match store.insert(&record).await {
            Ok(id) => id,
            Err(e) => {
                eprintln!("Skipping test_postgres_store_inserts_row: {}", e);
                return;
            }
        };

        let stored: ConversationRecord = sqlx::query_as(
            "SELECT conversation_id, agent_id, status, user_email, user_name, company_name, \
             phone_number, interest_level, budget_range, timeline, specific_interest, page_section, \
             call_duration_secs, message_count, call_successful, termination_reason, language, \
             transcript, data_collection, created_at FROM voice_conversations WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(stored.conversation_id, "conv_store");
        assert_eq!(stored.user_email.as_deref(), Some("a@b.com"));

        sqlx::query("DELETE FROM voice_conversations WHERE id = $1")
            .bind(id)
            .execute(&pool)
            .await
            .ok();
    }
}
