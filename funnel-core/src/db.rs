use crate::config::StoreConfig;
use crate::error::FunnelError;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// Build a pool that connects on first use, so a database outage never
/// prevents the server from starting.
pub fn create_lazy_pool(config: &StoreConfig) -> Result<PgPool, FunnelError> {
    let url = config
        .database_url
        .as_deref()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| FunnelError::Other("store.database_url is not set".to_string()))?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect_lazy(url)?;
    Ok(pool)
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

/// SQL identifiers can't be bound as parameters, so table names are checked instead.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
