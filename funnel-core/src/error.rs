use thiserror::Error;

#[derive(Error, Debug)]
pub enum FunnelError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Other error: {0}")]
    Other(String),
}
