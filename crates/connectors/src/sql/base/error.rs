use std::time::Duration;
use thiserror::Error;

/// Errors happening while opening a session.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),
}

/// Failure of the statement against one target. The display text is what
/// gets recorded on the target.
#[derive(Debug, Error)]
pub enum TargetExecutionError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("connection validation failed: {0}")]
    Validation(String),

    #[error("statement failed: {0}")]
    Statement(String),

    #[error("query timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("failed to decode column '{column}': {reason}")]
    Decode { column: String, reason: String },
}

impl From<ConnectorError> for TargetExecutionError {
    fn from(err: ConnectorError) -> Self {
        TargetExecutionError::Connect(err.to_string())
    }
}
