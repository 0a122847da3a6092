use connectors::file::csv::error::SinkError;
use engine_config::error::SettingsError;
use engine_core::error::{LedgerError, PlanResolutionError, RegistryError};
use model::{core::identifiers::ClusterId, execution::errors::ModelError};
use thiserror::Error;

/// Top-level errors for the query engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid submission: {0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Plan(#[from] PlanResolutionError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Cluster registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Result storage error: {0}")]
    Sink(#[from] SinkError),

    #[error("{0}")]
    Model(#[from] ModelError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Worker pool error: {0}")]
    Worker(#[from] WorkerError),

    /// An error occurred while joining a task.
    /// This usually indicates that the task was cancelled or panicked.
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Rejections of a submission before anything is persisted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("SQL query cannot be empty")]
    EmptySql,

    #[error("Only SELECT queries are allowed")]
    NotSelect,

    #[error("Query contains disallowed keyword: {0}")]
    DisallowedKeyword(String),

    #[error("At least one cluster must be specified")]
    NoClusters,

    #[error("Cluster not found: {0}")]
    UnknownCluster(ClusterId),

    #[error("User id cannot be empty")]
    EmptyUserId,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Task queue closed")]
    QueueClosed,
}
