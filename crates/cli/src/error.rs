use connectors::sql::base::error::TargetExecutionError;
use engine_config::error::SettingsError;
use engine_core::error::{LedgerError, RegistryError};
use engine_runtime::error::EngineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("Failed to open the execution ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Failed to load the cluster inventory: {0}")]
    Registry(#[from] RegistryError),

    #[error("{0}")]
    Engine(#[from] EngineError),

    #[error("Connection check failed: {0}")]
    Connection(#[from] TargetExecutionError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("Cluster not found: {0}")]
    UnknownCluster(u64),

    #[error("Unexpected error: {0}")]
    Unexpected(String),

    #[error("Shutdown requested")]
    ShutdownRequested,
}
