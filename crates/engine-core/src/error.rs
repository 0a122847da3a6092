use model::{core::identifiers::ClusterId, execution::errors::ModelError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Failed to encode ledger record: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Execution {0} already exists")]
    Duplicate(String),
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Cluster {0} not found")]
    NotFound(ClusterId),

    #[error("Cluster {0} appears more than once in the inventory")]
    Duplicate(ClusterId),

    #[error("Failed to read cluster inventory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed cluster inventory: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Discovery failed for cluster {cluster}: {reason}")]
    Discovery { cluster: String, reason: String },
}

#[derive(Error, Debug)]
pub enum PlanResolutionError {
    #[error("{0}")]
    Metadata(#[from] ModelError),

    #[error("Unknown cluster id {0}")]
    UnknownCluster(ClusterId),

    #[error("no targets: no accessible database matched the submission")]
    NoTargets,

    #[error("Cluster registry error: {0}")]
    Registry(#[from] RegistryError),
}
