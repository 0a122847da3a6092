use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

const EXECUTION_ID_PREFIX: &str = "exec_";

/// Externally visible execution identifier (`exec_` followed by 32 hex chars).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(Arc<str>);

impl ExecutionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(Arc::from(id.into()))
    }

    pub fn generate() -> Self {
        Self::new(format!(
            "{EXECUTION_ID_PREFIX}{}",
            uuid::Uuid::new_v4().simple()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ExecutionId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ExecutionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Numeric key of a cluster in the inventory.
pub type ClusterId = u64;
