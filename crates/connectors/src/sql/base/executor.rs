use crate::sql::base::error::TargetExecutionError;
use async_trait::async_trait;
use model::{
    cluster::{Cluster, ConnectionDescriptor},
    records::row::NormalizedRow,
};
use std::{sync::Arc, time::Duration};

/// Limits applied to every session the executor opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub connect_timeout: Duration,
    pub query_timeout: Duration,
    pub max_rows: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            query_timeout: Duration::from_secs(300),
            max_rows: 1_000_000,
        }
    }
}

/// Result of one statement against one database.
#[derive(Debug, Clone, Default)]
pub struct QueryOutcome {
    pub columns: Vec<Arc<str>>,
    pub rows: Vec<NormalizedRow>,
    pub elapsed: Duration,
    /// True when rows beyond the cap were dropped.
    pub truncated: bool,
}

impl QueryOutcome {
    pub fn row_count(&self) -> u64 {
        self.rows.len() as u64
    }
}

/// Runs a read-only statement against a single database.
#[async_trait]
pub trait DatabaseExecutor: Send + Sync {
    async fn execute(
        &self,
        connection: &ConnectionDescriptor,
        sql: &str,
    ) -> Result<QueryOutcome, TargetExecutionError>;

    async fn test_connection(
        &self,
        connection: &ConnectionDescriptor,
    ) -> Result<(), TargetExecutionError>;

    /// Databases on the cluster that accept connections, in name order.
    async fn discover_databases(&self, cluster: &Cluster)
    -> Result<Vec<String>, TargetExecutionError>;
}
