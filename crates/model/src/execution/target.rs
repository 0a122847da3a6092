use crate::{core::identifiers::ClusterId, execution::status::TargetStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of running the statement against one database of one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetResult {
    pub execution_key: u64,
    /// Position in the resolved plan.
    pub seq: u32,
    pub cluster_id: ClusterId,
    pub database: String,
    pub status: TargetStatus,
    pub rows_affected: u64,
    pub duration_ms: Option<u64>,
    pub error_message: Option<String>,
    pub file_path: Option<String>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl TargetResult {
    pub fn pending(
        execution_key: u64,
        seq: u32,
        cluster_id: ClusterId,
        database: impl Into<String>,
    ) -> Self {
        Self {
            execution_key,
            seq,
            cluster_id,
            database: database.into(),
            status: TargetStatus::Pending,
            rows_affected: 0,
            duration_ms: None,
            error_message: None,
            file_path: None,
            executed_at: None,
        }
    }

    pub fn record_success(&mut self, rows: u64, duration_ms: u64, file_path: Option<String>) {
        self.status = TargetStatus::Completed;
        self.rows_affected = rows;
        self.duration_ms = Some(duration_ms);
        self.file_path = file_path;
        self.executed_at = Some(Utc::now());
    }

    pub fn record_failure(&mut self, message: impl Into<String>, duration_ms: u64) {
        self.status = TargetStatus::Failed;
        self.error_message = Some(message.into());
        self.duration_ms = Some(duration_ms);
        self.executed_at = Some(Utc::now());
    }
}
