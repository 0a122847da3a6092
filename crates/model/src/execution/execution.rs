use crate::{core::identifiers::ExecutionId, execution::status::ExecutionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ledger entry for one submitted statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// Internal numeric key; target rows are keyed by it.
    pub key: u64,
    pub id: ExecutionId,
    pub sql: String,
    pub user_id: String,
    pub user_email: Option<String>,
    pub status: ExecutionStatus,
    pub total_targets: u32,
    pub completed_targets: u32,
    pub failed_targets: u32,
    pub total_rows: u64,
    pub duration_ms: Option<u64>,
    pub consolidated_path: Option<String>,
    pub error_message: Option<String>,
    /// Serialized plan parameters.
    pub metadata: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Execution {
    pub fn new(
        key: u64,
        id: ExecutionId,
        sql: impl Into<String>,
        user_id: impl Into<String>,
        user_email: Option<String>,
        metadata: String,
    ) -> Self {
        Self {
            key,
            id,
            sql: sql.into(),
            user_id: user_id.into(),
            user_email,
            status: ExecutionStatus::Pending,
            total_targets: 0,
            completed_targets: 0,
            failed_targets: 0,
            total_rows: 0,
            duration_ms: None,
            consolidated_path: None,
            error_message: None,
            metadata,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn mark_started(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.finish(ExecutionStatus::Completed);
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
        self.finish(ExecutionStatus::Failed);
    }

    pub fn mark_cancelled(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
        self.status = ExecutionStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }

    pub fn increment_completed(&mut self, rows: u64) {
        if self.completed_targets + self.failed_targets < self.total_targets {
            self.completed_targets += 1;
        }
        self.total_rows += rows;
    }

    pub fn increment_failed(&mut self) {
        if self.completed_targets + self.failed_targets < self.total_targets {
            self.failed_targets += 1;
        }
    }

    /// Milliseconds since the execution started, or since creation if it
    /// never started.
    pub fn elapsed_ms(&self, at: DateTime<Utc>) -> u64 {
        let from = self.started_at.unwrap_or(self.created_at);
        (at - from).num_milliseconds().max(0) as u64
    }

    fn finish(&mut self, status: ExecutionStatus) {
        let now = Utc::now();
        self.status = status;
        self.completed_at = Some(now);
        self.duration_ms = Some(self.elapsed_ms(now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execution() -> Execution {
        Execution::new(
            1,
            ExecutionId::from("exec_test"),
            "SELECT 1",
            "alice",
            None,
            "{}".into(),
        )
    }

    #[test]
    fn lifecycle_sets_timestamps_and_duration() {
        let mut exec = execution();
        assert_eq!(exec.status, ExecutionStatus::Pending);

        exec.mark_started();
        assert!(exec.started_at.is_some());

        exec.mark_completed();
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert!(exec.completed_at.is_some());
        assert!(exec.duration_ms.is_some());
        assert!(exec.is_terminal());
    }

    #[test]
    fn counters_never_exceed_total() {
        let mut exec = execution();
        exec.total_targets = 2;
        exec.increment_completed(10);
        exec.increment_failed();
        exec.increment_failed();
        exec.increment_completed(5);

        assert_eq!(exec.completed_targets, 1);
        assert_eq!(exec.failed_targets, 1);
        assert_eq!(exec.total_rows, 15);
    }

    #[test]
    fn failure_records_message() {
        let mut exec = execution();
        exec.mark_started();
        exec.mark_failed("boom");
        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert_eq!(exec.error_message.as_deref(), Some("boom"));
    }
}
