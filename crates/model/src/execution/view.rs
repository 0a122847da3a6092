use crate::execution::{
    execution::Execution,
    status::{ExecutionStatus, TargetStatus},
    target::TargetResult,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Caller-facing projection of an execution and its targets.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionView {
    pub execution_id: String,
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
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub targets: Vec<TargetView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetView {
    pub cluster_id: u64,
    pub cluster_alias: String,
    pub database: String,
    pub status: TargetStatus,
    pub rows_affected: u64,
    pub duration_ms: Option<u64>,
    pub error_message: Option<String>,
    pub file_path: Option<String>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl ExecutionView {
    pub fn new(execution: &Execution, targets: Vec<TargetView>) -> Self {
        Self {
            execution_id: execution.id.to_string(),
            sql: execution.sql.clone(),
            user_id: execution.user_id.clone(),
            user_email: execution.user_email.clone(),
            status: execution.status,
            total_targets: execution.total_targets,
            completed_targets: execution.completed_targets,
            failed_targets: execution.failed_targets,
            total_rows: execution.total_rows,
            duration_ms: execution.duration_ms,
            consolidated_path: execution.consolidated_path.clone(),
            error_message: execution.error_message.clone(),
            created_at: execution.created_at,
            started_at: execution.started_at,
            completed_at: execution.completed_at,
            targets,
        }
    }
}

impl TargetView {
    pub fn new(target: &TargetResult, cluster_alias: impl Into<String>) -> Self {
        Self {
            cluster_id: target.cluster_id,
            cluster_alias: cluster_alias.into(),
            database: target.database.clone(),
            status: target.status,
            rows_affected: target.rows_affected,
            duration_ms: target.duration_ms,
            error_message: target.error_message.clone(),
            file_path: target.file_path.clone(),
            executed_at: target.executed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identifiers::ExecutionId;

    #[test]
    fn serializes_camel_case_with_nested_targets() {
        let exec = Execution::new(
            7,
            ExecutionId::from("exec_abc"),
            "SELECT 1",
            "u1",
            Some("u1@example.com".into()),
            "{}".into(),
        );
        let mut target = TargetResult::pending(7, 0, 2, "sales");
        target.record_success(3, 12, Some("/tmp/x.csv".into()));

        let view = ExecutionView::new(&exec, vec![TargetView::new(&target, "east")]);
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["executionId"], "exec_abc");
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["userEmail"], "u1@example.com");
        assert_eq!(json["targets"][0]["clusterAlias"], "east");
        assert_eq!(json["targets"][0]["status"], "COMPLETED");
        assert_eq!(json["targets"][0]["rowsAffected"], 3);
    }
}
