use crate::error::LedgerError;
use async_trait::async_trait;
use model::{
    core::identifiers::ExecutionId,
    execution::{execution::Execution, status::ExecutionStatus, target::TargetResult},
};

pub mod sled_store;

/// Durable record of executions and their per-target results.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Allocates the next internal execution key.
    async fn next_key(&self) -> Result<u64, LedgerError>;

    /// Inserts a new execution; fails if the id is already taken.
    async fn create_execution(&self, execution: &Execution) -> Result<(), LedgerError>;

    /// Persists `execution` and returns what was stored. A terminal status
    /// already in the ledger is kept, only counters and output path are merged.
    async fn save_execution(&self, execution: &Execution) -> Result<Execution, LedgerError>;

    async fn load_execution(&self, id: &ExecutionId) -> Result<Option<Execution>, LedgerError>;

    /// Flips a live execution to CANCELLED. Returns false when the execution
    /// is unknown or already terminal.
    async fn cancel_execution(&self, id: &ExecutionId, reason: &str) -> Result<bool, LedgerError>;

    /// Executions of one user, newest first.
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Execution>, LedgerError>;

    /// Executions in `status`, oldest first.
    async fn list_by_status(&self, status: ExecutionStatus) -> Result<Vec<Execution>, LedgerError>;

    async fn save_target(&self, target: &TargetResult) -> Result<(), LedgerError>;

    async fn save_targets(&self, targets: &[TargetResult]) -> Result<(), LedgerError>;

    /// Targets of an execution in plan order.
    async fn targets_for(&self, execution_key: u64) -> Result<Vec<TargetResult>, LedgerError>;
}
