use crate::{error::LedgerError, ledger::LedgerStore};
use async_trait::async_trait;
use model::{
    core::identifiers::ExecutionId,
    execution::{execution::Execution, status::ExecutionStatus, target::TargetResult},
};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::path::Path;
use tracing::debug;

const EXEC_PREFIX: &str = "exec:";
const TARGET_PREFIX: &str = "tgt:";

pub struct SledLedgerStore {
    db: sled::Db,
}

impl SledLedgerStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// In-memory store that disappears on drop.
    pub fn temporary() -> Result<Self, LedgerError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    #[inline]
    fn exec_key(id: &ExecutionId) -> String {
        format!("{EXEC_PREFIX}{id}")
    }

    #[inline]
    fn target_prefix(execution_key: u64) -> String {
        format!("{TARGET_PREFIX}{execution_key:020}:")
    }

    #[inline]
    fn target_key(execution_key: u64, seq: u32) -> String {
        format!("{}{seq:08}", Self::target_prefix(execution_key))
    }

    /// Decides what gets stored when `incoming` overwrites `stored`.
    /// Status, error and completion time only move along legal transitions.
    fn reconcile(stored: Execution, incoming: &Execution) -> Execution {
        if stored.status.can_transition_to(incoming.status) {
            return incoming.clone();
        }

        let mut merged = incoming.clone();
        merged.status = stored.status;
        merged.error_message = stored.error_message;
        merged.completed_at = stored.completed_at;
        merged.duration_ms = stored.duration_ms;
        merged
    }

    fn all_executions(&self) -> Result<Vec<Execution>, LedgerError> {
        let mut executions = Vec::new();
        for item in self.db.scan_prefix(EXEC_PREFIX) {
            let (_key, value) = item?;
            executions.push(bincode::deserialize::<Execution>(&value)?);
        }
        Ok(executions)
    }
}

#[async_trait]
impl LedgerStore for SledLedgerStore {
    async fn next_key(&self) -> Result<u64, LedgerError> {
        Ok(self.db.generate_id()?)
    }

    async fn create_execution(&self, execution: &Execution) -> Result<(), LedgerError> {
        let key = Self::exec_key(&execution.id);
        let bytes = bincode::serialize(execution)?;

        match self
            .db
            .compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(bytes))?
        {
            Ok(()) => Ok(()),
            Err(_) => Err(LedgerError::Duplicate(execution.id.to_string())),
        }
    }

    async fn save_execution(&self, execution: &Execution) -> Result<Execution, LedgerError> {
        let key = Self::exec_key(&execution.id);

        // Check-then-set so a concurrent cancel is never overwritten.
        let result = self.db.transaction::<_, _, LedgerError>(|tx_db| {
            let stored = match tx_db.get(key.as_bytes())? {
                Some(existing_bytes) => {
                    let existing: Execution = bincode::deserialize(&existing_bytes)
                        .map_err(|e| ConflictableTransactionError::Abort(e.into()))?;
                    Self::reconcile(existing, execution)
                }
                None => execution.clone(),
            };

            let bytes = bincode::serialize(&stored)
                .map_err(|e| ConflictableTransactionError::Abort(e.into()))?;
            tx_db.insert(key.as_bytes(), bytes)?;
            Ok(stored)
        });

        match result {
            Ok(stored) => {
                if stored.status != execution.status {
                    debug!(
                        execution_id = %execution.id,
                        kept = %stored.status,
                        rejected = %execution.status,
                        "Kept stored execution status"
                    );
                }
                Ok(stored)
            }
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    async fn load_execution(&self, id: &ExecutionId) -> Result<Option<Execution>, LedgerError> {
        match self.db.get(Self::exec_key(id))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn cancel_execution(&self, id: &ExecutionId, reason: &str) -> Result<bool, LedgerError> {
        let key = Self::exec_key(id);

        let result = self.db.transaction::<_, _, LedgerError>(|tx_db| {
            let Some(existing_bytes) = tx_db.get(key.as_bytes())? else {
                return Ok(false);
            };
            let mut existing: Execution = bincode::deserialize(&existing_bytes)
                .map_err(|e| ConflictableTransactionError::Abort(e.into()))?;
            if existing.is_terminal() {
                return Ok(false);
            }

            existing.mark_cancelled(reason);
            let bytes = bincode::serialize(&existing)
                .map_err(|e| ConflictableTransactionError::Abort(e.into()))?;
            tx_db.insert(key.as_bytes(), bytes)?;
            Ok(true)
        });

        match result {
            Ok(cancelled) => Ok(cancelled),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Execution>, LedgerError> {
        let mut executions: Vec<Execution> = self
            .all_executions()?
            .into_iter()
            .filter(|e| e.user_id == user_id)
            .collect();
        executions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.key.cmp(&a.key)));
        Ok(executions)
    }

    async fn list_by_status(&self, status: ExecutionStatus) -> Result<Vec<Execution>, LedgerError> {
        let mut executions: Vec<Execution> = self
            .all_executions()?
            .into_iter()
            .filter(|e| e.status == status)
            .collect();
        executions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.key.cmp(&b.key)));
        Ok(executions)
    }

    async fn save_target(&self, target: &TargetResult) -> Result<(), LedgerError> {
        let key = Self::target_key(target.execution_key, target.seq);
        self.db.insert(key, bincode::serialize(target)?)?;
        Ok(())
    }

    async fn save_targets(&self, targets: &[TargetResult]) -> Result<(), LedgerError> {
        let mut batch = sled::Batch::default();
        for target in targets {
            let key = Self::target_key(target.execution_key, target.seq);
            batch.insert(key.as_bytes(), bincode::serialize(target)?);
        }
        self.db.apply_batch(batch)?;
        Ok(())
    }

    async fn targets_for(&self, execution_key: u64) -> Result<Vec<TargetResult>, LedgerError> {
        let mut targets = Vec::new();
        for item in self.db.scan_prefix(Self::target_prefix(execution_key)) {
            let (_key, value) = item?;
            targets.push(bincode::deserialize::<TargetResult>(&value)?);
        }
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn mk_exec(key: u64, id: &str, user: &str) -> Execution {
        Execution::new(
            key,
            ExecutionId::from(id),
            "SELECT 1",
            user,
            None,
            "{}".into(),
        )
    }

    #[tokio::test]
    async fn final_write_does_not_overwrite_cancel() {
        let dir = tempdir().unwrap();
        let store = SledLedgerStore::open(dir.path()).unwrap();

        let mut exec = mk_exec(1, "exec_a", "alice");
        exec.total_targets = 2;
        store.create_execution(&exec).await.unwrap();

        exec.mark_started();
        store.save_execution(&exec).await.unwrap();

        assert!(
            store
                .cancel_execution(&exec.id, "cancelled by user")
                .await
                .unwrap()
        );

        // The running loop keeps going and eventually writes COMPLETED.
        exec.increment_completed(7);
        exec.increment_completed(3);
        exec.consolidated_path = Some("/tmp/out.csv".into());
        exec.mark_completed();
        let stored = store.save_execution(&exec).await.unwrap();

        assert_eq!(stored.status, ExecutionStatus::Cancelled);
        assert_eq!(stored.error_message.as_deref(), Some("cancelled by user"));
        assert_eq!(stored.completed_targets, 2);
        assert_eq!(stored.total_rows, 10);
        assert_eq!(stored.consolidated_path.as_deref(), Some("/tmp/out.csv"));

        let loaded = store.load_execution(&exec.id).await.unwrap().unwrap();
        assert_eq!(loaded, stored);
    }

    #[tokio::test]
    async fn pending_execution_cannot_finish_without_running() {
        let store = SledLedgerStore::temporary().unwrap();
        let mut exec = mk_exec(1, "exec_skip", "frank");
        store.create_execution(&exec).await.unwrap();

        let mut skipped = exec.clone();
        skipped.mark_failed("worker pool closed");
        let stored = store.save_execution(&skipped).await.unwrap();
        assert_eq!(stored.status, ExecutionStatus::Pending);
        assert!(stored.error_message.is_none());

        exec.mark_started();
        store.save_execution(&exec).await.unwrap();
        exec.mark_failed("worker pool closed");
        let stored = store.save_execution(&exec).await.unwrap();
        assert_eq!(stored.status, ExecutionStatus::Failed);
        assert!(stored.started_at.is_some());
    }

    #[tokio::test]
    async fn cancel_rejects_terminal_and_unknown() {
        let store = SledLedgerStore::temporary().unwrap();

        let mut exec = mk_exec(1, "exec_done", "bob");
        store.create_execution(&exec).await.unwrap();
        exec.mark_started();
        store.save_execution(&exec).await.unwrap();
        exec.mark_completed();
        store.save_execution(&exec).await.unwrap();

        assert!(!store.cancel_execution(&exec.id, "late").await.unwrap());
        let loaded = store.load_execution(&exec.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Completed);

        assert!(
            !store
                .cancel_execution(&ExecutionId::from("exec_missing"), "x")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn create_refuses_duplicates() {
        let store = SledLedgerStore::temporary().unwrap();
        let exec = mk_exec(1, "exec_dup", "carol");
        store.create_execution(&exec).await.unwrap();
        assert!(matches!(
            store.create_execution(&exec).await,
            Err(LedgerError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn targets_come_back_in_plan_order() {
        let store = SledLedgerStore::temporary().unwrap();
        let exec = mk_exec(42, "exec_t", "dave");
        store.create_execution(&exec).await.unwrap();

        let targets: Vec<TargetResult> = (0..12)
            .map(|seq| TargetResult::pending(42, seq, 1, format!("db{seq}")))
            .collect();
        store.save_targets(&targets).await.unwrap();

        // Unrelated execution whose key shares a textual prefix.
        store
            .save_target(&TargetResult::pending(4, 0, 1, "other"))
            .await
            .unwrap();

        let mut second = targets[1].clone();
        second.record_failure("boom", 5);
        store.save_target(&second).await.unwrap();

        let loaded = store.targets_for(42).await.unwrap();
        assert_eq!(loaded.len(), 12);
        assert_eq!(loaded[1].error_message.as_deref(), Some("boom"));
        let seqs: Vec<u32> = loaded.iter().map(|t| t.seq).collect();
        assert_eq!(seqs, (0..12).collect::<Vec<_>>());

        assert_eq!(store.targets_for(4).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn listings_filter_and_order() {
        let store = SledLedgerStore::temporary().unwrap();

        let first = mk_exec(1, "exec_1", "erin");
        store.create_execution(&first).await.unwrap();
        let mut second = mk_exec(2, "exec_2", "erin");
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        second.mark_started();
        store.create_execution(&second).await.unwrap();
        store
            .create_execution(&mk_exec(3, "exec_3", "frank"))
            .await
            .unwrap();

        let mine: Vec<String> = store
            .list_by_user("erin")
            .await
            .unwrap()
            .iter()
            .map(|e| e.id.to_string())
            .collect();
        assert_eq!(mine, vec!["exec_2", "exec_1"]);

        let running = store.list_by_status(ExecutionStatus::Running).await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id.as_str(), "exec_2");

        let pending = store.list_by_status(ExecutionStatus::Pending).await.unwrap();
        assert_eq!(pending.len(), 2);
    }

    #[tokio::test]
    async fn keys_are_unique() {
        let store = SledLedgerStore::temporary().unwrap();
        let a = store.next_key().await.unwrap();
        let b = store.next_key().await.unwrap();
        assert_ne!(a, b);
    }
}
