use crate::{error::EngineError, execution::workers::ExecutionRunner};
use async_trait::async_trait;
use chrono::Utc;
use connectors::{
    file::csv::sink::CsvResultSink,
    sql::base::executor::{DatabaseExecutor, QueryOutcome},
};
use engine_core::{ledger::LedgerStore, plan::resolver::PlanResolver, registry::ClusterRegistry};
use model::{
    core::identifiers::ExecutionId,
    execution::{execution::Execution, plan::PlannedTarget, target::TargetResult},
};
use std::{path::PathBuf, sync::Arc};
use tracing::{error, info, warn};

/// Runs one execution: resolves its targets, runs the statement against each
/// target in plan order, writes per-target files and the consolidated file,
/// and keeps the ledger current after every target.
pub struct FanOutExecutor {
    ledger: Arc<dyn LedgerStore>,
    resolver: PlanResolver,
    executor: Arc<dyn DatabaseExecutor>,
    sink: CsvResultSink,
}

impl FanOutExecutor {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        registry: Arc<dyn ClusterRegistry>,
        executor: Arc<dyn DatabaseExecutor>,
        sink: CsvResultSink,
    ) -> Self {
        Self {
            ledger,
            resolver: PlanResolver::new(registry),
            executor,
            sink,
        }
    }

    /// Drives the execution to a terminal state and returns what the ledger
    /// holds afterwards.
    pub async fn run(&self, id: &ExecutionId) -> Result<Execution, EngineError> {
        let mut execution = self
            .ledger
            .load_execution(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        if execution.is_terminal() {
            info!(execution_id = %id, status = %execution.status, "Execution already finished, skipping");
            return Ok(execution);
        }

        execution.mark_started();
        let stored = self.ledger.save_execution(&execution).await?;
        if stored.is_terminal() {
            info!(execution_id = %id, status = %stored.status, "Execution finished before start");
            return Ok(stored);
        }
        info!(execution_id = %id, user = %execution.user_id, "Execution started");

        match self.execute_plan(&mut execution).await {
            Ok(()) => execution.mark_completed(),
            Err(err) => {
                error!(execution_id = %id, %err, "Execution failed");
                execution.mark_failed(err.to_string());
            }
        }

        let stored = self.ledger.save_execution(&execution).await?;
        info!(
            execution_id = %id,
            status = %stored.status,
            completed = stored.completed_targets,
            failed = stored.failed_targets,
            rows = stored.total_rows,
            duration_ms = stored.duration_ms.unwrap_or_default(),
            "Execution finished"
        );
        Ok(stored)
    }

    async fn execute_plan(&self, execution: &mut Execution) -> Result<(), EngineError> {
        let planned = self.resolver.resolve_metadata(&execution.metadata).await?;

        let mut records: Vec<TargetResult> = planned
            .iter()
            .enumerate()
            .map(|(seq, target)| {
                TargetResult::pending(execution.key, seq as u32, target.cluster.id, &target.database)
            })
            .collect();
        self.ledger.save_targets(&records).await?;

        execution.total_targets = records.len() as u32;
        self.ledger.save_execution(execution).await?;

        for (target, record) in planned.iter().zip(records.iter_mut()) {
            self.run_target(execution, target, record).await;
            self.ledger.save_target(record).await?;
            self.ledger.save_execution(execution).await?;
        }

        if execution.total_rows > 0 {
            match self.consolidate(&execution.id).await {
                Ok(Some(path)) => execution.consolidated_path = Some(path.display().to_string()),
                Ok(None) => {}
                Err(err) => warn!(execution_id = %execution.id, %err, "Consolidation failed"),
            }
        }
        Ok(())
    }

    /// Records the outcome of one target on `record` and the execution's
    /// counters. Never fails: every problem becomes a failed target.
    async fn run_target(&self, execution: &mut Execution, target: &PlannedTarget, record: &mut TargetResult) {
        let alias = target.cluster.alias.as_str();

        if let Some(reason) = &target.preset_failure {
            warn!(execution_id = %execution.id, cluster = %alias, database = %target.database, %reason, "Target skipped");
            record.record_failure(reason.clone(), execution.elapsed_ms(Utc::now()));
            execution.increment_failed();
            return;
        }

        let connection = target.cluster.connection(&target.database);
        match self.executor.execute(&connection, &execution.sql).await {
            Ok(outcome) => {
                let rows = outcome.row_count();
                let duration_ms = outcome.elapsed.as_millis() as u64;

                match self.write_rows(&execution.id, alias, &target.database, outcome).await {
                    Ok(path) => {
                        info!(
                            execution_id = %execution.id,
                            cluster = %alias,
                            database = %target.database,
                            rows,
                            duration_ms,
                            "Target completed"
                        );
                        record.record_success(rows, duration_ms, path.map(|p| p.display().to_string()));
                        execution.increment_completed(rows);
                    }
                    Err(err) => {
                        error!(execution_id = %execution.id, cluster = %alias, database = %target.database, %err, "Failed to store target rows");
                        record.record_failure(err.to_string(), duration_ms);
                        execution.increment_failed();
                    }
                }
            }
            Err(err) => {
                error!(execution_id = %execution.id, cluster = %alias, database = %target.database, %err, "Target failed");
                record.record_failure(err.to_string(), execution.elapsed_ms(Utc::now()));
                execution.increment_failed();
            }
        }
    }

    async fn write_rows(
        &self,
        id: &ExecutionId,
        alias: &str,
        database: &str,
        outcome: QueryOutcome,
    ) -> Result<Option<PathBuf>, EngineError> {
        if outcome.rows.is_empty() {
            return Ok(None);
        }

        let sink = self.sink.clone();
        let (id, alias, database) = (id.clone(), alias.to_string(), database.to_string());
        let path = tokio::task::spawn_blocking(move || {
            sink.write(&id, &alias, &database, &outcome.columns, &outcome.rows)
        })
        .await??;
        Ok(path)
    }

    async fn consolidate(&self, id: &ExecutionId) -> Result<Option<PathBuf>, EngineError> {
        let sink = self.sink.clone();
        let id = id.clone();
        Ok(tokio::task::spawn_blocking(move || sink.consolidate(&id)).await??)
    }
}

#[async_trait]
impl ExecutionRunner for FanOutExecutor {
    async fn run_execution(&self, id: ExecutionId) {
        if let Err(err) = self.run(&id).await {
            error!(execution_id = %id, %err, "Execution could not be driven to completion");
        }
    }
}
