use crate::{
    error::{EngineError, ValidationError},
    execution::{
        executor::FanOutExecutor,
        workers::{ShutdownReport, WorkerPool},
    },
    validation::validate_request,
};
use connectors::{
    file::csv::sink::{CsvResultSink, FileInfo, PurgeReport},
    sql::base::executor::DatabaseExecutor,
};
use engine_config::settings::EngineSettings;
use engine_core::{ledger::LedgerStore, registry::ClusterRegistry};
use model::{
    core::identifiers::{ClusterId, ExecutionId},
    execution::{
        execution::Execution,
        plan::PlanParameters,
        request::SubmitRequest,
        status::ExecutionStatus,
        view::{ExecutionView, TargetView},
    },
};
use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, warn};

const CANCELLED_BY_USER: &str = "cancelled by user";
const INTERRUPTED_BY_SHUTDOWN: &str = "interrupted by shutdown";

/// Entry point for callers: accepts submissions, hands them to the worker
/// pool and answers status, cancel, download and retention requests.
pub struct Orchestrator {
    ledger: Arc<dyn LedgerStore>,
    registry: Arc<dyn ClusterRegistry>,
    sink: CsvResultSink,
    pool: WorkerPool,
    retention_days: u32,
}

impl Orchestrator {
    /// Builds the result sink, the fan-out executor and the worker pool.
    /// Must be called inside a Tokio runtime.
    pub fn new(
        settings: &EngineSettings,
        ledger: Arc<dyn LedgerStore>,
        registry: Arc<dyn ClusterRegistry>,
        executor: Arc<dyn DatabaseExecutor>,
    ) -> Result<Self, EngineError> {
        settings.validate()?;
        let sink = CsvResultSink::new(settings.csv_settings())?;

        let fan_out = Arc::new(FanOutExecutor::new(
            Arc::clone(&ledger),
            Arc::clone(&registry),
            executor,
            sink.clone(),
        ));
        let pool = WorkerPool::start(
            settings.worker_pool_size,
            settings.queue_capacity,
            settings.shutdown_grace,
            fan_out,
        );

        Ok(Self {
            ledger,
            registry,
            sink,
            pool,
            retention_days: settings.retention_days,
        })
    }

    /// Validates and records the submission, queues it and returns the
    /// PENDING projection without waiting for any target.
    pub async fn submit(&self, request: SubmitRequest) -> Result<ExecutionView, EngineError> {
        validate_request(&request)?;
        for &id in &request.cluster_ids {
            if self.registry.get(id).await?.is_none() {
                return Err(ValidationError::UnknownCluster(id).into());
            }
        }

        let params = PlanParameters::new(
            &request.cluster_ids,
            request.database_names,
            request.description,
            &request.sql,
        );
        let execution = Execution::new(
            self.ledger.next_key().await?,
            ExecutionId::generate(),
            request.sql,
            request.user_id,
            request.user_email,
            params.to_json()?,
        );
        self.ledger.create_execution(&execution).await?;
        info!(
            execution_id = %execution.id,
            user = %execution.user_id,
            clusters = params.cluster_ids.len(),
            "Execution submitted"
        );

        if let Err(err) = self.pool.submit(execution.id.clone()).await {
            self.fail_unfinished(execution.clone(), &err.to_string()).await?;
            return Err(err.into());
        }

        Ok(ExecutionView::new(&execution, Vec::new()))
    }

    pub async fn status(&self, id: &ExecutionId) -> Result<ExecutionView, EngineError> {
        let execution = self.load(id).await?;
        self.project(&execution).await
    }

    pub async fn list_by_user(&self, user_id: &str) -> Result<Vec<ExecutionView>, EngineError> {
        let executions = self.ledger.list_by_user(user_id).await?;
        self.project_all(&executions).await
    }

    pub async fn running(&self) -> Result<Vec<ExecutionView>, EngineError> {
        let executions = self.ledger.list_by_status(ExecutionStatus::Running).await?;
        self.project_all(&executions).await
    }

    pub async fn pending(&self) -> Result<Vec<ExecutionView>, EngineError> {
        let executions = self.ledger.list_by_status(ExecutionStatus::Pending).await?;
        self.project_all(&executions).await
    }

    /// Returns false when the execution is unknown or already terminal.
    pub async fn cancel(&self, id: &ExecutionId) -> Result<bool, EngineError> {
        let cancelled = self.ledger.cancel_execution(id, CANCELLED_BY_USER).await?;
        if cancelled {
            info!(execution_id = %id, "Execution cancelled");
        } else {
            warn!(execution_id = %id, "Cancel rejected, execution unknown or finished");
        }
        Ok(cancelled)
    }

    /// Bytes of the consolidated result file.
    pub async fn download(&self, id: &ExecutionId) -> Result<Vec<u8>, EngineError> {
        let execution = self.load(id).await?;
        let path = execution
            .consolidated_path
            .map(PathBuf::from)
            .ok_or_else(|| EngineError::NotFound(format!("consolidated result for {id}")))?;

        let sink = self.sink.clone();
        Ok(tokio::task::spawn_blocking(move || sink.read_bytes(&path)).await??)
    }

    /// Deletes result directories older than `days`, or the configured
    /// retention when not given.
    pub async fn purge(&self, days: Option<u32>) -> Result<PurgeReport, EngineError> {
        let days = days.unwrap_or(self.retention_days);
        let sink = self.sink.clone();
        Ok(tokio::task::spawn_blocking(move || sink.purge_older_than(days)).await??)
    }

    /// Polls the ledger until the execution reaches a terminal state.
    pub async fn wait_for(
        &self,
        id: &ExecutionId,
        poll_interval: Duration,
    ) -> Result<ExecutionView, EngineError> {
        loop {
            let execution = self.load(id).await?;
            if execution.is_terminal() {
                return self.project(&execution).await;
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Result files written so far for an execution, in name order.
    pub async fn files(&self, id: &ExecutionId) -> Result<Vec<FileInfo>, EngineError> {
        self.load(id).await?;
        let sink = self.sink.clone();
        let id = id.clone();
        Ok(tokio::task::spawn_blocking(move || {
            sink.list_execution_files(&id)?
                .iter()
                .map(|path| sink.file_info(path))
                .collect::<Result<Vec<_>, _>>()
        })
        .await??)
    }

    /// Drains the worker pool. Executions left RUNNING or PENDING can no
    /// longer progress and are marked FAILED.
    pub async fn shutdown(&self) -> Result<ShutdownReport, EngineError> {
        let report = self.pool.shutdown().await;

        let mut orphaned = self.ledger.list_by_status(ExecutionStatus::Running).await?;
        orphaned.extend(self.ledger.list_by_status(ExecutionStatus::Pending).await?);
        for execution in orphaned {
            warn!(execution_id = %execution.id, status = %execution.status, "Marking interrupted execution as failed");
            self.fail_unfinished(execution, INTERRUPTED_BY_SHUTDOWN).await?;
        }
        Ok(report)
    }

    /// Fails an execution no worker will run. A PENDING execution is first
    /// stored as RUNNING, since only RUNNING may become FAILED.
    async fn fail_unfinished(&self, mut execution: Execution, reason: &str) -> Result<(), EngineError> {
        if execution.status == ExecutionStatus::Pending {
            execution.mark_started();
            execution = self.ledger.save_execution(&execution).await?;
            if execution.is_terminal() {
                return Ok(());
            }
        }
        execution.mark_failed(reason);
        self.ledger.save_execution(&execution).await?;
        Ok(())
    }

    async fn load(&self, id: &ExecutionId) -> Result<Execution, EngineError> {
        self.ledger
            .load_execution(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("execution {id}")))
    }

    async fn project(&self, execution: &Execution) -> Result<ExecutionView, EngineError> {
        let mut aliases = HashMap::new();
        self.project_with(execution, &mut aliases).await
    }

    async fn project_all(&self, executions: &[Execution]) -> Result<Vec<ExecutionView>, EngineError> {
        let mut aliases = HashMap::new();
        let mut views = Vec::with_capacity(executions.len());
        for execution in executions {
            views.push(self.project_with(execution, &mut aliases).await?);
        }
        Ok(views)
    }

    async fn project_with(
        &self,
        execution: &Execution,
        aliases: &mut HashMap<ClusterId, String>,
    ) -> Result<ExecutionView, EngineError> {
        let targets = self.ledger.targets_for(execution.key).await?;
        let mut views = Vec::with_capacity(targets.len());
        for target in &targets {
            let alias = match aliases.get(&target.cluster_id) {
                Some(alias) => alias.clone(),
                None => {
                    let alias = self.registry.alias(target.cluster_id).await;
                    aliases.insert(target.cluster_id, alias.clone());
                    alias
                }
            };
            views.push(TargetView::new(target, alias));
        }
        Ok(ExecutionView::new(execution, views))
    }
}
