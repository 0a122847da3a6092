use crate::error::WorkerError;
use async_trait::async_trait;
use model::core::identifiers::ExecutionId;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Something that can drive a queued execution to completion.
#[async_trait]
pub trait ExecutionRunner: Send + Sync + 'static {
    async fn run_execution(&self, id: ExecutionId);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every worker finished within the grace period.
    pub drained: bool,
    /// Workers that had to be aborted.
    pub aborted: usize,
}

/// Fixed set of worker loops pulling execution ids from one bounded queue.
/// Each worker runs one execution at a time.
pub struct WorkerPool {
    tx: Mutex<Option<mpsc::Sender<ExecutionId>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    grace: Duration,
}

impl WorkerPool {
    pub fn start(
        size: usize,
        queue_capacity: usize,
        grace: Duration,
        runner: Arc<dyn ExecutionRunner>,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<ExecutionId>(queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let cancel = CancellationToken::new();

        let handles = (0..size.max(1))
            .map(|worker| spawn_worker(worker, Arc::clone(&rx), Arc::clone(&runner), cancel.clone()))
            .collect();

        info!(workers = size.max(1), queue_capacity, "Worker pool started");
        Self {
            tx: Mutex::new(Some(tx)),
            handles: Mutex::new(handles),
            cancel,
            grace,
        }
    }

    /// Queues an execution, waiting for room when the queue is full.
    pub async fn submit(&self, id: ExecutionId) -> Result<(), WorkerError> {
        let tx = self
            .tx
            .lock()
            .await
            .as_ref()
            .cloned()
            .ok_or(WorkerError::QueueClosed)?;
        tx.send(id).await.map_err(|_| WorkerError::QueueClosed)
    }

    /// Closes the queue, lets workers finish queued work for up to the grace
    /// period, then cancels and aborts whatever is left.
    pub async fn shutdown(&self) -> ShutdownReport {
        drop(self.tx.lock().await.take());
        let mut handles = std::mem::take(&mut *self.handles.lock().await);

        let drained = tokio::time::timeout(self.grace, async {
            for handle in handles.iter_mut() {
                let _ = handle.await;
            }
        })
        .await
        .is_ok();

        let mut aborted = 0;
        if !drained {
            warn!(grace_secs = self.grace.as_secs(), "Workers still busy after grace period, aborting");
            self.cancel.cancel();
            for handle in &handles {
                if !handle.is_finished() {
                    handle.abort();
                    aborted += 1;
                }
            }
        }

        info!(drained, aborted, "Worker pool stopped");
        ShutdownReport { drained, aborted }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

fn spawn_worker(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<ExecutionId>>>,
    runner: Arc<dyn ExecutionRunner>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => None,
                id = async { rx.lock().await.recv().await } => id,
            };
            let Some(id) = next else {
                break;
            };

            debug!(worker, execution_id = %id, "Worker picked up execution");
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!(worker, execution_id = %id, "Execution interrupted by shutdown");
                    break;
                }
                _ = runner.run_execution(id.clone()) => {}
            }
        }
        debug!(worker, "Worker stopped");
    })
}
