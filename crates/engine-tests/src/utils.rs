#![allow(dead_code)]

use async_trait::async_trait;
use connectors::sql::base::{
    error::TargetExecutionError,
    executor::{DatabaseExecutor, QueryOutcome},
};
use engine_config::settings::{EngineSettings, EngineSettingsBuilder};
use engine_core::{
    ledger::{LedgerStore, sled_store::SledLedgerStore},
    registry::{ClusterRegistry, file::FileClusterRegistry},
};
use engine_runtime::orchestrator::Orchestrator;
use model::{
    cluster::{Cluster, ConnectionDescriptor, DatabaseDescriptor},
    core::{identifiers::ClusterId, value::ScalarValue},
    execution::request::SubmitRequest,
    records::row::NormalizedRow,
};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};
use tempfile::TempDir;
use tracing::debug;

pub const TEST_USER: &str = "analyst-1";
pub const POLL: Duration = Duration::from_millis(10);

/// What the scripted executor does for one database.
#[derive(Debug, Clone)]
pub enum Script {
    /// Returns `n` rows of `(id, db)`.
    Rows(usize),
    /// Fails with a statement error.
    Fail(String),
    /// Fails with a connection error.
    Refuse(String),
    /// Sleeps, then returns `n` rows.
    Slow(Duration, usize),
}

/// In-memory stand-in for a database server fleet. Scripts are keyed by
/// database name; unscripted databases return one row.
#[derive(Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, Script>>,
    discovered: Mutex<HashMap<ClusterId, Vec<String>>>,
    calls: Mutex<Vec<String>>,
    max_rows: Option<usize>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_rows(max_rows: usize) -> Self {
        Self {
            max_rows: Some(max_rows),
            ..Self::default()
        }
    }

    pub fn script(self, database: &str, script: Script) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(database.to_string(), script);
        self
    }

    pub fn discovers(self, cluster: ClusterId, databases: &[&str]) -> Self {
        self.discovered
            .lock()
            .unwrap()
            .insert(cluster, databases.iter().map(|d| d.to_string()).collect());
        self
    }

    /// Databases executed against, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DatabaseExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        connection: &ConnectionDescriptor,
        _sql: &str,
    ) -> Result<QueryOutcome, TargetExecutionError> {
        self.calls
            .lock()
            .unwrap()
            .push(connection.database.clone());

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&connection.database)
            .cloned()
            .unwrap_or(Script::Rows(1));

        let count = match script {
            Script::Rows(n) => n,
            Script::Fail(msg) => return Err(TargetExecutionError::Statement(msg)),
            Script::Refuse(msg) => return Err(TargetExecutionError::Connect(msg)),
            Script::Slow(delay, n) => {
                tokio::time::sleep(delay).await;
                n
            }
        };

        let kept = self.max_rows.map_or(count, |cap| count.min(cap));
        Ok(QueryOutcome {
            columns: vec![Arc::from("id"), Arc::from("db")],
            rows: (0..kept).map(|i| row(i as i64, &connection.database)).collect(),
            elapsed: Duration::from_millis(1),
            truncated: kept < count,
        })
    }

    async fn test_connection(
        &self,
        connection: &ConnectionDescriptor,
    ) -> Result<(), TargetExecutionError> {
        match self.scripts.lock().unwrap().get(&connection.database) {
            Some(Script::Refuse(msg)) => Err(TargetExecutionError::Connect(msg.clone())),
            _ => Ok(()),
        }
    }

    async fn discover_databases(
        &self,
        cluster: &Cluster,
    ) -> Result<Vec<String>, TargetExecutionError> {
        Ok(self
            .discovered
            .lock()
            .unwrap()
            .get(&cluster.id)
            .cloned()
            .unwrap_or_default())
    }
}

fn row(id: i64, database: &str) -> NormalizedRow {
    [
        (Arc::from("id"), ScalarValue::Int(id)),
        (Arc::from("db"), ScalarValue::from(database)),
    ]
    .into_iter()
    .collect()
}

pub fn cluster(id: ClusterId, alias: &str, active: bool, databases: &[&str]) -> Cluster {
    Cluster {
        id,
        alias: alias.into(),
        host: format!("{alias}.db.internal"),
        port: 5432,
        username: "reader".into(),
        password: "secret".into(),
        active,
        databases: databases
            .iter()
            .map(|d| DatabaseDescriptor::accessible(*d))
            .collect(),
        description: None,
    }
}

pub fn request(sql: &str, clusters: &[ClusterId]) -> SubmitRequest {
    SubmitRequest {
        sql: sql.into(),
        cluster_ids: clusters.to_vec(),
        user_id: TEST_USER.into(),
        user_email: Some("analyst@example.com".into()),
        ..SubmitRequest::default()
    }
}

/// A running engine over a temporary ledger and result directory.
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub ledger: Arc<dyn LedgerStore>,
    pub registry: Arc<FileClusterRegistry>,
    pub executor: Arc<ScriptedExecutor>,
    pub settings: EngineSettings,
    pub dir: TempDir,
}

impl Harness {
    pub fn start(clusters: Vec<Cluster>, executor: ScriptedExecutor) -> Self {
        Self::start_with(clusters, executor, |builder| builder)
    }

    pub fn start_with(
        clusters: Vec<Cluster>,
        executor: ScriptedExecutor,
        configure: impl FnOnce(EngineSettingsBuilder) -> EngineSettingsBuilder,
    ) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = configure(
            EngineSettingsBuilder::new()
                .storage_path(dir.path().join("results"))
                .state_path(dir.path().join("state"))
                .worker_pool_size(2)
                .shutdown_grace(Duration::from_secs(5)),
        )
        .build()
        .expect("settings");

        let executor = Arc::new(executor);
        let registry = Arc::new(
            FileClusterRegistry::from_clusters(clusters, executor.clone()).expect("registry"),
        );
        let ledger: Arc<dyn LedgerStore> =
            Arc::new(SledLedgerStore::open(&settings.state_path).expect("ledger"));
        let orchestrator = Orchestrator::new(
            &settings,
            ledger.clone(),
            registry.clone() as Arc<dyn ClusterRegistry>,
            executor.clone(),
        )
        .expect("orchestrator");
        debug!(root = %dir.path().display(), "Test harness started");

        Self {
            orchestrator,
            ledger,
            registry,
            executor,
            settings,
            dir,
        }
    }

    pub fn results_root(&self) -> &Path {
        &self.settings.storage_path
    }
}

/// Lines of a CSV file, without the trailing empty line.
pub fn read_lines(path: impl AsRef<Path>) -> Vec<String> {
    fs::read_to_string(path)
        .expect("read csv")
        .lines()
        .map(str::to_string)
        .collect()
}

/// Files directly under `dir`, sorted by name.
pub fn files_in(dir: impl AsRef<Path>) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok().map(|e| e.path())).collect())
        .unwrap_or_default();
    files.sort();
    files
}
