use crate::sql::{
    base::{
        error::TargetExecutionError,
        executor::{DatabaseExecutor, ExecutorSettings, QueryOutcome},
    },
    postgres::{
        decoder::decode_row,
        utils::{connect_client, session_config},
    },
};
use async_trait::async_trait;
use futures_util::{TryStreamExt, pin_mut};
use model::cluster::{Cluster, ConnectionDescriptor};
use std::{sync::Arc, time::Instant};
use tokio::time::timeout;
use tokio_postgres::{Client, IsolationLevel, error::SqlState};
use tracing::{debug, warn};

const QUERY_LIST_DATABASES_SQL: &str = include_str!("sql/list_databases.sql");
const VALIDATION_QUERY: &str = "SELECT 1";
const MAINTENANCE_DATABASE: &str = "postgres";

/// Opens one dedicated session per call; sessions are never reused.
#[derive(Debug, Clone, Default)]
pub struct PgExecutor {
    settings: ExecutorSettings,
}

impl PgExecutor {
    pub fn new(settings: ExecutorSettings) -> Self {
        Self { settings }
    }

    async fn open(&self, conn: &ConnectionDescriptor) -> Result<Client, TargetExecutionError> {
        let config = session_config(conn, self.settings.connect_timeout);
        let client = timeout(self.settings.connect_timeout, connect_client(config))
            .await
            .map_err(|_| {
                TargetExecutionError::Connect(format!(
                    "timed out after {}s connecting to {conn}",
                    self.settings.connect_timeout.as_secs()
                ))
            })??;

        timeout(
            self.settings.connect_timeout,
            client.simple_query(VALIDATION_QUERY),
        )
        .await
        .map_err(|_| TargetExecutionError::Validation(format!("{conn} did not answer in time")))?
        .map_err(|e| TargetExecutionError::Validation(e.to_string()))?;

        Ok(client)
    }

    async fn fetch(
        &self,
        client: &mut Client,
        sql: &str,
    ) -> Result<QueryOutcome, TargetExecutionError> {
        let tx = client
            .build_transaction()
            .isolation_level(IsolationLevel::ReadCommitted)
            .read_only(true)
            .start()
            .await
            .map_err(|e| self.statement_error(e))?;

        tx.batch_execute(&format!(
            "SET LOCAL statement_timeout = {}",
            self.settings.query_timeout.as_millis()
        ))
        .await
        .map_err(|e| self.statement_error(e))?;

        let stmt = tx.prepare(sql).await.map_err(|e| self.statement_error(e))?;
        let columns: Vec<Arc<str>> = stmt.columns().iter().map(|c| Arc::from(c.name())).collect();

        let mut outcome = QueryOutcome {
            columns,
            ..QueryOutcome::default()
        };

        // The portal asks the server for one row past the cap, so a huge
        // result stops streaming there and the extra row only marks truncation.
        let portal = tx.bind(&stmt, &[]).await.map_err(|e| self.statement_error(e))?;
        {
            let stream = tx
                .query_portal_raw(&portal, portal_fetch_size(self.settings.max_rows))
                .await
                .map_err(|e| self.statement_error(e))?;
            pin_mut!(stream);

            while let Some(row) = stream.try_next().await.map_err(|e| self.statement_error(e))? {
                if outcome.rows.len() >= self.settings.max_rows {
                    outcome.truncated = true;
                    break;
                }
                outcome.rows.push(decode_row(&row, &outcome.columns)?);
            }
        }

        if outcome.truncated {
            warn!(
                max_rows = self.settings.max_rows,
                "Row cap reached, remaining rows dropped"
            );
        }

        tx.rollback().await.map_err(|e| self.statement_error(e))?;
        Ok(outcome)
    }

    fn statement_error(&self, err: tokio_postgres::Error) -> TargetExecutionError {
        if err.code() == Some(&SqlState::QUERY_CANCELED) {
            return TargetExecutionError::Timeout(self.settings.query_timeout);
        }
        match err.as_db_error() {
            Some(db) => TargetExecutionError::Statement(db.message().to_string()),
            None => TargetExecutionError::Statement(err.to_string()),
        }
    }
}

/// Rows requested from the portal: the cap plus one sentinel row.
fn portal_fetch_size(max_rows: usize) -> i32 {
    i32::try_from(max_rows.saturating_add(1)).unwrap_or(i32::MAX)
}

#[async_trait]
impl DatabaseExecutor for PgExecutor {
    async fn execute(
        &self,
        connection: &ConnectionDescriptor,
        sql: &str,
    ) -> Result<QueryOutcome, TargetExecutionError> {
        let started = Instant::now();
        let mut client = self.open(connection).await?;

        let mut outcome = timeout(self.settings.query_timeout, self.fetch(&mut client, sql))
            .await
            .map_err(|_| TargetExecutionError::Timeout(self.settings.query_timeout))??;
        outcome.elapsed = started.elapsed();

        debug!(
            target = %connection,
            rows = outcome.rows.len(),
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "Statement finished"
        );
        Ok(outcome)
    }

    async fn test_connection(
        &self,
        connection: &ConnectionDescriptor,
    ) -> Result<(), TargetExecutionError> {
        self.open(connection).await.map(|_| ())
    }

    async fn discover_databases(
        &self,
        cluster: &Cluster,
    ) -> Result<Vec<String>, TargetExecutionError> {
        let conn = cluster.connection(MAINTENANCE_DATABASE);
        let client = self.open(&conn).await?;

        let rows = timeout(
            self.settings.query_timeout,
            client.query(QUERY_LIST_DATABASES_SQL, &[]),
        )
        .await
        .map_err(|_| TargetExecutionError::Timeout(self.settings.query_timeout))?
        .map_err(|e| self.statement_error(e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<_, String>(0)
                    .map_err(|e| TargetExecutionError::Decode {
                        column: "datname".into(),
                        reason: e.to_string(),
                    })
            })
            .collect()
    }
}
