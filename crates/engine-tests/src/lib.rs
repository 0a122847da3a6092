#![allow(dead_code)]

use connectors::sql::{
    base::executor::ExecutorSettings,
    postgres::{
        executor::PgExecutor,
        utils::{connect_client, session_config},
    },
};
use model::cluster::{Cluster, DatabaseDescriptor};
use std::{env, time::Duration};

pub mod engine;
pub mod utils;

// Live Postgres used by the ignored integration tests
const PG_HOST: &str = "FANOUT_TEST_PG_HOST";
const PG_PORT: &str = "FANOUT_TEST_PG_PORT";
const PG_USER: &str = "FANOUT_TEST_PG_USER";
const PG_PASSWORD: &str = "FANOUT_TEST_PG_PASSWORD";
const PG_DATABASE: &str = "FANOUT_TEST_PG_DATABASE";

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn pg_database() -> String {
    var_or(PG_DATABASE, "testdb")
}

/// Cluster pointing at the test server.
pub fn pg_cluster() -> Cluster {
    Cluster {
        id: 1,
        alias: "local".into(),
        host: var_or(PG_HOST, "localhost"),
        port: var_or(PG_PORT, "5432").parse().expect("FANOUT_TEST_PG_PORT"),
        username: var_or(PG_USER, "user"),
        password: var_or(PG_PASSWORD, "password"),
        active: true,
        databases: vec![DatabaseDescriptor::accessible(pg_database())],
        description: Some("integration test server".into()),
    }
}

pub fn pg_executor(max_rows: usize) -> PgExecutor {
    PgExecutor::new(ExecutorSettings {
        connect_timeout: Duration::from_secs(5),
        query_timeout: Duration::from_secs(30),
        max_rows,
    })
}

/// Drop & recreate the fixture table with three known rows.
pub async fn reset_fixture_table() {
    let cluster = pg_cluster();
    let config = session_config(&cluster.connection(&pg_database()), Duration::from_secs(5));
    let client = connect_client(config).await.expect("connect postgres");
    client
        .batch_execute(
            r#"
            DROP TABLE IF EXISTS fanout_fixture;
            CREATE TABLE fanout_fixture (
                id BIGINT PRIMARY KEY,
                label VARCHAR(32),
                amount NUMERIC(12, 2),
                created_at TIMESTAMP NOT NULL,
                payload BYTEA,
                tags TEXT[]
            );
            INSERT INTO fanout_fixture VALUES
                (1, 'alpha', 10.50, '2024-01-15 10:30:00', '\x010203', ARRAY['a', 'b']),
                (2, 'beta', -3.25, '2024-02-01 00:00:00', NULL, ARRAY[]::TEXT[]),
                (3, NULL, 0, '2024-03-31 23:59:59.5', '\x', ARRAY['x', NULL]);
        "#,
        )
        .await
        .expect("reset fixture table");
}
