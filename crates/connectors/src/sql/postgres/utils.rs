use crate::sql::base::error::ConnectorError;
use model::cluster::ConnectionDescriptor;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::{future::Future, time::Duration};
use tokio_postgres::{Client, Config, NoTls, config::SslMode};
use tracing::{debug, error, warn};

const APPLICATION_NAME: &str = "fanout";

/// Session parameters for one target database.
pub fn session_config(conn: &ConnectionDescriptor, connect_timeout: Duration) -> Config {
    let mut config = Config::new();
    config
        .host(&conn.host)
        .port(conn.port)
        .dbname(&conn.database)
        .user(&conn.username)
        .password(&conn.password)
        .application_name(APPLICATION_NAME)
        .connect_timeout(connect_timeout)
        .ssl_mode(SslMode::Prefer);
    config
}

/// Opens a session honouring the configured SSL mode. `Prefer` retries in
/// plain text when the TLS handshake itself fails.
pub async fn connect_client(config: Config) -> Result<Client, ConnectorError> {
    match config.get_ssl_mode() {
        SslMode::Disable => connect_plain(&config).await,
        SslMode::Prefer => match connect_tls(&config).await {
            Ok(client) => Ok(client),
            Err(error) => {
                warn!(%error, "Postgres TLS handshake failed, retrying without TLS");
                connect_plain(&config).await
            }
        },
        _ => connect_tls(&config).await,
    }
}

async fn connect_tls(config: &Config) -> Result<Client, ConnectorError> {
    let tls = MakeTlsConnector::new(TlsConnector::builder().build()?);
    let (client, connection) = config.connect(tls).await?;
    drive(connection);
    Ok(client)
}

async fn connect_plain(config: &Config) -> Result<Client, ConnectorError> {
    let (client, connection) = config.connect(NoTls).await?;
    drive(connection);
    Ok(client)
}

/// The connection future does the actual socket I/O and must be polled for
/// the client to make progress; it ends when the client is dropped.
fn drive<F>(connection: F)
where
    F: Future<Output = Result<(), tokio_postgres::Error>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(%err, "Postgres connection error");
        }
        debug!("Postgres session closed");
    });
}
