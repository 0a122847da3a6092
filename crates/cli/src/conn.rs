use crate::error::CliError;
use engine_core::registry::{ClusterRegistry, file::FileClusterRegistry};
use model::cluster::Cluster;
use tracing::{error, info};

/// Opens a session against one database of the cluster and runs the
/// validation query. Without `database` the first accessible one is used.
pub async fn ping_cluster(
    registry: &FileClusterRegistry,
    cluster_id: u64,
    database: Option<String>,
) -> Result<(), CliError> {
    let cluster = lookup(registry, cluster_id).await?;
    let database = match database {
        Some(database) => database,
        None => cluster
            .accessible_databases()
            .next()
            .map(|d| d.name.clone())
            .ok_or_else(|| {
                CliError::Config(format!(
                    "cluster {} has no known databases, pass --database",
                    cluster.alias
                ))
            })?,
    };

    let connection = cluster.connection(&database);
    info!("Pinging Postgres at '{connection}'");
    match registry.executor().test_connection(&connection).await {
        Ok(()) => {
            info!("Postgres connection OK");
            Ok(())
        }
        Err(err) => {
            error!("Postgres connection failed: {err}");
            Err(err.into())
        }
    }
}

/// Re-runs discovery and returns the refreshed cluster.
pub async fn rediscover(registry: &FileClusterRegistry, cluster_id: u64) -> Result<Cluster, CliError> {
    lookup(registry, cluster_id).await?;
    let cluster = registry.rediscover(cluster_id).await?;
    info!(
        cluster = %cluster.alias,
        active = cluster.active,
        databases = cluster.databases.len(),
        "Discovery finished"
    );
    Ok(cluster)
}

async fn lookup(registry: &FileClusterRegistry, cluster_id: u64) -> Result<Cluster, CliError> {
    registry
        .get(cluster_id)
        .await?
        .ok_or(CliError::UnknownCluster(cluster_id))
}
