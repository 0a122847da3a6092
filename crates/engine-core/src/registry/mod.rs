use crate::error::RegistryError;
use async_trait::async_trait;
use model::{
    cluster::{Cluster, DatabaseDescriptor},
    core::identifiers::ClusterId,
};

pub mod file;

/// Read access to the cluster inventory, plus the one mutation the engine
/// is allowed: refreshing a cluster's database list.
#[async_trait]
pub trait ClusterRegistry: Send + Sync {
    async fn get(&self, id: ClusterId) -> Result<Option<Cluster>, RegistryError>;

    /// Re-runs discovery and returns the refreshed cluster. An empty discovery
    /// leaves the known databases untouched and the cluster inactive.
    async fn rediscover(&self, id: ClusterId) -> Result<Cluster, RegistryError>;

    /// Known databases of the cluster in listing order.
    async fn list_databases(&self, id: ClusterId) -> Result<Vec<DatabaseDescriptor>, RegistryError>;

    /// Alias used in projections; falls back to `cluster-{id}` for unknown ids.
    async fn alias(&self, id: ClusterId) -> String {
        match self.get(id).await {
            Ok(Some(cluster)) => cluster.alias,
            _ => format!("cluster-{id}"),
        }
    }
}
