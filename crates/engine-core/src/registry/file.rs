use crate::{error::RegistryError, registry::ClusterRegistry};
use async_trait::async_trait;
use connectors::sql::base::executor::DatabaseExecutor;
use model::{
    cluster::{Cluster, DatabaseDescriptor},
    core::identifiers::ClusterId,
};
use std::{collections::BTreeMap, path::Path, sync::Arc};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Registry backed by a JSON inventory file. Discovery results live in
/// memory only.
pub struct FileClusterRegistry {
    clusters: RwLock<BTreeMap<ClusterId, Cluster>>,
    executor: Arc<dyn DatabaseExecutor>,
}

impl FileClusterRegistry {
    pub fn load(
        path: impl AsRef<Path>,
        executor: Arc<dyn DatabaseExecutor>,
    ) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let clusters: Vec<Cluster> = serde_json::from_str(&content)?;
        info!(path = %path.display(), clusters = clusters.len(), "Loaded cluster inventory");
        Self::from_clusters(clusters, executor)
    }

    pub fn from_clusters(
        clusters: Vec<Cluster>,
        executor: Arc<dyn DatabaseExecutor>,
    ) -> Result<Self, RegistryError> {
        let mut map = BTreeMap::new();
        for cluster in clusters {
            let id = cluster.id;
            if map.insert(id, cluster).is_some() {
                return Err(RegistryError::Duplicate(id));
            }
        }
        Ok(Self {
            clusters: RwLock::new(map),
            executor,
        })
    }

    pub async fn list(&self) -> Vec<Cluster> {
        self.clusters.read().await.values().cloned().collect()
    }

    pub fn executor(&self) -> &Arc<dyn DatabaseExecutor> {
        &self.executor
    }
}

#[async_trait]
impl ClusterRegistry for FileClusterRegistry {
    async fn get(&self, id: ClusterId) -> Result<Option<Cluster>, RegistryError> {
        Ok(self.clusters.read().await.get(&id).cloned())
    }

    async fn rediscover(&self, id: ClusterId) -> Result<Cluster, RegistryError> {
        let cluster = self.get(id).await?.ok_or(RegistryError::NotFound(id))?;

        let names = self
            .executor
            .discover_databases(&cluster)
            .await
            .map_err(|e| RegistryError::Discovery {
                cluster: cluster.alias.clone(),
                reason: e.to_string(),
            })?;

        let mut clusters = self.clusters.write().await;
        let entry = clusters.get_mut(&id).ok_or(RegistryError::NotFound(id))?;
        if names.is_empty() {
            warn!(cluster = %entry.alias, "Discovery returned no databases");
            return Ok(entry.clone());
        }

        info!(cluster = %entry.alias, databases = names.len(), "Rediscovered databases");
        entry.databases = names.into_iter().map(DatabaseDescriptor::accessible).collect();
        entry.active = true;
        Ok(entry.clone())
    }

    async fn list_databases(&self, id: ClusterId) -> Result<Vec<DatabaseDescriptor>, RegistryError> {
        self.clusters
            .read()
            .await
            .get(&id)
            .map(|c| c.databases.clone())
            .ok_or(RegistryError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectors::sql::base::{
        error::TargetExecutionError,
        executor::QueryOutcome,
    };
    use model::cluster::ConnectionDescriptor;

    struct ScriptedDiscovery(Result<Vec<String>, String>);

    #[async_trait]
    impl DatabaseExecutor for ScriptedDiscovery {
        async fn execute(
            &self,
            _connection: &ConnectionDescriptor,
            _sql: &str,
        ) -> Result<QueryOutcome, TargetExecutionError> {
            Ok(QueryOutcome::default())
        }

        async fn test_connection(
            &self,
            _connection: &ConnectionDescriptor,
        ) -> Result<(), TargetExecutionError> {
            Ok(())
        }

        async fn discover_databases(
            &self,
            _cluster: &Cluster,
        ) -> Result<Vec<String>, TargetExecutionError> {
            self.0.clone().map_err(TargetExecutionError::Connect)
        }
    }

    fn cluster(id: ClusterId, active: bool, dbs: &[&str]) -> Cluster {
        Cluster {
            id,
            alias: format!("c{id}"),
            host: "localhost".into(),
            port: 5432,
            username: "u".into(),
            password: "p".into(),
            active,
            databases: dbs.iter().map(|d| DatabaseDescriptor::accessible(*d)).collect(),
            description: None,
        }
    }

    #[tokio::test]
    async fn rediscovery_activates_and_replaces_databases() {
        let registry = FileClusterRegistry::from_clusters(
            vec![cluster(1, false, &["old"])],
            Arc::new(ScriptedDiscovery(Ok(vec!["a".into(), "b".into()]))),
        )
        .unwrap();

        let refreshed = registry.rediscover(1).await.unwrap();
        assert!(refreshed.active);
        let names: Vec<String> = registry
            .list_databases(1)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn empty_or_failed_discovery_keeps_cluster_inactive() {
        let registry = FileClusterRegistry::from_clusters(
            vec![cluster(1, false, &["old"])],
            Arc::new(ScriptedDiscovery(Ok(vec![]))),
        )
        .unwrap();
        let same = registry.rediscover(1).await.unwrap();
        assert!(!same.active);
        assert_eq!(same.databases.len(), 1);

        let failing = FileClusterRegistry::from_clusters(
            vec![cluster(1, false, &[])],
            Arc::new(ScriptedDiscovery(Err("refused".into()))),
        )
        .unwrap();
        assert!(matches!(
            failing.rediscover(1).await,
            Err(RegistryError::Discovery { .. })
        ));
    }

    #[tokio::test]
    async fn loads_inventory_file_and_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clusters.json");
        std::fs::write(
            &path,
            r#"[{"id": 7, "alias": "east", "host": "h", "port": 5432,
                 "username": "u", "password": "p", "databases": [{"name": "x"}]}]"#,
        )
        .unwrap();

        let executor: Arc<dyn DatabaseExecutor> = Arc::new(ScriptedDiscovery(Ok(vec![])));
        let registry = FileClusterRegistry::load(&path, executor.clone()).unwrap();
        assert_eq!(registry.alias(7).await, "east");
        assert_eq!(registry.alias(8).await, "cluster-8");

        let dup = FileClusterRegistry::from_clusters(
            vec![cluster(1, true, &[]), cluster(1, true, &[])],
            executor,
        );
        assert!(matches!(dup, Err(RegistryError::Duplicate(1))));
    }
}
