use crate::{error::PlanResolutionError, registry::ClusterRegistry};
use model::{
    cluster::Cluster,
    execution::plan::{PlanParameters, PlannedTarget},
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Expands stored plan parameters into the ordered list of (cluster,
/// database) targets.
#[derive(Clone)]
pub struct PlanResolver {
    registry: Arc<dyn ClusterRegistry>,
}

impl PlanResolver {
    pub fn new(registry: Arc<dyn ClusterRegistry>) -> Self {
        Self { registry }
    }

    /// Decodes the execution's metadata blob and resolves it.
    pub async fn resolve_metadata(
        &self,
        metadata: &str,
    ) -> Result<Vec<PlannedTarget>, PlanResolutionError> {
        let params = PlanParameters::from_json(metadata)?;
        self.resolve(&params).await
    }

    /// Targets come out grouped by cluster in submission order, databases in
    /// the registry's listing order.
    pub async fn resolve(
        &self,
        params: &PlanParameters,
    ) -> Result<Vec<PlannedTarget>, PlanResolutionError> {
        let mut targets = Vec::new();

        for &id in &params.cluster_ids {
            let cluster = self
                .registry
                .get(id)
                .await?
                .ok_or(PlanResolutionError::UnknownCluster(id))?;

            if cluster.active {
                self.push_active(&cluster, params, &mut targets).await?;
                continue;
            }

            warn!(cluster = %cluster.alias, "Cluster inactive, rediscovering databases");
            match self.registry.rediscover(id).await {
                Ok(refreshed) if refreshed.active => {
                    self.push_active(&refreshed, params, &mut targets).await?;
                }
                Ok(refreshed) => {
                    Self::push_inactive(refreshed, params, "discovery found no databases", &mut targets);
                }
                Err(err) => {
                    Self::push_inactive(cluster, params, &err.to_string(), &mut targets);
                }
            }
        }

        if targets.is_empty() {
            return Err(PlanResolutionError::NoTargets);
        }

        info!(targets = targets.len(), clusters = params.cluster_ids.len(), "Resolved execution plan");
        Ok(targets)
    }

    async fn push_active(
        &self,
        cluster: &Cluster,
        params: &PlanParameters,
        targets: &mut Vec<PlannedTarget>,
    ) -> Result<(), PlanResolutionError> {
        let cluster_ref = Arc::new(cluster.clone());
        let databases = self.registry.list_databases(cluster.id).await?;

        let before = targets.len();
        for db in databases {
            if !db.accessible {
                debug!(cluster = %cluster.alias, database = %db.name, "Skipping inaccessible database");
                continue;
            }
            if params.admits(&db.name) {
                targets.push(PlannedTarget::new(Arc::clone(&cluster_ref), db.name));
            }
        }

        if targets.len() == before {
            warn!(cluster = %cluster.alias, "No database of the cluster matched the submission");
        }
        Ok(())
    }

    /// A cluster that stays inactive yields one failed target per known
    /// matching database, or nothing if none are known.
    fn push_inactive(
        cluster: Cluster,
        params: &PlanParameters,
        reason: &str,
        targets: &mut Vec<PlannedTarget>,
    ) {
        let message = format!("cluster {} is inactive: {reason}", cluster.alias);
        let names: Vec<String> = cluster
            .accessible_databases()
            .filter(|db| params.admits(&db.name))
            .map(|db| db.name.clone())
            .collect();

        if names.is_empty() {
            warn!(cluster = %cluster.alias, %reason, "Skipping inactive cluster without known databases");
            return;
        }

        let cluster = Arc::new(cluster);
        for name in names {
            targets.push(PlannedTarget::failed(Arc::clone(&cluster), name, message.clone()));
        }
    }
}
