use crate::{
    cluster::Cluster,
    core::identifiers::ClusterId,
    execution::errors::ModelError,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Resolution inputs stored on the execution at submission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanParameters {
    pub cluster_ids: Vec<ClusterId>,
    #[serde(default)]
    pub database_filter: Option<Vec<String>>,
    #[serde(default)]
    pub description: Option<String>,
    pub sql_length: usize,
    pub submitted_at: DateTime<Utc>,
}

impl PlanParameters {
    /// Duplicate cluster ids keep their first position; an empty filter
    /// means "every accessible database".
    pub fn new(
        cluster_ids: &[ClusterId],
        database_filter: Option<Vec<String>>,
        description: Option<String>,
        sql: &str,
    ) -> Self {
        let mut ids = Vec::with_capacity(cluster_ids.len());
        for id in cluster_ids {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }

        Self {
            cluster_ids: ids,
            database_filter: database_filter.filter(|names| !names.is_empty()),
            description,
            sql_length: sql.len(),
            submitted_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String, ModelError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Exact-name match against the filter; no filter admits everything.
    pub fn admits(&self, database: &str) -> bool {
        match &self.database_filter {
            Some(names) if !names.is_empty() => names.iter().any(|n| n == database),
            _ => true,
        }
    }
}

/// One (cluster, database) pair the statement will run against.
#[derive(Debug, Clone)]
pub struct PlannedTarget {
    pub cluster: Arc<Cluster>,
    pub database: String,
    /// Set when the target is known to fail before execution.
    pub preset_failure: Option<String>,
}

impl PlannedTarget {
    pub fn new(cluster: Arc<Cluster>, database: impl Into<String>) -> Self {
        Self {
            cluster,
            database: database.into(),
            preset_failure: None,
        }
    }

    pub fn failed(cluster: Arc<Cluster>, database: impl Into<String>, reason: String) -> Self {
        Self {
            cluster,
            database: database.into(),
            preset_failure: Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedups_ids_and_drops_empty_filter() {
        let params = PlanParameters::new(&[3, 1, 3, 2, 1], Some(vec![]), None, "SELECT 1");
        assert_eq!(params.cluster_ids, vec![3, 1, 2]);
        assert_eq!(params.database_filter, None);
        assert_eq!(params.sql_length, 8);
        assert!(params.admits("anything"));
    }

    #[test]
    fn json_round_trip_keeps_filter() {
        let params = PlanParameters::new(
            &[1],
            Some(vec!["sales".into()]),
            Some("monthly".into()),
            "SELECT * FROM t",
        );
        let decoded = PlanParameters::from_json(&params.to_json().unwrap()).unwrap();
        assert_eq!(decoded, params);
        assert!(decoded.admits("sales"));
        assert!(!decoded.admits("Sales"));
    }

    #[test]
    fn malformed_metadata_is_an_error() {
        assert!(matches!(
            PlanParameters::from_json("{\"cluster_ids\": \"x\"}"),
            Err(ModelError::Metadata(_))
        ));
        assert!(PlanParameters::from_json("").is_err());
    }
}
