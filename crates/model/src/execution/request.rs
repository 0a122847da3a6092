use crate::core::identifiers::ClusterId;
use serde::{Deserialize, Serialize};

/// A statement submission as received from a caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub sql: String,
    pub cluster_ids: Vec<ClusterId>,
    #[serde(default)]
    pub database_names: Option<Vec<String>>,
    pub user_id: String,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}
