use crate::core::identifiers::ClusterId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A database server reachable through one host/port/credential set.
///
/// The engine only reads clusters; the known database list is refreshed
/// through the registry's rediscovery call.
#[derive(Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub alias: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub databases: Vec<DatabaseDescriptor>,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseDescriptor {
    pub name: String,
    #[serde(default = "default_active")]
    pub accessible: bool,
}

impl DatabaseDescriptor {
    pub fn accessible(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            accessible: true,
        }
    }
}

impl Cluster {
    /// Known databases that targets may be built for, in listing order.
    pub fn accessible_databases(&self) -> impl Iterator<Item = &DatabaseDescriptor> {
        self.databases.iter().filter(|db| db.accessible)
    }

    pub fn connection(&self, database: &str) -> ConnectionDescriptor {
        ConnectionDescriptor {
            host: self.host.clone(),
            port: self.port,
            database: database.to_string(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("id", &self.id)
            .field("alias", &self.alias)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("active", &self.active)
            .field("databases", &self.databases)
            .finish_non_exhaustive()
    }
}

/// Everything needed to open one session against one database.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.database)
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_entry_defaults() {
        let json = r#"{
            "id": 3,
            "alias": "reporting",
            "host": "db.internal",
            "port": 5432,
            "username": "reader",
            "password": "secret",
            "databases": [{ "name": "a" }, { "name": "b", "accessible": false }]
        }"#;

        let cluster: Cluster = serde_json::from_str(json).unwrap();
        assert!(cluster.active);
        assert_eq!(cluster.description, None);

        let names: Vec<&str> = cluster
            .accessible_databases()
            .map(|db| db.name.as_str())
            .collect();
        assert_eq!(names, vec!["a"]);
    }

    #[test]
    fn debug_output_hides_password() {
        let cluster = Cluster {
            id: 1,
            alias: "c".into(),
            host: "h".into(),
            port: 5432,
            username: "u".into(),
            password: "hunter2".into(),
            active: true,
            databases: vec![],
            description: None,
        };

        assert!(!format!("{cluster:?}").contains("hunter2"));
        let conn = cluster.connection("sales");
        assert!(!format!("{conn:?}").contains("hunter2"));
        assert_eq!(conn.to_string(), "h:5432/sales");
        assert!(!serde_json::to_string(&cluster).unwrap().contains("hunter2"));
    }
}
