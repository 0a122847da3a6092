use crate::{
    error::SettingsError,
    settings::validated::{EngineSettings, EngineSettingsBuilder},
};
use std::{str::FromStr, time::Duration};
use tracing::debug;

pub const ENV_PREFIX: &str = "FANOUT_";

pub const STORAGE_PATH: &str = "FANOUT_STORAGE_PATH";
pub const CSV_DELIMITER: &str = "FANOUT_CSV_DELIMITER";
pub const CSV_ENCODING: &str = "FANOUT_CSV_ENCODING";
pub const CSV_INCLUDE_HEADER: &str = "FANOUT_CSV_INCLUDE_HEADER";
pub const QUERY_TIMEOUT_SECS: &str = "FANOUT_QUERY_TIMEOUT_SECS";
pub const MAX_ROWS: &str = "FANOUT_MAX_ROWS";
pub const CONNECT_TIMEOUT_SECS: &str = "FANOUT_CONNECT_TIMEOUT_SECS";
pub const WORKER_POOL_SIZE: &str = "FANOUT_WORKER_POOL_SIZE";
pub const QUEUE_CAPACITY: &str = "FANOUT_QUEUE_CAPACITY";
pub const RETENTION_DAYS: &str = "FANOUT_RETENTION_DAYS";
pub const SHUTDOWN_GRACE_SECS: &str = "FANOUT_SHUTDOWN_GRACE_SECS";
pub const STATE_PATH: &str = "FANOUT_STATE_PATH";
pub const CLUSTERS_FILE: &str = "FANOUT_CLUSTERS_FILE";

impl EngineSettings {
    /// Loads settings through `lookup`; unset or blank keys keep their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut builder = EngineSettingsBuilder::new();
        builder.storage_path = get(STORAGE_PATH).map(Into::into);
        builder.csv_delimiter = get(CSV_DELIMITER).map(|v| parse_delimiter(&v)).transpose()?;
        builder.csv_encoding = get(CSV_ENCODING);
        builder.csv_include_header = get(CSV_INCLUDE_HEADER)
            .map(|v| parse_bool(CSV_INCLUDE_HEADER, &v))
            .transpose()?;
        builder.query_timeout = get(QUERY_TIMEOUT_SECS)
            .map(|v| parse_secs(QUERY_TIMEOUT_SECS, &v))
            .transpose()?;
        builder.max_rows = get(MAX_ROWS).map(|v| parse(MAX_ROWS, &v)).transpose()?;
        builder.connect_timeout = get(CONNECT_TIMEOUT_SECS)
            .map(|v| parse_secs(CONNECT_TIMEOUT_SECS, &v))
            .transpose()?;
        builder.worker_pool_size = get(WORKER_POOL_SIZE)
            .map(|v| parse(WORKER_POOL_SIZE, &v))
            .transpose()?;
        builder.queue_capacity = get(QUEUE_CAPACITY)
            .map(|v| parse(QUEUE_CAPACITY, &v))
            .transpose()?;
        builder.retention_days = get(RETENTION_DAYS)
            .map(|v| parse(RETENTION_DAYS, &v))
            .transpose()?;
        builder.shutdown_grace = get(SHUTDOWN_GRACE_SECS)
            .map(|v| parse_secs(SHUTDOWN_GRACE_SECS, &v))
            .transpose()?;
        builder.state_path = get(STATE_PATH).map(Into::into);
        builder.clusters_file = get(CLUSTERS_FILE).map(Into::into);

        let settings = builder.build()?;
        debug!(?settings, "Loaded engine settings");
        Ok(settings)
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T, SettingsError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| SettingsError::invalid_value(key, value, e.to_string()))
}

fn parse_secs(key: &str, value: &str) -> Result<Duration, SettingsError> {
    parse::<u64>(key, value).map(Duration::from_secs)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, SettingsError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(SettingsError::invalid_value(key, value, "expected a boolean")),
    }
}

fn parse_delimiter(value: &str) -> Result<u8, SettingsError> {
    let value = if value == "\\t" { "\t" } else { value };
    match value.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ => Err(SettingsError::invalid_value(
            CSV_DELIMITER,
            value,
            "expected a single ASCII character",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::HashMap, path::PathBuf};

    fn load(vars: &[(&str, &str)]) -> Result<EngineSettings, SettingsError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineSettings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(load(&[]).unwrap(), EngineSettings::default());
    }

    #[test]
    fn reads_overrides() {
        let settings = load(&[
            (STORAGE_PATH, "/srv/results"),
            (CSV_DELIMITER, "\\t"),
            (CSV_INCLUDE_HEADER, "false"),
            (QUERY_TIMEOUT_SECS, "5"),
            (WORKER_POOL_SIZE, "2"),
            (RETENTION_DAYS, " 30 "),
            (CSV_ENCODING, "windows-1252"),
        ])
        .unwrap();

        assert_eq!(settings.storage_path, PathBuf::from("/srv/results"));
        assert_eq!(settings.csv_delimiter, b'\t');
        assert!(!settings.csv_include_header);
        assert_eq!(settings.query_timeout, Duration::from_secs(5));
        assert_eq!(settings.worker_pool_size, 2);
        assert_eq!(settings.retention_days, 30);
        assert_eq!(settings.csv_settings().encoding.name(), "windows-1252");
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(matches!(
            load(&[(MAX_ROWS, "lots")]),
            Err(SettingsError::InvalidValue { .. })
        ));
        assert!(load(&[(CSV_DELIMITER, ";;")]).is_err());
        assert!(load(&[(CSV_INCLUDE_HEADER, "maybe")]).is_err());
        assert!(matches!(
            load(&[(CSV_ENCODING, "UTF-16")]),
            Err(SettingsError::Invalid(_))
        ));
    }
}
