use crate::error::SettingsError;
use connectors::{file::csv::settings::CsvSettings, sql::base::executor::ExecutorSettings};
use encoding_rs::{Encoding, UTF_8};
use std::{path::PathBuf, time::Duration};

pub const DEFAULT_STORAGE_PATH: &str = "/tmp/query-results";
pub const DEFAULT_ENCODING: &str = "UTF-8";
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MAX_ROWS: usize = 1_000_000;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_WORKER_POOL_SIZE: usize = 10;
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_RETENTION_DAYS: u32 = 7;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 60;

const APP_DIR: &str = ".fanout";

/// Immutable, validated configuration shared by every engine component.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Root directory for per-execution result files
    pub storage_path: PathBuf,
    pub csv_delimiter: u8,
    /// WHATWG encoding label, e.g. `UTF-8` or `windows-1252`
    pub csv_encoding: String,
    pub csv_include_header: bool,
    pub query_timeout: Duration,
    /// Rows kept per target; the rest are dropped
    pub max_rows: usize,
    pub connect_timeout: Duration,
    pub worker_pool_size: usize,
    pub queue_capacity: usize,
    pub retention_days: u32,
    /// How long shutdown waits for running executions before aborting them
    pub shutdown_grace: Duration,
    /// Ledger directory
    pub state_path: PathBuf,
    /// JSON cluster inventory
    pub clusters_file: PathBuf,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            csv_delimiter: b',',
            csv_encoding: DEFAULT_ENCODING.to_string(),
            csv_include_header: true,
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            max_rows: DEFAULT_MAX_ROWS,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            retention_days: DEFAULT_RETENTION_DAYS,
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
            state_path: app_dir().join("state"),
            clusters_file: app_dir().join("clusters.json"),
        }
    }
}

fn app_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(APP_DIR))
}

impl EngineSettings {
    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            connect_timeout: self.connect_timeout,
            query_timeout: self.query_timeout,
            max_rows: self.max_rows,
        }
    }

    pub fn csv_settings(&self) -> CsvSettings {
        CsvSettings {
            storage_path: self.storage_path.clone(),
            delimiter: self.csv_delimiter,
            include_header: self.csv_include_header,
            encoding: self.output_encoding().unwrap_or(UTF_8),
            ..CsvSettings::default()
        }
    }

    /// Resolves the configured encoding label.
    pub fn output_encoding(&self) -> Result<&'static Encoding, SettingsError> {
        let encoding = Encoding::for_label(self.csv_encoding.trim().as_bytes()).ok_or_else(|| {
            SettingsError::Invalid(format!("unknown CSV encoding '{}'", self.csv_encoding))
        })?;
        if encoding.output_encoding() != encoding {
            return Err(SettingsError::Invalid(format!(
                "CSV encoding '{}' can only be read, not written",
                self.csv_encoding
            )));
        }
        Ok(encoding)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.worker_pool_size == 0 {
            return Err(SettingsError::Invalid("worker pool size must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(SettingsError::Invalid("queue capacity must be at least 1".into()));
        }
        if self.max_rows == 0 {
            return Err(SettingsError::Invalid("max rows must be at least 1".into()));
        }
        if self.query_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(SettingsError::Invalid("timeouts must be non-zero".into()));
        }
        self.output_encoding()?;
        if matches!(self.csv_delimiter, b'"' | b'\n' | b'\r') || !self.csv_delimiter.is_ascii() {
            return Err(SettingsError::Invalid(format!(
                "unusable CSV delimiter {:?}",
                self.csv_delimiter as char
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct EngineSettingsBuilder {
    pub storage_path: Option<PathBuf>,
    pub csv_delimiter: Option<u8>,
    pub csv_encoding: Option<String>,
    pub csv_include_header: Option<bool>,
    pub query_timeout: Option<Duration>,
    pub max_rows: Option<usize>,
    pub connect_timeout: Option<Duration>,
    pub worker_pool_size: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub retention_days: Option<u32>,
    pub shutdown_grace: Option<Duration>,
    pub state_path: Option<PathBuf>,
    pub clusters_file: Option<PathBuf>,
}

impl EngineSettingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    pub fn csv_delimiter(mut self, delimiter: u8) -> Self {
        self.csv_delimiter = Some(delimiter);
        self
    }

    pub fn csv_encoding(mut self, label: impl Into<String>) -> Self {
        self.csv_encoding = Some(label.into());
        self
    }

    pub fn csv_include_header(mut self, include: bool) -> Self {
        self.csv_include_header = Some(include);
        self
    }

    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    pub fn max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = Some(max_rows);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = Some(size);
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn retention_days(mut self, days: u32) -> Self {
        self.retention_days = Some(days);
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = Some(grace);
        self
    }

    pub fn state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = Some(path.into());
        self
    }

    pub fn clusters_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.clusters_file = Some(path.into());
        self
    }

    pub fn build(self) -> Result<EngineSettings, SettingsError> {
        let defaults = EngineSettings::default();
        let settings = EngineSettings {
            storage_path: self.storage_path.unwrap_or(defaults.storage_path),
            csv_delimiter: self.csv_delimiter.unwrap_or(defaults.csv_delimiter),
            csv_encoding: self.csv_encoding.unwrap_or(defaults.csv_encoding),
            csv_include_header: self.csv_include_header.unwrap_or(defaults.csv_include_header),
            query_timeout: self.query_timeout.unwrap_or(defaults.query_timeout),
            max_rows: self.max_rows.unwrap_or(defaults.max_rows),
            connect_timeout: self.connect_timeout.unwrap_or(defaults.connect_timeout),
            worker_pool_size: self.worker_pool_size.unwrap_or(defaults.worker_pool_size),
            queue_capacity: self.queue_capacity.unwrap_or(defaults.queue_capacity),
            retention_days: self.retention_days.unwrap_or(defaults.retention_days),
            shutdown_grace: self.shutdown_grace.unwrap_or(defaults.shutdown_grace),
            state_path: self.state_path.unwrap_or(defaults.state_path),
            clusters_file: self.clusters_file.unwrap_or(defaults.clusters_file),
        };
        settings.validate()?;
        Ok(settings)
    }
}
