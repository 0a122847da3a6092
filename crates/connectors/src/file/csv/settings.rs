use crate::file::csv::error::SinkError;
use encoding_rs::{Encoding, UTF_8};
use std::path::PathBuf;

pub const DEFAULT_STORAGE_PATH: &str = "/tmp/query-results";
pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvSettings {
    pub storage_path: PathBuf,
    pub delimiter: u8,
    pub include_header: bool,
    /// Output encoding of every result file
    pub encoding: &'static Encoding,
    pub max_download_bytes: u64,
}

impl Default for CsvSettings {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            delimiter: b',',
            include_header: true,
            encoding: UTF_8,
            max_download_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
        }
    }
}

impl CsvSettings {
    pub fn validate(&self) -> Result<(), SinkError> {
        if matches!(self.delimiter, b'"' | b'\n' | b'\r') {
            return Err(SinkError::InvalidSettings(format!(
                "delimiter {:?} cannot be used",
                self.delimiter as char
            )));
        }
        if self.encoding.output_encoding() != self.encoding {
            return Err(SinkError::InvalidSettings(format!(
                "{} cannot be used as an output encoding",
                self.encoding.name()
            )));
        }
        if self.storage_path.as_os_str().is_empty() {
            return Err(SinkError::InvalidSettings("storage path is empty".into()));
        }
        Ok(())
    }
}
