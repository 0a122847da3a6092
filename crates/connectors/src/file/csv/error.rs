use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("File {path} is {size} bytes, above the {limit} byte download limit")]
    PayloadTooLarge { path: String, size: u64, limit: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid sink settings: {0}")]
    InvalidSettings(String),
}
