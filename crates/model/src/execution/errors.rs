use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown status: {0}")]
    UnknownStatus(String),

    #[error("malformed plan parameters: {0}")]
    Metadata(#[from] serde_json::Error),
}
