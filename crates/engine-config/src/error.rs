use thiserror::Error;

/// Errors raised while loading or validating engine settings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    /// A variable was set but could not be parsed.
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    /// The settings parsed but are unusable together.
    #[error("Invalid settings: {0}")]
    Invalid(String),
}

impl SettingsError {
    pub(crate) fn invalid_value(key: &str, value: &str, reason: impl Into<String>) -> Self {
        SettingsError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
