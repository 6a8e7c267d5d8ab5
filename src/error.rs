//! Error types for the log storage renderer

use thiserror::Error;

use crate::crd::SpecValidationError;

/// Errors surfaced by synthesis and by the surrounding CLI
#[derive(Error, Debug)]
pub enum Error {
    /// The LogStorage spec failed shape validation
    #[error("invalid LogStorage spec: {}", format_validation_errors(.0))]
    ValidationError(Vec<SpecValidationError>),

    /// A resource quantity could not be parsed
    #[error("invalid quantity {value:?} for {field}")]
    InvalidQuantity { field: String, value: String },

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Build a validation error for a single field
    pub fn validation(
        field: impl Into<String>,
        message: impl Into<String>,
        how_to_fix: impl Into<String>,
    ) -> Self {
        Error::ValidationError(vec![SpecValidationError::new(field, message, how_to_fix)])
    }

    /// Whether re-running synthesis without a user edit could succeed.
    ///
    /// Shape errors are stable for a given LogStorage spec; only I/O
    /// failures around loading the snapshot are worth retrying.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::IoError(_))
    }

    /// Short machine-readable reason used in status conditions
    pub fn reason(&self) -> &'static str {
        match self {
            Error::ValidationError(_) => "InvalidSpec",
            Error::InvalidQuantity { .. } => "InvalidQuantity",
            Error::ConfigError(_) => "ConfigurationError",
            Error::SerializationError(_) | Error::YamlError(_) => "SerializationError",
            Error::IoError(_) => "IoError",
        }
    }
}

fn format_validation_errors(errors: &[SpecValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lists_every_field() {
        let err = Error::ValidationError(vec![
            SpecValidationError::new("spec.nodes.count", "must not be negative", "fix it"),
            SpecValidationError::new("spec.retention.flows", "must not be negative", "fix it"),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("spec.nodes.count"));
        assert!(msg.contains("spec.retention.flows"));
        assert!(!err.is_retriable());
        assert_eq!(err.reason(), "InvalidSpec");
    }

    #[test]
    fn test_io_errors_are_retriable() {
        let err = Error::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(err.is_retriable());
    }
}
