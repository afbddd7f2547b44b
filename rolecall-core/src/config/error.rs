//! Errors raised while loading and validating a configuration

use std::fmt;
use thiserror::Error;

/// Failure to produce a usable [`Config`](super::Config)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading config from '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in '{path}'{}: {message}", describe_location(.line, .column))]
    ParseError {
        path: String,
        line: Option<usize>,
        column: Option<usize>,
        message: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Environment variable '{var}' not found")]
    EnvVarNotFound { var: String },

    #[error("Interpolation failed: {message}")]
    Interpolation { message: String },
}

fn describe_location(line: &Option<usize>, column: &Option<usize>) -> String {
    match (line, column) {
        (Some(line), Some(column)) => format!(" at line {}, column {}", line, column),
        (Some(line), None) => format!(" at line {}", line),
        _ => String::new(),
    }
}

/// A rejected field, addressed by its dotted path (e.g. `roles.coder.provider`)
#[derive(Debug, Error)]
pub struct ValidationError {
    pub field_path: String,
    pub kind: ValidationErrorKind,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validation failed at '{}': {}", self.field_path, self.kind)
    }
}

#[derive(Debug, Error)]
pub enum ValidationErrorKind {
    #[error("required field is missing")]
    RequiredFieldMissing,

    #[error("value out of range: {message}")]
    OutOfRange { message: String },

    /// A role or fallback names a provider missing from `providers`
    #[error("provider '{name}' is not configured under 'providers'")]
    UnknownReference { name: String },

    #[error("unknown provider type '{tag}', expected one of: {known}")]
    UnknownProviderType { tag: String, known: String },

    #[error("fallback repeats the primary provider and model")]
    RedundantFallback,

    #[error("invalid URL: {message}")]
    InvalidUrl { message: String },
}

impl ValidationError {
    pub fn new(field_path: impl Into<String>, kind: ValidationErrorKind) -> Self {
        Self {
            field_path: field_path.into(),
            kind,
        }
    }

    pub fn required(field_path: impl Into<String>) -> Self {
        Self::new(field_path, ValidationErrorKind::RequiredFieldMissing)
    }

    pub fn out_of_range(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            field_path,
            ValidationErrorKind::OutOfRange {
                message: message.into(),
            },
        )
    }

    pub fn unknown_reference(field_path: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(
            field_path,
            ValidationErrorKind::UnknownReference { name: name.into() },
        )
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_reference_display() {
        let msg = ValidationError::unknown_reference("roles.coder.provider", "ghost").to_string();
        assert_eq!(
            msg,
            "Validation failed at 'roles.coder.provider': provider 'ghost' is not configured under 'providers'"
        );
    }

    #[test]
    fn test_parse_error_location_omitted_when_unknown() {
        let err = ConfigError::ParseError {
            path: "cfg.yaml".to_string(),
            line: None,
            column: None,
            message: "bad".to_string(),
        };
        assert_eq!(err.to_string(), "Parse error in 'cfg.yaml': bad");
    }

    #[test]
    fn test_parse_error_location_rendered() {
        let err = ConfigError::ParseError {
            path: "cfg.json".to_string(),
            line: Some(3),
            column: Some(7),
            message: "expected value".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Parse error in 'cfg.json' at line 3, column 7: expected value"
        );
    }
}
