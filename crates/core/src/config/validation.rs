use std::collections::HashSet;
use thiserror::Error;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {field}. {hint}")]
    MissingRequired { field: String, hint: String },

    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Configuration validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Parsing error: {message}")]
    ParsingError { message: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    /// Create a missing required field error
    pub fn missing_required(field: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::MissingRequired {
            field: field.into(),
            hint: hint.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    /// Create a validation failed error
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }
}

/// Trait for validating configuration values
pub trait ConfigValidator<T: ?Sized> {
    /// Validate a configuration value
    fn validate(&self, value: &T) -> Result<(), ConfigError>;
}

/// Validates a list of class or stereotype names: no blanks, no duplicates
pub struct NameListValidator {
    pub field: &'static str,
}

impl NameListValidator {
    pub fn new(field: &'static str) -> Self {
        Self { field }
    }
}

impl ConfigValidator<[String]> for NameListValidator {
    fn validate(&self, value: &[String]) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for name in value {
            if name.trim().is_empty() {
                return Err(ConfigError::invalid_value(
                    self.field,
                    name.clone(),
                    "non-empty class or stereotype name",
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::validation_failed(format!(
                    "'{}' is listed more than once in {}",
                    name, self.field
                )));
            }
        }
        Ok(())
    }
}

/// Parses a boolean flag the way environment variables usually spell them
pub fn parse_flag(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid_value(
            field,
            value,
            "one of: true, false, 1, 0, yes, no, on, off",
        )),
    }
}

/// Splits a comma separated list, dropping empty segments
pub fn parse_name_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_list_rejects_duplicates() {
        let validator = NameListValidator::new("alternatives");
        let names = vec!["MockMailer".to_string(), "MockMailer".to_string()];
        assert!(matches!(
            validator.validate(&names),
            Err(ConfigError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn test_name_list_rejects_blank_entries() {
        let validator = NameListValidator::new("interceptors");
        let names = vec!["  ".to_string()];
        assert!(matches!(
            validator.validate(&names),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("strict", "Yes").unwrap());
        assert!(!parse_flag("strict", "0").unwrap());
        assert!(parse_flag("strict", "maybe").is_err());
    }

    #[test]
    fn test_parse_name_list() {
        assert_eq!(
            parse_name_list("A, B,,C "),
            vec!["A".to_string(), "B".to_string(), "C".to_string()]
        );
        assert!(parse_name_list("").is_empty());
    }
}
