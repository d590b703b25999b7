use crate::config::{parse_flag, parse_name_list, ConfigError, ConfigSource, ConfigValidator, NameListValidator};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

pub const ENV_ENVIRONMENT: &str = "BEANWIRE_ENV";
pub const ENV_STRICT: &str = "BEANWIRE_STRICT";
pub const ENV_ALTERNATIVES: &str = "BEANWIRE_ALTERNATIVES";
pub const ENV_INTERCEPTORS: &str = "BEANWIRE_INTERCEPTORS";
pub const ENV_DECORATORS: &str = "BEANWIRE_DECORATORS";
pub const ENV_VALIDATE_INJECTION_POINTS: &str = "BEANWIRE_VALIDATE_INJECTION_POINTS";

/// Configuration trait for environment-driven configuration
pub trait EnvConfig: Sized {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self, ConfigError>;

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError>;

    /// Get configuration source information for debugging
    fn config_sources(&self) -> HashMap<String, ConfigSource>;
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Testing,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue {
                field: "environment".to_string(),
                value: s.to_string(),
                expected: "development, testing, or production".to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env_str = match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Production => "production",
        };
        write!(f, "{}", env_str)
    }
}

impl Environment {
    /// Check if environment is production
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Strict deployment is the default only in production
    pub fn default_strict(&self) -> bool {
        self.is_production()
    }
}

/// Deployment-level settings of a bean container.
///
/// The enablement lists hold implementation class names (or stereotype
/// names for alternatives). Interceptor and decorator order follows the
/// order of their lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub environment: Environment,
    /// Abort deployment on the first definition or resolution problem
    pub strict: bool,
    pub alternatives: Vec<String>,
    pub interceptors: Vec<String>,
    pub decorators: Vec<String>,
    /// Resolve every injection point of every enabled bean at build time
    pub validate_injection_points: bool,
}

impl ContainerConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self {
            environment: Environment::Development,
            strict: false,
            alternatives: Vec::new(),
            interceptors: Vec::new(),
            decorators: Vec::new(),
            validate_injection_points: true,
        }
    }

    /// Create configuration for testing
    pub fn testing() -> Self {
        Self {
            environment: Environment::Testing,
            strict: true,
            ..Self::new()
        }
    }

    /// Create configuration for production
    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            strict: true,
            ..Self::new()
        }
    }

    /// Parse a YAML document
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document
    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Enable an alternative class or stereotype
    pub fn with_alternative(mut self, name: impl Into<String>) -> Self {
        self.alternatives.push(name.into());
        self
    }

    /// Enable an interceptor class; order of calls is invocation order
    pub fn with_interceptor(mut self, class_name: impl Into<String>) -> Self {
        self.interceptors.push(class_name.into());
        self
    }

    /// Enable a decorator class; order of calls is delegation order
    pub fn with_decorator(mut self, class_name: impl Into<String>) -> Self {
        self.decorators.push(class_name.into());
        self
    }

    pub fn with_injection_point_validation(mut self, enabled: bool) -> Self {
        self.validate_injection_points = enabled;
        self
    }

    /// Check whether an alternative class or stereotype is activated
    pub fn is_alternative_enabled(&self, name: &str) -> bool {
        self.alternatives.iter().any(|a| a == name)
    }

    /// Position of an enabled interceptor class
    pub fn interceptor_position(&self, class_name: &str) -> Option<usize> {
        self.interceptors.iter().position(|i| i == class_name)
    }

    /// Position of an enabled decorator class
    pub fn decorator_position(&self, class_name: &str) -> Option<usize> {
        self.decorators.iter().position(|d| d == class_name)
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvConfig for ContainerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new();

        if let Ok(env_str) = env::var(ENV_ENVIRONMENT) {
            config.environment = env_str.parse()?;
        }

        // Strict mode defaults based on environment if not set
        config.strict = match env::var(ENV_STRICT) {
            Ok(value) => parse_flag("strict", &value)?,
            Err(_) => config.environment.default_strict(),
        };

        if let Ok(value) = env::var(ENV_ALTERNATIVES) {
            config.alternatives = parse_name_list(&value);
        }

        if let Ok(value) = env::var(ENV_INTERCEPTORS) {
            config.interceptors = parse_name_list(&value);
        }

        if let Ok(value) = env::var(ENV_DECORATORS) {
            config.decorators = parse_name_list(&value);
        }

        if let Ok(value) = env::var(ENV_VALIDATE_INJECTION_POINTS) {
            config.validate_injection_points = parse_flag("validate_injection_points", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        NameListValidator::new("alternatives").validate(&self.alternatives)?;
        NameListValidator::new("interceptors").validate(&self.interceptors)?;
        NameListValidator::new("decorators").validate(&self.decorators)?;

        if let Some(name) = self
            .interceptors
            .iter()
            .find(|name| self.decorators.contains(name))
        {
            return Err(ConfigError::validation_failed(format!(
                "'{}' is enabled both as interceptor and as decorator",
                name
            )));
        }

        // Lenient deployment leaves broken beans out silently in production
        if self.environment.is_production() && !self.strict {
            return Err(ConfigError::InvalidValue {
                field: "strict".to_string(),
                value: "false".to_string(),
                expected: "true in production environment".to_string(),
            });
        }

        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let mut sources = HashMap::new();

        let from_env = |var: &str, default: &str| {
            if env::var(var).is_ok() {
                ConfigSource::EnvVar(var.to_string())
            } else {
                ConfigSource::Default(default.to_string())
            }
        };

        sources.insert(
            "environment".to_string(),
            from_env(ENV_ENVIRONMENT, "development"),
        );
        sources.insert(
            "strict".to_string(),
            from_env(ENV_STRICT, "based on environment"),
        );
        sources.insert("alternatives".to_string(), from_env(ENV_ALTERNATIVES, "none"));
        sources.insert("interceptors".to_string(), from_env(ENV_INTERCEPTORS, "none"));
        sources.insert("decorators".to_string(), from_env(ENV_DECORATORS, "none"));
        sources.insert(
            "validate_injection_points".to_string(),
            from_env(ENV_VALIDATE_INJECTION_POINTS, "true"),
        );

        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            ENV_ENVIRONMENT,
            ENV_STRICT,
            ENV_ALTERNATIVES,
            ENV_INTERCEPTORS,
            ENV_DECORATORS,
            ENV_VALIDATE_INJECTION_POINTS,
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = ContainerConfig::from_env().unwrap();
        assert_eq!(config, ContainerConfig::new());
        assert!(config.config_sources()["strict"].is_default());
    }

    #[test]
    #[serial]
    fn test_from_env_reads_lists() {
        clear_env();
        env::set_var(ENV_ALTERNATIVES, "MockMailer, Staging");
        env::set_var(ENV_INTERCEPTORS, "TxInterceptor,AuditInterceptor");
        env::set_var(ENV_STRICT, "true");

        let config = ContainerConfig::from_env().unwrap();
        assert!(config.strict);
        assert!(config.is_alternative_enabled("Staging"));
        assert_eq!(config.interceptor_position("AuditInterceptor"), Some(1));
        assert!(config.config_sources()["alternatives"].is_env_var());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_production_defaults_to_strict() {
        clear_env();
        env::set_var(ENV_ENVIRONMENT, "prod");
        let config = ContainerConfig::from_env().unwrap();
        assert!(config.strict);

        env::set_var(ENV_STRICT, "false");
        assert!(ContainerConfig::from_env().is_err());
        clear_env();
    }

    #[test]
    fn test_interceptor_and_decorator_overlap_is_rejected() {
        let config = ContainerConfig::new()
            .with_interceptor("Audit")
            .with_decorator("Audit");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn test_from_yaml_str() {
        let yaml = "environment: testing\nstrict: true\nalternatives:\n  - MockMailer\ninterceptors:\n  - TxInterceptor\n";
        let config = ContainerConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.environment, Environment::Testing);
        assert!(config.is_alternative_enabled("MockMailer"));
        assert!(config.validate_injection_points);
    }

    #[test]
    fn test_from_json_str() {
        let config =
            ContainerConfig::from_json_str(r#"{"decorators": ["TimingDecorator"]}"#).unwrap();
        assert_eq!(config.decorator_position("TimingDecorator"), Some(0));
        assert!(!config.strict);
    }
}
