use crate::config::ConfigError;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error carried as the cause of an invocation failure
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared cause of an invocation failure
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Core error type for the bean container
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Definition error: {message}")]
    Definition { message: String },

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("Inconsistent specialization: {message}")]
    InconsistentSpecialization { message: String },

    #[error("Injection failed for '{member}': {source}")]
    InjectionExecution {
        member: String,
        #[source]
        source: InvocationFailure,
    },

    #[error("Invocation of '{member}' failed: {source}")]
    Invocation {
        member: String,
        #[source]
        source: InvocationFailure,
    },

    #[error("Passivation error: {message}")]
    Passivation { message: String },

    #[error("Illegal product: {message}")]
    IllegalProduct { message: String },

    #[error("Interception error: {message}")]
    Interception { message: String },

    #[error("Bean not found: {bean}")]
    BeanNotFound { bean: String },

    #[error("No active context for scope '{scope}'")]
    ContextNotActive { scope: String },

    #[error("Bean registry is frozen, cannot {operation}")]
    RegistryFrozen { operation: String },

    #[error("Lock error on resource: {resource}")]
    LockError { resource: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl CoreError {
    /// Create a new configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new definition error
    pub fn definition(message: impl Into<String>) -> Self {
        Self::Definition {
            message: message.into(),
        }
    }

    /// Create a new inconsistent specialization error
    pub fn inconsistent_specialization(message: impl Into<String>) -> Self {
        Self::InconsistentSpecialization {
            message: message.into(),
        }
    }

    /// Wrap an invoker failure raised while injecting into `member`
    pub fn injection(member: impl Into<String>, source: InvocationFailure) -> Self {
        Self::InjectionExecution {
            member: member.into(),
            source,
        }
    }

    /// Wrap an invoker failure raised by a business method or callback
    pub fn invocation(member: impl Into<String>, source: InvocationFailure) -> Self {
        Self::Invocation {
            member: member.into(),
            source,
        }
    }

    /// Create a new passivation error
    pub fn passivation(message: impl Into<String>) -> Self {
        Self::Passivation {
            message: message.into(),
        }
    }

    /// Create a new illegal product error
    pub fn illegal_product(message: impl Into<String>) -> Self {
        Self::IllegalProduct {
            message: message.into(),
        }
    }

    /// Create a new interception error
    pub fn interception(message: impl Into<String>) -> Self {
        Self::Interception {
            message: message.into(),
        }
    }

    /// Create a lock error for the named resource
    pub fn lock(resource: impl Into<String>) -> Self {
        Self::LockError {
            resource: resource.into(),
        }
    }

    /// Check if the error is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::Config(_))
    }

    /// Check if the error is a definition error
    pub fn is_definition(&self) -> bool {
        matches!(self, Self::Definition { .. })
    }

    /// Check if the error is any resolution error
    pub fn is_resolution(&self) -> bool {
        matches!(self, Self::Resolution(_))
    }

    /// Check if the error is an unsatisfied resolution
    pub fn is_unsatisfied(&self) -> bool {
        matches!(self, Self::Resolution(ResolutionError::Unsatisfied { .. }))
    }

    /// Check if the error is an ambiguous resolution
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Resolution(ResolutionError::Ambiguous { .. }))
    }

    /// Check if the error is an inconsistent specialization
    pub fn is_inconsistent_specialization(&self) -> bool {
        matches!(self, Self::InconsistentSpecialization { .. })
    }

    /// Check if the error wraps an injection failure
    pub fn is_injection_execution(&self) -> bool {
        matches!(self, Self::InjectionExecution { .. })
    }

    /// Check if the error is a passivation error
    pub fn is_passivation(&self) -> bool {
        matches!(self, Self::Passivation { .. })
    }

    /// An error of the same kind carrying the same details, for reporting
    /// one failure more than once. Configuration parsing errors keep their
    /// kind and message only.
    pub fn replay(&self) -> Self {
        match self {
            Self::Configuration { message } => Self::configuration(message.clone()),
            Self::Definition { message } => Self::definition(message.clone()),
            Self::Resolution(e) => Self::Resolution(e.clone()),
            Self::InconsistentSpecialization { message } => Self::inconsistent_specialization(message.clone()),
            Self::InjectionExecution { member, source } => Self::injection(member.clone(), source.clone()),
            Self::Invocation { member, source } => Self::invocation(member.clone(), source.clone()),
            Self::Passivation { message } => Self::passivation(message.clone()),
            Self::IllegalProduct { message } => Self::illegal_product(message.clone()),
            Self::Interception { message } => Self::interception(message.clone()),
            Self::BeanNotFound { bean } => Self::BeanNotFound { bean: bean.clone() },
            Self::ContextNotActive { scope } => Self::ContextNotActive { scope: scope.clone() },
            Self::RegistryFrozen { operation } => Self::RegistryFrozen {
                operation: operation.clone(),
            },
            Self::LockError { resource } => Self::lock(resource.clone()),
            Self::Config(e) => Self::configuration(e.to_string()),
        }
    }

    /// Errors raised while a bean is being defined; they exclude the bean
    /// from the registry.
    pub fn is_deployment_problem(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. }
                | Self::Definition { .. }
                | Self::Resolution(_)
                | Self::InconsistentSpecialization { .. }
                | Self::Passivation { .. }
        )
    }
}

/// Failure of typesafe resolution for a single injection point
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("Unsatisfied dependency: no enabled bean matches type '{required_type}' with qualifiers [{}]", .qualifiers.join(", "))]
    Unsatisfied {
        required_type: String,
        qualifiers: Vec<String>,
    },

    #[error("Ambiguous dependency: type '{required_type}' with qualifiers [{}] matches beans [{}]", .qualifiers.join(", "), .candidates.join(", "))]
    Ambiguous {
        required_type: String,
        qualifiers: Vec<String>,
        candidates: Vec<String>,
    },

    #[error("Injection point for primitive type {injection_point} resolves bean '{bean}' with nullable return type")]
    NullableDependency { injection_point: String, bean: String },

    #[error("Bean '{bean}' has a normal scope and is unproxyable: {reason}")]
    Unproxyable { bean: String, reason: String },
}

impl ResolutionError {
    /// Names of the candidate beans of an ambiguous resolution
    pub fn candidates(&self) -> &[String] {
        match self {
            Self::Ambiguous { candidates, .. } => candidates,
            _ => &[],
        }
    }
}

/// Failure raised by a member invoker
#[derive(Debug, Clone, Error)]
pub enum InvocationFailure {
    #[error("member '{member}' is not accessible")]
    IllegalAccess { member: String },

    #[error("invocation target threw: {source}")]
    InvocationTarget {
        #[source]
        source: SharedError,
    },

    #[error("instantiation failed: {message}")]
    Instantiation { message: String },

    #[error("missing argument at position {index}")]
    MissingArgument { index: usize },

    #[error("argument at position {index} is not a '{expected}'")]
    ArgumentMismatch { index: usize, expected: String },

    #[error("target instance is not a '{expected}'")]
    TargetMismatch { expected: String },
}

impl InvocationFailure {
    /// Wrap an error raised by the invoked member itself
    pub fn target(source: impl Into<BoxError>) -> Self {
        Self::InvocationTarget {
            source: SharedError::from(source.into()),
        }
    }

    /// Create a new instantiation failure
    pub fn instantiation(message: impl Into<String>) -> Self {
        Self::Instantiation {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_message_names_candidates() {
        let err = ResolutionError::Ambiguous {
            required_type: "PaymentService".to_string(),
            qualifiers: vec!["@Default".to_string()],
            candidates: vec!["CardPayments".to_string(), "WirePayments".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("CardPayments"));
        assert!(message.contains("WirePayments"));
        assert_eq!(err.candidates().len(), 2);
    }

    #[test]
    fn test_resolution_converts_into_core_error() {
        let err: CoreError = ResolutionError::Unsatisfied {
            required_type: "Mailer".to_string(),
            qualifiers: vec![],
        }
        .into();
        assert!(err.is_resolution());
        assert!(err.is_unsatisfied());
        assert!(!err.is_ambiguous());
        assert!(err.is_deployment_problem());
    }

    #[test]
    fn test_injection_error_preserves_cause() {
        let err = CoreError::injection(
            "OrderService#new",
            InvocationFailure::target("database offline"),
        );
        assert!(err.is_injection_execution());
        let cause = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(
            cause.as_deref(),
            Some("invocation target threw: database offline")
        );
    }

    #[test]
    fn test_replay_keeps_kind_and_cause() {
        let err = CoreError::invocation("Orders#place", InvocationFailure::target("card declined"));
        let replayed = err.replay();
        assert!(matches!(replayed, CoreError::Invocation { ref member, .. } if member == "Orders#place"));
        assert_eq!(replayed.to_string(), err.to_string());
        let cause = std::error::Error::source(&replayed).map(|s| s.to_string());
        assert_eq!(cause.as_deref(), Some("invocation target threw: card declined"));

        let unsatisfied: CoreError = ResolutionError::Unsatisfied {
            required_type: "Mailer".to_string(),
            qualifiers: vec![],
        }
        .into();
        assert!(unsatisfied.replay().is_unsatisfied());
    }
}
