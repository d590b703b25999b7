pub mod config;
pub mod container;
pub mod errors;

pub use config::{ConfigError, ContainerConfig, EnvConfig, Environment};
pub use container::{
    BeanContainer, BeanDefinition, BeanId, ClassInfo, ContainerBuilder, Qualifier, Scope, TypeRef,
};
pub use errors::{CoreError, InvocationFailure, ResolutionError};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Framework information
pub const FRAMEWORK_NAME: &str = "beanwire";

/// Get framework version
pub fn version() -> &'static str {
    VERSION
}

/// Get framework name
pub fn name() -> &'static str {
    FRAMEWORK_NAME
}
