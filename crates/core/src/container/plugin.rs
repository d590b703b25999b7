//! Pluggable deployment validators.

use crate::container::class_info::ClassInfo;
use crate::container::descriptor::BeanDefinition;
use crate::container::qualifier::Qualifier;
use crate::container::types::TypeRef;
use crate::errors::CoreError;
use std::sync::Arc;

/// Hook consulted while beans are defined
pub trait DeploymentPlugin: Send + Sync {
    /// Plugin name for diagnostics
    fn name(&self) -> &str;

    /// Structural validation of a managed bean class; an error aborts the
    /// bean's registration
    fn validate(&self, class: &ClassInfo) -> Result<(), CoreError> {
        let _ = class;
        Ok(())
    }

    /// Validation of a resource-style injection on `member`
    fn check_resource(&self, ty: &TypeRef, annotation: &Qualifier, member: &str) -> Result<(), CoreError> {
        let _ = (ty, annotation, member);
        Ok(())
    }

    /// Whether the plugin makes a non-serializable bean passivation capable
    fn is_passivation_capable(&self, bean: &BeanDefinition) -> bool {
        let _ = bean;
        false
    }
}

/// Registered deployment plugins, consulted in registration order
#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn DeploymentPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin
    pub fn register(&mut self, plugin: Arc<dyn DeploymentPlugin>) {
        tracing::info!("Registering deployment plugin: {}", plugin.name());
        self.plugins.push(plugin);
    }

    /// Get the number of registered plugins
    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Run every plugin's class validation; the first error wins
    pub fn validate(&self, class: &ClassInfo) -> Result<(), CoreError> {
        for plugin in &self.plugins {
            plugin.validate(class).map_err(|e| {
                tracing::warn!("Plugin {} rejected class {}: {}", plugin.name(), class.name, e);
                e
            })?;
        }
        Ok(())
    }

    pub fn check_resource(&self, ty: &TypeRef, annotation: &Qualifier, member: &str) -> Result<(), CoreError> {
        for plugin in &self.plugins {
            plugin.check_resource(ty, annotation, member)?;
        }
        Ok(())
    }

    pub fn is_passivation_capable(&self, bean: &BeanDefinition) -> bool {
        self.plugins.iter().any(|p| p.is_passivation_capable(bean))
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RejectFinal;

    impl DeploymentPlugin for RejectFinal {
        fn name(&self) -> &str {
            "reject-final"
        }

        fn validate(&self, class: &ClassInfo) -> Result<(), CoreError> {
            if class.is_final {
                Err(CoreError::configuration(format!("{} is final", class.name)))
            } else {
                Ok(())
            }
        }
    }

    struct Passivates;

    impl DeploymentPlugin for Passivates {
        fn name(&self) -> &str {
            "passivates"
        }

        fn is_passivation_capable(&self, bean: &BeanDefinition) -> bool {
            bean.bean_class.ends_with("Session")
        }
    }

    #[test]
    fn test_validate_runs_every_plugin() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(Passivates));
        registry.register(Arc::new(RejectFinal));
        assert_eq!(registry.plugin_count(), 2);
        assert!(registry.validate(&ClassInfo::new("Open")).is_ok());
        assert!(registry.validate(&ClassInfo::new("Closed").final_class()).is_err());
    }

    #[test]
    fn test_passivation_capability() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(Passivates));
        let bean = BeanDefinition::managed(ClassInfo::new("CartSession"), vec![]);
        assert!(registry.is_passivation_capable(&bean));
        let other = BeanDefinition::managed(ClassInfo::new("Cart"), vec![]);
        assert!(!registry.is_passivation_capable(&other));
    }
}
