//! Enablement of alternatives and specialization overrides.
//!
//! Both passes run during deployment, before the registry is frozen. A
//! specialized bean disables the bean it supersedes and takes over its
//! qualifiers and name, so at most one bean of a chain stays enabled.

use crate::container::class_info::Marker;
use crate::container::descriptor::{BeanDefinition, BeanId, BeanKind};
use crate::container::qualifier::push_unique;
use crate::container::registry::BeanRegistry;
use crate::errors::CoreError;

fn is_class_bean(bean: &BeanDefinition) -> bool {
    matches!(bean.kind, BeanKind::Managed(_) | BeanKind::Enterprise(_))
}

fn is_specializing(bean: &BeanDefinition) -> bool {
    is_class_bean(bean) && bean.class().map_or(false, |c| c.specializes)
}

impl BeanRegistry {
    /// Decide the enabled flag of every alternative.
    ///
    /// A class-backed alternative is enabled when its class, or one of its
    /// alternative stereotypes, is listed in the deployment. Producers follow
    /// their declaring bean; an alternative producer of a non-alternative
    /// bean also needs the declaring class listed.
    pub fn apply_enablement(&mut self) -> Result<(), CoreError> {
        self.ensure_mutable("apply enablement")?;
        let config = std::sync::Arc::clone(&self.config);

        for bean in self.beans.iter_mut().filter(|b| b.alternative) {
            let class = match bean.kind.class() {
                Some(class) => std::sync::Arc::clone(class),
                None => continue,
            };
            let listed = config.is_alternative_enabled(&class.name)
                || class
                    .stereotypes
                    .iter()
                    .filter(|s| s.alternative)
                    .any(|s| config.is_alternative_enabled(&s.name));
            if !listed {
                tracing::warn!("Alternative {} is not enabled in the deployment", bean.display_name());
            }
            bean.enabled = listed;
        }

        let parents: Vec<(bool, bool)> = self.beans.iter().map(|b| (b.enabled, b.alternative)).collect();
        for bean in self.beans.iter_mut().filter(|b| b.kind.is_producer()) {
            let (parent_enabled, parent_alternative) = match bean.kind.parent() {
                Some(parent) => parents[parent.index()],
                None => continue,
            };
            bean.enabled = if bean.alternative && !parent_alternative {
                let declaring = bean.kind.declaring_class().unwrap_or_default();
                parent_enabled && config.is_alternative_enabled(declaring)
            } else {
                parent_enabled
            };
        }
        Ok(())
    }

    /// Specialize every enabled specializing class, supertypes first, then
    /// every specializing producer method.
    pub fn apply_all_specializations(&mut self) -> Result<(), CoreError> {
        let mut classes: Vec<(usize, String)> = self
            .beans
            .iter()
            .filter(|b| b.enabled && is_specializing(b))
            .map(|b| (self.specialization_depth(&b.bean_class), b.bean_class.clone()))
            .collect();
        classes.sort();
        classes.dedup();
        for (_, class) in classes {
            self.apply_specialization(&class)?;
        }

        let producers: Vec<BeanId> = self
            .beans
            .iter()
            .filter(|b| {
                b.enabled
                    && matches!(&b.kind, BeanKind::ProducerMethod(p) if p.method.has_marker(Marker::Specializes))
            })
            .map(BeanDefinition::id)
            .collect();
        for producer in producers {
            self.apply_producer_specialization(producer)?;
        }
        Ok(())
    }

    /// Number of specializing classes from `class_name` up its superclass
    /// chain
    fn specialization_depth(&self, class_name: &str) -> usize {
        let mut depth = 0;
        let mut current = self.class_info(class_name).cloned();
        while let Some(class) = current {
            if !class.specializes || depth > self.beans.len() {
                break;
            }
            depth += 1;
            current = class
                .superclass
                .as_deref()
                .and_then(|s| self.class_info(s).cloned());
        }
        depth
    }

    /// Let the specializing bean of `child_class` supersede the bean of its
    /// superclass. Applying it again to an already specialized pair changes
    /// nothing.
    pub fn apply_specialization(&mut self, child_class: &str) -> Result<(), CoreError> {
        self.ensure_mutable("apply specialization")?;
        let specializers: Vec<usize> = self
            .beans
            .iter()
            .enumerate()
            .filter(|(_, b)| b.enabled && b.bean_class == child_class && is_specializing(b))
            .map(|(i, _)| i)
            .collect();
        let child = match specializers.as_slice() {
            [] => {
                return Err(CoreError::inconsistent_specialization(format!(
                    "Specialized bean for class : {} is not enabled in the deployment.",
                    child_class
                )))
            }
            [child] => *child,
            _ => {
                return Err(CoreError::inconsistent_specialization(format!(
                    "More than one specialized bean for class : {} is enabled in the deployment.",
                    child_class
                )))
            }
        };

        let superclass = self.beans[child]
            .class()
            .and_then(|c| c.superclass.clone())
            .ok_or_else(|| {
                CoreError::inconsistent_specialization(format!(
                    "Specialized class : {} does not extend another bean class",
                    child_class
                ))
            })?;
        let parent = self
            .beans
            .iter()
            .position(|b| b.bean_class == superclass && is_class_bean(b))
            .ok_or_else(|| {
                CoreError::inconsistent_specialization(format!(
                    "Super class : {} of specialized class : {} is not a bean in the deployment.",
                    superclass, child_class
                ))
            })?;

        self.supersede(child, parent)
    }

    /// Let a specializing producer method supersede the producer method it
    /// overrides in the superclass of its declaring class.
    pub fn apply_producer_specialization(&mut self, producer: BeanId) -> Result<(), CoreError> {
        self.ensure_mutable("apply producer specialization")?;
        let bean = self
            .get(producer)
            .ok_or(CoreError::BeanNotFound { bean: producer.to_string() })?;
        let method = match &bean.kind {
            BeanKind::ProducerMethod(p) => p.method.clone(),
            _ => {
                return Err(CoreError::configuration(format!(
                    "Bean {} is not a producer method",
                    bean.display_name()
                )))
            }
        };
        let superclass = self
            .class_info(&bean.bean_class)
            .and_then(|c| c.superclass.clone())
            .ok_or_else(|| {
                CoreError::configuration(format!(
                    "Producer method specialization is failed. Class : {} has no super class",
                    bean.bean_class
                ))
            })?;

        let param_types: Vec<_> = method.params.iter().map(|p| &p.ty).collect();
        let overridden = self.beans.iter().position(|b| match &b.kind {
            BeanKind::ProducerMethod(p) => {
                p.declaring_class == superclass
                    && p.method.name == method.name
                    && p.method.params.iter().map(|p| &p.ty).eq(param_types.iter().copied())
            }
            _ => false,
        });
        let parent = match overridden {
            Some(parent) => parent,
            None => {
                let declared = self
                    .class_info(&superclass)
                    .map_or(false, |c| c.method(&method.name).is_some());
                let problem = if declared {
                    "not annotated with @Produces"
                } else {
                    "not found"
                };
                return Err(CoreError::configuration(format!(
                    "Producer method specialization is failed. Method {} {} in super class : {}",
                    method.name, problem, superclass
                )));
            }
        };

        self.supersede(producer.index(), parent)
    }

    fn supersede(&mut self, child: usize, parent: usize) -> Result<(), CoreError> {
        let parent_id = BeanId(parent);
        if !self.beans[parent].enabled {
            if self.beans[child].specializes == Some(parent_id) {
                return Ok(());
            }
            return Err(CoreError::inconsistent_specialization(format!(
                "Super bean : {} is not enabled to be specialized by : {}",
                self.beans[parent].display_name(),
                self.beans[child].display_name()
            )));
        }

        let parent_name = self.beans[parent].name.clone();
        let parent_qualifiers = self.beans[parent].qualifiers.clone();
        let parent_display = self.beans[parent].display_name();

        let bean = &mut self.beans[child];
        if let Some(name) = parent_name {
            if bean.explicit_name {
                return Err(CoreError::definition(format!(
                    "@Specialized Class : {} may not explicitly declare a bean name",
                    bean.display_name()
                )));
            }
            bean.qualifiers.retain(|q| !q.is_named());
            bean.name = Some(name);
        }
        for qualifier in parent_qualifiers {
            push_unique(&mut bean.qualifiers, qualifier);
        }
        bean.specialized = true;
        bean.specializes = Some(parent_id);
        tracing::info!("{} specializes {}", bean.display_name(), parent_display);

        self.beans[parent].enabled = false;
        Ok(())
    }

    /// The enabled end of the specialization chain starting at `bean`
    pub fn most_specialized(&self, bean: BeanId) -> BeanId {
        let mut current = bean;
        for _ in 0..self.beans.len() {
            match self.beans.iter().find(|b| b.specializes == Some(current)) {
                Some(next) => current = next.id(),
                None => break,
            }
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ContainerConfig;
    use crate::container::class_info::{ClassInfo, ConstructorInfo, Marker, MethodInfo, Stereotype};
    use crate::container::descriptor::BeanDefinition;
    use crate::container::invoker::ConstructorInvoker;
    use crate::container::plugin::PluginRegistry;
    use crate::container::qualifier::Qualifier;
    use crate::container::registry::BeanRegistry;
    use crate::container::types::TypeRef;
    use std::sync::Arc;

    fn registry_with(config: ContainerConfig) -> BeanRegistry {
        BeanRegistry::new(Arc::new(config), Arc::new(PluginRegistry::new()))
    }

    fn class(name: &str) -> ClassInfo {
        ClassInfo::new(name).with_constructor(ConstructorInfo::new(ConstructorInvoker::new(name, |_| Ok(()))))
    }

    #[test]
    fn test_specialization_inherits_name_and_disables_parent() {
        let mut registry = registry_with(ContainerConfig::new());
        let base = registry
            .register(BeanDefinition::managed(class("BaseService"), vec![]).named("base"))
            .unwrap();
        let child = registry
            .register(BeanDefinition::managed(
                class("ChildService").extending("BaseService").specializing(),
                vec![TypeRef::class("BaseService")],
            ))
            .unwrap();

        registry.apply_specialization("ChildService").unwrap();

        assert!(!registry.get(base).unwrap().enabled);
        let child_bean = registry.get(child).unwrap();
        assert_eq!(child_bean.name.as_deref(), Some("base"));
        assert!(child_bean.specialized);
        assert_eq!(registry.most_specialized(base), child);
    }

    #[test]
    fn test_specialization_is_idempotent() {
        let mut registry = registry_with(ContainerConfig::new());
        registry
            .register(BeanDefinition::managed(class("Base"), vec![]).with_qualifier(Qualifier::new("Fast")))
            .unwrap();
        let child = registry
            .register(BeanDefinition::managed(class("Child").extending("Base").specializing(), vec![]))
            .unwrap();

        registry.apply_specialization("Child").unwrap();
        let once = registry.get(child).unwrap().qualifiers.clone();
        registry.apply_specialization("Child").unwrap();
        assert_eq!(registry.get(child).unwrap().qualifiers, once);
        assert_eq!(registry.enabled_count(), 1);
    }

    #[test]
    fn test_explicit_child_name_with_named_parent() {
        let mut registry = registry_with(ContainerConfig::new());
        registry
            .register(BeanDefinition::managed(class("Base"), vec![]).named("base"))
            .unwrap();
        registry
            .register(
                BeanDefinition::managed(class("Child").extending("Base").specializing(), vec![]).named("child"),
            )
            .unwrap();
        let err = registry.apply_specialization("Child").unwrap_err();
        assert!(err.is_definition());
        assert!(err.to_string().contains("may not explicitly declare a bean name"));
    }

    #[test]
    fn test_missing_specializer() {
        let mut registry = registry_with(ContainerConfig::new());
        registry.register(BeanDefinition::managed(class("Base"), vec![])).unwrap();
        let err = registry.apply_specialization("Base").unwrap_err();
        assert!(err.is_inconsistent_specialization());
        assert!(err.to_string().contains("is not enabled in the deployment"));
    }

    #[test]
    fn test_chain_is_applied_supertypes_first() {
        let mut registry = registry_with(ContainerConfig::new());
        let base = registry
            .register(BeanDefinition::managed(class("Base"), vec![]).named("base"))
            .unwrap();
        registry
            .register(BeanDefinition::managed(class("Middle").extending("Base").specializing(), vec![]))
            .unwrap();
        let leaf = registry
            .register(BeanDefinition::managed(class("Leaf").extending("Middle").specializing(), vec![]))
            .unwrap();

        registry.apply_all_specializations().unwrap();

        assert_eq!(registry.enabled_count(), 1);
        assert_eq!(registry.get(leaf).unwrap().name.as_deref(), Some("base"));
        assert_eq!(registry.most_specialized(base), leaf);
    }

    #[test]
    fn test_alternative_enablement() {
        let mut registry = registry_with(ContainerConfig::new().with_alternative("Staging"));
        let listed = registry
            .register(BeanDefinition::managed(
                class("StagingMailer").with_stereotype(Stereotype::new("Staging").alternative()),
                vec![],
            ))
            .unwrap();
        let unlisted = registry
            .register(BeanDefinition::managed(class("MockMailer").alternative(), vec![]))
            .unwrap();

        registry.apply_enablement().unwrap();

        assert!(registry.get(listed).unwrap().enabled);
        assert!(!registry.get(unlisted).unwrap().enabled);
    }

    #[test]
    fn test_producer_follows_alternative_parent() {
        let mut registry = registry_with(ContainerConfig::new());
        registry
            .register(BeanDefinition::managed(class("MockFactory").alternative(), vec![]))
            .unwrap();
        let method = MethodInfo::new("MockFactory", "clock")
            .with_marker(Marker::Produces)
            .returning(TypeRef::class("Clock"));
        let producer = registry
            .register(BeanDefinition::producer_method("MockFactory", method))
            .unwrap();

        registry.apply_enablement().unwrap();
        assert!(!registry.get(producer).unwrap().enabled);
    }

    #[test]
    fn test_producer_specialization() {
        let mut registry = registry_with(ContainerConfig::new());
        registry.register(BeanDefinition::managed(class("Shop"), vec![])).unwrap();
        registry
            .register(BeanDefinition::managed(class("MockShop").extending("Shop").specializing(), vec![]))
            .unwrap();
        let parent = registry
            .register(BeanDefinition::producer_method(
                "Shop",
                MethodInfo::new("Shop", "getPrice")
                    .with_marker(Marker::Produces)
                    .returning(TypeRef::class("Price"))
                    .with_qualifier(Qualifier::new("Named")),
            ))
            .unwrap();
        let child = registry
            .register(BeanDefinition::producer_method(
                "MockShop",
                MethodInfo::new("MockShop", "getPrice")
                    .with_marker(Marker::Produces)
                    .with_marker(Marker::Specializes)
                    .returning(TypeRef::class("Price")),
            ))
            .unwrap();

        registry.apply_all_specializations().unwrap();

        assert!(!registry.get(parent).unwrap().enabled);
        let bean = registry.get(child).unwrap();
        assert_eq!(bean.name.as_deref(), Some("price"));
        assert!(bean.specialized);
    }

    #[test]
    fn test_producer_specialization_without_overridden_producer() {
        let mut registry = registry_with(ContainerConfig::new());
        registry.register(BeanDefinition::managed(class("Shop"), vec![])).unwrap();
        registry
            .register(BeanDefinition::managed(class("MockShop").extending("Shop"), vec![]))
            .unwrap();
        let child = registry
            .register(BeanDefinition::producer_method(
                "MockShop",
                MethodInfo::new("MockShop", "discount")
                    .with_marker(Marker::Produces)
                    .with_marker(Marker::Specializes)
                    .returning(TypeRef::class("Discount")),
            ))
            .unwrap();
        let err = registry.apply_producer_specialization(child).unwrap_err();
        assert!(err.to_string().contains("Method discount not found in super class : Shop"));
    }
}
