use crate::container::descriptor::{BeanDefinition, InjectionPoint};
use crate::container::qualifier::{describe, normalize_required, Qualifier};
use crate::container::registry::BeanRegistry;
use crate::container::types::TypeRef;
use crate::container::validation::unproxyable_reason;
use crate::errors::ResolutionError;

/// Typesafe resolution over a registry. Never mutates the registry.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'r> {
    registry: &'r BeanRegistry,
}

impl<'r> Resolver<'r> {
    pub fn new(registry: &'r BeanRegistry) -> Self {
        Self { registry }
    }

    /// Resolve an injection point to exactly one enabled bean
    pub fn resolve(&self, ip: &InjectionPoint) -> Result<&'r BeanDefinition, ResolutionError> {
        let qualifiers = required_qualifiers(&ip.required_type, &ip.qualifiers);
        let bean = self.resolve_type(&ip.required_type, &qualifiers)?;
        Self::check_nullable(ip, bean)?;
        tracing::debug!("Resolved {} to {}", ip, bean.display_name());
        Ok(bean)
    }

    /// Resolve a type and qualifier set to exactly one enabled bean
    pub fn resolve_type(
        &self,
        required_type: &TypeRef,
        qualifiers: &[Qualifier],
    ) -> Result<&'r BeanDefinition, ResolutionError> {
        let mut candidates = self.candidates(required_type, qualifiers);
        match candidates.len() {
            0 => Err(ResolutionError::Unsatisfied {
                required_type: required_type.to_string(),
                qualifiers: describe(&normalize_required(qualifiers)),
            }),
            1 => Ok(candidates.remove(0)),
            _ => Err(ResolutionError::Ambiguous {
                required_type: required_type.to_string(),
                qualifiers: describe(&normalize_required(qualifiers)),
                candidates: candidates.iter().map(|b| b.display_name()).collect(),
            }),
        }
    }

    /// Matching enabled beans after alternative and specialization filtering
    pub fn candidates(&self, required_type: &TypeRef, qualifiers: &[Qualifier]) -> Vec<&'r BeanDefinition> {
        let qualifiers = required_qualifiers(required_type, qualifiers);
        filter_candidates(self.registry.lookup(required_type, &qualifiers))
    }

    /// Resolve a bean by name
    pub fn resolve_name(&self, name: &str) -> Result<&'r BeanDefinition, ResolutionError> {
        let mut candidates = filter_candidates(self.registry.lookup_by_name(name));
        let named = vec![format!("@Named(value={})", name)];
        match candidates.len() {
            0 => Err(ResolutionError::Unsatisfied {
                required_type: "Object".to_string(),
                qualifiers: named,
            }),
            1 => Ok(candidates.remove(0)),
            _ => Err(ResolutionError::Ambiguous {
                required_type: "Object".to_string(),
                qualifiers: named,
                candidates: candidates.iter().map(|b| b.display_name()).collect(),
            }),
        }
    }

    /// A primitive injection point can not take a bean that may yield null
    pub fn check_nullable(ip: &InjectionPoint, bean: &BeanDefinition) -> Result<(), ResolutionError> {
        if !ip.nullable && bean.nullable {
            return Err(ResolutionError::NullableDependency {
                injection_point: ip.to_string(),
                bean: bean.display_name(),
            });
        }
        Ok(())
    }

    /// Normal-scoped beans must admit a client proxy
    pub fn check_proxyable(bean: &BeanDefinition) -> Result<(), ResolutionError> {
        match unproxyable_reason(bean) {
            Some(reason) => Err(ResolutionError::Unproxyable {
                bean: bean.display_name(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

/// `@New` without a value means "new instance of the required type"
fn required_qualifiers(required_type: &TypeRef, qualifiers: &[Qualifier]) -> Vec<Qualifier> {
    qualifiers
        .iter()
        .map(|q| {
            if q.is_new() && q.member("value").is_none() {
                Qualifier::new_qualifier(required_type.raw_name())
            } else {
                q.clone()
            }
        })
        .collect()
}

/// Enabled alternatives take precedence; beans superseded by another
/// candidate are dropped.
fn filter_candidates(candidates: Vec<&BeanDefinition>) -> Vec<&BeanDefinition> {
    if candidates.len() < 2 {
        return candidates;
    }
    let alternatives: Vec<&BeanDefinition> = candidates.iter().copied().filter(|b| b.alternative).collect();
    let candidates = if alternatives.is_empty() {
        candidates
    } else {
        alternatives
    };
    if candidates.len() < 2 {
        return candidates;
    }
    candidates
        .iter()
        .copied()
        .filter(|b| !candidates.iter().any(|other| other.specializes == Some(b.id())))
        .collect()
}
