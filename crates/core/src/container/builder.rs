use crate::config::{ContainerConfig, EnvConfig};
use crate::container::class_info::{ClassInfo, Marker};
use crate::container::container::BeanContainer;
use crate::container::descriptor::{BeanDefinition, BeanId, BeanKind, InjectionPoint};
use crate::container::events::{ContainerEvent, ContainerEventKind, EventDispatcher, TracingDispatcher};
use crate::container::injector::EnterpriseInstanceProvider;
use crate::container::interceptor::{build_stack, BoundInterceptorClass, InterceptorSource};
use crate::container::invoker::{Arguments, Instance};
use crate::container::matcher::matches_in;
use crate::container::plugin::{DeploymentPlugin, PluginRegistry};
use crate::container::qualifier::{normalize_required, MemberValue};
use crate::container::registry::BeanRegistry;
use crate::container::resolver::Resolver;
use crate::container::scope::{InMemoryContext, Scope, ScopeContext};
use crate::container::validation;
use crate::errors::CoreError;
use std::sync::Arc;

/// Deployment pipeline of a bean container.
///
/// Collects bean definitions, plugins and contexts, then `build()` validates
/// the definitions, applies enablement and specialization, binds
/// interceptors and decorators, validates injection points and freezes the
/// registry.
pub struct ContainerBuilder {
    config: ContainerConfig,
    plugins: PluginRegistry,
    beans: Vec<BeanDefinition>,
    external_interceptors: Vec<ClassInfo>,
    dispatcher: Arc<dyn EventDispatcher>,
    enterprise: Option<Arc<dyn EnterpriseInstanceProvider>>,
    contexts: Vec<Arc<dyn ScopeContext>>,
}

impl ContainerBuilder {
    pub fn new(config: ContainerConfig) -> Self {
        Self {
            config,
            plugins: PluginRegistry::new(),
            beans: Vec::new(),
            external_interceptors: Vec::new(),
            dispatcher: Arc::new(TracingDispatcher),
            enterprise: None,
            contexts: Vec::new(),
        }
    }

    pub fn plugin(mut self, plugin: Arc<dyn DeploymentPlugin>) -> Self {
        self.plugins.register(plugin);
        self
    }

    pub fn event_dispatcher(mut self, dispatcher: Arc<dyn EventDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn enterprise_provider(mut self, provider: Arc<dyn EnterpriseInstanceProvider>) -> Self {
        self.enterprise = Some(provider);
        self
    }

    pub fn add_bean(mut self, bean: BeanDefinition) -> Self {
        self.beans.push(bean);
        self
    }

    pub fn add_beans(mut self, beans: impl IntoIterator<Item = BeanDefinition>) -> Self {
        self.beans.extend(beans);
        self
    }

    /// An interceptor class that is not itself a bean; it is instantiated
    /// once through its no-argument constructor
    pub fn external_interceptor(mut self, class: ClassInfo) -> Self {
        self.external_interceptors.push(class);
        self
    }

    /// Replace the default context of a scope
    pub fn context(mut self, context: Arc<dyn ScopeContext>) -> Self {
        self.contexts.retain(|c| c.scope() != context.scope());
        self.contexts.push(context);
        self
    }

    /// Deploy the collected beans
    pub fn build(self) -> Result<BeanContainer, CoreError> {
        self.config.validate()?;
        tracing::info!(
            "Deploying {} bean definition(s) in {} mode ({})",
            self.beans.len(),
            if self.config.strict { "strict" } else { "lenient" },
            self.config.environment
        );

        let mut deployment = Deployment {
            registry: BeanRegistry::new(Arc::new(self.config.clone()), Arc::new(self.plugins)),
            dispatcher: Arc::clone(&self.dispatcher),
            strict: self.config.strict,
            problems: Vec::new(),
        };

        let (producers, class_backed): (Vec<_>, Vec<_>) =
            self.beans.into_iter().partition(|b| b.kind.is_producer());
        for bean in class_backed.into_iter().chain(producers) {
            deployment.define(bean)?;
        }
        deployment.fire(ContainerEvent::new(ContainerEventKind::AfterBeanDiscovery, "deployment"))?;

        deployment.registry.apply_enablement()?;
        deployment.registry.apply_all_specializations()?;
        deployment.add_implicit_beans()?;

        let external = instantiate_external(self.external_interceptors)?;
        deployment.bind_interceptors(&external)?;
        deployment.bind_decorators()?;
        if self.config.validate_injection_points {
            deployment.validate_injection_points()?;
        }

        let Deployment {
            mut registry,
            dispatcher,
            problems,
            ..
        } = deployment;
        registry.freeze();
        dispatcher.dispatch(
            &ContainerEvent::new(ContainerEventKind::AfterDeploymentValidation, "deployment")
                .with_payload(serde_json::json!({
                    "beans": registry.len(),
                    "enabled": registry.enabled_count(),
                    "problems": problems.len(),
                })),
        )?;
        if !problems.is_empty() {
            tracing::warn!("Deployment finished with {} problem(s)", problems.len());
        }

        let mut contexts = default_contexts();
        for context in self.contexts {
            contexts.retain(|c| c.scope() != context.scope());
            contexts.push(context);
        }
        Ok(BeanContainer::new(
            registry,
            contexts,
            dispatcher,
            self.enterprise,
            problems,
        ))
    }
}

fn default_contexts() -> Vec<Arc<dyn ScopeContext>> {
    vec![
        Arc::new(InMemoryContext::new(Scope::Singleton)),
        Arc::new(InMemoryContext::new(Scope::Application)),
        Arc::new(InMemoryContext::new(Scope::Request)),
    ]
}

fn instantiate_external(classes: Vec<ClassInfo>) -> Result<Vec<(Arc<ClassInfo>, Instance)>, CoreError> {
    classes
        .into_iter()
        .map(|class| {
            let constructor = class.no_arg_constructor().ok_or_else(|| {
                CoreError::configuration(format!(
                    "Interceptor class : {} must define a no-argument constructor",
                    class.name
                ))
            })?;
            let created = constructor
                .invoker
                .construct(&Arguments::empty())
                .map_err(|e| CoreError::injection(format!("{}#<init>", class.name), e))?;
            Ok((Arc::new(class), created))
        })
        .collect()
}

/// State of one `build()` run
struct Deployment {
    registry: BeanRegistry,
    dispatcher: Arc<dyn EventDispatcher>,
    strict: bool,
    problems: Vec<CoreError>,
}

impl Deployment {
    fn fire(&self, event: ContainerEvent) -> Result<(), CoreError> {
        self.dispatcher.dispatch(&event)
    }

    /// Strict deployments stop at the first problem; lenient ones record it
    fn problem(&mut self, error: CoreError) -> Result<(), CoreError> {
        if self.strict || !error.is_deployment_problem() {
            return Err(error);
        }
        tracing::warn!("Deployment problem: {}", error);
        self.problems.push(error);
        Ok(())
    }

    fn define(&mut self, bean: BeanDefinition) -> Result<(), CoreError> {
        for event in discovery_events(&bean) {
            self.fire(event)?;
        }
        match self.registry.register(bean) {
            Ok(id) => {
                let bean = self.registry.get(id).ok_or(CoreError::BeanNotFound { bean: id.to_string() })?;
                let event = ContainerEvent::new(ContainerEventKind::ProcessBean, bean.display_name())
                    .for_bean(id.index())
                    .with_qualifiers(&bean.qualifiers);
                self.fire(event)
            }
            Err(e) => self.problem(e),
        }
    }

    /// `Event<T>`, `Instance<T>` and `@New` beans for the injection points
    /// that need them
    fn add_implicit_beans(&mut self) -> Result<(), CoreError> {
        let points: Vec<InjectionPoint> = self
            .registry
            .enabled_beans()
            .flat_map(|b| b.injection_points.iter().filter(|ip| !ip.delegate).cloned())
            .collect();

        for ip in points {
            let implicit = if ip.is_event() || ip.is_instance() {
                let argument = match ip.required_type.args() {
                    [argument] => argument.clone(),
                    _ => continue,
                };
                let qualifiers = normalize_required(&ip.qualifiers);
                if !self.registry.lookup(&ip.required_type, &qualifiers).is_empty() {
                    continue;
                }
                if ip.is_event() {
                    BeanDefinition::event(argument, ip.qualifiers.clone())
                } else {
                    BeanDefinition::instance_lookup(argument, ip.qualifiers.clone())
                }
            } else if let Some(new) = ip.qualifiers.iter().find(|q| q.is_new()) {
                let value = match new.member("value") {
                    Some(MemberValue::Class(class)) => Some(class.as_str()),
                    _ => None,
                };
                let target = match value.or_else(|| ip.required_type.raw_name()) {
                    Some(target) => target.to_string(),
                    None => continue,
                };
                let companion = {
                    let class = self.registry.class_info(&target).map(Arc::as_ref);
                    if let Err(e) = validation::check_new_target(&ip, class) {
                        self.problem(e)?;
                        continue;
                    }
                    let exists = self
                        .registry
                        .beans()
                        .any(|b| b.kind.is_new() && b.bean_class == target);
                    if exists {
                        continue;
                    }
                    self.registry
                        .find_class_bean(&target)
                        .and_then(BeanDefinition::new_companion)
                };
                match companion {
                    Some(companion) => companion,
                    None => continue,
                }
            } else {
                continue;
            };

            tracing::debug!("Adding implicit {} for {}", implicit.display_name(), ip);
            if let Err(e) = self.registry.register(implicit) {
                self.problem(e)?;
            }
        }
        Ok(())
    }

    fn bind_interceptors(&mut self, external: &[(Arc<ClassInfo>, Instance)]) -> Result<(), CoreError> {
        let targets: Vec<(BeanId, Arc<ClassInfo>)> = self
            .registry
            .enabled_beans()
            .filter(|b| {
                matches!(
                    b.kind,
                    BeanKind::Managed(_) | BeanKind::New(_) | BeanKind::Enterprise(_)
                )
            })
            .filter_map(|b| b.class().map(|c| (b.id(), Arc::clone(c))))
            .collect();

        for (id, class) in targets {
            let bound = self.bound_interceptors(&class, external);
            match build_stack(&class, &bound) {
                Ok(stack) => {
                    if !stack.is_empty() {
                        tracing::debug!("Bound {} interceptor method(s) to {}", stack.len(), class.name);
                    }
                    self.registry.bean_mut(id)?.interceptor_stack = stack;
                }
                Err(e) => {
                    self.registry.exclude(id)?;
                    self.problem(e)?;
                }
            }
        }
        Ok(())
    }

    /// Enabled interceptor classes bound to `class`, at class level first,
    /// each group in configured order
    fn bound_interceptors(
        &self,
        class: &ClassInfo,
        external: &[(Arc<ClassInfo>, Instance)],
    ) -> Vec<BoundInterceptorClass> {
        let config = self.registry.config();
        let mut class_level: Vec<&str> = class.interceptors.iter().map(String::as_str).collect();
        for stereotype in &class.stereotypes {
            class_level.extend(stereotype.interceptor_bindings.iter().map(|b| b.name.as_str()));
        }
        let mut seen = std::collections::HashSet::new();
        class_level.retain(|name| seen.insert(*name));

        let mut bound = Vec::new();
        let push = |name: &str, bound_method: Option<&str>, bound: &mut Vec<(usize, BoundInterceptorClass)>| {
            let position = match config.interceptor_position(name) {
                Some(position) => position,
                None => {
                    tracing::debug!("Interceptor {} bound to {} is not enabled", name, class.name);
                    return;
                }
            };
            let resolved = self.interceptor_class(name, external);
            match resolved {
                Some((interceptor, source)) => bound.push((
                    position,
                    BoundInterceptorClass {
                        class: interceptor,
                        source,
                        bound_method: bound_method.map(str::to_string),
                    },
                )),
                None => tracing::warn!("Enabled interceptor {} has no bean or class definition", name),
            }
        };

        let mut class_bound = Vec::new();
        for name in class_level {
            push(name, None, &mut class_bound);
        }
        class_bound.sort_by_key(|(position, _)| *position);

        let mut method_bound = Vec::new();
        for method in &class.methods {
            for name in &method.interceptors {
                push(name, Some(&method.name), &mut method_bound);
            }
        }
        method_bound.sort_by_key(|(position, _)| *position);

        bound.extend(class_bound.into_iter().chain(method_bound).map(|(_, b)| b));
        bound
    }

    fn interceptor_class(
        &self,
        name: &str,
        external: &[(Arc<ClassInfo>, Instance)],
    ) -> Option<(Arc<ClassInfo>, InterceptorSource)> {
        let bean = self
            .registry
            .enabled_beans()
            .find(|b| matches!(b.kind, BeanKind::Interceptor(_)) && b.bean_class == name);
        if let Some(bean) = bean {
            return bean
                .class()
                .map(|c| (Arc::clone(c), InterceptorSource::Bean(bean.id())));
        }
        external
            .iter()
            .find(|(class, _)| class.name == name)
            .map(|(class, instance)| (Arc::clone(class), InterceptorSource::External(instance.clone())))
    }

    fn bind_decorators(&mut self) -> Result<(), CoreError> {
        let config = self.registry.config();
        let hierarchy = self.registry.hierarchy();
        let mut decorators: Vec<(usize, &BeanDefinition)> = self
            .registry
            .enabled_beans()
            .filter(|b| matches!(b.kind, BeanKind::Decorator(_)))
            .filter_map(|b| config.decorator_position(&b.bean_class).map(|p| (p, b)))
            .collect();
        decorators.sort_by_key(|(position, _)| *position);

        let mut plan: Vec<(BeanId, Vec<BeanId>)> = Vec::new();
        for bean in self.registry.enabled_beans() {
            if !matches!(bean.kind, BeanKind::Managed(_) | BeanKind::New(_) | BeanKind::Enterprise(_)) {
                continue;
            }
            let applied: Vec<BeanId> = decorators
                .iter()
                .filter(|(_, d)| {
                    d.class().and_then(|c| c.delegate.as_ref()).map_or(false, |delegate| {
                        matches_in(
                            &hierarchy,
                            &delegate.ty,
                            &normalize_required(&delegate.qualifiers),
                            &bean.types,
                            &bean.qualifiers,
                        )
                    })
                })
                .map(|(_, d)| d.id())
                .collect();
            if !applied.is_empty() {
                plan.push((bean.id(), applied));
            }
        }

        for (id, applied) in plan {
            tracing::debug!("Decorating {} with {} decorator(s)", id, applied.len());
            self.registry.bean_mut(id)?.decorators = applied;
        }
        Ok(())
    }

    /// Resolve every injection point of every enabled bean. Excluding a bean
    /// can leave others unsatisfied, so passes repeat until one excludes
    /// nothing.
    fn validate_injection_points(&mut self) -> Result<(), CoreError> {
        loop {
            let mut failures: Vec<(BeanId, CoreError)> = Vec::new();
            {
                let resolver = Resolver::new(&self.registry);
                for bean in self.registry.enabled_beans() {
                    for ip in bean.injection_points.iter().filter(|ip| !ip.delegate) {
                        let outcome = resolver.resolve(ip).and_then(Resolver::check_proxyable);
                        if let Err(e) = outcome {
                            failures.push((bean.id(), e.into()));
                            break;
                        }
                    }
                }
            }
            if failures.is_empty() {
                return Ok(());
            }
            for (id, error) in failures {
                self.registry.exclude(id)?;
                self.problem(error)?;
            }
        }
    }
}

/// Process events fired before a bean is registered
fn discovery_events(bean: &BeanDefinition) -> Vec<ContainerEvent> {
    let subject = bean.display_name();
    match &bean.kind {
        BeanKind::ProducerMethod(p) => vec![
            ContainerEvent::new(ContainerEventKind::ProcessProducer, p.method.qualified_name()),
            ContainerEvent::new(ContainerEventKind::ProcessProducerMethod, subject),
        ],
        BeanKind::ProducerField(p) => vec![
            ContainerEvent::new(ContainerEventKind::ProcessProducer, p.field.qualified_name()),
            ContainerEvent::new(ContainerEventKind::ProcessProducerField, subject),
        ],
        _ => match bean.class() {
            Some(class) => {
                let mut events = vec![
                    ContainerEvent::new(ContainerEventKind::ProcessAnnotatedType, class.name.clone()),
                    ContainerEvent::new(ContainerEventKind::ProcessInjectionTarget, class.name.clone()),
                ];
                events.extend(
                    class
                        .methods
                        .iter()
                        .filter(|m| m.params.iter().any(|p| p.has_marker(Marker::Observes)))
                        .map(|m| ContainerEvent::new(ContainerEventKind::ProcessObserverMethod, m.qualified_name())),
                );
                events
            }
            None => Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::class_info::{ConstructorInfo, MethodInfo};
    use crate::container::events::CollectingDispatcher;
    use crate::container::invoker::ConstructorInvoker;
    use crate::container::types::TypeRef;

    fn class(name: &str) -> ClassInfo {
        ClassInfo::new(name).with_constructor(ConstructorInfo::new(ConstructorInvoker::new(name, |_| Ok(()))))
    }

    #[test]
    fn test_build_empty_container() {
        let container = ContainerBuilder::new(ContainerConfig::testing()).build().unwrap();
        assert!(container.registry().is_empty());
        assert!(container.registry().is_frozen());
        assert!(container.problems().is_empty());
    }

    #[test]
    fn test_lenient_build_records_problems() {
        let container = ContainerBuilder::new(ContainerConfig::new())
            .add_bean(BeanDefinition::managed(class("Broken").inner(), vec![]))
            .add_bean(BeanDefinition::managed(class("Fine"), vec![]))
            .build()
            .unwrap();
        assert_eq!(container.problems().len(), 1);
        assert!(container.problems()[0].is_definition());
        assert_eq!(container.registry().enabled_count(), 1);
    }

    #[test]
    fn test_strict_build_fails_on_first_problem() {
        let err = ContainerBuilder::new(ContainerConfig::testing())
            .add_bean(BeanDefinition::managed(class("Broken").inner(), vec![]))
            .build()
            .unwrap_err();
        assert!(err.is_definition());
    }

    #[test]
    fn test_unsatisfied_injection_point_is_reported() {
        let client = ClassInfo::new("Client").with_constructor(
            ConstructorInfo::injecting(ConstructorInvoker::new("Client", |_| Ok(()))).with_param(
                crate::container::class_info::ParameterInfo::new(TypeRef::class("Printer")),
            ),
        );
        let err = ContainerBuilder::new(ContainerConfig::testing())
            .add_bean(BeanDefinition::managed(client, vec![]))
            .build()
            .unwrap_err();
        assert!(err.is_unsatisfied());
    }

    #[test]
    fn test_deployment_events_are_dispatched() {
        let dispatcher = Arc::new(CollectingDispatcher::new());
        let producer = MethodInfo::new("Factory", "widget")
            .with_marker(Marker::Produces)
            .returning(TypeRef::class("Widget"));
        ContainerBuilder::new(ContainerConfig::testing())
            .event_dispatcher(dispatcher.clone())
            .add_bean(BeanDefinition::producer_method("Factory", producer))
            .add_bean(BeanDefinition::managed(class("Factory"), vec![]))
            .build()
            .unwrap();

        assert_eq!(dispatcher.count(ContainerEventKind::ProcessAnnotatedType), 1);
        assert_eq!(dispatcher.count(ContainerEventKind::ProcessProducerMethod), 1);
        assert_eq!(dispatcher.count(ContainerEventKind::ProcessBean), 2);
        assert_eq!(dispatcher.count(ContainerEventKind::AfterBeanDiscovery), 1);
        assert_eq!(dispatcher.count(ContainerEventKind::AfterDeploymentValidation), 1);
    }

    #[test]
    fn test_implicit_event_bean_is_added() {
        let client = class("Client").with_field(
            crate::container::class_info::FieldInfo::new(
                "Client",
                "events",
                TypeRef::parameterized("Event", vec![TypeRef::class("OrderPlaced")]),
                crate::container::invoker::FieldAccessor::new("events")
                    .with_setter::<(), _>(|_, _| Ok(())),
            )
            .with_marker(Marker::Inject),
        );
        let container = ContainerBuilder::new(ContainerConfig::testing())
            .add_bean(BeanDefinition::managed(client, vec![]))
            .build()
            .unwrap();
        assert!(container
            .registry()
            .beans()
            .any(|b| matches!(b.kind, BeanKind::Event(_))));
    }
}
