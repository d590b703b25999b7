use crate::config::ContainerConfig;
use crate::container::class_info::MethodBody;
use crate::container::creational::CreationalContext;
use crate::container::descriptor::{BeanDefinition, BeanId, BeanKind, InjectionPoint};
use crate::container::events::{EventDispatcher, EventSource};
use crate::container::injector::{BeanInstanceSource, EnterpriseInstanceProvider, Injector};
use crate::container::interceptor::{
    DecoratorChain, DecoratorLink, InterceptionType, InterceptorData, InvocationContext, TargetFn,
};
use crate::container::invoker::{instance, Arguments, Instance, MemberInvoker};
use crate::container::lifecycle;
use crate::container::qualifier::Qualifier;
use crate::container::registry::BeanRegistry;
use crate::container::resolver::Resolver;
use crate::container::scope::{Scope, ScopeContext};
use crate::container::types::TypeRef;
use crate::container::validation;
use crate::errors::{CoreError, InvocationFailure};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

/// Interceptor and decorator instances created for one target instance
type Attached = HashMap<String, Instance>;

/// Attached instances of a target, valid while the target is alive
struct AttachedEntry {
    target: Weak<dyn Any + Send + Sync>,
    instances: Attached,
}

impl AttachedEntry {
    fn is_live(&self) -> bool {
        self.target.strong_count() > 0
    }
}

/// Identity of an instance for the lifetime of its allocation
fn identity(instance: &Instance) -> usize {
    Arc::as_ptr(instance) as *const () as usize
}

/// Deployed bean container.
///
/// Built by `ContainerBuilder`; the registry is frozen, so resolution needs
/// no locking. Scope contexts and per-instance interceptor state are guarded
/// by `RwLock`s.
pub struct BeanContainer {
    registry: Arc<BeanRegistry>,
    contexts: RwLock<HashMap<String, Arc<dyn ScopeContext>>>,
    attached: RwLock<HashMap<usize, AttachedEntry>>,
    dispatcher: Arc<dyn EventDispatcher>,
    enterprise: Option<Arc<dyn EnterpriseInstanceProvider>>,
    problems: Vec<CoreError>,
}

impl BeanContainer {
    pub(crate) fn new(
        registry: BeanRegistry,
        contexts: Vec<Arc<dyn ScopeContext>>,
        dispatcher: Arc<dyn EventDispatcher>,
        enterprise: Option<Arc<dyn EnterpriseInstanceProvider>>,
        problems: Vec<CoreError>,
    ) -> Self {
        let contexts = contexts
            .into_iter()
            .map(|c| (c.scope().as_str().to_string(), c))
            .collect();
        Self {
            registry: Arc::new(registry),
            contexts: RwLock::new(contexts),
            attached: RwLock::new(HashMap::new()),
            dispatcher,
            enterprise,
            problems,
        }
    }

    pub fn registry(&self) -> &BeanRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ContainerConfig {
        self.registry.config()
    }

    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.registry)
    }

    /// Problems that excluded beans from a lenient deployment
    pub fn problems(&self) -> &[CoreError] {
        &self.problems
    }

    pub fn bean(&self, id: BeanId) -> Result<&BeanDefinition, CoreError> {
        self.registry
            .get(id)
            .ok_or(CoreError::BeanNotFound { bean: id.to_string() })
    }

    /// Register or replace the context of a scope
    pub fn register_context(&self, context: Arc<dyn ScopeContext>) -> Result<(), CoreError> {
        let key = context.scope().as_str().to_string();
        tracing::info!("Registering context for scope {}", context.scope());
        self.contexts
            .write()
            .map_err(|_| CoreError::lock("scope contexts"))?
            .insert(key, context);
        Ok(())
    }

    /// The active context of `scope`
    pub fn context(&self, scope: &Scope) -> Result<Arc<dyn ScopeContext>, CoreError> {
        let contexts = self
            .contexts
            .read()
            .map_err(|_| CoreError::lock("scope contexts"))?;
        match contexts.get(scope.as_str()) {
            Some(context) if context.is_active() => Ok(Arc::clone(context)),
            _ => Err(CoreError::ContextNotActive {
                scope: scope.to_string(),
            }),
        }
    }

    /// Contextual reference of the bean resolved for `ty` and `qualifiers`.
    ///
    /// Dependent instances created on the way are recorded in `creational`.
    pub fn reference(
        &self,
        ty: &TypeRef,
        qualifiers: &[Qualifier],
        creational: &mut CreationalContext,
    ) -> Result<Instance, CoreError> {
        let bean = self.resolver().resolve_type(ty, qualifiers)?;
        self.contextual_instance(bean, creational)?.ok_or_else(|| {
            CoreError::illegal_product(format!("Bean {} produced no instance", bean.display_name()))
        })
    }

    /// Contextual reference with a throwaway creational context
    pub fn get_reference(&self, ty: &TypeRef, qualifiers: &[Qualifier]) -> Result<Instance, CoreError> {
        let mut creational = CreationalContext::new(None);
        self.reference(ty, qualifiers, &mut creational)
    }

    /// Typed contextual reference
    pub fn get<T: std::any::Any + Send + Sync>(&self, ty: &TypeRef, qualifiers: &[Qualifier]) -> Result<Arc<T>, CoreError> {
        let reference = self.get_reference(ty, qualifiers)?;
        reference.downcast::<T>().map_err(|_| {
            CoreError::injection(
                ty.to_string(),
                InvocationFailure::TargetMismatch {
                    expected: std::any::type_name::<T>().to_string(),
                },
            )
        })
    }

    /// Contextual reference of the bean carrying `name`
    pub fn get_by_name(&self, name: &str) -> Result<Instance, CoreError> {
        let bean = self.resolver().resolve_name(name)?;
        let mut creational = CreationalContext::new(None);
        self.contextual_instance(bean, &mut creational)?.ok_or_else(|| {
            CoreError::illegal_product(format!("Bean {} produced no instance", bean.display_name()))
        })
    }

    /// The instance of `bean` for its scope: a new dependent recorded in
    /// `creational`, or the instance held by the scope's context
    pub fn contextual_instance(
        &self,
        bean: &BeanDefinition,
        creational: &mut CreationalContext,
    ) -> Result<Option<Instance>, CoreError> {
        if bean.scope.is_dependent() {
            let mut own = creational.child(bean.id());
            let created = self.create_owned(bean, &mut own)?;
            match &created {
                Some(created) => creational.add_dependent(bean.id(), created.clone(), own),
                None => self.release(&mut own),
            }
            return Ok(created);
        }

        let context = self.context(&bean.scope)?;
        if let Some(existing) = context.get(bean.id())? {
            return Ok(Some(existing));
        }
        let mut own = CreationalContext::new(Some(bean.id()));
        let created = match self.create_owned(bean, &mut own)? {
            Some(created) => created,
            None => {
                self.release(&mut own);
                validation::check_null_product(bean)?;
                return Ok(None);
            }
        };
        let stored = context.insert_if_absent(bean.id(), created.clone(), own)?;
        if !Arc::ptr_eq(&stored, &created) {
            tracing::debug!("Discarding concurrently created instance of {}", bean.display_name());
            self.forget(&created);
        }
        Ok(Some(stored))
    }

    /// Create a new instance of a bean, ignoring its scope
    pub fn create(&self, bean: BeanId, creational: &mut CreationalContext) -> Result<Option<Instance>, CoreError> {
        let bean = self.bean(bean)?;
        self.create_instance(bean, creational)
    }

    /// Create into a context owned by the caller; on failure the dependents
    /// created so far are released
    fn create_owned(&self, bean: &BeanDefinition, own: &mut CreationalContext) -> Result<Option<Instance>, CoreError> {
        match self.create_instance(bean, own) {
            Ok(created) => Ok(created),
            Err(e) => {
                self.release(own);
                Err(e)
            }
        }
    }

    fn create_instance(
        &self,
        bean: &BeanDefinition,
        creational: &mut CreationalContext,
    ) -> Result<Option<Instance>, CoreError> {
        if !bean.enabled {
            return Err(CoreError::BeanNotFound {
                bean: format!("{} is disabled", bean.display_name()),
            });
        }
        tracing::debug!("Creating instance of {}", bean.display_name());
        match &bean.kind {
            BeanKind::Managed(m) | BeanKind::New(m) | BeanKind::Interceptor(m) | BeanKind::Decorator(m) => {
                let class = Arc::clone(&m.class);
                let constructor = validation::select_constructor(&class)?;
                let injector = self.injector();
                let created = injector.inject_constructor(bean, constructor, creational)?;
                injector.inject_members(bean, &class, &created, creational)?;

                let attached = self.attach(bean, creational)?;
                lifecycle::post_construct(bean, &created, |data| attached_instance(&attached, data))?;
                if !attached.is_empty() {
                    let mut entries = self
                        .attached
                        .write()
                        .map_err(|_| CoreError::lock("attached instances"))?;
                    entries.retain(|_, entry| entry.is_live());
                    entries.insert(
                        identity(&created),
                        AttachedEntry {
                            target: Arc::downgrade(&created),
                            instances: attached,
                        },
                    );
                }
                Ok(Some(created))
            }
            BeanKind::Enterprise(_) => {
                let provider = self.enterprise.as_ref().ok_or_else(|| {
                    CoreError::configuration(format!(
                        "No enterprise instance provider is registered for bean {}",
                        bean.display_name()
                    ))
                })?;
                provider.instance(bean, creational).map(Some)
            }
            BeanKind::ProducerMethod(p) => {
                let (target, mut parent_creational) = self.producer_target(bean, p.method.is_static)?;
                let product = self
                    .injector()
                    .inject_method(bean, &p.method, target.as_ref(), creational, None);
                self.release(&mut parent_creational);
                let product = product?;
                if product.is_none() {
                    validation::check_null_product(bean)?;
                }
                Ok(product)
            }
            BeanKind::ProducerField(p) => {
                let (target, mut parent_creational) = self.producer_target(bean, p.field.is_static)?;
                let member = MemberInvoker::Field(p.field.accessor.clone());
                member.force_accessible();
                let product = member
                    .invoke(target.as_ref(), &Arguments::empty())
                    .map_err(|e| CoreError::injection(p.field.qualified_name(), e));
                self.release(&mut parent_creational);
                let product = product?;
                if product.is_none() {
                    validation::check_null_product(bean)?;
                }
                Ok(product)
            }
            BeanKind::Event(e) => Ok(Some(instance(EventSource::new(
                e.event_type.clone(),
                e.qualifiers.clone(),
                Arc::clone(&self.dispatcher),
            )))),
            BeanKind::Instance(i) => Ok(Some(instance(InstanceHandle::new(
                i.lookup_type.clone(),
                i.qualifiers.clone(),
            )))),
            BeanKind::Extension(e) => Ok(Some(e.instance.clone())),
        }
    }

    /// Instance of the bean declaring a producer; the returned context is
    /// released once the producer member has been used
    fn producer_target(
        &self,
        bean: &BeanDefinition,
        is_static: bool,
    ) -> Result<(Option<Instance>, CreationalContext), CoreError> {
        let parent_id = bean.kind.parent().ok_or_else(|| {
            CoreError::definition(format!("Producer {} has no declaring bean", bean.display_name()))
        })?;
        let mut parent_creational = CreationalContext::new(Some(parent_id));
        if is_static {
            return Ok((None, parent_creational));
        }
        let parent = self.bean(parent_id)?;
        let target = self.contextual_instance(parent, &mut parent_creational)?;
        Ok((target, parent_creational))
    }

    /// Container-managed interceptor and decorator instances of a new target,
    /// recorded as its dependents
    fn attach(&self, bean: &BeanDefinition, creational: &mut CreationalContext) -> Result<Attached, CoreError> {
        let mut attached = Attached::new();
        let interceptor_beans = bean.interceptor_stack.entries().iter().filter_map(|data| match data.source {
            crate::container::interceptor::InterceptorSource::Bean(id) => Some(id),
            _ => None,
        });
        for id in interceptor_beans.chain(bean.decorators.iter().copied()) {
            let dependent = self.bean(id)?;
            if attached.contains_key(&dependent.bean_class) {
                continue;
            }
            let created = self.contextual_instance(dependent, creational)?.ok_or_else(|| {
                CoreError::interception(format!("{} produced no instance", dependent.display_name()))
            })?;
            attached.insert(dependent.bean_class.clone(), created);
        }
        Ok(attached)
    }

    fn forget(&self, target: &Instance) -> Option<Attached> {
        self.attached
            .write()
            .ok()
            .and_then(|mut attached| attached.remove(&identity(target)))
            .filter(AttachedEntry::is_live)
            .map(|entry| entry.instances)
    }

    /// Attached instances of a live target
    fn attached_to(&self, target: &Instance) -> Result<Attached, CoreError> {
        Ok(self
            .attached
            .read()
            .map_err(|_| CoreError::lock("attached instances"))?
            .get(&identity(target))
            .filter(|entry| entry.is_live())
            .map(|entry| entry.instances.clone())
            .unwrap_or_default())
    }

    fn injector(&self) -> Injector<'_, Self> {
        Injector::new(self.resolver(), self)
    }

    /// Invoke a business method of `target`, an instance of `bean`, through
    /// its around-invoke interceptors and decorators
    pub fn invoke(
        &self,
        bean: BeanId,
        target: &Instance,
        method: &str,
        args: Arguments,
    ) -> Result<Option<Instance>, CoreError> {
        let bean = self.bean(bean)?;
        let class = bean.class().ok_or_else(|| {
            CoreError::configuration(format!("Bean {} has no business methods", bean.display_name()))
        })?;
        let business = class
            .method(method)
            .and_then(|m| m.invoker().cloned().map(|invoker| (m.qualified_name(), invoker)));
        let (qualified, business) = business.ok_or_else(|| {
            CoreError::configuration(format!(
                "Bean {} has no invocable business method {}",
                bean.display_name(),
                method
            ))
        })?;

        let attached = self.attached_to(target)?;

        let decorators = self.decorator_links(bean, method, &attached)?;
        let terminal: Arc<TargetFn> = if decorators.is_empty() {
            Arc::new(move |target: &Instance, args: &Arguments| {
                business
                    .invoke(Some(target), args)
                    .map_err(|e| CoreError::invocation(qualified.clone(), e))
            })
        } else {
            let chain = DecoratorChain::new(method, decorators, business);
            Arc::new(move |target: &Instance, args: &Arguments| chain.invoke(target, args))
        };

        let links = bean.interceptor_stack.links(
            InterceptionType::AroundInvoke,
            Some(method),
            target,
            |data| attached_instance(&attached, data),
        )?;
        if links.is_empty() {
            return terminal(target, &args);
        }
        let mut context = InvocationContext::for_method(target.clone(), method, args, links, terminal);
        context.proceed()
    }

    fn decorator_links(
        &self,
        bean: &BeanDefinition,
        method: &str,
        attached: &Attached,
    ) -> Result<Vec<DecoratorLink>, CoreError> {
        let mut links = Vec::new();
        for id in &bean.decorators {
            let decorator = self.bean(*id)?;
            let body = decorator.class().and_then(|c| {
                c.methods.iter().find_map(|m| match &m.body {
                    MethodBody::Decorator(body) if m.name == method => Some(Arc::clone(body)),
                    _ => None,
                })
            });
            let body = match body {
                Some(body) => body,
                None => continue,
            };
            let instance = attached.get(&decorator.bean_class).cloned().ok_or_else(|| {
                CoreError::interception(format!(
                    "No decorator instance of {} for {}",
                    decorator.bean_class,
                    bean.display_name()
                ))
            })?;
            links.push(DecoratorLink {
                decorator_class: decorator.bean_class.clone(),
                instance,
                body,
            });
        }
        Ok(links)
    }

    /// Destroy an instance of `bean` and release everything it depends on
    pub fn destroy(&self, bean: BeanId, target: &Instance, creational: CreationalContext) -> Result<(), CoreError> {
        let bean = self.bean(bean)?;
        self.destroy_instance(bean, target, creational)
    }

    fn destroy_instance(
        &self,
        bean: &BeanDefinition,
        target: &Instance,
        mut creational: CreationalContext,
    ) -> Result<(), CoreError> {
        tracing::debug!("Destroying instance of {}", bean.display_name());
        let outcome = match &bean.kind {
            BeanKind::Managed(_) | BeanKind::New(_) | BeanKind::Interceptor(_) | BeanKind::Decorator(_) => {
                let attached = self.forget(target).unwrap_or_default();
                lifecycle::pre_destroy(bean, target, |data| attached_instance(&attached, data))
            }
            BeanKind::ProducerMethod(p) => match &p.disposal {
                Some(disposal) => self.dispose(bean, disposal, target, &mut creational),
                None => Ok(()),
            },
            BeanKind::ProducerField(p) => match &p.disposal {
                Some(disposal) => self.dispose(bean, disposal, target, &mut creational),
                None => Ok(()),
            },
            _ => Ok(()),
        };
        self.release(&mut creational);
        outcome
    }

    fn dispose(
        &self,
        bean: &BeanDefinition,
        disposal: &crate::container::class_info::MethodInfo,
        product: &Instance,
        creational: &mut CreationalContext,
    ) -> Result<(), CoreError> {
        let (target, mut parent_creational) = self.producer_target(bean, disposal.is_static)?;
        let outcome = self
            .injector()
            .inject_method(bean, disposal, target.as_ref(), creational, Some(product.clone()));
        self.release(&mut parent_creational);
        outcome.map(|_| ())
    }

    /// Destroy every dependent recorded in `creational`, most recent first.
    /// Failures are logged and do not stop the release.
    pub fn release(&self, creational: &mut CreationalContext) {
        let dependents = creational.take_dependents();
        if dependents.is_empty() {
            return;
        }
        tracing::debug!(
            "Releasing {} dependent(s) of creational context {}",
            dependents.len(),
            creational.id()
        );
        for dependent in dependents {
            let outcome = self
                .bean(dependent.bean)
                .and_then(|bean| self.destroy_instance(bean, &dependent.instance, dependent.creational));
            if let Err(e) = outcome {
                tracing::warn!("Failed to destroy dependent {}: {}", dependent.bean, e);
            }
        }
    }

    /// Destroy every instance held by the context of `scope`
    pub fn end_context(&self, scope: &Scope) -> Result<usize, CoreError> {
        let context = match self
            .contexts
            .read()
            .map_err(|_| CoreError::lock("scope contexts"))?
            .get(scope.as_str())
        {
            Some(context) => Arc::clone(context),
            None => return Ok(0),
        };
        let entries = context.drain()?;
        let count = entries.len();
        for (bean, instance, creational) in entries {
            let outcome = self
                .bean(bean)
                .and_then(|b| self.destroy_instance(b, &instance, creational));
            if let Err(e) = outcome {
                tracing::warn!("Failed to destroy {} instance of {}: {}", scope, bean, e);
            }
        }
        Ok(count)
    }

    /// End every registered context
    pub fn shutdown(&self) -> Result<(), CoreError> {
        let scopes: Vec<Scope> = self
            .contexts
            .read()
            .map_err(|_| CoreError::lock("scope contexts"))?
            .values()
            .map(|c| c.scope().clone())
            .collect();
        let mut destroyed = 0;
        for scope in &scopes {
            destroyed += self.end_context(scope)?;
        }
        tracing::info!(
            "Bean container shut down: {} context(s) ended, {} instance(s) destroyed",
            scopes.len(),
            destroyed
        );
        Ok(())
    }
}

fn attached_instance(attached: &Attached, data: &InterceptorData) -> Result<Instance, CoreError> {
    attached.get(&data.interceptor_class).cloned().ok_or_else(|| {
        CoreError::interception(format!(
            "No instance of interceptor {} is attached to the target",
            data.interceptor_class
        ))
    })
}

impl BeanInstanceSource for BeanContainer {
    fn instance_for(
        &self,
        bean: &BeanDefinition,
        ip: &InjectionPoint,
        creational: &mut CreationalContext,
    ) -> Result<Option<Instance>, CoreError> {
        let value = self.contextual_instance(bean, creational)?;
        if value.is_none() && !ip.nullable {
            return Err(CoreError::illegal_product(format!(
                "Bean {} produced null for non-nullable injection point {}",
                bean.display_name(),
                ip
            )));
        }
        Ok(value)
    }
}

impl std::fmt::Debug for BeanContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeanContainer")
            .field("beans", &self.registry.len())
            .field("enabled", &self.registry.enabled_count())
            .field("problems", &self.problems.len())
            .finish()
    }
}

/// Programmatic lookup handle injected for `Instance<T>`
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceHandle {
    lookup_type: TypeRef,
    qualifiers: Vec<Qualifier>,
}

impl InstanceHandle {
    pub fn new(lookup_type: TypeRef, qualifiers: Vec<Qualifier>) -> Self {
        Self {
            lookup_type,
            qualifiers,
        }
    }

    pub fn lookup_type(&self) -> &TypeRef {
        &self.lookup_type
    }

    /// Narrow the lookup with additional qualifiers
    pub fn select(&self, qualifiers: &[Qualifier]) -> Self {
        let mut narrowed = self.clone();
        narrowed.qualifiers.retain(|q| !q.is_any());
        narrowed.qualifiers.extend(qualifiers.iter().cloned());
        narrowed
    }

    pub fn is_unsatisfied(&self, container: &BeanContainer) -> bool {
        container
            .resolver()
            .candidates(&self.lookup_type, &self.qualifiers)
            .is_empty()
    }

    pub fn is_ambiguous(&self, container: &BeanContainer) -> bool {
        container
            .resolver()
            .candidates(&self.lookup_type, &self.qualifiers)
            .len()
            > 1
    }

    /// Resolve and obtain the instance
    pub fn get(&self, container: &BeanContainer) -> Result<Instance, CoreError> {
        container.get_reference(&self.lookup_type, &self.qualifiers)
    }
}
