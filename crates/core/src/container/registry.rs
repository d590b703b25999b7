use crate::config::ContainerConfig;
use crate::container::class_info::{ClassInfo, ConstructorInfo, Marker, MethodInfo, ParameterInfo};
use crate::container::descriptor::{
    default_bean_name, BeanDefinition, BeanId, BeanKind, InjectionMember, InjectionPoint,
};
use crate::container::matcher::matches_in;
use crate::container::plugin::PluginRegistry;
use crate::container::qualifier::{normalize_bean_qualifiers, Qualifier};
use crate::container::types::{TypeHierarchy, TypeRef, OBJECT_TYPE};
use crate::container::validation;
use crate::errors::CoreError;
use once_cell::sync::OnceCell;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Subtype knowledge derived from the API types of the registered beans
#[derive(Debug, Clone, Default)]
pub struct ClassHierarchy {
    supertypes: HashMap<String, BTreeSet<String>>,
}

impl ClassHierarchy {
    pub fn from_beans<'b>(beans: impl IntoIterator<Item = &'b BeanDefinition>) -> Self {
        let mut hierarchy = Self::default();
        for bean in beans {
            let own = match bean.types.first().and_then(TypeRef::raw_name) {
                Some(own) => own.to_string(),
                None => continue,
            };
            let entry = hierarchy.supertypes.entry(own.clone()).or_default();
            for ty in bean.types.iter().filter_map(TypeRef::raw_name) {
                if ty != own {
                    entry.insert(ty.to_string());
                }
            }
            if let Some(superclass) = bean.class().and_then(|c| c.superclass.clone()) {
                entry.insert(superclass);
            }
        }
        hierarchy
    }

    /// Declare `sup` a direct supertype of `sub`
    pub fn declare(&mut self, sub: impl Into<String>, sup: impl Into<String>) {
        self.supertypes.entry(sub.into()).or_default().insert(sup.into());
    }
}

impl TypeHierarchy for ClassHierarchy {
    fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        if sub == sup || sup == OBJECT_TYPE {
            return true;
        }
        let mut seen = BTreeSet::new();
        let mut pending = vec![sub];
        while let Some(current) = pending.pop() {
            if !seen.insert(current) {
                continue;
            }
            if let Some(direct) = self.supertypes.get(current) {
                if direct.contains(sup) {
                    return true;
                }
                pending.extend(direct.iter().map(String::as_str));
            }
        }
        false
    }
}

/// Lookup index built once, after the registry is frozen
#[derive(Debug)]
struct RegistryIndex {
    hierarchy: ClassHierarchy,
    by_type: HashMap<String, Vec<usize>>,
    by_name: HashMap<String, Vec<usize>>,
}

impl RegistryIndex {
    fn build(beans: &[BeanDefinition]) -> Self {
        let mut by_type: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, bean) in beans.iter().enumerate().filter(|(_, b)| b.enabled) {
            let mut raw: Vec<&str> = bean.types.iter().filter_map(TypeRef::raw_name).collect();
            raw.sort_unstable();
            raw.dedup();
            for name in raw {
                by_type.entry(name.to_string()).or_default().push(index);
            }
            if let Some(name) = &bean.name {
                by_name.entry(name.clone()).or_default().push(index);
            }
        }
        tracing::debug!(
            "Built registry index: {} type key(s), {} name(s)",
            by_type.len(),
            by_name.len()
        );
        Self {
            hierarchy: ClassHierarchy::from_beans(beans),
            by_type,
            by_name,
        }
    }
}

/// Holder of every known bean definition.
///
/// Mutation happens only during deployment through `&mut self`; once
/// `freeze()` is called the registry is read-only and may be shared across
/// threads, with its lookup index built on first use.
#[derive(Debug)]
pub struct BeanRegistry {
    pub(crate) beans: Vec<BeanDefinition>,
    pub(crate) config: Arc<ContainerConfig>,
    plugins: Arc<PluginRegistry>,
    frozen: bool,
    index: OnceCell<RegistryIndex>,
}

impl BeanRegistry {
    pub fn new(config: Arc<ContainerConfig>, plugins: Arc<PluginRegistry>) -> Self {
        Self {
            beans: Vec::new(),
            config,
            plugins,
            frozen: false,
            index: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub(crate) fn ensure_mutable(&self, operation: &str) -> Result<(), CoreError> {
        if self.frozen {
            Err(CoreError::RegistryFrozen {
                operation: operation.to_string(),
            })
        } else {
            Ok(())
        }
    }

    /// Validate and register a bean definition.
    ///
    /// The definition is rejected, and nothing is registered, when any
    /// definition-time rule fails.
    pub fn register(&mut self, mut bean: BeanDefinition) -> Result<BeanId, CoreError> {
        self.ensure_mutable("register")?;
        if let Err(e) = self.define(&mut bean) {
            tracing::warn!("Rejected bean {}: {}", bean.display_name(), e);
            return Err(e);
        }
        let id = BeanId(self.beans.len());
        bean.id = id;
        tracing::debug!("Registered {} as {}", bean, id);
        self.beans.push(bean);
        Ok(id)
    }

    fn define(&self, bean: &mut BeanDefinition) -> Result<(), CoreError> {
        let injection_points = match &bean.kind {
            BeanKind::Managed(m) | BeanKind::Interceptor(m) | BeanKind::Decorator(m) | BeanKind::New(m) => {
                let class = Arc::clone(&m.class);
                self.plugins.validate(&class)?;
                validation::check_managed_class(&class)?;
                let constructor = validation::select_constructor(&class)?;
                validation::check_initializer_methods(&class)?;
                validation::check_generic_class(&class, &bean.scope)?;
                validation::check_interception_methods(&class)?;
                self.check_resources(&class)?;
                class_injection_points(&class, Some(constructor))
            }
            BeanKind::Enterprise(m) => {
                let class = Arc::clone(&m.class);
                self.plugins.validate(&class)?;
                validation::check_initializer_methods(&class)?;
                validation::check_interception_methods(&class)?;
                self.check_resources(&class)?;
                class_injection_points(&class, None)
            }
            BeanKind::ProducerMethod(p) => {
                validation::check_producer_method(&p.method, &p.declaring_class)?;
                if let Some(ty) = &p.method.return_type {
                    validation::check_producer_type(ty, &bean.scope, &bean.display_name())?;
                }
                let mut points = method_injection_points(&p.method, &p.declaring_class);
                if let Some(disposal) = &p.disposal {
                    validation::check_disposal_method(disposal, &p.declaring_class)?;
                    points.extend(method_injection_points(disposal, &p.declaring_class));
                }
                points
            }
            BeanKind::ProducerField(p) => {
                validation::check_producer_type(&p.field.ty, &bean.scope, &bean.display_name())?;
                match &p.disposal {
                    Some(disposal) => {
                        validation::check_disposal_method(disposal, &p.declaring_class)?;
                        method_injection_points(disposal, &p.declaring_class)
                    }
                    None => Vec::new(),
                }
            }
            BeanKind::Event(_) | BeanKind::Instance(_) | BeanKind::Extension(_) => Vec::new(),
        };

        for ip in &injection_points {
            validation::check_injection_point(ip)?;
        }
        bean.injection_points = injection_points;

        if bean.kind.managed().is_some() && bean.scope.is_passivating() {
            let capable = bean.passivation_capable || self.plugins.is_passivation_capable(bean);
            if !capable {
                return Err(CoreError::passivation(format!(
                    "Bean : {} with passivating scope {} must be Serializable",
                    bean.bean_class, bean.scope
                )));
            }
            bean.passivation_capable = true;
        }

        resolve_name(bean);
        if !bean.kind.is_new() {
            bean.qualifiers = normalize_bean_qualifiers(&bean.qualifiers, bean.name.as_deref());
        }

        if bean.kind.is_producer() {
            self.link_parent(bean)?;
        }
        Ok(())
    }

    fn check_resources(&self, class: &ClassInfo) -> Result<(), CoreError> {
        for field in &class.fields {
            if let Some(annotation) = &field.resource {
                self.plugins
                    .check_resource(&field.ty, annotation, &field.qualified_name())?;
            }
        }
        for method in &class.methods {
            if let (Some(annotation), Some(param)) = (&method.resource, method.params.first()) {
                self.plugins
                    .check_resource(&param.ty, annotation, &method.qualified_name())?;
            }
        }
        Ok(())
    }

    fn link_parent(&self, bean: &mut BeanDefinition) -> Result<(), CoreError> {
        let declaring = bean.kind.declaring_class().unwrap_or_default().to_string();
        let parent = self
            .find_class_bean(&declaring)
            .map(BeanDefinition::id)
            .ok_or_else(|| {
                CoreError::definition(format!(
                    "Producer {} is declared by class : {} which is not a registered bean",
                    bean.display_name(),
                    declaring
                ))
            })?;
        let parent_alternative = self.beans[parent.index()].alternative;
        match &mut bean.kind {
            BeanKind::ProducerMethod(p) => p.parent = Some(parent),
            BeanKind::ProducerField(p) => p.parent = Some(parent),
            _ => {}
        }
        bean.alternative |= parent_alternative;
        Ok(())
    }

    /// Stop accepting mutations; lookups use the index from here on
    pub fn freeze(&mut self) {
        if !self.frozen {
            self.frozen = true;
            tracing::info!(
                "Bean registry frozen with {} bean(s), {} enabled",
                self.beans.len(),
                self.enabled_count()
            );
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn len(&self) -> usize {
        self.beans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beans.is_empty()
    }

    pub fn enabled_count(&self) -> usize {
        self.beans.iter().filter(|b| b.enabled).count()
    }

    pub fn get(&self, id: BeanId) -> Option<&BeanDefinition> {
        self.beans.get(id.index())
    }

    pub fn beans(&self) -> impl Iterator<Item = &BeanDefinition> {
        self.beans.iter()
    }

    pub fn enabled_beans(&self) -> impl Iterator<Item = &BeanDefinition> {
        self.beans.iter().filter(|b| b.enabled)
    }

    /// Enable or disable a bean during deployment
    pub(crate) fn set_enabled(&mut self, id: BeanId, enabled: bool) -> Result<(), CoreError> {
        self.ensure_mutable("set enablement")?;
        let bean = self
            .beans
            .get_mut(id.index())
            .ok_or(CoreError::BeanNotFound { bean: id.to_string() })?;
        bean.enabled = enabled;
        Ok(())
    }

    /// Take a bean that failed deployment out of service together with the
    /// producers it declares. Returns the number of beans disabled.
    pub(crate) fn exclude(&mut self, id: BeanId) -> Result<usize, CoreError> {
        self.set_enabled(id, false)?;
        let producers: Vec<BeanId> = self
            .beans
            .iter()
            .filter(|b| b.enabled && b.kind.parent() == Some(id))
            .map(BeanDefinition::id)
            .collect();
        for producer in &producers {
            tracing::warn!("Disabling producer {} of excluded bean {}", producer, id);
            self.set_enabled(*producer, false)?;
        }
        Ok(1 + producers.len())
    }

    pub(crate) fn bean_mut(&mut self, id: BeanId) -> Result<&mut BeanDefinition, CoreError> {
        self.ensure_mutable("update bean")?;
        self.beans
            .get_mut(id.index())
            .ok_or(CoreError::BeanNotFound { bean: id.to_string() })
    }

    /// The class-backed bean (managed or enterprise) of `class_name`
    pub fn find_class_bean(&self, class_name: &str) -> Option<&BeanDefinition> {
        self.beans.iter().find(|b| {
            b.bean_class == class_name
                && matches!(b.kind, BeanKind::Managed(_) | BeanKind::Enterprise(_))
        })
    }

    /// Registered class metadata by class name
    pub fn class_info(&self, class_name: &str) -> Option<&Arc<ClassInfo>> {
        self.beans
            .iter()
            .filter_map(BeanDefinition::class)
            .find(|c| c.name == class_name)
    }

    /// Subtype knowledge of the current bean set
    pub fn hierarchy(&self) -> ClassHierarchy {
        match self.index.get() {
            Some(index) => index.hierarchy.clone(),
            None => ClassHierarchy::from_beans(&self.beans),
        }
    }

    fn index(&self) -> Option<&RegistryIndex> {
        if self.frozen {
            Some(self.index.get_or_init(|| RegistryIndex::build(&self.beans)))
        } else {
            None
        }
    }

    /// Enabled beans matching the required type and qualifiers
    pub fn lookup(&self, required_type: &TypeRef, qualifiers: &[Qualifier]) -> Vec<&BeanDefinition> {
        match self.index() {
            Some(index) => {
                let candidates = required_type
                    .raw_name()
                    .and_then(|name| index.by_type.get(name));
                match candidates {
                    Some(candidates) => candidates
                        .iter()
                        .map(|&i| &self.beans[i])
                        .filter(|b| matches_bean(&index.hierarchy, required_type, qualifiers, b))
                        .collect(),
                    None if required_type.raw_name().is_some() => Vec::new(),
                    None => self.scan(&index.hierarchy, required_type, qualifiers),
                }
            }
            None => {
                let hierarchy = ClassHierarchy::from_beans(&self.beans);
                self.scan(&hierarchy, required_type, qualifiers)
            }
        }
    }

    fn scan(
        &self,
        hierarchy: &ClassHierarchy,
        required_type: &TypeRef,
        qualifiers: &[Qualifier],
    ) -> Vec<&BeanDefinition> {
        self.beans
            .iter()
            .filter(|b| b.enabled && matches_bean(hierarchy, required_type, qualifiers, b))
            .collect()
    }

    /// Enabled beans carrying `name`
    pub fn lookup_by_name(&self, name: &str) -> Vec<&BeanDefinition> {
        match self.index() {
            Some(index) => index
                .by_name
                .get(name)
                .map(|ids| ids.iter().map(|&i| &self.beans[i]).collect())
                .unwrap_or_default(),
            None => self
                .beans
                .iter()
                .filter(|b| b.enabled && b.name.as_deref() == Some(name))
                .collect(),
        }
    }
}

fn matches_bean(
    hierarchy: &ClassHierarchy,
    required_type: &TypeRef,
    qualifiers: &[Qualifier],
    bean: &BeanDefinition,
) -> bool {
    // Interceptors and decorators are bound, never injected
    !matches!(bean.kind, BeanKind::Interceptor(_) | BeanKind::Decorator(_))
        && matches_in(hierarchy, required_type, qualifiers, &bean.types, &bean.qualifiers)
}

/// Settle the bean name from a declared `@Named` qualifier
fn resolve_name(bean: &mut BeanDefinition) {
    if bean.name.is_some() {
        return;
    }
    let declared = bean
        .qualifiers
        .iter()
        .find(|q| q.is_named())
        .map(|q| q.named_value().map(str::to_string));
    match declared {
        Some(Some(value)) => {
            bean.name = Some(value);
            bean.explicit_name = true;
        }
        Some(None) if bean.kind.managed().is_some() => {
            bean.name = Some(default_bean_name(&bean.bean_class));
        }
        _ => {}
    }
}

fn parameter_point(owner: &str, member: InjectionMember, param: &ParameterInfo) -> InjectionPoint {
    InjectionPoint::new(owner, member, param.ty.clone(), param.qualifiers.clone())
        .with_markers(param.markers.clone())
}

/// Injection points of a producer, disposal or initializer method; the
/// disposed or observed parameter is supplied by the container, not looked up
fn method_injection_points(method: &MethodInfo, owner: &str) -> Vec<InjectionPoint> {
    if let (Some(annotation), Some(param)) = (&method.resource, method.params.first()) {
        return vec![InjectionPoint::new(
            owner,
            InjectionMember::MethodParameter {
                method: method.name.clone(),
                index: 0,
            },
            param.ty.clone(),
            vec![annotation.clone()],
        )];
    }
    method
        .params
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.has_marker(Marker::Disposes) && !p.has_marker(Marker::Observes))
        .map(|(index, p)| {
            parameter_point(
                owner,
                InjectionMember::MethodParameter {
                    method: method.name.clone(),
                    index,
                },
                p,
            )
        })
        .collect()
}

/// Constructor, field, initializer and delegate injection points of a class
fn class_injection_points(class: &ClassInfo, constructor: Option<&ConstructorInfo>) -> Vec<InjectionPoint> {
    let mut points = Vec::new();
    if let Some(constructor) = constructor {
        for (index, param) in constructor.params.iter().enumerate() {
            points.push(parameter_point(
                &class.name,
                InjectionMember::ConstructorParameter { index },
                param,
            ));
        }
    }
    for field in &class.fields {
        let qualifiers = match &field.resource {
            Some(annotation) => vec![annotation.clone()],
            None if field.has_marker(Marker::Inject) => field.qualifiers.clone(),
            None => continue,
        };
        points.push(
            InjectionPoint::new(
                &class.name,
                InjectionMember::Field {
                    name: field.name.clone(),
                },
                field.ty.clone(),
                qualifiers,
            )
            .with_markers(field.markers.clone()),
        );
    }
    for method in class
        .methods_with(Marker::Inject)
        .filter(|m| !m.has_marker(Marker::Produces))
    {
        points.extend(method_injection_points(method, &class.name));
    }
    if let Some(delegate) = &class.delegate {
        let mut point = InjectionPoint::new(
            &class.name,
            InjectionMember::Field {
                name: "delegate".to_string(),
            },
            delegate.ty.clone(),
            delegate.qualifiers.clone(),
        );
        point.delegate = true;
        points.push(point);
    }
    points
}
