use crate::container::class_info::{ClassInfo, FieldInfo, Marker, MethodInfo};
use crate::container::interceptor::InterceptorStack;
use crate::container::invoker::Instance;
use crate::container::qualifier::{describe, normalize_required, Qualifier};
use crate::container::scope::Scope;
use crate::container::types::TypeRef;
use std::fmt;
use std::sync::Arc;

/// Raw type name of the programmatic lookup handle
pub const INSTANCE_TYPE: &str = "Instance";

/// Raw type name of the event source handle
pub const EVENT_TYPE: &str = "Event";

/// Identifier of a registered bean: its position in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BeanId(pub usize);

impl BeanId {
    /// Placeholder carried by definitions not yet registered
    pub const UNREGISTERED: BeanId = BeanId(usize::MAX);

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for BeanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Member an injection point belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectionMember {
    ConstructorParameter { index: usize },
    Field { name: String },
    MethodParameter { method: String, index: usize },
}

impl InjectionMember {
    pub fn is_field(&self) -> bool {
        matches!(self, Self::Field { .. })
    }
}

impl fmt::Display for InjectionMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConstructorParameter { index } => write!(f, "constructor parameter {}", index),
            Self::Field { name } => write!(f, "field {}", name),
            Self::MethodParameter { method, index } => {
                write!(f, "parameter {} of method {}", index, method)
            }
        }
    }
}

/// A location requiring a resolved bean instance
#[derive(Debug, Clone, PartialEq)]
pub struct InjectionPoint {
    /// Implementation class of the owning bean
    pub owner: String,
    pub member: InjectionMember,
    pub required_type: TypeRef,
    /// Declared qualifiers; empty means `@Default`
    pub qualifiers: Vec<Qualifier>,
    pub markers: Vec<Marker>,
    /// Primitive injection points cannot receive null
    pub nullable: bool,
    /// Decorator delegate; resolved to the decorated bean, not through lookup
    pub delegate: bool,
}

impl InjectionPoint {
    pub fn new(
        owner: impl Into<String>,
        member: InjectionMember,
        required_type: TypeRef,
        qualifiers: Vec<Qualifier>,
    ) -> Self {
        let nullable = !required_type.is_primitive();
        Self {
            owner: owner.into(),
            member,
            required_type,
            qualifiers,
            markers: Vec::new(),
            nullable,
            delegate: false,
        }
    }

    pub fn with_markers(mut self, markers: Vec<Marker>) -> Self {
        self.markers = markers;
        self
    }

    /// Qualifiers used for resolution
    pub fn required_qualifiers(&self) -> Vec<Qualifier> {
        normalize_required(&self.qualifiers)
    }

    pub fn has_marker(&self, marker: Marker) -> bool {
        self.markers.contains(&marker)
    }

    pub fn is_instance(&self) -> bool {
        self.required_type.raw_name() == Some(INSTANCE_TYPE)
    }

    pub fn is_event(&self) -> bool {
        self.required_type.raw_name() == Some(EVENT_TYPE)
    }
}

impl fmt::Display for InjectionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} of {} [{}]",
            self.required_type,
            self.member,
            self.owner,
            describe(&self.qualifiers).join(", ")
        )
    }
}

/// Type-level realization of a generic producer class. Disposer and observer
/// parameters keep their own type and take the qualifiers declared for the
/// redeclared return type.
#[derive(Debug, Clone, PartialEq)]
pub struct Realizes {
    pub return_type: TypeRef,
    pub qualifiers: Vec<Qualifier>,
}

/// Payload of class-backed beans
#[derive(Debug, Clone)]
pub struct ManagedBean {
    pub class: Arc<ClassInfo>,
    pub realizes: Option<Realizes>,
}

#[derive(Debug, Clone)]
pub struct ProducerMethodBean {
    pub declaring_class: String,
    pub method: MethodInfo,
    pub disposal: Option<MethodInfo>,
    pub realizes: Option<Realizes>,
    /// Declaring bean, linked at registration
    pub parent: Option<BeanId>,
}

#[derive(Debug, Clone)]
pub struct ProducerFieldBean {
    pub declaring_class: String,
    pub field: FieldInfo,
    pub disposal: Option<MethodInfo>,
    pub parent: Option<BeanId>,
}

/// Implicit `Event<T>` source bean
#[derive(Debug, Clone)]
pub struct EventBean {
    pub event_type: TypeRef,
    pub qualifiers: Vec<Qualifier>,
}

/// Implicit `Instance<T>` lookup bean
#[derive(Debug, Clone)]
pub struct InstanceBean {
    pub lookup_type: TypeRef,
    pub qualifiers: Vec<Qualifier>,
}

/// A pre-built container extension exposed as a bean
#[derive(Clone)]
pub struct ExtensionBean {
    pub instance: Instance,
}

impl fmt::Debug for ExtensionBean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionBean").finish_non_exhaustive()
    }
}

/// Variant-specific part of a bean definition
#[derive(Debug, Clone)]
pub enum BeanKind {
    Managed(ManagedBean),
    /// `@New` companion of a managed bean: dependent, qualified `@New` only
    New(ManagedBean),
    /// Session-backed bean; instances come from the enterprise provider
    Enterprise(ManagedBean),
    Interceptor(ManagedBean),
    Decorator(ManagedBean),
    ProducerMethod(ProducerMethodBean),
    ProducerField(ProducerFieldBean),
    Event(EventBean),
    Instance(InstanceBean),
    Extension(ExtensionBean),
}

impl BeanKind {
    pub fn name(&self) -> &'static str {
        match self {
            BeanKind::Managed(_) => "managed",
            BeanKind::New(_) => "new",
            BeanKind::Enterprise(_) => "enterprise",
            BeanKind::Interceptor(_) => "interceptor",
            BeanKind::Decorator(_) => "decorator",
            BeanKind::ProducerMethod(_) => "producer method",
            BeanKind::ProducerField(_) => "producer field",
            BeanKind::Event(_) => "event",
            BeanKind::Instance(_) => "instance",
            BeanKind::Extension(_) => "extension",
        }
    }

    /// Class payload of class-backed kinds
    pub fn managed(&self) -> Option<&ManagedBean> {
        match self {
            BeanKind::Managed(m)
            | BeanKind::New(m)
            | BeanKind::Enterprise(m)
            | BeanKind::Interceptor(m)
            | BeanKind::Decorator(m) => Some(m),
            _ => None,
        }
    }

    pub fn class(&self) -> Option<&Arc<ClassInfo>> {
        self.managed().map(|m| &m.class)
    }

    pub fn is_producer(&self) -> bool {
        matches!(self, BeanKind::ProducerMethod(_) | BeanKind::ProducerField(_))
    }

    pub fn is_new(&self) -> bool {
        matches!(self, BeanKind::New(_))
    }

    /// Class declaring a producer
    pub fn declaring_class(&self) -> Option<&str> {
        match self {
            BeanKind::ProducerMethod(p) => Some(&p.declaring_class),
            BeanKind::ProducerField(p) => Some(&p.declaring_class),
            _ => None,
        }
    }

    /// Bean declaring a producer, once linked
    pub fn parent(&self) -> Option<BeanId> {
        match self {
            BeanKind::ProducerMethod(p) => p.parent,
            BeanKind::ProducerField(p) => p.parent,
            _ => None,
        }
    }
}

/// A registered, contextually managed component
#[derive(Debug, Clone)]
pub struct BeanDefinition {
    pub(crate) id: BeanId,
    /// Implementation type name
    pub bean_class: String,
    pub types: Vec<TypeRef>,
    pub qualifiers: Vec<Qualifier>,
    pub scope: Scope,
    pub name: Option<String>,
    /// The name was declared on the bean itself rather than defaulted or inherited
    pub explicit_name: bool,
    pub enabled: bool,
    /// This bean superseded another through specialization
    pub specialized: bool,
    pub specializes: Option<BeanId>,
    pub alternative: bool,
    pub passivation_capable: bool,
    /// The bean may produce null
    pub nullable: bool,
    pub injection_points: Vec<InjectionPoint>,
    pub interceptor_stack: InterceptorStack,
    /// Enabled decorators, in delegation order
    pub decorators: Vec<BeanId>,
    pub kind: BeanKind,
}

impl BeanDefinition {
    fn base(bean_class: impl Into<String>, types: Vec<TypeRef>, kind: BeanKind) -> Self {
        Self {
            id: BeanId::UNREGISTERED,
            bean_class: bean_class.into(),
            types,
            qualifiers: Vec::new(),
            scope: Scope::Dependent,
            name: None,
            explicit_name: false,
            enabled: true,
            specialized: false,
            specializes: None,
            alternative: false,
            passivation_capable: false,
            nullable: false,
            injection_points: Vec::new(),
            interceptor_stack: InterceptorStack::default(),
            decorators: Vec::new(),
            kind,
        }
    }

    fn class_backed(class: ClassInfo, api_types: Vec<TypeRef>, wrap: fn(ManagedBean) -> BeanKind) -> Self {
        let mut types = api_types;
        let own = TypeRef::class(class.name.clone());
        if !types.iter().any(|t| t.same_raw(&own)) {
            types.insert(0, own);
        }
        if !types.iter().any(TypeRef::is_object) {
            types.push(TypeRef::object());
        }
        let alternative = class.is_alternative();
        let serializable = class.serializable;
        let default_named = class.stereotypes.iter().any(|s| s.named.is_some());
        let stereotype_scope = class
            .stereotypes
            .iter()
            .find_map(|s| s.scopes.first().cloned());
        let name = class.name.clone();
        let mut bean = Self::base(
            name.clone(),
            types,
            wrap(ManagedBean {
                class: Arc::new(class),
                realizes: None,
            }),
        );
        bean.alternative = alternative;
        bean.passivation_capable = serializable;
        if let Some(scope) = stereotype_scope {
            bean.scope = scope;
        }
        if default_named {
            bean.name = Some(default_bean_name(&name));
        }
        bean
    }

    /// A managed bean exposing `api_types` in addition to its own class
    pub fn managed(class: ClassInfo, api_types: Vec<TypeRef>) -> Self {
        Self::class_backed(class, api_types, BeanKind::Managed)
    }

    /// A session-backed bean
    pub fn enterprise(class: ClassInfo, api_types: Vec<TypeRef>) -> Self {
        Self::class_backed(class, api_types, BeanKind::Enterprise)
    }

    pub fn interceptor(class: ClassInfo) -> Self {
        Self::class_backed(class, Vec::new(), BeanKind::Interceptor)
    }

    pub fn decorator(class: ClassInfo, api_types: Vec<TypeRef>) -> Self {
        Self::class_backed(class, api_types, BeanKind::Decorator)
    }

    /// `@New` companion of a managed bean
    pub fn new_companion(managed: &BeanDefinition) -> Option<Self> {
        let payload = managed.kind.managed()?.clone();
        let mut bean = Self::base(
            managed.bean_class.clone(),
            managed.types.clone(),
            BeanKind::New(payload),
        );
        bean.qualifiers = vec![Qualifier::new_qualifier(Some(&managed.bean_class))];
        bean.passivation_capable = managed.passivation_capable;
        Some(bean)
    }

    /// A producer method declared by `declaring_class`
    pub fn producer_method(declaring_class: impl Into<String>, method: MethodInfo) -> Self {
        let return_type = method.return_type.clone().unwrap_or_else(TypeRef::object);
        let nullable = !return_type.is_primitive();
        let mut types = vec![return_type];
        if !types.iter().any(TypeRef::is_object) {
            types.push(TypeRef::object());
        }
        let qualifiers = method.qualifiers.clone();
        let name = qualifiers
            .iter()
            .find(|q| q.is_named())
            .map(|q| match q.named_value() {
                Some(value) => (value.to_string(), true),
                None => (default_producer_name(&method.name), false),
            });
        let declaring_class = declaring_class.into();
        let mut bean = Self::base(
            declaring_class.clone(),
            types,
            BeanKind::ProducerMethod(ProducerMethodBean {
                declaring_class,
                method,
                disposal: None,
                realizes: None,
                parent: None,
            }),
        );
        bean.qualifiers = qualifiers;
        bean.nullable = nullable;
        if let Some((name, explicit)) = name {
            bean.name = Some(name);
            bean.explicit_name = explicit;
        }
        bean
    }

    /// A producer field declared by `declaring_class`
    pub fn producer_field(declaring_class: impl Into<String>, field: FieldInfo) -> Self {
        let nullable = !field.ty.is_primitive();
        let mut types = vec![field.ty.clone()];
        if !types.iter().any(TypeRef::is_object) {
            types.push(TypeRef::object());
        }
        let qualifiers = field.qualifiers.clone();
        let name = qualifiers.iter().find(|q| q.is_named()).map(|q| {
            q.named_value()
                .map(str::to_string)
                .unwrap_or_else(|| field.name.clone())
        });
        let declaring_class = declaring_class.into();
        let mut bean = Self::base(
            declaring_class.clone(),
            types,
            BeanKind::ProducerField(ProducerFieldBean {
                declaring_class,
                field,
                disposal: None,
                parent: None,
            }),
        );
        bean.qualifiers = qualifiers;
        bean.nullable = nullable;
        bean.name = name;
        bean
    }

    /// Implicit `Event<T>` bean for an event injection point
    pub fn event(event_type: TypeRef, qualifiers: Vec<Qualifier>) -> Self {
        let mut bean = Self::base(
            EVENT_TYPE,
            vec![TypeRef::parameterized(EVENT_TYPE, vec![event_type.clone()])],
            BeanKind::Event(EventBean {
                event_type,
                qualifiers: qualifiers.clone(),
            }),
        );
        bean.qualifiers = qualifiers;
        bean
    }

    /// Implicit `Instance<T>` bean
    pub fn instance_lookup(lookup_type: TypeRef, qualifiers: Vec<Qualifier>) -> Self {
        let mut bean = Self::base(
            INSTANCE_TYPE,
            vec![TypeRef::parameterized(INSTANCE_TYPE, vec![lookup_type.clone()])],
            BeanKind::Instance(InstanceBean {
                lookup_type,
                qualifiers: qualifiers.clone(),
            }),
        );
        bean.qualifiers = qualifiers;
        bean
    }

    /// An application-scoped extension instance
    pub fn extension(class_name: impl Into<String>, instance: Instance) -> Self {
        let class_name = class_name.into();
        let mut bean = Self::base(
            class_name.clone(),
            vec![TypeRef::class(class_name), TypeRef::object()],
            BeanKind::Extension(ExtensionBean { instance }),
        );
        bean.scope = Scope::Application;
        bean
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.push(qualifier);
        self
    }

    pub fn with_type(mut self, ty: TypeRef) -> Self {
        self.types.push(ty);
        self
    }

    /// Declare an explicit bean name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self.explicit_name = true;
        self
    }

    /// Use the default name derived from the implementation class
    pub fn default_named(mut self) -> Self {
        self.name = Some(default_bean_name(&self.bean_class));
        self.explicit_name = false;
        self
    }

    pub fn alternative(mut self) -> Self {
        self.alternative = true;
        self
    }

    pub fn with_realizes(mut self, realizes: Realizes) -> Self {
        match &mut self.kind {
            BeanKind::ProducerMethod(p) => p.realizes = Some(realizes),
            BeanKind::Managed(m) => m.realizes = Some(realizes),
            _ => {}
        }
        self
    }

    /// Attach a disposal method to a producer
    pub fn with_disposal(mut self, disposal: MethodInfo) -> Self {
        match &mut self.kind {
            BeanKind::ProducerMethod(p) => p.disposal = Some(disposal),
            BeanKind::ProducerField(p) => p.disposal = Some(disposal),
            _ => {}
        }
        self
    }

    pub fn id(&self) -> BeanId {
        self.id
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Class payload for class-backed beans
    pub fn class(&self) -> Option<&Arc<ClassInfo>> {
        self.kind.class()
    }

    /// Whether the bean exposes the raw class `name`
    pub fn has_type_named(&self, name: &str) -> bool {
        self.types.iter().any(|t| t.raw_name() == Some(name))
    }

    /// `bean_class` plus member for producers
    pub fn display_name(&self) -> String {
        match &self.kind {
            BeanKind::ProducerMethod(p) => format!("{}#{}", p.declaring_class, p.method.name),
            BeanKind::ProducerField(p) => format!("{}.{}", p.declaring_class, p.field.name),
            _ => self.bean_class.clone(),
        }
    }
}

impl fmt::Display for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bean {} {} [{}]",
            self.kind.name(),
            self.display_name(),
            self.scope,
            describe(&self.qualifiers).join(", ")
        )?;
        if let Some(name) = &self.name {
            write!(f, " named '{}'", name)?;
        }
        Ok(())
    }
}

fn lower_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Default name of a managed bean: simple class name, first letter lower-cased
pub fn default_bean_name(class_name: &str) -> String {
    let simple = class_name
        .rsplit(|c| c == '.' || c == ':')
        .next()
        .unwrap_or(class_name);
    lower_first(simple)
}

/// Default name of a producer method: accessor prefix stripped, first
/// letter lower-cased
pub fn default_producer_name(method_name: &str) -> String {
    for prefix in ["get", "set", "is"] {
        if let Some(rest) = method_name.strip_prefix(prefix) {
            if !rest.is_empty() {
                return lower_first(rest);
            }
        }
    }
    lower_first(method_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names() {
        assert_eq!(default_bean_name("PaymentService"), "paymentService");
        assert_eq!(default_bean_name("shop::billing::Invoice"), "invoice");
        assert_eq!(default_producer_name("getCurrentUser"), "currentUser");
        assert_eq!(default_producer_name("isOpen"), "open");
        assert_eq!(default_producer_name("setLocale"), "locale");
        assert_eq!(default_producer_name("get"), "get");
        assert_eq!(default_producer_name("Random"), "random");
    }

    #[test]
    fn test_managed_bean_exposes_own_class_and_object() {
        let bean = BeanDefinition::managed(
            ClassInfo::new("CardPayments"),
            vec![TypeRef::class("PaymentService")],
        );
        assert!(bean.has_type_named("CardPayments"));
        assert!(bean.has_type_named("PaymentService"));
        assert!(bean.types.iter().any(TypeRef::is_object));
        assert!(bean.enabled);
        assert_eq!(bean.id(), BeanId::UNREGISTERED);
    }

    #[test]
    fn test_producer_method_default_name() {
        let method = MethodInfo::new("Config", "getTimeout")
            .returning(TypeRef::primitive("int"))
            .with_qualifier(Qualifier::named(""));
        let bean = BeanDefinition::producer_method("Config", method);
        assert_eq!(bean.name.as_deref(), Some("timeout"));
        assert!(!bean.explicit_name);
        assert!(!bean.nullable);
        assert_eq!(bean.display_name(), "Config#getTimeout");
    }

    #[test]
    fn test_new_companion() {
        let bean = BeanDefinition::managed(ClassInfo::new("Cart"), vec![]).with_scope(Scope::Session);
        let companion = BeanDefinition::new_companion(&bean).unwrap();
        assert!(companion.kind.is_new());
        assert_eq!(companion.scope, Scope::Dependent);
        assert!(companion.qualifiers[0].is_new());
    }

    #[test]
    fn test_injection_point_display_and_nullability() {
        let ip = InjectionPoint::new(
            "Checkout",
            InjectionMember::Field { name: "retries".to_string() },
            TypeRef::primitive("int"),
            vec![],
        );
        assert!(!ip.nullable);
        assert_eq!(ip.to_string(), "int field retries of Checkout []");
        assert_eq!(ip.required_qualifiers()[0], Qualifier::default_qualifier());
    }
}
