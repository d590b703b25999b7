//! Class metadata supplied by discovery. The container never scans
//! anything itself; it validates and consumes these records.

use crate::container::interceptor::{DecoratorFn, InterceptorFn};
use crate::container::invoker::{ConstructorInvoker, FieldAccessor, MethodInvoker};
use crate::container::qualifier::Qualifier;
use crate::container::scope::Scope;
use crate::container::types::TypeRef;
use crate::errors::CoreError;
use std::fmt;
use std::sync::Arc;

/// Type name of the invocation context parameter of interceptor methods
pub const INVOCATION_CONTEXT_TYPE: &str = "InvocationContext";

/// Exception type that every around-invoke method must declare
pub const EXCEPTION_TYPE: &str = "Exception";

/// Non-qualifier annotations the container reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    Inject,
    Produces,
    Disposes,
    Observes,
    PostConstruct,
    PreDestroy,
    AroundInvoke,
    Specializes,
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Marker::Inject => "@Inject",
            Marker::Produces => "@Produces",
            Marker::Disposes => "@Disposes",
            Marker::Observes => "@Observes",
            Marker::PostConstruct => "@PostConstruct",
            Marker::PreDestroy => "@PreDestroy",
            Marker::AroundInvoke => "@AroundInvoke",
            Marker::Specializes => "@Specializes",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterInfo {
    pub ty: TypeRef,
    pub qualifiers: Vec<Qualifier>,
    pub markers: Vec<Marker>,
}

impl ParameterInfo {
    pub fn new(ty: TypeRef) -> Self {
        Self {
            ty,
            qualifiers: Vec::new(),
            markers: Vec::new(),
        }
    }

    pub fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.push(qualifier);
        self
    }

    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    pub fn has_marker(&self, marker: Marker) -> bool {
        self.markers.contains(&marker)
    }
}

/// Declared exception type of a method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrownType {
    pub name: String,
    pub checked: bool,
}

impl ThrownType {
    pub fn checked(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            checked: true,
        }
    }

    pub fn unchecked(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            checked: false,
        }
    }

    /// The general checked exception type
    pub fn exception() -> Self {
        Self::checked(EXCEPTION_TYPE)
    }
}

#[derive(Debug, Clone)]
pub struct ConstructorInfo {
    pub params: Vec<ParameterInfo>,
    /// Marked as the injection constructor
    pub inject: bool,
    pub invoker: ConstructorInvoker,
}

impl ConstructorInfo {
    pub fn new(invoker: ConstructorInvoker) -> Self {
        Self {
            params: Vec::new(),
            inject: false,
            invoker,
        }
    }

    /// The injection constructor
    pub fn injecting(invoker: ConstructorInvoker) -> Self {
        Self {
            inject: true,
            ..Self::new(invoker)
        }
    }

    pub fn with_param(mut self, param: ParameterInfo) -> Self {
        self.params.push(param);
        self
    }
}

/// What runs when a method is invoked
#[derive(Clone)]
pub enum MethodBody {
    /// Declared only, never called by the container
    None,
    Invoker(MethodInvoker),
    /// Interceptor method receiving the invocation context
    Interceptor(Arc<InterceptorFn>),
    /// Decorator method receiving the delegate invocation
    Decorator(Arc<DecoratorFn>),
}

impl fmt::Debug for MethodBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodBody::None => write!(f, "None"),
            MethodBody::Invoker(invoker) => write!(f, "Invoker({:?})", invoker),
            MethodBody::Interceptor(_) => write!(f, "Interceptor(<fn>)"),
            MethodBody::Decorator(_) => write!(f, "Decorator(<fn>)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub name: String,
    pub declaring_class: String,
    pub params: Vec<ParameterInfo>,
    /// `None` for methods returning nothing
    pub return_type: Option<TypeRef>,
    pub markers: Vec<Marker>,
    /// A single resource-style annotation on the method itself
    pub resource: Option<Qualifier>,
    /// Qualifiers on a producer method
    pub qualifiers: Vec<Qualifier>,
    pub throws: Vec<ThrownType>,
    pub is_static: bool,
    pub is_final: bool,
    /// Interceptor classes bound to this method only
    pub interceptors: Vec<String>,
    pub body: MethodBody,
}

impl MethodInfo {
    pub fn new(declaring_class: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declaring_class: declaring_class.into(),
            params: Vec::new(),
            return_type: None,
            markers: Vec::new(),
            resource: None,
            qualifiers: Vec::new(),
            throws: Vec::new(),
            is_static: false,
            is_final: false,
            interceptors: Vec::new(),
            body: MethodBody::None,
        }
    }

    pub fn with_param(mut self, param: ParameterInfo) -> Self {
        self.params.push(param);
        self
    }

    pub fn returning(mut self, ty: TypeRef) -> Self {
        self.return_type = Some(ty);
        self
    }

    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    pub fn with_resource(mut self, annotation: Qualifier) -> Self {
        self.resource = Some(annotation);
        self
    }

    pub fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.push(qualifier);
        self
    }

    pub fn throwing(mut self, thrown: ThrownType) -> Self {
        self.throws.push(thrown);
        self
    }

    pub fn static_method(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn final_method(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn with_interceptor(mut self, interceptor_class: impl Into<String>) -> Self {
        self.interceptors.push(interceptor_class.into());
        self
    }

    pub fn with_invoker(mut self, invoker: MethodInvoker) -> Self {
        self.body = MethodBody::Invoker(invoker);
        self
    }

    pub fn with_interceptor_fn(mut self, body: Arc<InterceptorFn>) -> Self {
        self.body = MethodBody::Interceptor(body);
        self
    }

    pub fn with_decorator_fn(mut self, body: Arc<DecoratorFn>) -> Self {
        self.body = MethodBody::Decorator(body);
        self
    }

    pub fn has_marker(&self, marker: Marker) -> bool {
        self.markers.contains(&marker)
    }

    /// Number of parameters carrying `marker`
    pub fn params_with(&self, marker: Marker) -> usize {
        self.params.iter().filter(|p| p.has_marker(marker)).count()
    }

    pub fn declares_checked_exceptions(&self) -> bool {
        self.throws.iter().any(|t| t.checked)
    }

    /// `Class#method` for diagnostics
    pub fn qualified_name(&self) -> String {
        format!("{}#{}", self.declaring_class, self.name)
    }

    pub fn invoker(&self) -> Option<&MethodInvoker> {
        match &self.body {
            MethodBody::Invoker(invoker) => Some(invoker),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub declaring_class: String,
    pub ty: TypeRef,
    pub qualifiers: Vec<Qualifier>,
    pub markers: Vec<Marker>,
    /// A resource-style annotation on the field
    pub resource: Option<Qualifier>,
    pub is_static: bool,
    pub accessor: FieldAccessor,
}

impl FieldInfo {
    pub fn new(
        declaring_class: impl Into<String>,
        name: impl Into<String>,
        ty: TypeRef,
        accessor: FieldAccessor,
    ) -> Self {
        Self {
            name: name.into(),
            declaring_class: declaring_class.into(),
            ty,
            qualifiers: Vec::new(),
            markers: Vec::new(),
            resource: None,
            is_static: false,
            accessor,
        }
    }

    pub fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.push(qualifier);
        self
    }

    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    pub fn with_resource(mut self, annotation: Qualifier) -> Self {
        self.resource = Some(annotation);
        self
    }

    pub fn has_marker(&self, marker: Marker) -> bool {
        self.markers.contains(&marker)
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.declaring_class, self.name)
    }
}

/// Interceptor binding declared by a stereotype
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptorBindingInfo {
    pub name: String,
    /// The binding may only target types, not methods
    pub type_target_only: bool,
}

/// A stereotype applied to a bean class
#[derive(Debug, Clone, PartialEq)]
pub struct Stereotype {
    pub name: String,
    pub scopes: Vec<Scope>,
    /// `Some("")` for a valueless `@Named`
    pub named: Option<String>,
    pub qualifiers: Vec<Qualifier>,
    pub interceptor_bindings: Vec<InterceptorBindingInfo>,
    pub alternative: bool,
}

impl Stereotype {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scopes: Vec::new(),
            named: None,
            qualifiers: Vec::new(),
            interceptor_bindings: Vec::new(),
            alternative: false,
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scopes.push(scope);
        self
    }

    pub fn with_default_name(mut self) -> Self {
        self.named = Some(String::new());
        self
    }

    pub fn alternative(mut self) -> Self {
        self.alternative = true;
        self
    }

    /// Structural rules every stereotype must follow
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.scopes.len() > 1 {
            return Err(CoreError::configuration(format!(
                "Stereotype : {} can not declare more than one scope",
                self.name
            )));
        }
        if matches!(&self.named, Some(value) if !value.is_empty()) {
            return Err(CoreError::configuration(format!(
                "Stereotype : {} can not define @Named annotation with value",
                self.name
            )));
        }
        if let Some(qualifier) = self.qualifiers.first() {
            return Err(CoreError::configuration(format!(
                "Stereotype : {} can not define qualifier annotation {}",
                self.name, qualifier
            )));
        }
        if let Some(binding) = self
            .interceptor_bindings
            .iter()
            .find(|b| !b.type_target_only)
        {
            return Err(CoreError::configuration(format!(
                "Stereotype : {} declares interceptor binding @{} that does not target types only",
                self.name, binding.name
            )));
        }
        Ok(())
    }
}

/// Delegate injection point of a decorator class
#[derive(Debug, Clone, PartialEq)]
pub struct DelegateInfo {
    pub ty: TypeRef,
    pub qualifiers: Vec<Qualifier>,
}

/// Metadata of a bean, interceptor or decorator implementation class
#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    pub superclass: Option<String>,
    pub type_params: Vec<String>,
    pub is_abstract: bool,
    pub is_interface: bool,
    pub is_final: bool,
    pub is_inner_non_static: bool,
    pub is_decorator: bool,
    pub is_interceptor: bool,
    pub specializes: bool,
    pub alternative: bool,
    pub serializable: bool,
    pub stereotypes: Vec<Stereotype>,
    pub constructors: Vec<ConstructorInfo>,
    /// Declared and inherited methods
    pub methods: Vec<MethodInfo>,
    pub fields: Vec<FieldInfo>,
    /// Interceptor classes bound at class level, in declaration order
    pub interceptors: Vec<String>,
    pub delegate: Option<DelegateInfo>,
    pub decorated_types: Vec<TypeRef>,
}

impl ClassInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superclass: None,
            type_params: Vec::new(),
            is_abstract: false,
            is_interface: false,
            is_final: false,
            is_inner_non_static: false,
            is_decorator: false,
            is_interceptor: false,
            specializes: false,
            alternative: false,
            serializable: false,
            stereotypes: Vec::new(),
            constructors: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
            interceptors: Vec::new(),
            delegate: None,
            decorated_types: Vec::new(),
        }
    }

    pub fn extending(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn with_type_param(mut self, name: impl Into<String>) -> Self {
        self.type_params.push(name.into());
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn interface(mut self) -> Self {
        self.is_interface = true;
        self
    }

    pub fn final_class(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn inner(mut self) -> Self {
        self.is_inner_non_static = true;
        self
    }

    pub fn specializing(mut self) -> Self {
        self.specializes = true;
        self
    }

    pub fn alternative(mut self) -> Self {
        self.alternative = true;
        self
    }

    pub fn serializable(mut self) -> Self {
        self.serializable = true;
        self
    }

    pub fn interceptor(mut self) -> Self {
        self.is_interceptor = true;
        self
    }

    /// Mark as a decorator of `decorated_types` wrapping `delegate`
    pub fn decorator(mut self, delegate: DelegateInfo, decorated_types: Vec<TypeRef>) -> Self {
        self.is_decorator = true;
        self.delegate = Some(delegate);
        self.decorated_types = decorated_types;
        self
    }

    pub fn with_stereotype(mut self, stereotype: Stereotype) -> Self {
        self.stereotypes.push(stereotype);
        self
    }

    pub fn with_constructor(mut self, constructor: ConstructorInfo) -> Self {
        self.constructors.push(constructor);
        self
    }

    pub fn with_method(mut self, method: MethodInfo) -> Self {
        self.methods.push(method);
        self
    }

    pub fn with_field(mut self, field: FieldInfo) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_interceptor(mut self, interceptor_class: impl Into<String>) -> Self {
        self.interceptors.push(interceptor_class.into());
        self
    }

    pub fn is_concrete(&self) -> bool {
        !self.is_abstract && !self.is_interface
    }

    /// Alternative directly or through a stereotype
    pub fn is_alternative(&self) -> bool {
        self.alternative || self.stereotypes.iter().any(|s| s.alternative)
    }

    pub fn methods_with(&self, marker: Marker) -> impl Iterator<Item = &MethodInfo> {
        self.methods.iter().filter(move |m| m.has_marker(marker))
    }

    pub fn method(&self, name: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// More than one method of the hierarchy carries `name`; such methods
    /// override or overload each other.
    pub fn has_overridden_name(&self, name: &str) -> bool {
        self.methods.iter().filter(|m| m.name == name).count() > 1
    }

    pub fn no_arg_constructor(&self) -> Option<&ConstructorInfo> {
        self.constructors.iter().find(|c| c.params.is_empty())
    }

    /// Decorator delegate methods by name
    pub fn decorates_method(&self, name: &str) -> bool {
        self.methods
            .iter()
            .any(|m| m.name == name && matches!(m.body, MethodBody::Decorator(_)))
    }
}
