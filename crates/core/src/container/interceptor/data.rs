use crate::container::class_info::{Marker, MethodInfo};
use crate::container::descriptor::BeanId;
use crate::container::interceptor::invocation::InvocationContext;
use crate::container::invoker::Instance;
use crate::errors::CoreError;
use std::fmt;

/// Body of an interceptor method: receives the interceptor (or target)
/// instance and the invocation context it may `proceed()` on.
pub type InterceptorFn =
    dyn Fn(&Instance, &mut InvocationContext) -> Result<Option<Instance>, CoreError> + Send + Sync;

/// Kind of interception a binding applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterceptionType {
    AroundInvoke,
    PostConstruct,
    PreDestroy,
}

impl InterceptionType {
    pub const ALL: [InterceptionType; 3] = [
        InterceptionType::AroundInvoke,
        InterceptionType::PostConstruct,
        InterceptionType::PreDestroy,
    ];

    pub fn marker(&self) -> Marker {
        match self {
            InterceptionType::AroundInvoke => Marker::AroundInvoke,
            InterceptionType::PostConstruct => Marker::PostConstruct,
            InterceptionType::PreDestroy => Marker::PreDestroy,
        }
    }

    pub fn is_lifecycle(&self) -> bool {
        !matches!(self, InterceptionType::AroundInvoke)
    }
}

impl fmt::Display for InterceptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.marker())
    }
}

/// Where the instance an interceptor method runs on comes from
#[derive(Clone)]
pub enum InterceptorSource {
    /// Declared on the target class; runs on the target instance
    Target,
    /// Container-managed interceptor bean, created per target instance
    Bean(BeanId),
    /// Externally managed interceptor class, instantiated once
    External(Instance),
}

impl fmt::Debug for InterceptorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterceptorSource::Target => write!(f, "Target"),
            InterceptorSource::Bean(id) => write!(f, "Bean({})", id),
            InterceptorSource::External(_) => write!(f, "External"),
        }
    }
}

/// One interception binding of a bean
#[derive(Debug, Clone)]
pub struct InterceptorData {
    pub interception_type: InterceptionType,
    pub method: MethodInfo,
    pub interceptor_class: String,
    pub defined_in_interceptor_class: bool,
    /// Business method the binding was declared on; `None` for class level
    pub bound_method: Option<String>,
    pub source: InterceptorSource,
}

impl InterceptorData {
    /// Container-managed (bean) interceptors versus externally managed ones
    pub fn is_container_managed(&self) -> bool {
        matches!(self.source, InterceptorSource::Bean(_))
    }

    /// Whether an around-invoke binding applies to `method`
    pub fn applies_to(&self, method: Option<&str>) -> bool {
        match (&self.bound_method, method) {
            (None, _) => true,
            (Some(bound), Some(method)) => bound == method,
            (Some(_), None) => false,
        }
    }
}
