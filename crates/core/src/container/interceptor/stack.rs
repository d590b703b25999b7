use crate::container::class_info::{ClassInfo, Marker, MethodInfo, INVOCATION_CONTEXT_TYPE, EXCEPTION_TYPE};
use crate::container::interceptor::data::{InterceptionType, InterceptorData, InterceptorSource};
use crate::container::interceptor::invocation::ChainLink;
use crate::container::invoker::Instance;
use crate::errors::CoreError;
use std::sync::Arc;

/// Ordered interception bindings of one bean
#[derive(Debug, Clone, Default)]
pub struct InterceptorStack {
    entries: Vec<InterceptorData>,
}

impl InterceptorStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: InterceptorData) {
        self.entries.push(data);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[InterceptorData] {
        &self.entries
    }

    /// Bindings of one interception type that apply to `method`, in stack order
    pub fn for_invocation<'s>(
        &'s self,
        interception_type: InterceptionType,
        method: Option<&'s str>,
    ) -> impl Iterator<Item = &'s InterceptorData> {
        self.entries
            .iter()
            .filter(move |d| d.interception_type == interception_type && d.applies_to(method))
    }

    pub fn contains_type(&self, interception_type: InterceptionType) -> bool {
        self.entries
            .iter()
            .any(|d| d.interception_type == interception_type)
    }

    /// Pair the bindings for one invocation with the instances they run on
    pub fn links<F>(
        &self,
        interception_type: InterceptionType,
        method: Option<&str>,
        target: &Instance,
        mut instance_for: F,
    ) -> Result<Vec<ChainLink>, CoreError>
    where
        F: FnMut(&InterceptorData) -> Result<Instance, CoreError>,
    {
        self.for_invocation(interception_type, method)
            .map(|data| {
                let instance = match &data.source {
                    InterceptorSource::Target => target.clone(),
                    InterceptorSource::External(instance) => instance.clone(),
                    InterceptorSource::Bean(_) => instance_for(data)?,
                };
                Ok(ChainLink {
                    data: data.clone(),
                    instance,
                })
            })
            .collect()
    }

    /// Target-class bindings first, then interceptor classes; stable
    fn order(&mut self) {
        self.entries.sort_by_key(|d| d.defined_in_interceptor_class);
    }
}

/// An interceptor class bound to a bean, at class level or on one method
#[derive(Debug, Clone)]
pub struct BoundInterceptorClass {
    pub class: Arc<ClassInfo>,
    pub source: InterceptorSource,
    pub bound_method: Option<String>,
}

/// Methods carrying `marker`, keeping one method per name: the one the
/// class declares itself, otherwise the first inherited one.
fn effective_methods(class: &ClassInfo, marker: Marker) -> Vec<&MethodInfo> {
    let mut chosen: Vec<&MethodInfo> = Vec::new();
    for method in class.methods_with(marker) {
        match chosen.iter().position(|m| m.name == method.name) {
            Some(index) => {
                if method.declaring_class == class.name && chosen[index].declaring_class != class.name {
                    chosen[index] = method;
                }
            }
            None => chosen.push(method),
        }
    }
    chosen
}

fn single_method<'c>(class: &'c ClassInfo, marker: Marker) -> Result<Option<&'c MethodInfo>, CoreError> {
    let methods = effective_methods(class, marker);
    if methods.len() > 1 {
        return Err(CoreError::configuration(format!(
            "{} annotation is declared more than one method in the class : {}",
            marker, class.name
        )));
    }
    Ok(methods.into_iter().next())
}

fn takes_context_only(method: &MethodInfo) -> bool {
    method.params.len() == 1 && method.params[0].ty.raw_name() == Some(INVOCATION_CONTEXT_TYPE)
}

fn signature_error(marker: Marker, method: &MethodInfo, class: &ClassInfo, problem: &str) -> CoreError {
    CoreError::configuration(format!(
        "{} annotated method : {} in class : {} {}",
        marker, method.name, class.name, problem
    ))
}

/// Validate the post-construct or pre-destroy callback of a class.
///
/// Callbacks return nothing, declare no checked exceptions and are not
/// static. Target-class callbacks take no arguments; interceptor-class
/// callbacks take the invocation context as their only parameter.
pub fn check_lifecycle_callback(
    class: &ClassInfo,
    interception_type: InterceptionType,
    interceptor_class: bool,
) -> Result<Option<&MethodInfo>, CoreError> {
    let marker = interception_type.marker();
    let method = match single_method(class, marker)? {
        Some(method) => method,
        None => return Ok(None),
    };

    if interceptor_class {
        if !takes_context_only(method) {
            return Err(signature_error(
                marker,
                method,
                class,
                "must take exactly one InvocationContext parameter",
            ));
        }
    } else if !method.params.is_empty() {
        return Err(signature_error(marker, method, class, "can not take any formal arguments"));
    }

    if method.return_type.is_some() {
        return Err(signature_error(marker, method, class, "must return void type"));
    }
    if method.declares_checked_exceptions() {
        return Err(signature_error(
            marker,
            method,
            class,
            "can not throw any checked exception",
        ));
    }
    if method.is_static {
        return Err(signature_error(marker, method, class, "can not be static"));
    }
    Ok(Some(method))
}

/// Validate the around-invoke method of a class: it takes the invocation
/// context only, returns a value, declares that it may throw and is
/// neither static nor final.
pub fn check_around_invoke(class: &ClassInfo) -> Result<Option<&MethodInfo>, CoreError> {
    let marker = Marker::AroundInvoke;
    let method = match single_method(class, marker)? {
        Some(method) => method,
        None => return Ok(None),
    };

    if !takes_context_only(method) {
        return Err(signature_error(
            marker,
            method,
            class,
            "must take exactly one InvocationContext parameter",
        ));
    }
    if !matches!(&method.return_type, Some(ty) if ty.is_object()) {
        return Err(signature_error(marker, method, class, "must return Object type"));
    }
    if !method.throws.iter().any(|t| t.name == EXCEPTION_TYPE) {
        return Err(signature_error(marker, method, class, "must throw Exception"));
    }
    if method.is_static || method.is_final {
        return Err(signature_error(marker, method, class, "can not be static or final"));
    }
    Ok(Some(method))
}

fn binding_for(class: &ClassInfo, interception_type: InterceptionType, interceptor_class: bool) -> Result<Option<&MethodInfo>, CoreError> {
    if interception_type.is_lifecycle() {
        check_lifecycle_callback(class, interception_type, interceptor_class)
    } else {
        check_around_invoke(class)
    }
}

/// Build and validate the interceptor stack of `target`.
///
/// Every violation is a definition-time configuration error.
pub fn build_stack(
    target: &ClassInfo,
    bound: &[BoundInterceptorClass],
) -> Result<InterceptorStack, CoreError> {
    let mut stack = InterceptorStack::new();

    for interception_type in InterceptionType::ALL {
        if let Some(method) = binding_for(target, interception_type, false)? {
            stack.push(InterceptorData {
                interception_type,
                method: method.clone(),
                interceptor_class: target.name.clone(),
                defined_in_interceptor_class: false,
                bound_method: None,
                source: InterceptorSource::Target,
            });
        }
    }

    for binding in bound {
        for interception_type in InterceptionType::ALL {
            // Lifecycle interception is bound at class level only
            if interception_type.is_lifecycle() && binding.bound_method.is_some() {
                continue;
            }
            if let Some(method) = binding_for(&binding.class, interception_type, true)? {
                stack.push(InterceptorData {
                    interception_type,
                    method: method.clone(),
                    interceptor_class: binding.class.name.clone(),
                    defined_in_interceptor_class: true,
                    bound_method: binding.bound_method.clone(),
                    source: binding.source.clone(),
                });
            }
        }
    }

    stack.order();
    tracing::debug!(
        "Built interceptor stack for {} with {} binding(s)",
        target.name,
        stack.len()
    );
    Ok(stack)
}
