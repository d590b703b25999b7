//! Definition-time checks applied while a bean is registered. Every
//! violation excludes the bean from the deployment.

use crate::container::class_info::{ClassInfo, ConstructorInfo, Marker, MethodInfo};
use crate::container::descriptor::{BeanDefinition, BeanKind, InjectionPoint};
use crate::container::interceptor::{check_around_invoke, check_lifecycle_callback, InterceptionType};
use crate::container::scope::Scope;
use crate::container::types::TypeRef;
use crate::errors::CoreError;

/// Structural rules for a class backing a managed bean
pub fn check_managed_class(class: &ClassInfo) -> Result<(), CoreError> {
    if class.is_inner_non_static {
        return Err(CoreError::definition(format!(
            "Bean implementation class : {} can not be non-static inner class",
            class.name
        )));
    }
    if !class.is_concrete() && !class.is_decorator {
        return Err(CoreError::definition(format!(
            "Bean implementation class : {} must be concrete if not a decorator",
            class.name
        )));
    }
    for stereotype in &class.stereotypes {
        stereotype.validate()?;
    }
    Ok(())
}

/// The constructor the container instantiates `class` through: the single
/// injection constructor, otherwise the no-argument one.
pub fn select_constructor(class: &ClassInfo) -> Result<&ConstructorInfo, CoreError> {
    if class.constructors.is_empty() {
        return Err(CoreError::definition(format!(
            "Bean implementation class : {} must define at least one Constructor",
            class.name
        )));
    }

    let mut injecting = class.constructors.iter().filter(|c| c.inject);
    let selected = match (injecting.next(), injecting.next()) {
        (Some(_), Some(_)) => {
            return Err(CoreError::definition(format!(
                "There are more than one Constructor with Initializer annotation in class {}",
                class.name
            )))
        }
        (Some(constructor), None) => constructor,
        (None, _) => class.no_arg_constructor().ok_or_else(|| {
            CoreError::definition(format!("No constructor is found for the class : {}", class.name))
        })?,
    };

    for marker in [Marker::Disposes, Marker::Observes] {
        if selected.params.iter().any(|p| p.has_marker(marker)) {
            return Err(CoreError::definition(format!(
                "Constructor parameter annotations can not contain {} annotation in class : {}",
                marker, class.name
            )));
        }
    }
    Ok(selected)
}

/// Initializer methods: injected, neither producers nor disposers
pub fn check_initializer_methods(class: &ClassInfo) -> Result<(), CoreError> {
    for method in class.methods_with(Marker::Inject) {
        if method.has_marker(Marker::Produces) {
            return Err(CoreError::definition(format!(
                "Initializer method : {} in class : {} can not be annotated with @Produces",
                method.name, class.name
            )));
        }
        for marker in [Marker::Disposes, Marker::Observes] {
            if method.params_with(marker) > 0 {
                return Err(CoreError::definition(format!(
                    "Initializer method : {} in class : {} can not have parameter annotated with {}",
                    method.name, class.name, marker
                )));
            }
        }
        if method.is_static {
            return Err(CoreError::definition(format!(
                "Initializer method : {} in class : {} can not be static",
                method.name, class.name
            )));
        }
    }
    Ok(())
}

/// Generic bean classes are `@Dependent` only
pub fn check_generic_class(class: &ClassInfo, scope: &Scope) -> Result<(), CoreError> {
    if !class.type_params.is_empty() && !scope.is_dependent() {
        return Err(CoreError::definition(format!(
            "Generic bean class : {} must be @Dependent scoped, found {}",
            class.name, scope
        )));
    }
    Ok(())
}

/// Lifecycle and around-invoke declarations of a bean or interceptor class
pub fn check_interception_methods(class: &ClassInfo) -> Result<(), CoreError> {
    for interception_type in [InterceptionType::PostConstruct, InterceptionType::PreDestroy] {
        check_lifecycle_callback(class, interception_type, class.is_interceptor)?;
    }
    check_around_invoke(class)?;
    Ok(())
}

/// Rules for a producer method declared by `declaring_class`
pub fn check_producer_method(method: &MethodInfo, declaring_class: &str) -> Result<(), CoreError> {
    if method.has_marker(Marker::Inject) {
        return Err(CoreError::definition(format!(
            "Producer method : {} in class : {} can not be annotated with @Initializer",
            method.name, declaring_class
        )));
    }
    for marker in [Marker::Disposes, Marker::Observes] {
        if method.params_with(marker) > 0 {
            return Err(CoreError::definition(format!(
                "Producer method : {} in class : {} can not define parameter with annotation {}",
                method.name, declaring_class, marker
            )));
        }
    }
    if method.return_type.is_none() {
        return Err(CoreError::definition(format!(
            "Producer method : {} in class : {} can not return void type",
            method.name, declaring_class
        )));
    }
    Ok(())
}

/// Rules on the type a producer method or field yields
pub fn check_producer_type(ty: &TypeRef, scope: &Scope, member: &str) -> Result<(), CoreError> {
    if ty.is_variable() {
        return Err(CoreError::definition(format!(
            "Producer : {} return type can not be a type variable",
            member
        )));
    }
    if ty.has_wildcard_arg() {
        return Err(CoreError::definition(format!(
            "Producer : {} return type {} can not contain a wildcard",
            member, ty
        )));
    }
    if ty.has_variable_arg() && !scope.is_dependent() {
        return Err(CoreError::definition(format!(
            "Producer : {} with parameterized return type {} must be @Dependent scoped",
            member, ty
        )));
    }
    Ok(())
}

/// Rules for a disposal method: exactly one disposed parameter, no other
/// role
pub fn check_disposal_method(method: &MethodInfo, declaring_class: &str) -> Result<(), CoreError> {
    let disposed = method.params_with(Marker::Disposes);
    if disposed != 1 {
        return Err(CoreError::definition(format!(
            "Disposal method : {} in class : {} must declare exactly one @Disposes parameter, found {}",
            method.name, declaring_class, disposed
        )));
    }
    for marker in [Marker::Inject, Marker::Produces] {
        if method.has_marker(marker) {
            return Err(CoreError::definition(format!(
                "Disposal method : {} in class : {} can not be annotated with {}",
                method.name, declaring_class, marker
            )));
        }
    }
    if method.params_with(Marker::Observes) > 0 {
        return Err(CoreError::definition(format!(
            "Disposal method : {} in class : {} can not define @Observes parameter",
            method.name, declaring_class
        )));
    }
    Ok(())
}

/// Per-injection-point rules
pub fn check_injection_point(ip: &InjectionPoint) -> Result<(), CoreError> {
    if ip.qualifiers.iter().any(|q| q.is_new()) && ip.qualifiers.len() > 1 {
        return Err(CoreError::definition(format!(
            "@New qualifier can not be combined with other qualifiers at injection point {}",
            ip
        )));
    }
    if ip
        .qualifiers
        .iter()
        .any(|q| q.is_named() && q.named_value().is_none())
        && !ip.member.is_field()
    {
        return Err(CoreError::definition(format!(
            "@Named without value is only allowed on fields, found at injection point {}",
            ip
        )));
    }
    if ip.is_instance() && ip.required_type.args().len() != 1 {
        return Err(CoreError::definition(format!(
            "Instance injection point {} must declare exactly one actual type argument",
            ip
        )));
    }
    if ip.is_event() && ip.required_type.args().len() != 1 {
        return Err(CoreError::definition(format!(
            "Event injection point {} must declare exactly one actual type argument",
            ip
        )));
    }
    if ip.required_type.is_variable() {
        return Err(CoreError::definition(format!(
            "Injection point {} can not have a type variable type",
            ip
        )));
    }
    Ok(())
}

/// `@New` injection needs a concrete class to instantiate
pub fn check_new_target(ip: &InjectionPoint, class: Option<&ClassInfo>) -> Result<(), CoreError> {
    match class {
        Some(class) if class.is_concrete() => Ok(()),
        _ => Err(CoreError::definition(format!(
            "@New qualifier injection point {} requires a concrete bean class",
            ip
        ))),
    }
}

/// A normal-scoped managed bean must admit a client proxy
pub fn unproxyable_reason(bean: &BeanDefinition) -> Option<String> {
    if !bean.scope.is_normal() {
        return None;
    }
    let class = match &bean.kind {
        BeanKind::Managed(m) | BeanKind::Enterprise(m) => &m.class,
        _ => return None,
    };
    if class.is_final {
        return Some("class is final".to_string());
    }
    class
        .methods
        .iter()
        .find(|m| m.is_final && !m.is_static)
        .map(|m| format!("declares final method {}", m.name))
}

/// A producer returning null is only legal for dependent beans
pub fn check_null_product(bean: &BeanDefinition) -> Result<(), CoreError> {
    if bean.scope.is_dependent() {
        Ok(())
    } else {
        Err(CoreError::illegal_product(format!(
            "Producer {} returned null but its scope {} is not @Dependent",
            bean.display_name(),
            bean.scope
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::class_info::ParameterInfo;
    use crate::container::descriptor::InjectionMember;
    use crate::container::invoker::ConstructorInvoker;
    use crate::container::qualifier::Qualifier;

    fn ctor() -> ConstructorInvoker {
        ConstructorInvoker::new("ctor", |_| Ok(()))
    }

    #[test]
    fn test_class_without_constructors() {
        let err = select_constructor(&ClassInfo::new("Ghost")).unwrap_err();
        assert!(err.is_definition());
        assert!(err.to_string().contains("must define at least one Constructor"));
    }

    #[test]
    fn test_disposes_on_injection_constructor() {
        let class = ClassInfo::new("Repository").with_constructor(
            ConstructorInfo::injecting(ctor())
                .with_param(ParameterInfo::new(TypeRef::class("Connection")).with_marker(Marker::Disposes)),
        );
        let err = select_constructor(&class).unwrap_err();
        assert!(err.to_string().contains("@Disposes"));
    }

    #[test]
    fn test_two_injection_constructors() {
        let class = ClassInfo::new("Twice")
            .with_constructor(ConstructorInfo::injecting(ctor()))
            .with_constructor(
                ConstructorInfo::injecting(ctor()).with_param(ParameterInfo::new(TypeRef::class("Clock"))),
            );
        assert!(select_constructor(&class).is_err());
    }

    #[test]
    fn test_no_arg_constructor_selected() {
        let class = ClassInfo::new("Plain").with_constructor(ConstructorInfo::new(ctor()));
        assert!(select_constructor(&class).unwrap().params.is_empty());
    }

    #[test]
    fn test_abstract_class_rejected() {
        let err = check_managed_class(&ClassInfo::new("Shape").abstract_class()).unwrap_err();
        assert!(err.is_definition());
    }

    #[test]
    fn test_generic_class_requires_dependent() {
        let class = ClassInfo::new("Box").with_type_param("T");
        assert!(check_generic_class(&class, &Scope::Dependent).is_ok());
        assert!(check_generic_class(&class, &Scope::Application).is_err());
    }

    #[test]
    fn test_producer_type_rules() {
        assert!(check_producer_type(&TypeRef::variable("T"), &Scope::Dependent, "make").is_err());
        let wildcard = TypeRef::parameterized("List", vec![TypeRef::wildcard()]);
        assert!(check_producer_type(&wildcard, &Scope::Dependent, "make").is_err());
        let variable_arg = TypeRef::parameterized("List", vec![TypeRef::variable("T")]);
        assert!(check_producer_type(&variable_arg, &Scope::Dependent, "make").is_ok());
        assert!(check_producer_type(&variable_arg, &Scope::Request, "make").is_err());
    }

    #[test]
    fn test_disposal_method_needs_one_disposed_parameter() {
        let method = MethodInfo::new("Factory", "close")
            .with_param(ParameterInfo::new(TypeRef::class("Conn")).with_marker(Marker::Disposes))
            .with_param(ParameterInfo::new(TypeRef::class("Conn")).with_marker(Marker::Disposes));
        assert!(check_disposal_method(&method, "Factory").is_err());
    }

    #[test]
    fn test_instance_injection_point_needs_one_argument() {
        let raw = InjectionPoint::new(
            "Client",
            InjectionMember::Field { name: "all".into() },
            TypeRef::class("Instance"),
            vec![],
        );
        assert!(check_injection_point(&raw).is_err());

        let typed = InjectionPoint::new(
            "Client",
            InjectionMember::Field { name: "all".into() },
            TypeRef::parameterized("Instance", vec![TypeRef::class("Payment")]),
            vec![],
        );
        assert!(check_injection_point(&typed).is_ok());
    }

    #[test]
    fn test_valueless_named_only_on_fields() {
        let param = InjectionPoint::new(
            "Client",
            InjectionMember::ConstructorParameter { index: 0 },
            TypeRef::class("Config"),
            vec![Qualifier::new("Named")],
        );
        assert!(check_injection_point(&param).is_err());
    }

    #[test]
    fn test_final_normal_scoped_class_is_unproxyable() {
        let bean = BeanDefinition::managed(ClassInfo::new("Locked").final_class(), vec![])
            .with_scope(Scope::Application);
        assert!(unproxyable_reason(&bean).is_some());
        let dependent = BeanDefinition::managed(ClassInfo::new("Locked").final_class(), vec![]);
        assert!(unproxyable_reason(&dependent).is_none());
    }
}
