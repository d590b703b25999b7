//! Constructor, method and field injection.
//!
//! Every argument is resolved through the resolver and materialized by a
//! `BeanInstanceSource`; failures of the invoked member surface as
//! `CoreError::InjectionExecution` carrying the member and the cause.

use crate::container::class_info::{ClassInfo, ConstructorInfo, FieldInfo, Marker, MethodInfo, ParameterInfo};
use crate::container::creational::CreationalContext;
use crate::container::descriptor::{BeanDefinition, BeanKind, InjectionMember, InjectionPoint, Realizes};
use crate::container::invoker::{Arguments, Instance, MemberInvoker};
use crate::container::qualifier::push_unique;
use crate::container::resolver::Resolver;
use crate::errors::{CoreError, InvocationFailure};

/// Supplies instances for resolved injection points
pub trait BeanInstanceSource {
    /// Instance of `bean` to inject into `ip`; dependents created on the
    /// way are recorded in `creational`
    fn instance_for(
        &self,
        bean: &BeanDefinition,
        ip: &InjectionPoint,
        creational: &mut CreationalContext,
    ) -> Result<Option<Instance>, CoreError>;
}

/// Supplies instances of session-backed beans
pub trait EnterpriseInstanceProvider: Send + Sync {
    fn instance(&self, bean: &BeanDefinition, creational: &mut CreationalContext) -> Result<Instance, CoreError>;
}

pub struct Injector<'c, S: BeanInstanceSource + ?Sized> {
    resolver: Resolver<'c>,
    source: &'c S,
}

impl<'c, S: BeanInstanceSource + ?Sized> Injector<'c, S> {
    pub fn new(resolver: Resolver<'c>, source: &'c S) -> Self {
        Self { resolver, source }
    }

    /// Resolve and materialize one injection point
    pub fn resolve_argument(
        &self,
        ip: &InjectionPoint,
        creational: &mut CreationalContext,
    ) -> Result<Option<Instance>, CoreError> {
        let bean = self.resolver.resolve(ip)?;
        self.source.instance_for(bean, ip, creational)
    }

    /// Instantiate `bean` through `constructor`, resolving every parameter
    /// in declaration order
    pub fn inject_constructor(
        &self,
        bean: &BeanDefinition,
        constructor: &ConstructorInfo,
        creational: &mut CreationalContext,
    ) -> Result<Instance, CoreError> {
        let mut args = Arguments::empty();
        for (index, param) in constructor.params.iter().enumerate() {
            let ip = parameter_point(&bean.bean_class, InjectionMember::ConstructorParameter { index }, param);
            args.push(self.resolve_argument(&ip, creational)?);
        }

        let member = MemberInvoker::Constructor(constructor.invoker.clone());
        member.force_accessible();
        let created = member
            .invoke(None, &args)
            .map_err(|e| CoreError::injection(format!("{}#<init>", bean.bean_class), e))?;
        created.ok_or_else(|| {
            CoreError::injection(
                format!("{}#<init>", bean.bean_class),
                InvocationFailure::instantiation("constructor produced no instance"),
            )
        })
    }

    /// Invoke `method` on `target` with resolved arguments.
    ///
    /// A method carrying a resource annotation receives a single value of its
    /// first parameter type qualified by that annotation. Otherwise each
    /// parameter is resolved; the disposed or observed parameter takes
    /// `special` when given.
    pub fn inject_method(
        &self,
        bean: &BeanDefinition,
        method: &MethodInfo,
        target: Option<&Instance>,
        creational: &mut CreationalContext,
        special: Option<Instance>,
    ) -> Result<Option<Instance>, CoreError> {
        let invoker = method.invoker().ok_or_else(|| {
            CoreError::injection(
                method.qualified_name(),
                InvocationFailure::IllegalAccess {
                    member: format!("{} (no invoker)", method.qualified_name()),
                },
            )
        })?;

        let args = match (&method.resource, method.params.first()) {
            (Some(annotation), Some(param)) => {
                let ip = InjectionPoint::new(
                    &bean.bean_class,
                    method_member(method, 0),
                    param.ty.clone(),
                    vec![annotation.clone()],
                );
                Arguments::new(vec![self.resolve_argument(&ip, creational)?])
            }
            _ => self.method_arguments(bean, method, creational, special)?,
        };

        let member = MemberInvoker::Method(invoker.clone());
        member.force_accessible();
        member
            .invoke(target, &args)
            .map_err(|e| CoreError::injection(method.qualified_name(), e))
    }

    fn method_arguments(
        &self,
        bean: &BeanDefinition,
        method: &MethodInfo,
        creational: &mut CreationalContext,
        mut special: Option<Instance>,
    ) -> Result<Arguments, CoreError> {
        let realizes = realizes_of(bean);
        let mut args = Arguments::empty();
        for (index, param) in method.params.iter().enumerate() {
            let supplied = param.has_marker(Marker::Disposes) || param.has_marker(Marker::Observes);
            if supplied {
                if let Some(value) = special.take() {
                    args.push(Some(value));
                    continue;
                }
            }
            let mut ip = parameter_point(&bean.bean_class, method_member(method, index), param);
            if let (true, Some(realizes)) = (supplied, realizes) {
                for qualifier in &realizes.qualifiers {
                    push_unique(&mut ip.qualifiers, qualifier.clone());
                }
            }
            args.push(self.resolve_argument(&ip, creational)?);
        }
        Ok(args)
    }

    /// Resolve and write one injected field of `target`
    pub fn inject_field(
        &self,
        bean: &BeanDefinition,
        field: &FieldInfo,
        target: &Instance,
        creational: &mut CreationalContext,
    ) -> Result<(), CoreError> {
        let qualifiers = match &field.resource {
            Some(annotation) => vec![annotation.clone()],
            None => field.qualifiers.clone(),
        };
        let ip = InjectionPoint::new(
            &bean.bean_class,
            InjectionMember::Field {
                name: field.name.clone(),
            },
            field.ty.clone(),
            qualifiers,
        )
        .with_markers(field.markers.clone());
        let value = self.resolve_argument(&ip, creational)?;

        let member = MemberInvoker::Field(field.accessor.clone());
        member.force_accessible();
        member
            .invoke(Some(target), &Arguments::new(vec![value]))
            .map_err(|e| CoreError::injection(field.qualified_name(), e))?;
        Ok(())
    }

    /// Inject fields, then call initializer methods
    pub fn inject_members(
        &self,
        bean: &BeanDefinition,
        class: &ClassInfo,
        target: &Instance,
        creational: &mut CreationalContext,
    ) -> Result<(), CoreError> {
        for field in class
            .fields
            .iter()
            .filter(|f| f.resource.is_some() || f.has_marker(Marker::Inject))
        {
            self.inject_field(bean, field, target, creational)?;
        }
        for method in class
            .methods_with(Marker::Inject)
            .filter(|m| !m.has_marker(Marker::Produces))
        {
            self.inject_method(bean, method, Some(target), creational, None)?;
        }
        Ok(())
    }
}

fn realizes_of(bean: &BeanDefinition) -> Option<&Realizes> {
    match &bean.kind {
        BeanKind::Managed(m) => m.realizes.as_ref(),
        BeanKind::ProducerMethod(p) => p.realizes.as_ref(),
        _ => None,
    }
}

fn method_member(method: &MethodInfo, index: usize) -> InjectionMember {
    InjectionMember::MethodParameter {
        method: method.name.clone(),
        index,
    }
}

fn parameter_point(owner: &str, member: InjectionMember, param: &ParameterInfo) -> InjectionPoint {
    InjectionPoint::new(owner, member, param.ty.clone(), param.qualifiers.clone())
        .with_markers(param.markers.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContainerConfig;
    use crate::container::invoker::{instance, ConstructorInvoker, FieldAccessor, MethodInvoker};
    use crate::container::plugin::PluginRegistry;
    use crate::container::qualifier::Qualifier;
    use crate::container::registry::BeanRegistry;
    use crate::container::types::TypeRef;
    use std::sync::{Arc, Mutex};

    /// Materializes every bean as its class name
    struct Names;

    impl BeanInstanceSource for Names {
        fn instance_for(
            &self,
            bean: &BeanDefinition,
            _ip: &InjectionPoint,
            _creational: &mut CreationalContext,
        ) -> Result<Option<Instance>, CoreError> {
            Ok(Some(instance(bean.bean_class.clone())))
        }
    }

    fn class(name: &str) -> ClassInfo {
        ClassInfo::new(name).with_constructor(ConstructorInfo::new(ConstructorInvoker::new(name, |_| Ok(()))))
    }

    fn registry() -> BeanRegistry {
        let mut registry = BeanRegistry::new(Arc::new(ContainerConfig::new()), Arc::new(PluginRegistry::new()));
        registry
            .register(BeanDefinition::managed(class("SmtpMailer"), vec![TypeRef::class("Mailer")]))
            .unwrap();
        registry
            .register(
                BeanDefinition::managed(class("AuditLog"), vec![TypeRef::class("Log")])
                    .with_qualifier(Qualifier::new("Audit")),
            )
            .unwrap();
        registry.freeze();
        registry
    }

    struct Greeter {
        mailer: String,
        log: Mutex<Option<String>>,
    }

    #[test]
    fn test_constructor_injection() {
        let registry = registry();
        let injector = Injector::new(Resolver::new(&registry), &Names);
        let constructor = ConstructorInfo::injecting(ConstructorInvoker::new("Greeter", |args| {
            Ok(Greeter {
                mailer: (*args.get::<String>(0)?).clone(),
                log: Mutex::new(None),
            })
        }))
        .with_param(ParameterInfo::new(TypeRef::class("Mailer")));
        let bean = BeanDefinition::managed(class("Greeter"), vec![]);

        let mut creational = CreationalContext::new(None);
        let created = injector.inject_constructor(&bean, &constructor, &mut creational).unwrap();
        let greeter = created.downcast::<Greeter>().unwrap();
        assert_eq!(greeter.mailer, "SmtpMailer");
    }

    #[test]
    fn test_field_injection_forces_access() {
        let registry = registry();
        let injector = Injector::new(Resolver::new(&registry), &Names);
        let field = FieldInfo::new(
            "Greeter",
            "log",
            TypeRef::class("Log"),
            FieldAccessor::new("log")
                .with_setter::<Greeter, _>(|g, value| {
                    let value = value.and_then(|v| v.downcast::<String>().ok());
                    *g.log.lock().unwrap() = value.map(|v| (*v).clone());
                    Ok(())
                })
                .private(),
        )
        .with_marker(Marker::Inject)
        .with_qualifier(Qualifier::new("Audit"));
        let bean = BeanDefinition::managed(class("Greeter"), vec![]);
        let target = instance(Greeter {
            mailer: String::new(),
            log: Mutex::new(None),
        });

        let mut creational = CreationalContext::new(None);
        injector.inject_field(&bean, &field, &target, &mut creational).unwrap();
        let greeter = target.downcast::<Greeter>().unwrap();
        assert_eq!(greeter.log.lock().unwrap().as_deref(), Some("AuditLog"));
    }

    #[test]
    fn test_resource_method_receives_single_value() {
        let registry = registry();
        let injector = Injector::new(Resolver::new(&registry), &Names);
        let method = MethodInfo::new("Greeter", "setLog")
            .with_resource(Qualifier::new("Audit"))
            .with_param(ParameterInfo::new(TypeRef::class("Log")))
            .with_param(ParameterInfo::new(TypeRef::class("Unresolvable")))
            .with_invoker(MethodInvoker::static_fn("setLog", |args| {
                Ok(format!("{}:{}", args.len(), args.get::<String>(0)?))
            }));
        let bean = BeanDefinition::managed(class("Greeter"), vec![]);

        let mut creational = CreationalContext::new(None);
        let result = injector
            .inject_method(&bean, &method, None, &mut creational, None)
            .unwrap()
            .unwrap();
        assert_eq!(*result.downcast::<String>().unwrap(), "1:AuditLog");
    }

    #[test]
    fn test_disposed_parameter_takes_special_argument() {
        let registry = registry();
        let injector = Injector::new(Resolver::new(&registry), &Names);
        let method = MethodInfo::new("Factory", "close")
            .with_param(ParameterInfo::new(TypeRef::class("Connection")).with_marker(Marker::Disposes))
            .with_param(ParameterInfo::new(TypeRef::class("Mailer")))
            .with_invoker(MethodInvoker::static_fn("close", |args| {
                Ok(format!("{}+{}", args.get::<u32>(0)?, args.get::<String>(1)?))
            }));
        let bean = BeanDefinition::managed(class("Factory"), vec![]);

        let mut creational = CreationalContext::new(None);
        let result = injector
            .inject_method(&bean, &method, None, &mut creational, Some(instance(7u32)))
            .unwrap()
            .unwrap();
        assert_eq!(*result.downcast::<String>().unwrap(), "7+SmtpMailer");
    }

    #[test]
    fn test_realizes_recomputes_disposed_parameter_qualifiers() {
        let registry = registry();
        let injector = Injector::new(Resolver::new(&registry), &Names);
        // The parameter keeps its own type; only the qualifiers come from the
        // realized producer
        let method = MethodInfo::new("AuditFactory", "dispose")
            .with_param(ParameterInfo::new(TypeRef::class("Log")).with_marker(Marker::Disposes))
            .with_invoker(MethodInvoker::static_fn("dispose", |args| Ok((*args.get::<String>(0)?).clone())));
        let bean = BeanDefinition::managed(class("AuditFactory"), vec![]).with_realizes(Realizes {
            return_type: TypeRef::class("Connection"),
            qualifiers: vec![Qualifier::new("Audit")],
        });

        let mut creational = CreationalContext::new(None);
        let result = injector
            .inject_method(&bean, &method, None, &mut creational, None)
            .unwrap()
            .unwrap();
        assert_eq!(*result.downcast::<String>().unwrap(), "AuditLog");
    }

    #[test]
    fn test_failing_member_reports_injection_error() {
        let registry = registry();
        let injector = Injector::new(Resolver::new(&registry), &Names);
        let method = MethodInfo::new("Greeter", "init")
            .with_invoker(MethodInvoker::static_fn::<(), _>("init", |_| {
                Err(InvocationFailure::target("boom"))
            }));
        let bean = BeanDefinition::managed(class("Greeter"), vec![]);

        let mut creational = CreationalContext::new(None);
        let err = injector
            .inject_method(&bean, &method, None, &mut creational, None)
            .unwrap_err();
        assert!(err.is_injection_execution());
        assert!(err.to_string().contains("Greeter"));
    }

    #[test]
    fn test_unsatisfied_parameter() {
        let registry = registry();
        let injector = Injector::new(Resolver::new(&registry), &Names);
        let constructor = ConstructorInfo::injecting(ConstructorInvoker::new("Broken", |_| Ok(())))
            .with_param(ParameterInfo::new(TypeRef::class("Printer")));
        let bean = BeanDefinition::managed(class("Broken"), vec![]);
        let mut creational = CreationalContext::new(None);
        let err = injector
            .inject_constructor(&bean, &constructor, &mut creational)
            .unwrap_err();
        assert!(err.is_unsatisfied());
    }
}
