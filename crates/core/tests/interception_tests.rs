//! Integration tests for interceptor chains, decorators and lifecycle
//! callbacks of deployed beans.

use beanwire_core::container::{
    Arguments, BeanContainer, BeanDefinition, ClassInfo, ConstructorInfo, ConstructorInvoker, DelegateInfo,
    DelegateInvocation, Instance, InvocationContext, Marker, MethodInfo, MethodInvoker, ParameterInfo,
    ThrownType, TypeRef,
};
use beanwire_core::{ContainerBuilder, ContainerConfig, CoreError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<String>>>;

struct Orders {
    placed: AtomicUsize,
}

fn orders_class(log: &Log) -> ClassInfo {
    let on_place = Arc::clone(log);
    ClassInfo::new("Orders")
        .with_constructor(ConstructorInfo::new(ConstructorInvoker::new("Orders", |_| {
            Ok(Orders {
                placed: AtomicUsize::new(0),
            })
        })))
        .with_method(
            MethodInfo::new("Orders", "place")
                .returning(TypeRef::class("String"))
                .with_invoker(MethodInvoker::on::<Orders, String, _>("place", move |orders, _| {
                    orders.placed.fetch_add(1, Ordering::SeqCst);
                    on_place.lock().unwrap().push("place".to_string());
                    Ok("placed".to_string())
                })),
        )
}

/// Around-invoke interceptor class recording its name, proceeding `calls`
/// times
fn interceptor_class(name: &'static str, log: &Log, calls: usize) -> ClassInfo {
    let log = Arc::clone(log);
    ClassInfo::new(name)
        .interceptor()
        .with_constructor(ConstructorInfo::new(ConstructorInvoker::new(name, |_| Ok(()))))
        .with_method(
            MethodInfo::new(name, "intercept")
                .with_marker(Marker::AroundInvoke)
                .with_param(ParameterInfo::new(TypeRef::class("InvocationContext")))
                .returning(TypeRef::object())
                .throwing(ThrownType::exception())
                .with_interceptor_fn(Arc::new(
                    move |_: &Instance, ctx: &mut InvocationContext| -> Result<Option<Instance>, CoreError> {
                        log.lock().unwrap().push(name.to_string());
                        let mut result = Ok(None);
                        for _ in 0..calls {
                            result = ctx.proceed();
                        }
                        result
                    },
                )),
        )
}

fn invoke_place(container: &BeanContainer) -> Result<Option<Instance>, CoreError> {
    let bean = container
        .resolver()
        .resolve_type(&TypeRef::class("Orders"), &[])
        .unwrap()
        .id();
    let target = container.get_reference(&TypeRef::class("Orders"), &[]).unwrap();
    container.invoke(bean, &target, "place", Arguments::empty())
}

#[test]
fn test_interceptors_run_in_configured_order() {
    let log: Log = Arc::default();
    let container = ContainerBuilder::new(
        ContainerConfig::testing()
            .with_interceptor("Timing")
            .with_interceptor("Audit"),
    )
    .add_bean(BeanDefinition::managed(
        orders_class(&log).with_interceptor("Audit").with_interceptor("Timing"),
        vec![],
    ))
    .add_bean(BeanDefinition::interceptor(interceptor_class("Audit", &log, 1)))
    .add_bean(BeanDefinition::interceptor(interceptor_class("Timing", &log, 1)))
    .build()
    .unwrap();

    let result = invoke_place(&container).unwrap().unwrap();
    assert_eq!(*result.downcast::<String>().unwrap(), "placed");
    assert_eq!(*log.lock().unwrap(), vec!["Timing", "Audit", "place"]);
}

#[test]
fn test_disabled_interceptor_is_not_bound() {
    let log: Log = Arc::default();
    let container = ContainerBuilder::new(ContainerConfig::testing().with_interceptor("Timing"))
        .add_bean(BeanDefinition::managed(
            orders_class(&log).with_interceptor("Audit").with_interceptor("Timing"),
            vec![],
        ))
        .add_bean(BeanDefinition::interceptor(interceptor_class("Audit", &log, 1)))
        .add_bean(BeanDefinition::interceptor(interceptor_class("Timing", &log, 1)))
        .build()
        .unwrap();

    invoke_place(&container).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["Timing", "place"]);
}

#[test]
fn test_repeated_proceed_invokes_target_once() {
    let log: Log = Arc::default();
    let container = ContainerBuilder::new(ContainerConfig::testing().with_interceptor("Retry"))
        .add_bean(BeanDefinition::managed(orders_class(&log).with_interceptor("Retry"), vec![]))
        .add_bean(BeanDefinition::interceptor(interceptor_class("Retry", &log, 3)))
        .build()
        .unwrap();

    let result = invoke_place(&container).unwrap().unwrap();
    assert_eq!(*result.downcast::<String>().unwrap(), "placed");
    assert_eq!(*log.lock().unwrap(), vec!["Retry", "place"]);
}

#[test]
fn test_external_interceptor_bound_to_method() {
    let log: Log = Arc::default();
    let mut orders = orders_class(&log);
    orders.methods[0].interceptors.push("Metrics".to_string());
    let container = ContainerBuilder::new(ContainerConfig::testing().with_interceptor("Metrics"))
        .add_bean(BeanDefinition::managed(orders, vec![]))
        .external_interceptor(interceptor_class("Metrics", &log, 1))
        .build()
        .unwrap();

    invoke_place(&container).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["Metrics", "place"]);
}

#[test]
fn test_decorators_wrap_business_method() {
    let log: Log = Arc::default();
    let decorator = |name: &'static str| {
        ClassInfo::new(name)
            .decorator(
                DelegateInfo {
                    ty: TypeRef::class("Orders"),
                    qualifiers: vec![],
                },
                vec![TypeRef::class("Orders")],
            )
            .with_constructor(ConstructorInfo::new(ConstructorInvoker::new(name, |_| Ok(()))))
            .with_method(MethodInfo::new(name, "place").with_decorator_fn(Arc::new(
                move |_: &Instance, delegate: &mut DelegateInvocation| -> Result<Option<Instance>, CoreError> {
                    let inner = delegate.proceed()?;
                    let inner = inner
                        .and_then(|v| v.downcast::<String>().ok())
                        .map(|s| s.to_string())
                        .unwrap_or_default();
                    Ok(Some(Arc::new(format!("{}({})", name, inner)) as Instance))
                },
            )))
    };

    let container = ContainerBuilder::new(
        ContainerConfig::testing()
            .with_decorator("Logged")
            .with_decorator("Cached"),
    )
    .add_bean(BeanDefinition::managed(orders_class(&log), vec![]))
    .add_bean(BeanDefinition::decorator(decorator("Cached"), vec![TypeRef::class("Orders")]))
    .add_bean(BeanDefinition::decorator(decorator("Logged"), vec![TypeRef::class("Orders")]))
    .build()
    .unwrap();

    let result = invoke_place(&container).unwrap().unwrap();
    assert_eq!(*result.downcast::<String>().unwrap(), "Logged(Cached(placed))");
}

#[test]
fn test_lifecycle_callbacks_run_around_request_context() {
    let log: Log = Arc::default();
    let (created, destroyed) = (Arc::clone(&log), Arc::clone(&log));
    let session = ClassInfo::new("Cart")
        .with_constructor(ConstructorInfo::new(ConstructorInvoker::new("Cart", |_| Ok(()))))
        .with_method(
            MethodInfo::new("Cart", "open")
                .with_marker(Marker::PostConstruct)
                .with_invoker(MethodInvoker::void_on::<(), _>("open", move |_, _| {
                    created.lock().unwrap().push("open".to_string());
                    Ok(())
                })),
        )
        .with_method(
            MethodInfo::new("Cart", "close")
                .with_marker(Marker::PreDestroy)
                .with_invoker(MethodInvoker::void_on::<(), _>("close", move |_, _| {
                    destroyed.lock().unwrap().push("close".to_string());
                    Ok(())
                })),
        );
    let container = ContainerBuilder::new(ContainerConfig::testing())
        .add_bean(BeanDefinition::managed(session, vec![]).with_scope(beanwire_core::Scope::Request))
        .build()
        .unwrap();

    container.get_reference(&TypeRef::class("Cart"), &[]).unwrap();
    container.get_reference(&TypeRef::class("Cart"), &[]).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["open"]);

    container.end_context(&beanwire_core::Scope::Request).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["open", "close"]);
}

#[test]
fn test_duplicate_post_construct_is_rejected() {
    let broken = ClassInfo::new("Broken")
        .with_constructor(ConstructorInfo::new(ConstructorInvoker::new("Broken", |_| Ok(()))))
        .with_method(MethodInfo::new("Broken", "first").with_marker(Marker::PostConstruct))
        .with_method(MethodInfo::new("Broken", "second").with_marker(Marker::PostConstruct));
    let err = ContainerBuilder::new(ContainerConfig::testing())
        .add_bean(BeanDefinition::managed(broken, vec![]))
        .build()
        .unwrap_err();
    assert!(err.is_configuration());
    assert!(err
        .to_string()
        .contains("annotation is declared more than one method in the class : Broken"));
}
