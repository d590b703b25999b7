//! Bean definitions, typesafe resolution, injection and contextual
//! lifecycle.

pub mod class_info;
pub mod creational;
pub mod descriptor;
pub mod events;
pub mod injector;
pub mod interceptor;
pub mod invoker;
pub mod lifecycle;
pub mod matcher;
pub mod plugin;
pub mod qualifier;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod specialization;
pub mod types;
pub mod validation;

pub mod builder;
#[allow(clippy::module_inception)]
pub mod container;

pub use builder::ContainerBuilder;
pub use class_info::{
    ClassInfo, ConstructorInfo, DelegateInfo, FieldInfo, InterceptorBindingInfo, Marker, MethodBody, MethodInfo,
    ParameterInfo, Stereotype, ThrownType,
};
pub use container::{BeanContainer, InstanceHandle};
pub use creational::{CreationalContext, DependentInstance};
pub use descriptor::{BeanDefinition, BeanId, BeanKind, InjectionMember, InjectionPoint, Realizes};
pub use events::{CollectingDispatcher, ContainerEvent, ContainerEventKind, EventDispatcher, EventSource, TracingDispatcher};
pub use injector::{BeanInstanceSource, EnterpriseInstanceProvider, Injector};
pub use interceptor::{DelegateInvocation, InterceptionType, InvocationContext};
pub use invoker::{instance, Arguments, ConstructorInvoker, FieldAccessor, Instance, MemberInvoker, MethodInvoker};
pub use plugin::{DeploymentPlugin, PluginRegistry};
pub use qualifier::{MemberValue, Qualifier};
pub use registry::{BeanRegistry, ClassHierarchy};
pub use resolver::Resolver;
pub use scope::{InMemoryContext, Scope, ScopeContext};
pub use types::{TypeHierarchy, TypeRef};
