//! Interceptor and decorator invocation chains.

pub mod data;
pub mod decorator;
pub mod invocation;
pub mod stack;

pub use data::{InterceptionType, InterceptorData, InterceptorFn, InterceptorSource};
pub use decorator::{DecoratorChain, DecoratorFn, DecoratorLink, DelegateInvocation};
pub use invocation::{ChainLink, ChainState, InvocationContext, Step, TargetFn};
pub use stack::{
    build_stack, check_around_invoke, check_lifecycle_callback, BoundInterceptorClass,
    InterceptorStack,
};
