use crate::container::descriptor::BeanDefinition;
use crate::container::interceptor::{InterceptionType, InterceptorData, InvocationContext};
use crate::container::invoker::Instance;
use crate::errors::CoreError;

/// Run the post-construct chain of a freshly injected instance
pub fn post_construct<F>(bean: &BeanDefinition, target: &Instance, instance_for: F) -> Result<(), CoreError>
where
    F: FnMut(&InterceptorData) -> Result<Instance, CoreError>,
{
    run(bean, InterceptionType::PostConstruct, target, instance_for)
}

/// Run the pre-destroy chain of an instance about to be released
pub fn pre_destroy<F>(bean: &BeanDefinition, target: &Instance, instance_for: F) -> Result<(), CoreError>
where
    F: FnMut(&InterceptorData) -> Result<Instance, CoreError>,
{
    run(bean, InterceptionType::PreDestroy, target, instance_for)
}

fn run<F>(
    bean: &BeanDefinition,
    interception_type: InterceptionType,
    target: &Instance,
    instance_for: F,
) -> Result<(), CoreError>
where
    F: FnMut(&InterceptorData) -> Result<Instance, CoreError>,
{
    if !bean.interceptor_stack.contains_type(interception_type) {
        return Ok(());
    }
    let chain = bean
        .interceptor_stack
        .links(interception_type, None, target, instance_for)?;
    tracing::debug!(
        "Running {} chain of {} with {} callback(s)",
        interception_type,
        bean.display_name(),
        chain.len()
    );
    let mut context = InvocationContext::for_lifecycle(interception_type, target.clone(), chain);
    context.proceed()?;
    Ok(())
}
