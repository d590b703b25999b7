use crate::container::class_info::MethodBody;
use crate::container::interceptor::data::{InterceptionType, InterceptorData};
use crate::container::invoker::{Arguments, Instance};
use crate::errors::CoreError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Terminal step of an around-invoke chain: the business method, possibly
/// entered through the decorator chain.
pub type TargetFn = dyn Fn(&Instance, &Arguments) -> Result<Option<Instance>, CoreError> + Send + Sync;

/// An interceptor binding paired with the instance its method runs on
#[derive(Debug, Clone)]
pub struct ChainLink {
    pub data: InterceptorData,
    pub instance: Instance,
}

/// Cursor position of an invocation context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    /// The interceptor at this index runs on the next `proceed()`
    Pending(usize),
    /// The next `proceed()` invokes the target
    Terminal,
    /// The target has been invoked
    Completed,
}

/// What a single `advance()` selected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Interceptor(usize),
    Target,
    /// The target was already invoked by an earlier call
    Done,
}

/// Per-call interception state: the ordered interceptor list for one
/// interception type, a cursor into it and the terminal target invocation.
pub struct InvocationContext {
    interception_type: InterceptionType,
    target: Instance,
    method: Option<String>,
    parameters: Arguments,
    chain: Arc<[ChainLink]>,
    terminal: Option<Arc<TargetFn>>,
    state: ChainState,
    result: Option<Result<Option<Instance>, CoreError>>,
    context_data: HashMap<String, serde_json::Value>,
}

impl InvocationContext {
    /// Context for a business method call
    pub fn for_method(
        target: Instance,
        method: impl Into<String>,
        parameters: Arguments,
        chain: Vec<ChainLink>,
        terminal: Arc<TargetFn>,
    ) -> Self {
        Self::new(
            InterceptionType::AroundInvoke,
            target,
            Some(method.into()),
            parameters,
            chain,
            Some(terminal),
        )
    }

    /// Context for a post-construct or pre-destroy callback chain
    pub fn for_lifecycle(interception_type: InterceptionType, target: Instance, chain: Vec<ChainLink>) -> Self {
        Self::new(interception_type, target, None, Arguments::empty(), chain, None)
    }

    fn new(
        interception_type: InterceptionType,
        target: Instance,
        method: Option<String>,
        parameters: Arguments,
        chain: Vec<ChainLink>,
        terminal: Option<Arc<TargetFn>>,
    ) -> Self {
        let state = if chain.is_empty() {
            ChainState::Terminal
        } else {
            ChainState::Pending(0)
        };
        Self {
            interception_type,
            target,
            method,
            parameters,
            chain: chain.into(),
            terminal,
            state,
            result: None,
            context_data: HashMap::new(),
        }
    }

    pub fn interception_type(&self) -> InterceptionType {
        self.interception_type
    }

    pub fn target(&self) -> &Instance {
        &self.target
    }

    /// Business method name; `None` for lifecycle callbacks
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn parameters(&self) -> &Arguments {
        &self.parameters
    }

    /// Replace the arguments passed on to the target
    pub fn set_parameters(&mut self, parameters: Arguments) {
        self.parameters = parameters;
    }

    /// Data shared by the interceptors of this call
    pub fn context_data(&self) -> &HashMap<String, serde_json::Value> {
        &self.context_data
    }

    pub fn context_data_mut(&mut self) -> &mut HashMap<String, serde_json::Value> {
        &mut self.context_data
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    /// Move the cursor one step; the only state transition.
    pub fn advance(&mut self) -> Step {
        match self.state {
            ChainState::Pending(index) if index < self.chain.len() => {
                self.state = if index + 1 < self.chain.len() {
                    ChainState::Pending(index + 1)
                } else {
                    ChainState::Terminal
                };
                Step::Interceptor(index)
            }
            ChainState::Pending(_) | ChainState::Terminal => {
                self.state = ChainState::Completed;
                Step::Target
            }
            ChainState::Completed => Step::Done,
        }
    }

    /// Run the next interceptor, or the target once every interceptor has
    /// run. The target is invoked at most once per context; later calls
    /// return its recorded outcome.
    pub fn proceed(&mut self) -> Result<Option<Instance>, CoreError> {
        match self.advance() {
            Step::Interceptor(index) => {
                let chain = Arc::clone(&self.chain);
                let link = &chain[index];
                match &link.data.method.body {
                    MethodBody::Interceptor(body) => body(&link.instance, self),
                    MethodBody::Invoker(invoker) => {
                        invoker
                            .invoke(Some(&link.instance), &Arguments::empty())
                            .map_err(|e| CoreError::invocation(link.data.method.qualified_name(), e))?;
                        // Plain callbacks do not see the context; continue for them
                        self.proceed()
                    }
                    MethodBody::None | MethodBody::Decorator(_) => Err(CoreError::interception(format!(
                        "{} method {} has no invocable body",
                        link.data.interception_type,
                        link.data.method.qualified_name()
                    ))),
                }
            }
            Step::Target => {
                let outcome = match &self.terminal {
                    Some(terminal) => terminal(&self.target, &self.parameters),
                    None => Ok(None),
                };
                self.result = Some(match &outcome {
                    Ok(value) => Ok(value.clone()),
                    Err(e) => Err(e.replay()),
                });
                outcome
            }
            Step::Done => match &self.result {
                Some(Ok(value)) => Ok(value.clone()),
                Some(Err(e)) => Err(e.replay()),
                None => Ok(None),
            },
        }
    }
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("interception_type", &self.interception_type)
            .field("method", &self.method)
            .field("state", &self.state)
            .field("chain_len", &self.chain.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::class_info::MethodInfo;
    use crate::container::interceptor::data::{InterceptorFn, InterceptorSource};
    use crate::container::invoker::{instance, MethodInvoker};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn link(class: &str, body: Arc<InterceptorFn>) -> ChainLink {
        ChainLink {
            data: InterceptorData {
                interception_type: InterceptionType::AroundInvoke,
                method: MethodInfo::new(class, "intercept").with_interceptor_fn(body),
                interceptor_class: class.to_string(),
                defined_in_interceptor_class: class != "Target",
                bound_method: None,
                source: InterceptorSource::Target,
            },
            instance: instance(()),
        }
    }

    fn recording(name: &'static str, log: Arc<Mutex<Vec<&'static str>>>, proceed: bool) -> Arc<InterceptorFn> {
        Arc::new(move |_: &Instance, ctx: &mut InvocationContext| {
            log.lock().unwrap().push(name);
            if proceed {
                ctx.proceed()
            } else {
                Ok(None)
            }
        })
    }

    fn counting_target(calls: Arc<AtomicUsize>) -> Arc<TargetFn> {
        Arc::new(move |_: &Instance, _: &Arguments| -> Result<Option<Instance>, CoreError> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(instance("done".to_string())))
        })
    }

    #[test]
    fn test_chain_runs_in_order_then_target() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let mut ctx = InvocationContext::for_method(
            instance(()),
            "place",
            Arguments::empty(),
            vec![
                link("Target", recording("A", log.clone(), true)),
                link("Tx", recording("B", log.clone(), true)),
            ],
            counting_target(calls.clone()),
        );

        let result = ctx.proceed().unwrap().unwrap();
        assert_eq!(*result.downcast::<String>().unwrap(), "done");
        assert_eq!(*log.lock().unwrap(), vec!["A", "B"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.state(), ChainState::Completed);
    }

    #[test]
    fn test_target_reached_after_n_proceeds_and_invoked_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let mut ctx = InvocationContext::for_method(
            instance(()),
            "place",
            Arguments::empty(),
            vec![
                link("Target", recording("A", log.clone(), false)),
                link("Tx", recording("B", log.clone(), false)),
            ],
            counting_target(calls.clone()),
        );

        ctx.proceed().unwrap();
        assert_eq!(ctx.state(), ChainState::Pending(1));
        ctx.proceed().unwrap();
        assert_eq!(ctx.state(), ChainState::Terminal);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        ctx.proceed().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let again = ctx.proceed().unwrap();
        assert!(again.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_interceptor_may_short_circuit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let deny: Arc<InterceptorFn> = Arc::new(
            |_: &Instance, _: &mut InvocationContext| -> Result<Option<Instance>, CoreError> {
                Err(CoreError::interception("denied"))
            },
        );
        let mut ctx = InvocationContext::for_method(
            instance(()),
            "place",
            Arguments::empty(),
            vec![link("Security", deny)],
            counting_target(calls.clone()),
        );
        assert!(ctx.proceed().is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_target_reports_same_error_again() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let failing: Arc<TargetFn> = Arc::new(move |_: &Instance, _: &Arguments| -> Result<Option<Instance>, CoreError> {
            counted.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::invocation(
                "Orders#place",
                crate::errors::InvocationFailure::target("card declined"),
            ))
        });
        let mut ctx = InvocationContext::for_method(instance(()), "place", Arguments::empty(), vec![], failing);

        let first = ctx.proceed().unwrap_err();
        let second = ctx.proceed().unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(second, CoreError::Invocation { .. }));
        assert_eq!(second.to_string(), first.to_string());
        let cause = std::error::Error::source(&second).map(|s| s.to_string());
        assert_eq!(cause.as_deref(), Some("invocation target threw: card declined"));
    }

    #[test]
    fn test_plain_lifecycle_callbacks_continue_the_chain() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c1 = counter.clone();
        let c2 = counter.clone();
        let plain = |class: &str, c: Arc<AtomicUsize>| ChainLink {
            data: InterceptorData {
                interception_type: InterceptionType::PostConstruct,
                method: MethodInfo::new(class, "init").with_invoker(MethodInvoker::new(
                    format!("{}#init", class),
                    move |_, _| {
                        c.fetch_add(1, Ordering::SeqCst);
                        Ok(None)
                    },
                )),
                interceptor_class: class.to_string(),
                defined_in_interceptor_class: false,
                bound_method: None,
                source: InterceptorSource::Target,
            },
            instance: instance(()),
        };
        let mut ctx = InvocationContext::for_lifecycle(
            InterceptionType::PostConstruct,
            instance(()),
            vec![plain("A", c1), plain("B", c2)],
        );
        assert!(ctx.proceed().unwrap().is_none());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(ctx.state(), ChainState::Completed);
    }

    #[test]
    fn test_interceptor_can_replace_parameters() {
        let rewrite: Arc<InterceptorFn> = Arc::new(|_: &Instance, ctx: &mut InvocationContext| {
            ctx.set_parameters(Arguments::new(vec![Some(instance(10_i64))]));
            ctx.context_data_mut()
                .insert("audited".to_string(), serde_json::Value::Bool(true));
            ctx.proceed()
        });
        let target: Arc<TargetFn> = Arc::new(|_: &Instance, args: &Arguments| -> Result<Option<Instance>, CoreError> {
            let amount = args.get::<i64>(0).map_err(|e| CoreError::invocation("charge", e))?;
            Ok(Some(instance(*amount * 2)))
        });
        let mut ctx = InvocationContext::for_method(
            instance(()),
            "charge",
            Arguments::new(vec![Some(instance(1_i64))]),
            vec![link("Target", rewrite)],
            target,
        );
        let result = ctx.proceed().unwrap().unwrap();
        assert_eq!(*result.downcast::<i64>().unwrap(), 20);
        assert_eq!(ctx.context_data()["audited"], serde_json::Value::Bool(true));
    }
}
