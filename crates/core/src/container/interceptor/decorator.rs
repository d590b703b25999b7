use crate::container::invoker::{Arguments, Instance, MethodInvoker};
use crate::errors::CoreError;
use std::fmt;
use std::sync::Arc;

/// Body of a decorator method: receives the decorator instance and the
/// delegate invocation it forwards through.
pub type DecoratorFn =
    dyn Fn(&Instance, &mut DelegateInvocation) -> Result<Option<Instance>, CoreError> + Send + Sync;

/// A decorator instance wrapping one business method
#[derive(Clone)]
pub struct DecoratorLink {
    pub decorator_class: String,
    pub instance: Instance,
    pub body: Arc<DecoratorFn>,
}

impl fmt::Debug for DecoratorLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoratorLink")
            .field("decorator_class", &self.decorator_class)
            .finish()
    }
}

/// Delegate handle passed to a decorator method; `proceed()` calls the next
/// decorator of the method or, after the last one, the bean method itself.
pub struct DelegateInvocation {
    method: String,
    target: Instance,
    parameters: Arguments,
    links: Arc<[DecoratorLink]>,
    position: usize,
    business: MethodInvoker,
}

impl DelegateInvocation {
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn parameters(&self) -> &Arguments {
        &self.parameters
    }

    pub fn set_parameters(&mut self, parameters: Arguments) {
        self.parameters = parameters;
    }

    /// The decorated bean instance
    pub fn delegate(&self) -> &Instance {
        &self.target
    }

    pub fn proceed(&mut self) -> Result<Option<Instance>, CoreError> {
        if self.position < self.links.len() {
            let links = Arc::clone(&self.links);
            let link = &links[self.position];
            self.position += 1;
            (link.body)(&link.instance, self)
        } else {
            self.business
                .invoke(Some(&self.target), &self.parameters)
                .map_err(|e| CoreError::invocation(self.method.clone(), e))
        }
    }
}

/// Decorators of one business method, outermost first
#[derive(Clone)]
pub struct DecoratorChain {
    method: String,
    links: Arc<[DecoratorLink]>,
    business: MethodInvoker,
}

impl DecoratorChain {
    pub fn new(method: impl Into<String>, links: Vec<DecoratorLink>, business: MethodInvoker) -> Self {
        Self {
            method: method.into(),
            links: links.into(),
            business,
        }
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Enter the chain for one call on `target`
    pub fn invoke(&self, target: &Instance, parameters: &Arguments) -> Result<Option<Instance>, CoreError> {
        let mut invocation = DelegateInvocation {
            method: self.method.clone(),
            target: target.clone(),
            parameters: parameters.clone(),
            links: Arc::clone(&self.links),
            position: 0,
            business: self.business.clone(),
        };
        invocation.proceed()
    }
}

impl fmt::Debug for DecoratorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoratorChain")
            .field("method", &self.method)
            .field("links", &self.links)
            .finish()
    }
}
