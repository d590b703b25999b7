//! Member invokers: the capability used to construct instances, call
//! methods and read or write fields with an already resolved argument list.

use crate::errors::InvocationFailure;
use std::any::{type_name, Any};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A contextual or dependent bean instance
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Wrap a value as an [`Instance`]
pub fn instance<T: Any + Send + Sync>(value: T) -> Instance {
    Arc::new(value)
}

/// Downcast an instance to a concrete type
pub fn downcast<T: Any + Send + Sync>(instance: &Instance) -> Result<Arc<T>, InvocationFailure> {
    instance
        .clone()
        .downcast::<T>()
        .map_err(|_| InvocationFailure::TargetMismatch {
            expected: type_name::<T>().to_string(),
        })
}

/// Resolved argument list; `None` entries are null values from dependent producers
#[derive(Clone, Default)]
pub struct Arguments {
    values: Vec<Option<Instance>>,
}

impl Arguments {
    pub fn new(values: Vec<Option<Instance>>) -> Self {
        Self { values }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: Option<Instance>) {
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The raw value at `index`
    pub fn raw(&self, index: usize) -> Option<&Instance> {
        self.values.get(index).and_then(Option::as_ref)
    }

    /// A required argument of type `T`
    pub fn get<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>, InvocationFailure> {
        self.get_optional(index)?
            .ok_or(InvocationFailure::MissingArgument { index })
    }

    /// A nullable argument of type `T`
    pub fn get_optional<T: Any + Send + Sync>(
        &self,
        index: usize,
    ) -> Result<Option<Arc<T>>, InvocationFailure> {
        let slot = self
            .values
            .get(index)
            .ok_or(InvocationFailure::MissingArgument { index })?;
        match slot {
            None => Ok(None),
            Some(value) => value
                .clone()
                .downcast::<T>()
                .map(Some)
                .map_err(|_| InvocationFailure::ArgumentMismatch {
                    index,
                    expected: type_name::<T>().to_string(),
                }),
        }
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape: Vec<&str> = self
            .values
            .iter()
            .map(|v| if v.is_some() { "value" } else { "null" })
            .collect();
        f.debug_struct("Arguments").field("values", &shape).finish()
    }
}

type ConstructFn = dyn Fn(&Arguments) -> Result<Instance, InvocationFailure> + Send + Sync;
type MethodFn =
    dyn Fn(Option<&Instance>, &Arguments) -> Result<Option<Instance>, InvocationFailure> + Send + Sync;
type GetFn = dyn Fn(Option<&Instance>) -> Result<Option<Instance>, InvocationFailure> + Send + Sync;
type SetFn = dyn Fn(&Instance, Option<Instance>) -> Result<(), InvocationFailure> + Send + Sync;

/// Access state shared by every clone of one invoker
#[derive(Clone)]
struct Access {
    member: String,
    accessible: Arc<AtomicBool>,
}

impl Access {
    fn new(member: String, public: bool) -> Self {
        Self {
            member,
            accessible: Arc::new(AtomicBool::new(public)),
        }
    }

    fn check(&self) -> Result<(), InvocationFailure> {
        if self.accessible.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(InvocationFailure::IllegalAccess {
                member: self.member.clone(),
            })
        }
    }
}

/// Calls a constructor with the resolved arguments in declaration order
#[derive(Clone)]
pub struct ConstructorInvoker {
    access: Access,
    func: Arc<ConstructFn>,
}

impl ConstructorInvoker {
    pub fn new<T, F>(member: impl Into<String>, func: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Arguments) -> Result<T, InvocationFailure> + Send + Sync + 'static,
    {
        Self {
            access: Access::new(member.into(), true),
            func: Arc::new(move |args| func(args).map(|v| Arc::new(v) as Instance)),
        }
    }

    /// A constructor that is not accessible until forced open
    pub fn private(mut self) -> Self {
        self.access = Access::new(self.access.member, false);
        self
    }

    pub fn construct(&self, args: &Arguments) -> Result<Instance, InvocationFailure> {
        self.access.check()?;
        (self.func)(args)
    }
}

/// Calls an instance or static method
#[derive(Clone)]
pub struct MethodInvoker {
    access: Access,
    func: Arc<MethodFn>,
}

impl MethodInvoker {
    /// Untyped form; the target is `None` for static methods
    pub fn new<F>(member: impl Into<String>, func: F) -> Self
    where
        F: Fn(Option<&Instance>, &Arguments) -> Result<Option<Instance>, InvocationFailure>
            + Send
            + Sync
            + 'static,
    {
        Self {
            access: Access::new(member.into(), true),
            func: Arc::new(func),
        }
    }

    /// A method on `T` returning a value
    pub fn on<T, R, F>(member: impl Into<String>, func: F) -> Self
    where
        T: Any + Send + Sync,
        R: Any + Send + Sync,
        F: Fn(&T, &Arguments) -> Result<R, InvocationFailure> + Send + Sync + 'static,
    {
        Self::new(member, move |target, args| {
            let target = typed_target::<T>(target)?;
            func(&target, args).map(|r| Some(Arc::new(r) as Instance))
        })
    }

    /// A method on `T` returning nothing
    pub fn void_on<T, F>(member: impl Into<String>, func: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T, &Arguments) -> Result<(), InvocationFailure> + Send + Sync + 'static,
    {
        Self::new(member, move |target, args| {
            let target = typed_target::<T>(target)?;
            func(&target, args).map(|_| None)
        })
    }

    /// A static method returning a value
    pub fn static_fn<R, F>(member: impl Into<String>, func: F) -> Self
    where
        R: Any + Send + Sync,
        F: Fn(&Arguments) -> Result<R, InvocationFailure> + Send + Sync + 'static,
    {
        Self::new(member, move |_, args| func(args).map(|r| Some(Arc::new(r) as Instance)))
    }

    pub fn private(mut self) -> Self {
        self.access = Access::new(self.access.member, false);
        self
    }

    pub fn invoke(
        &self,
        target: Option<&Instance>,
        args: &Arguments,
    ) -> Result<Option<Instance>, InvocationFailure> {
        self.access.check()?;
        (self.func)(target, args)
    }
}

/// Reads or writes a field
#[derive(Clone)]
pub struct FieldAccessor {
    access: Access,
    getter: Option<Arc<GetFn>>,
    setter: Option<Arc<SetFn>>,
}

impl FieldAccessor {
    pub fn new(member: impl Into<String>) -> Self {
        Self {
            access: Access::new(member.into(), true),
            getter: None,
            setter: None,
        }
    }

    /// Read access, used by producer fields; target is `None` for static fields
    pub fn with_getter<F>(mut self, getter: F) -> Self
    where
        F: Fn(Option<&Instance>) -> Result<Option<Instance>, InvocationFailure> + Send + Sync + 'static,
    {
        self.getter = Some(Arc::new(getter));
        self
    }

    /// Write access on a `T`, used by field injection
    pub fn with_setter<T, F>(mut self, setter: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T, Option<Instance>) -> Result<(), InvocationFailure> + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(move |target: &Instance, value| {
            let target = downcast::<T>(target)?;
            setter(&target, value)
        }));
        self
    }

    pub fn private(mut self) -> Self {
        self.access = Access::new(self.access.member, false);
        self
    }

    pub fn get(&self, target: Option<&Instance>) -> Result<Option<Instance>, InvocationFailure> {
        self.access.check()?;
        match &self.getter {
            Some(getter) => getter(target),
            None => Err(InvocationFailure::IllegalAccess {
                member: format!("{} (not readable)", self.access.member),
            }),
        }
    }

    pub fn set(&self, target: &Instance, value: Option<Instance>) -> Result<(), InvocationFailure> {
        self.access.check()?;
        match &self.setter {
            Some(setter) => setter(target, value),
            None => Err(InvocationFailure::IllegalAccess {
                member: format!("{} (not writable)", self.access.member),
            }),
        }
    }
}

fn typed_target<T: Any + Send + Sync>(target: Option<&Instance>) -> Result<Arc<T>, InvocationFailure> {
    match target {
        Some(target) => downcast::<T>(target),
        None => Err(InvocationFailure::TargetMismatch {
            expected: type_name::<T>().to_string(),
        }),
    }
}

/// The member an injection or invocation goes through
#[derive(Clone)]
pub enum MemberInvoker {
    Constructor(ConstructorInvoker),
    Method(MethodInvoker),
    Field(FieldAccessor),
}

impl MemberInvoker {
    pub fn member(&self) -> &str {
        &self.access().member
    }

    fn access(&self) -> &Access {
        match self {
            Self::Constructor(c) => &c.access,
            Self::Method(m) => &m.access,
            Self::Field(f) => &f.access,
        }
    }

    pub fn is_accessible(&self) -> bool {
        self.access().accessible.load(Ordering::Acquire)
    }

    /// Open a non-public member for injection
    pub fn force_accessible(&self) {
        self.access().accessible.store(true, Ordering::Release);
    }

    /// Materialize the call.
    ///
    /// Constructors return the new instance. Methods return their result.
    /// Fields are written when one argument is given and read otherwise.
    pub fn invoke(
        &self,
        target: Option<&Instance>,
        args: &Arguments,
    ) -> Result<Option<Instance>, InvocationFailure> {
        match self {
            Self::Constructor(c) => c.construct(args).map(Some),
            Self::Method(m) => m.invoke(target, args),
            Self::Field(f) if args.is_empty() => f.get(target),
            Self::Field(f) => {
                let target = target.ok_or_else(|| InvocationFailure::TargetMismatch {
                    expected: format!("owner of field {}", self.member()),
                })?;
                f.set(target, args.raw(0).cloned())?;
                Ok(None)
            }
        }
    }
}

impl From<ConstructorInvoker> for MemberInvoker {
    fn from(invoker: ConstructorInvoker) -> Self {
        Self::Constructor(invoker)
    }
}

impl From<MethodInvoker> for MemberInvoker {
    fn from(invoker: MethodInvoker) -> Self {
        Self::Method(invoker)
    }
}

impl From<FieldAccessor> for MemberInvoker {
    fn from(invoker: FieldAccessor) -> Self {
        Self::Field(invoker)
    }
}

impl fmt::Debug for MemberInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Constructor(_) => "Constructor",
            Self::Method(_) => "Method",
            Self::Field(_) => "Field",
        };
        f.debug_struct("MemberInvoker")
            .field("kind", &kind)
            .field("member", &self.member())
            .field("accessible", &self.is_accessible())
            .finish()
    }
}

macro_rules! debug_via_member {
    ($($ty:ident),*) => {
        $(impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($ty))
                    .field("member", &self.access.member)
                    .finish()
            }
        })*
    };
}

debug_via_member!(ConstructorInvoker, MethodInvoker, FieldAccessor);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Repository {
        url: String,
    }

    struct Service {
        repository: Mutex<Option<Arc<Repository>>>,
    }

    #[test]
    fn test_constructor_invoker() {
        let invoker = ConstructorInvoker::new("Repository#new", |args: &Arguments| {
            let url = args.get::<String>(0)?;
            Ok(Repository { url: url.to_string() })
        });
        let created = invoker
            .construct(&Arguments::new(vec![Some(instance("db://local".to_string()))]))
            .unwrap();
        assert_eq!(downcast::<Repository>(&created).unwrap().url, "db://local");
    }

    #[test]
    fn test_argument_mismatch() {
        let args = Arguments::new(vec![Some(instance(42_i32))]);
        assert!(matches!(
            args.get::<String>(0),
            Err(InvocationFailure::ArgumentMismatch { index: 0, .. })
        ));
        assert!(matches!(
            args.get::<String>(3),
            Err(InvocationFailure::MissingArgument { index: 3 })
        ));
    }

    #[test]
    fn test_private_member_needs_forcing() {
        let setter = FieldAccessor::new("Service.repository")
            .with_setter(|service: &Service, value| {
                let repo = value.map(|v| downcast::<Repository>(&v)).transpose()?;
                *service.repository.lock().unwrap() = repo;
                Ok(())
            })
            .private();
        let member = MemberInvoker::from(setter);
        let target = instance(Service {
            repository: Mutex::new(None),
        });
        let args = Arguments::new(vec![Some(instance(Repository { url: "x".into() }))]);

        assert!(matches!(
            member.invoke(Some(&target), &args),
            Err(InvocationFailure::IllegalAccess { .. })
        ));
        member.force_accessible();
        member.invoke(Some(&target), &args).unwrap();
        let service = downcast::<Service>(&target).unwrap();
        assert!(service.repository.lock().unwrap().is_some());
    }

    #[test]
    fn test_method_invoker_target_type() {
        let method = MethodInvoker::on("Repository#url", |repo: &Repository, _| Ok(repo.url.clone()));
        let wrong = instance(7_u8);
        assert!(matches!(
            method.invoke(Some(&wrong), &Arguments::empty()),
            Err(InvocationFailure::TargetMismatch { .. })
        ));
    }
}
