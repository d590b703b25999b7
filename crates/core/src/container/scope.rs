use crate::container::creational::CreationalContext;
use crate::container::descriptor::BeanId;
use crate::container::invoker::Instance;
use crate::errors::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Bean scope
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// New instance per injection, bound to the lifecycle of its owner
    Dependent,
    /// Single instance without a client proxy
    Singleton,
    Application,
    Request,
    Session,
    Conversation,
    /// A scope whose context is registered by the application
    Custom {
        name: String,
        normal: bool,
        passivating: bool,
    },
}

impl Scope {
    /// Normal scopes are proxied and shared through a context
    pub fn is_normal(&self) -> bool {
        match self {
            Scope::Dependent | Scope::Singleton => false,
            Scope::Application | Scope::Request | Scope::Session | Scope::Conversation => true,
            Scope::Custom { normal, .. } => *normal,
        }
    }

    /// Passivating scopes require serializable implementations
    pub fn is_passivating(&self) -> bool {
        match self {
            Scope::Session | Scope::Conversation => true,
            Scope::Custom { passivating, .. } => *passivating,
            _ => false,
        }
    }

    pub fn is_dependent(&self) -> bool {
        matches!(self, Scope::Dependent)
    }

    /// Get the scope name as a string
    pub fn as_str(&self) -> &str {
        match self {
            Scope::Dependent => "dependent",
            Scope::Singleton => "singleton",
            Scope::Application => "application",
            Scope::Request => "request",
            Scope::Session => "session",
            Scope::Conversation => "conversation",
            Scope::Custom { name, .. } => name,
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Scope::Dependent
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.as_str())
    }
}

impl std::str::FromStr for Scope {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dependent" => Ok(Scope::Dependent),
            "singleton" => Ok(Scope::Singleton),
            "application" => Ok(Scope::Application),
            "request" => Ok(Scope::Request),
            "session" => Ok(Scope::Session),
            "conversation" => Ok(Scope::Conversation),
            _ => Err(CoreError::configuration(format!("Unknown scope: {}", s))),
        }
    }
}

/// Storage of contextual instances for one scope
pub trait ScopeContext: Send + Sync {
    fn scope(&self) -> &Scope;

    fn is_active(&self) -> bool {
        true
    }

    /// The existing instance of `bean`, if any
    fn get(&self, bean: BeanId) -> Result<Option<Instance>, CoreError>;

    /// Store an instance unless one already exists; returns the stored one
    fn insert_if_absent(
        &self,
        bean: BeanId,
        instance: Instance,
        creational: CreationalContext,
    ) -> Result<Instance, CoreError>;

    /// Remove every instance for destruction
    fn drain(&self) -> Result<Vec<(BeanId, Instance, CreationalContext)>, CoreError>;
}

struct ContextEntry {
    instance: Instance,
    creational: CreationalContext,
}

/// In-process context backed by a map
pub struct InMemoryContext {
    scope: Scope,
    context_id: uuid::Uuid,
    active: AtomicBool,
    entries: RwLock<HashMap<BeanId, ContextEntry>>,
}

impl InMemoryContext {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            context_id: uuid::Uuid::new_v4(),
            active: AtomicBool::new(true),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Get the context ID
    pub fn context_id(&self) -> uuid::Uuid {
        self.context_id
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn activate(&self) {
        self.active.store(true, Ordering::Release);
    }

    /// Number of stored instances
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_error(&self) -> CoreError {
        CoreError::lock(format!("{} context", self.scope.as_str()))
    }
}

impl std::fmt::Debug for InMemoryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryContext")
            .field("scope", &self.scope)
            .field("context_id", &self.context_id)
            .field("instances", &self.len())
            .finish()
    }
}

impl ScopeContext for InMemoryContext {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn get(&self, bean: BeanId) -> Result<Option<Instance>, CoreError> {
        let entries = self.entries.read().map_err(|_| self.lock_error())?;
        Ok(entries.get(&bean).map(|e| e.instance.clone()))
    }

    fn insert_if_absent(
        &self,
        bean: BeanId,
        instance: Instance,
        creational: CreationalContext,
    ) -> Result<Instance, CoreError> {
        let mut entries = self.entries.write().map_err(|_| self.lock_error())?;
        let entry = entries.entry(bean).or_insert(ContextEntry {
            instance,
            creational,
        });
        Ok(entry.instance.clone())
    }

    fn drain(&self) -> Result<Vec<(BeanId, Instance, CreationalContext)>, CoreError> {
        let mut entries = self.entries.write().map_err(|_| self.lock_error())?;
        Ok(entries
            .drain()
            .map(|(bean, entry)| (bean, entry.instance, entry.creational))
            .collect())
    }
}
