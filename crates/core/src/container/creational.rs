use crate::container::descriptor::BeanId;
use crate::container::invoker::Instance;
use std::fmt;

/// A dependent-scoped instance created while building another instance
pub struct DependentInstance {
    pub bean: BeanId,
    pub instance: Instance,
    /// Context that tracked the dependent's own dependents
    pub creational: CreationalContext,
}

impl fmt::Debug for DependentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependentInstance")
            .field("bean", &self.bean)
            .field("creational", &self.creational)
            .finish()
    }
}

/// Tracks dependent instances created transitively during one top-level
/// creation so they can be released together.
///
/// A context belongs to the creation call that made it and is moved, never
/// shared, into the scope entry or dependent record that outlives that call.
#[derive(Debug)]
pub struct CreationalContext {
    id: uuid::Uuid,
    owner: Option<BeanId>,
    dependents: Vec<DependentInstance>,
}

impl CreationalContext {
    /// Create a context for the creation of `owner`
    pub fn new(owner: Option<BeanId>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            owner,
            dependents: Vec::new(),
        }
    }

    /// Fresh context for a nested creation
    pub fn child(&self, owner: BeanId) -> Self {
        Self::new(Some(owner))
    }

    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    pub fn owner(&self) -> Option<BeanId> {
        self.owner
    }

    /// Record a dependent instance to be destroyed with this context
    pub fn add_dependent(&mut self, bean: BeanId, instance: Instance, creational: CreationalContext) {
        self.dependents.push(DependentInstance {
            bean,
            instance,
            creational,
        });
    }

    pub fn dependent_count(&self) -> usize {
        self.dependents.len()
    }

    pub fn dependents(&self) -> &[DependentInstance] {
        &self.dependents
    }

    /// Remove the dependents, most recently created first
    pub fn take_dependents(&mut self) -> Vec<DependentInstance> {
        let mut dependents = std::mem::take(&mut self.dependents);
        dependents.reverse();
        dependents
    }
}

impl Default for CreationalContext {
    fn default() -> Self {
        Self::new(None)
    }
}
