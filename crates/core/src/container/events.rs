//! Container lifecycle events and their dispatch.

use crate::container::qualifier::{describe, Qualifier};
use crate::container::types::TypeRef;
use crate::errors::CoreError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContainerEventKind {
    ProcessAnnotatedType,
    ProcessInjectionTarget,
    ProcessProducer,
    ProcessProducerMethod,
    ProcessProducerField,
    ProcessObserverMethod,
    ProcessBean,
    AfterBeanDiscovery,
    AfterDeploymentValidation,
    /// Fired by the application through an `Event<T>` source
    Application,
}

/// Event payload handed to the dispatcher
#[derive(Debug, Clone, Serialize)]
pub struct ContainerEvent {
    pub kind: ContainerEventKind,
    /// Class, member or event type the event is about
    pub subject: String,
    pub bean: Option<usize>,
    pub qualifiers: Vec<String>,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl ContainerEvent {
    pub fn new(kind: ContainerEventKind, subject: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            bean: None,
            qualifiers: Vec::new(),
            payload: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn for_bean(mut self, bean: usize) -> Self {
        self.bean = Some(bean);
        self
    }

    pub fn with_qualifiers(mut self, qualifiers: &[Qualifier]) -> Self {
        self.qualifiers = describe(qualifiers);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// External event-dispatch facility
pub trait EventDispatcher: Send + Sync {
    fn dispatch(&self, event: &ContainerEvent) -> Result<(), CoreError>;
}

/// Dispatcher that only logs events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDispatcher;

impl EventDispatcher for TracingDispatcher {
    fn dispatch(&self, event: &ContainerEvent) -> Result<(), CoreError> {
        tracing::debug!(kind = ?event.kind, subject = %event.subject, "container event");
        Ok(())
    }
}

/// Dispatcher that keeps every event in memory
#[derive(Debug, Default)]
pub struct CollectingDispatcher {
    events: Mutex<Vec<ContainerEvent>>,
}

impl CollectingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the dispatched events
    pub fn events(&self) -> Vec<ContainerEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, kind: ContainerEventKind) -> usize {
        self.events
            .lock()
            .map(|e| e.iter().filter(|ev| ev.kind == kind).count())
            .unwrap_or(0)
    }
}

impl EventDispatcher for CollectingDispatcher {
    fn dispatch(&self, event: &ContainerEvent) -> Result<(), CoreError> {
        self.events
            .lock()
            .map_err(|_| CoreError::lock("collected events"))?
            .push(event.clone());
        Ok(())
    }
}

/// Instance behind an implicit `Event<T>` bean
#[derive(Clone)]
pub struct EventSource {
    event_type: TypeRef,
    qualifiers: Vec<Qualifier>,
    dispatcher: Arc<dyn EventDispatcher>,
}

impl EventSource {
    pub fn new(event_type: TypeRef, qualifiers: Vec<Qualifier>, dispatcher: Arc<dyn EventDispatcher>) -> Self {
        Self {
            event_type,
            qualifiers,
            dispatcher,
        }
    }

    pub fn event_type(&self) -> &TypeRef {
        &self.event_type
    }

    /// Fire an application event carrying `payload`
    pub fn fire(&self, payload: serde_json::Value) -> Result<(), CoreError> {
        let event = ContainerEvent::new(ContainerEventKind::Application, self.event_type.to_string())
            .with_qualifiers(&self.qualifiers)
            .with_payload(payload);
        self.dispatcher.dispatch(&event)
    }
}

impl std::fmt::Debug for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSource")
            .field("event_type", &self.event_type)
            .field("qualifiers", &self.qualifiers)
            .finish()
    }
}
