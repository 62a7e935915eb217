//! Actor hosting seams.

use crate::correlator::{Correlator, Delivery};
use crate::error::AssignError;
use async_trait::async_trait;
use courier_event::{ActorMessage, AssignationEvent};
use courier_types::{Reference, TemplateId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A concrete implementation of a function that can be hosted locally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    /// Interface name the hosting supervisor resolves.
    pub interface: String,
}

impl Template {
    #[must_use]
    pub fn new(id: impl Into<TemplateId>, interface: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            interface: interface.into(),
        }
    }
}

/// Where an actor reports lifecycle events.
///
/// Events are routed by their reference through the executor's
/// correlator. [`EventSink::bound`] reports readiness on the actor's own
/// reference.
#[derive(Clone)]
pub struct EventSink {
    correlator: Arc<Correlator>,
    actor_reference: Reference,
}

impl EventSink {
    pub(crate) fn new(correlator: Arc<Correlator>, actor_reference: Reference) -> Self {
        Self {
            correlator,
            actor_reference,
        }
    }

    /// Reports an event for one of the actor's assignations.
    pub fn emit(&self, event: AssignationEvent) -> Delivery {
        self.correlator.deliver(event)
    }

    /// Reports that the actor is ready to accept assignations.
    pub fn bound(&self) {
        self.emit(AssignationEvent::bound(self.actor_reference));
    }

    /// Reports that the actor failed to start.
    pub fn failed(&self, message: impl Into<String>) {
        self.emit(AssignationEvent::critical(self.actor_reference, message));
    }

    /// Reference the actor's own lifecycle is reported on.
    #[must_use]
    pub fn actor_reference(&self) -> Reference {
        self.actor_reference
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("actor_reference", &self.actor_reference)
            .finish()
    }
}

/// A running actor hosting one template.
#[async_trait]
pub trait Actor: Send + Sync {
    /// Delivers an assign or cancel message.
    async fn send(&self, message: ActorMessage) -> Result<(), AssignError>;

    /// Stops the actor. Running assignations end with `CANCELLED`.
    async fn stop(&self);
}

/// Starts actors for templates.
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// Spawns an actor for `template`. The actor must emit `BOUND` through
    /// `sink` once it accepts messages.
    async fn spawn(&self, template: &Template, sink: EventSink)
        -> Result<Arc<dyn Actor>, AssignError>;
}
