//! Control messages accepted by local actors.
//!
//! The local executor drives an in-process actor with the same two
//! operations the broker uses remotely: start an assignation, cancel it.

use crate::Assignation;
use courier_types::{AssignationId, Reference};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Start one assignation on an actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assign {
    pub id: AssignationId,
    pub reference: Reference,
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<AssignationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl Assign {
    /// Returns the assignation this message starts.
    #[must_use]
    pub fn assignation(&self) -> Assignation {
        Assignation {
            id: self.id.clone(),
            reference: self.reference,
            parent: self.parent.clone(),
            user: self.user.clone(),
        }
    }
}

/// Message sent to an actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActorMessage {
    /// Start an assignation.
    Assign(Assign),
    /// Cancel a running assignation.
    Cancel { id: AssignationId },
}

impl ActorMessage {
    /// Returns the assignation id the message refers to.
    #[must_use]
    pub fn assignation_id(&self) -> &AssignationId {
        match self {
            Self::Assign(assign) => &assign.id,
            Self::Cancel { id } => id,
        }
    }
}
