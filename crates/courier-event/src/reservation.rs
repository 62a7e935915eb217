//! Reservations and agent registration.
//!
//! A reservation is a server-issued, long-lived binding of a caller to one
//! implementation of a node. The client only holds its id and releases it
//! on exit; status changes happen on the server.

use courier_types::{AgentId, InstanceId, NodeHash, NodeId, ReservationId, TemplateId};
use serde::{Deserialize, Serialize};

/// Reservation status as reported by the broker.
///
/// ```text
/// PENDING → ACTIVE → (HAPPY | UNHAPPY | INACTIVE)* → ENDED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Active,
    Happy,
    Unhappy,
    Inactive,
    Ended,
}

impl ReservationStatus {
    /// Returns `true` once the reservation can no longer serve calls.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        matches!(self, Self::Ended)
    }
}

/// Constraints narrowing which implementations may serve a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Binds {
    /// Only these templates may be chosen.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<TemplateId>,
    /// Only templates provided by these clients may be chosen.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub clients: Vec<String>,
    /// Minimum number of instances the broker should keep bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired_instances: Option<u32>,
}

impl Binds {
    /// Returns `true` if no constraint is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty() && self.clients.is_empty() && self.desired_instances.is_none()
    }
}

/// Server view of a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    /// Node the reservation serves.
    pub node: NodeId,
    pub status: ReservationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Binds::is_empty")]
    pub binds: Binds,
}

/// Input of the `reserve` mutation.
///
/// # Example
///
/// ```
/// use courier_event::ReserveInput;
/// use courier_types::{InstanceId, NodeId};
///
/// let input = ReserveInput::new(InstanceId::from("inst"), NodeId::from("N1"))
///     .with_title("segmentation");
/// assert_eq!(input.title.as_deref(), Some("segmentation"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveInput {
    pub instance_id: InstanceId,
    pub node: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<NodeHash>,
    #[serde(default, skip_serializing_if = "Binds::is_empty")]
    pub binds: Binds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl ReserveInput {
    #[must_use]
    pub fn new(instance_id: InstanceId, node: NodeId) -> Self {
        Self {
            instance_id,
            node,
            hash: None,
            binds: Binds::default(),
            title: None,
            reference: None,
        }
    }

    #[must_use]
    pub fn with_hash(mut self, hash: NodeHash) -> Self {
        self.hash = Some(hash);
        self
    }

    #[must_use]
    pub fn with_binds(mut self, binds: Binds) -> Self {
        self.binds = binds;
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// Agent registration of this client with the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub instance_id: InstanceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Input of the `ensure_agent` mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnsureAgentInput {
    pub instance_id: InstanceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,
}

impl EnsureAgentInput {
    #[must_use]
    pub fn new(instance_id: InstanceId) -> Self {
        Self {
            instance_id,
            name: None,
            extensions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_binds_are_omitted() {
        let input = ReserveInput::new(InstanceId::from("i"), NodeId::from("N1"));
        let json = serde_json::to_value(&input).expect("serialize");
        assert!(json.get("binds").is_none());
    }

    #[test]
    fn binds_roundtrip() {
        let binds = Binds {
            templates: vec![TemplateId::from("t1")],
            clients: vec![],
            desired_instances: Some(2),
        };
        let input = ReserveInput::new(InstanceId::from("i"), NodeId::from("N1")).with_binds(binds.clone());
        let json = serde_json::to_value(&input).expect("serialize");
        assert_eq!(json["binds"], json!({"templates": ["t1"], "desired_instances": 2}));

        let back: ReserveInput = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back.binds, binds);
    }

    #[test]
    fn status_wire_names() {
        let status: ReservationStatus = serde_json::from_str("\"UNHAPPY\"").expect("deserialize");
        assert_eq!(status, ReservationStatus::Unhappy);
        assert!(ReservationStatus::Ended.is_ended());
        assert!(!ReservationStatus::Active.is_ended());
    }
}
