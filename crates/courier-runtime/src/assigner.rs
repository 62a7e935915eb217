//! The assigner seam.
//!
//! An [`Assigner`] turns an [`AssignRequest`] into an
//! [`AssignationStream`]. Two implementations exist:
//!
//! | Assigner | Backend |
//! |----------|---------|
//! | [`crate::Postman`] | remote broker via [`crate::Transport`] |
//! | [`crate::LocalExecutor`] | in-process actor via [`crate::Supervisor`] |
//!
//! The caller API only sees this trait, so the same code runs against
//! either backend.

use crate::error::AssignError;
use crate::stream::AssignationStream;
use async_trait::async_trait;
use courier_event::{AssignFlags, AssignInput, Binds, Hook, Reservation, ReserveInput, Target};
use courier_types::{AssignationId, InstanceId, NodeHash, NodeId, Reference, ReservationId};
use serde_json::{Map, Value};

/// One assignment, before an instance id and reference are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignRequest {
    pub target: Target,
    /// Wire-form arguments.
    pub args: Map<String, Value>,
    pub parent: Option<AssignationId>,
    pub user: Option<String>,
    pub flags: AssignFlags,
    pub hooks: Vec<Hook>,
}

impl AssignRequest {
    #[must_use]
    pub fn new(target: Target) -> Self {
        Self {
            target,
            args: Map::new(),
            parent: None,
            user: None,
            flags: AssignFlags::default(),
            hooks: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Map<String, Value>) -> Self {
        self.args = args;
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent: Option<AssignationId>) -> Self {
        self.parent = parent;
        self
    }

    #[must_use]
    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: AssignFlags) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: Vec<Hook>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Builds the broker input.
    #[must_use]
    pub fn into_input(self, instance_id: InstanceId, reference: Reference) -> AssignInput {
        AssignInput {
            instance_id,
            target: self.target,
            reference,
            args: self.args,
            parent: self.parent,
            user: self.user,
            flags: self.flags,
            hooks: self.hooks,
        }
    }
}

/// A reservation request, before an instance id is attached.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReserveRequest {
    pub hash: Option<NodeHash>,
    pub binds: Binds,
    pub title: Option<String>,
    pub reference: Option<String>,
}

impl ReserveRequest {
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

    /// Builds the broker input for `node`.
    #[must_use]
    pub fn into_input(self, instance_id: InstanceId, node: NodeId) -> ReserveInput {
        ReserveInput {
            instance_id,
            node,
            hash: self.hash,
            binds: self.binds,
            title: self.title,
            reference: self.reference,
        }
    }
}

/// Submits assignments and manages reservations.
#[async_trait]
pub trait Assigner: Send + Sync + 'static {
    /// Submits one assignment and returns its event stream.
    async fn assign(&self, request: AssignRequest) -> Result<AssignationStream, AssignError>;

    /// Reserves an implementation of `node`.
    async fn reserve(
        &self,
        _node: NodeId,
        _request: ReserveRequest,
    ) -> Result<Reservation, AssignError> {
        Err(AssignError::Unsupported("reservations"))
    }

    /// Releases a reservation.
    async fn unreserve(&self, _id: &ReservationId) -> Result<(), AssignError> {
        Err(AssignError::Unsupported("reservations"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn into_input_carries_everything() {
        let mut args = Map::new();
        args.insert("x".into(), json!(3));
        let reference = Reference::new();

        let input = AssignRequest::new(Target::Node(NodeId::from("N1")))
            .with_args(args)
            .with_parent(Some(AssignationId::from("A0")))
            .with_user(Some("bob".into()))
            .with_hooks(vec![Hook::init(NodeHash::from("h"))])
            .into_input(InstanceId::from("inst"), reference);

        assert_eq!(input.reference, reference);
        assert_eq!(input.instance_id.as_str(), "inst");
        assert_eq!(input.args["x"], 3);
        assert_eq!(input.parent, Some(AssignationId::from("A0")));
        assert_eq!(input.user.as_deref(), Some("bob"));
        assert_eq!(input.hooks.len(), 1);
    }

    #[test]
    fn reserve_request_into_input() {
        let input = ReserveRequest::default()
            .with_title("seg")
            .into_input(InstanceId::from("inst"), NodeId::from("N1"));
        assert_eq!(input.node.as_str(), "N1");
        assert_eq!(input.title.as_deref(), Some("seg"));
        assert!(input.binds.is_empty());
    }
}
