//! Assignations and the submission input.
//!
//! An assignation is one invocation of a function. It is identified by a
//! client-chosen [`Reference`] and, once the broker acknowledges the
//! submission, by a server-assigned [`AssignationId`].

use courier_types::{AssignationId, InstanceId, NodeHash, NodeId, Reference, ReservationId, TemplateId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Server view of an assignation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignation {
    /// Server-assigned id.
    pub id: AssignationId,
    /// Client correlation key.
    pub reference: Reference,
    /// Causal parent, if this assignation was submitted from a handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<AssignationId>,
    /// User on whose behalf the assignation runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl Assignation {
    /// Creates an assignation without parent or user.
    #[must_use]
    pub fn new(id: AssignationId, reference: Reference) -> Self {
        Self {
            id,
            reference,
            parent: None,
            user: None,
        }
    }

    /// Sets the causal parent.
    #[must_use]
    pub fn with_parent(mut self, parent: AssignationId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Sets the user.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

/// Which function an assignment targets.
///
/// Exactly one designator is carried; the type makes "two targets at once"
/// unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Any implementation of the node with this hash.
    Hash(NodeHash),
    /// Any implementation of the node with this id.
    Node(NodeId),
    /// One specific implementation.
    Template(TemplateId),
    /// The implementation held by a reservation.
    Reservation(ReservationId),
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hash(h) => write!(f, "hash:{h}"),
            Self::Node(n) => write!(f, "node:{n}"),
            Self::Template(t) => write!(f, "template:{t}"),
            Self::Reservation(r) => write!(f, "reservation:{r}"),
        }
    }
}

/// Flags forwarded verbatim to the broker.
///
/// The client attaches no semantics to `cached` or `ephemeral`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignFlags {
    pub cached: bool,
    pub log: bool,
    pub ephemeral: bool,
    pub is_hook: bool,
}

/// When a lifecycle hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HookKind {
    Init,
    Cleanup,
}

/// An init or cleanup payload attached to an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hook {
    pub kind: HookKind,
    /// Hash of the node that implements the hook.
    pub hash: NodeHash,
}

impl Hook {
    #[must_use]
    pub fn init(hash: NodeHash) -> Self {
        Self {
            kind: HookKind::Init,
            hash,
        }
    }

    #[must_use]
    pub fn cleanup(hash: NodeHash) -> Self {
        Self {
            kind: HookKind::Cleanup,
            hash,
        }
    }
}

/// Input of the `assign` mutation.
///
/// Arguments are already shrunk to wire form. Using a JSON object map
/// guarantees they are a serializable mapping.
///
/// # Example
///
/// ```
/// use courier_event::{AssignInput, Target};
/// use courier_types::{InstanceId, NodeHash, Reference};
///
/// let input = AssignInput::new(
///     InstanceId::from("inst"),
///     Target::Hash(NodeHash::from("abc")),
///     Reference::new(),
/// )
/// .with_arg("x", serde_json::json!(3));
///
/// assert_eq!(input.args["x"], 3);
/// assert!(input.parent.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignInput {
    /// Submitting client.
    pub instance_id: InstanceId,
    /// Function designator.
    pub target: Target,
    /// Client correlation key.
    pub reference: Reference,
    /// Wire-form arguments.
    #[serde(default)]
    pub args: Map<String, Value>,
    /// Causal parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<AssignationId>,
    /// User on whose behalf the call runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Broker flags.
    #[serde(default)]
    pub flags: AssignFlags,
    /// Lifecycle hooks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<Hook>,
}

impl AssignInput {
    /// Creates an input with no arguments, flags or hooks.
    #[must_use]
    pub fn new(instance_id: InstanceId, target: Target, reference: Reference) -> Self {
        Self {
            instance_id,
            target,
            reference,
            args: Map::new(),
            parent: None,
            user: None,
            flags: AssignFlags::default(),
            hooks: Vec::new(),
        }
    }

    /// Replaces the argument map.
    #[must_use]
    pub fn with_args(mut self, args: Map<String, Value>) -> Self {
        self.args = args;
        self
    }

    /// Adds a single argument.
    #[must_use]
    pub fn with_arg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.args.insert(key.into(), value);
        self
    }

    /// Sets the causal parent.
    #[must_use]
    pub fn with_parent(mut self, parent: Option<AssignationId>) -> Self {
        self.parent = parent;
        self
    }

    /// Sets the user.
    #[must_use]
    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    /// Sets the broker flags.
    #[must_use]
    pub fn with_flags(mut self, flags: AssignFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Appends a lifecycle hook.
    #[must_use]
    pub fn with_hook(mut self, hook: Hook) -> Self {
        self.hooks.push(hook);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input() -> AssignInput {
        AssignInput::new(
            InstanceId::from("inst"),
            Target::Node(NodeId::from("N1")),
            Reference::new(),
        )
    }

    #[test]
    fn zero_arguments_serialize_as_empty_map() {
        let json = serde_json::to_value(input()).expect("serialize");
        assert_eq!(json["args"], json!({}));
    }

    #[test]
    fn target_serializes_tagged() {
        let json = serde_json::to_value(Target::Template(TemplateId::from("t"))).expect("serialize");
        assert_eq!(json, json!({"template": "t"}));
    }

    #[test]
    fn target_display() {
        assert_eq!(
            Target::Reservation(ReservationId::from("r1")).to_string(),
            "reservation:r1"
        );
    }

    #[test]
    fn builder_sets_everything() {
        let parent = AssignationId::from("A0");
        let i = input()
            .with_arg("x", json!(1))
            .with_parent(Some(parent.clone()))
            .with_user(Some("alice".into()))
            .with_flags(AssignFlags {
                cached: true,
                ..AssignFlags::default()
            })
            .with_hook(Hook::init(NodeHash::from("h")));

        assert_eq!(i.args.len(), 1);
        assert_eq!(i.parent, Some(parent));
        assert_eq!(i.user.as_deref(), Some("alice"));
        assert!(i.flags.cached);
        assert!(!i.flags.ephemeral);
        assert_eq!(i.hooks, vec![Hook::init(NodeHash::from("h"))]);
    }

    #[test]
    fn hook_kind_wire_names() {
        let json = serde_json::to_value(Hook::cleanup(NodeHash::from("h"))).expect("serialize");
        assert_eq!(json["kind"], "CLEANUP");
    }
}
