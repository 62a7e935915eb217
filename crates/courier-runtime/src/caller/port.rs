//! Node signatures.

use courier_types::{NodeHash, NodeId, TemplateId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value kind accepted or produced by a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortKind {
    Int,
    Float,
    String,
    Bool,
    List,
    Dict,
    /// A domain object passed by reference through a structure codec.
    Structure,
}

impl std::fmt::Display for PortKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Int => "INT",
            Self::Float => "FLOAT",
            Self::String => "STRING",
            Self::Bool => "BOOL",
            Self::List => "LIST",
            Self::Dict => "DICT",
            Self::Structure => "STRUCTURE",
        };
        f.write_str(name)
    }
}

/// One argument or return slot.
///
/// `children` describes the element port of `List` and the value port of
/// `Dict`. `identifier` names the codec of a `Structure` port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub key: String,
    pub kind: PortKind,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Port>,
}

impl Port {
    #[must_use]
    pub fn new(key: impl Into<String>, kind: PortKind) -> Self {
        Self {
            key: key.into(),
            kind,
            nullable: false,
            identifier: None,
            default: None,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn int(key: impl Into<String>) -> Self {
        Self::new(key, PortKind::Int)
    }

    #[must_use]
    pub fn float(key: impl Into<String>) -> Self {
        Self::new(key, PortKind::Float)
    }

    #[must_use]
    pub fn string(key: impl Into<String>) -> Self {
        Self::new(key, PortKind::String)
    }

    #[must_use]
    pub fn bool(key: impl Into<String>) -> Self {
        Self::new(key, PortKind::Bool)
    }

    /// A `Structure` port handled by the codec named `identifier`.
    #[must_use]
    pub fn structure(key: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            identifier: Some(identifier.into()),
            ..Self::new(key, PortKind::Structure)
        }
    }

    /// A `List` port whose elements follow `element`.
    #[must_use]
    pub fn list(key: impl Into<String>, element: Port) -> Self {
        Self {
            children: vec![element],
            ..Self::new(key, PortKind::List)
        }
    }

    /// A `Dict` port whose values follow `value`.
    #[must_use]
    pub fn dict(key: impl Into<String>, value: Port) -> Self {
        Self {
            children: vec![value],
            ..Self::new(key, PortKind::Dict)
        }
    }

    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Argument and return ports of a node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Definition {
    #[serde(default)]
    pub args: Vec<Port>,
    #[serde(default)]
    pub returns: Vec<Port>,
}

impl Definition {
    #[must_use]
    pub fn new(args: Vec<Port>, returns: Vec<Port>) -> Self {
        Self { args, returns }
    }
}

/// Client view of a callable node.
///
/// `hash` is always known; `id` and `template` narrow the target when set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRef {
    pub hash: NodeHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<TemplateId>,
    #[serde(default)]
    pub definition: Definition,
}

impl NodeRef {
    #[must_use]
    pub fn new(hash: impl Into<NodeHash>, definition: Definition) -> Self {
        Self {
            hash: hash.into(),
            id: None,
            template: None,
            definition,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_template(mut self, template: impl Into<TemplateId>) -> Self {
        self.template = Some(template.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn port_builders() {
        let p = Port::list("items", Port::structure("item", "image")).nullable();
        assert_eq!(p.kind, PortKind::List);
        assert!(p.nullable);
        assert_eq!(p.children[0].identifier.as_deref(), Some("image"));
    }

    #[test]
    fn definition_deserializes_with_defaults() {
        let def: Definition = serde_json::from_value(json!({
            "args": [{"key": "x", "kind": "INT"}]
        }))
        .expect("deserialize");
        assert_eq!(def.args[0], Port::int("x"));
        assert!(def.returns.is_empty());
    }

    #[test]
    fn node_ref_builder() {
        let node = NodeRef::new("h1", Definition::default())
            .with_id("N1")
            .with_template("T1");
        assert_eq!(node.hash.as_str(), "h1");
        assert_eq!(node.id.as_ref().map(NodeId::as_str), Some("N1"));
        assert_eq!(node.template.as_ref().map(TemplateId::as_str), Some("T1"));
    }
}
