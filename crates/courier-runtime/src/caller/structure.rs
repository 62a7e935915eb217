//! Shrinking arguments to wire form and expanding returns.
//!
//! Scalars cross the wire unchanged but are validated against their port.
//! `Structure` ports carry domain objects by reference: the owning
//! [`StructureCodec`] turns an object into an identifier on the way out
//! (shrink) and resolves it back on the way in (expand).
//!
//! | Error | Code |
//! |-------|------|
//! | [`StructureError::MissingArgument`] | `STRUCTURE_MISSING_ARGUMENT` |
//! | [`StructureError::UnexpectedArgument`] | `STRUCTURE_UNEXPECTED_ARGUMENT` |
//! | [`StructureError::TypeMismatch`] | `STRUCTURE_TYPE_MISMATCH` |
//! | [`StructureError::UnknownStructure`] | `STRUCTURE_UNKNOWN_STRUCTURE` |
//! | [`StructureError::ReturnsMismatch`] | `STRUCTURE_RETURNS_MISMATCH` |
//! | [`StructureError::Codec`] | `STRUCTURE_CODEC` |

use super::port::{Definition, Port, PortKind};
use async_trait::async_trait;
use courier_types::ErrorCode;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Argument or return value did not fit the node definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructureError {
    #[error("missing argument '{0}'")]
    MissingArgument(String),

    #[error("unexpected argument '{0}'")]
    UnexpectedArgument(String),

    #[error("port '{key}' expects {expected}, got {found}")]
    TypeMismatch {
        key: String,
        expected: PortKind,
        found: &'static str,
    },

    #[error("no codec registered for structure '{0}'")]
    UnknownStructure(String),

    #[error("expected {expected} return values, got {found}")]
    ReturnsMismatch { expected: usize, found: usize },

    #[error("codec failed: {0}")]
    Codec(String),
}

impl ErrorCode for StructureError {
    fn code(&self) -> &'static str {
        match self {
            Self::MissingArgument(_) => "STRUCTURE_MISSING_ARGUMENT",
            Self::UnexpectedArgument(_) => "STRUCTURE_UNEXPECTED_ARGUMENT",
            Self::TypeMismatch { .. } => "STRUCTURE_TYPE_MISMATCH",
            Self::UnknownStructure(_) => "STRUCTURE_UNKNOWN_STRUCTURE",
            Self::ReturnsMismatch { .. } => "STRUCTURE_RETURNS_MISMATCH",
            Self::Codec(_) => "STRUCTURE_CODEC",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// Converts values between domain and wire form, port by port.
#[async_trait]
pub trait StructureRegistry: Send + Sync {
    async fn shrink(&self, port: &Port, value: Value) -> Result<Value, StructureError>;
    async fn expand(&self, port: &Port, value: Value) -> Result<Value, StructureError>;
}

/// Converts one kind of domain object to an identifier and back.
#[async_trait]
pub trait StructureCodec: Send + Sync {
    async fn shrink(&self, value: Value) -> Result<String, StructureError>;
    async fn expand(&self, id: &str) -> Result<Value, StructureError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Shrink,
    Expand,
}

/// Default [`StructureRegistry`].
///
/// Validates scalar ports, recurses into `List` and `Dict`, and delegates
/// `Structure` ports to codecs registered by identifier.
#[derive(Default, Clone)]
pub struct JsonRegistry {
    codecs: HashMap<String, Arc<dyn StructureCodec>>,
}

impl JsonRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the codec for `Structure` ports named `identifier`.
    #[must_use]
    pub fn with_codec(mut self, identifier: impl Into<String>, codec: Arc<dyn StructureCodec>) -> Self {
        self.codecs.insert(identifier.into(), codec);
        self
    }

    fn convert<'a>(
        &'a self,
        port: &'a Port,
        value: Value,
        direction: Direction,
    ) -> BoxFuture<'a, Result<Value, StructureError>> {
        Box::pin(async move {
            if value.is_null() {
                return if port.nullable {
                    Ok(Value::Null)
                } else {
                    Err(mismatch(port, &value))
                };
            }

            match port.kind {
                PortKind::Int if value.is_i64() || value.is_u64() => Ok(value),
                PortKind::Float if value.is_number() => Ok(value),
                PortKind::String if value.is_string() => Ok(value),
                PortKind::Bool if value.is_boolean() => Ok(value),
                PortKind::List => match (value, port.children.first()) {
                    (Value::Array(items), Some(element)) => {
                        let mut out = Vec::with_capacity(items.len());
                        for item in items {
                            out.push(self.convert(element, item, direction).await?);
                        }
                        Ok(Value::Array(out))
                    }
                    (value @ Value::Array(_), None) => Ok(value),
                    (other, _) => Err(mismatch(port, &other)),
                },
                PortKind::Dict => match (value, port.children.first()) {
                    (Value::Object(entries), Some(child)) => {
                        let mut out = Map::with_capacity(entries.len());
                        for (k, v) in entries {
                            out.insert(k, self.convert(child, v, direction).await?);
                        }
                        Ok(Value::Object(out))
                    }
                    (value @ Value::Object(_), None) => Ok(value),
                    (other, _) => Err(mismatch(port, &other)),
                },
                PortKind::Structure => {
                    let identifier = port.identifier.as_deref().unwrap_or_default();
                    let codec = self
                        .codecs
                        .get(identifier)
                        .ok_or_else(|| StructureError::UnknownStructure(identifier.to_string()))?;
                    match direction {
                        Direction::Shrink => Ok(Value::String(codec.shrink(value).await?)),
                        Direction::Expand => match value {
                            Value::String(id) => codec.expand(&id).await,
                            other => Err(mismatch(port, &other)),
                        },
                    }
                }
                _ => Err(mismatch(port, &value)),
            }
        })
    }
}

#[async_trait]
impl StructureRegistry for JsonRegistry {
    async fn shrink(&self, port: &Port, value: Value) -> Result<Value, StructureError> {
        self.convert(port, value, Direction::Shrink).await
    }

    async fn expand(&self, port: &Port, value: Value) -> Result<Value, StructureError> {
        self.convert(port, value, Direction::Expand).await
    }
}

impl std::fmt::Debug for JsonRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.codecs.keys().collect();
        ids.sort();
        f.debug_struct("JsonRegistry").field("codecs", &ids).finish()
    }
}

fn mismatch(port: &Port, value: &Value) -> StructureError {
    let found = match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    };
    StructureError::TypeMismatch {
        key: port.key.clone(),
        expected: port.kind,
        found,
    }
}

/// Shrinks keyword arguments against `definition.args`.
///
/// Missing ports fall back to their default, then to `null` if nullable.
pub async fn shrink_args(
    registry: &dyn StructureRegistry,
    definition: &Definition,
    mut kwargs: Map<String, Value>,
) -> Result<Map<String, Value>, StructureError> {
    if let Some(extra) = kwargs
        .keys()
        .find(|key| !definition.args.iter().any(|port| &port.key == *key))
    {
        return Err(StructureError::UnexpectedArgument(extra.clone()));
    }

    let mut shrunk = Map::with_capacity(definition.args.len());
    for port in &definition.args {
        let value = match kwargs.remove(&port.key) {
            Some(value) => value,
            None => match (&port.default, port.nullable) {
                (Some(default), _) => default.clone(),
                (None, true) => Value::Null,
                (None, false) => return Err(StructureError::MissingArgument(port.key.clone())),
            },
        };
        shrunk.insert(port.key.clone(), registry.shrink(port, value).await?);
    }
    Ok(shrunk)
}

/// Expands one `YIELD` payload against `definition.returns`.
pub async fn expand_returns(
    registry: &dyn StructureRegistry,
    definition: &Definition,
    returns: Vec<Value>,
) -> Result<Vec<Value>, StructureError> {
    if returns.len() != definition.returns.len() {
        return Err(StructureError::ReturnsMismatch {
            expected: definition.returns.len(),
            found: returns.len(),
        });
    }
    let mut expanded = Vec::with_capacity(returns.len());
    for (port, value) in definition.returns.iter().zip(returns) {
        expanded.push(registry.expand(port, value).await?);
    }
    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryCodec;
    use courier_types::assert_error_codes;
    use serde_json::json;

    fn kwargs(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn image_registry() -> (Arc<MemoryCodec>, JsonRegistry) {
        let codec = Arc::new(MemoryCodec::new());
        let registry = JsonRegistry::new().with_codec("image", Arc::clone(&codec) as Arc<dyn StructureCodec>);
        (codec, registry)
    }

    #[test]
    fn all_error_codes_valid() {
        assert_error_codes(
            &[
                StructureError::MissingArgument("x".into()),
                StructureError::UnexpectedArgument("x".into()),
                StructureError::TypeMismatch {
                    key: "x".into(),
                    expected: PortKind::Int,
                    found: "string",
                },
                StructureError::UnknownStructure("x".into()),
                StructureError::ReturnsMismatch {
                    expected: 1,
                    found: 2,
                },
                StructureError::Codec("x".into()),
            ],
            "STRUCTURE_",
        );
    }

    #[tokio::test]
    async fn zero_arguments_shrink_to_empty_map() {
        let registry = JsonRegistry::new();
        let shrunk = shrink_args(&registry, &Definition::default(), Map::new())
            .await
            .expect("shrink");
        assert!(shrunk.is_empty());
    }

    #[tokio::test]
    async fn scalars_are_validated() {
        let registry = JsonRegistry::new();
        let def = Definition::new(vec![Port::int("x"), Port::string("s")], vec![]);

        let ok = shrink_args(&registry, &def, kwargs(json!({"x": 3, "s": "a"})))
            .await
            .expect("valid");
        assert_eq!(Value::Object(ok), json!({"x": 3, "s": "a"}));

        let err = shrink_args(&registry, &def, kwargs(json!({"x": "3", "s": "a"})))
            .await
            .expect_err("string for int");
        assert!(matches!(err, StructureError::TypeMismatch { ref key, .. } if key == "x"));
    }

    #[tokio::test]
    async fn missing_default_and_nullable() {
        let registry = JsonRegistry::new();
        let def = Definition::new(
            vec![
                Port::int("x"),
                Port::int("y").with_default(json!(7)),
                Port::string("z").nullable(),
            ],
            vec![],
        );

        let err = shrink_args(&registry, &def, Map::new()).await.expect_err("x missing");
        assert_eq!(err, StructureError::MissingArgument("x".into()));

        let ok = shrink_args(&registry, &def, kwargs(json!({"x": 1})))
            .await
            .expect("defaults");
        assert_eq!(Value::Object(ok), json!({"x": 1, "y": 7, "z": null}));
    }

    #[tokio::test]
    async fn unexpected_argument_rejected() {
        let registry = JsonRegistry::new();
        let def = Definition::new(vec![Port::int("x")], vec![]);
        let err = shrink_args(&registry, &def, kwargs(json!({"x": 1, "q": 2})))
            .await
            .expect_err("extra");
        assert_eq!(err, StructureError::UnexpectedArgument("q".into()));
    }

    #[tokio::test]
    async fn structures_roundtrip_through_codec() {
        let (codec, registry) = image_registry();
        let port = Port::structure("img", "image");
        let object = json!({"id": "img-1", "pixels": [1, 2, 3]});

        let wire = registry.shrink(&port, object.clone()).await.expect("shrink");
        assert_eq!(wire, json!("img-1"));
        assert_eq!(codec.len(), 1);

        let back = registry.expand(&port, wire).await.expect("expand");
        assert_eq!(back, object);
    }

    #[tokio::test]
    async fn nested_lists_of_structures() {
        let (_codec, registry) = image_registry();
        let port = Port::list("imgs", Port::structure("img", "image"));
        let wire = registry
            .shrink(&port, json!([{"id": "a"}, {"id": "b"}]))
            .await
            .expect("shrink");
        assert_eq!(wire, json!(["a", "b"]));
    }

    #[tokio::test]
    async fn unknown_structure_identifier() {
        let registry = JsonRegistry::new();
        let err = registry
            .shrink(&Port::structure("x", "volume"), json!({}))
            .await
            .expect_err("no codec");
        assert_eq!(err, StructureError::UnknownStructure("volume".into()));
    }

    #[tokio::test]
    async fn returns_arity_checked() {
        let registry = JsonRegistry::new();
        let def = Definition::new(vec![], vec![Port::int("a")]);
        let err = expand_returns(&registry, &def, vec![json!(1), json!(2)])
            .await
            .expect_err("arity");
        assert_eq!(
            err,
            StructureError::ReturnsMismatch {
                expected: 1,
                found: 2
            }
        );
        let ok = expand_returns(&registry, &def, vec![json!(1)]).await.expect("ok");
        assert_eq!(ok, vec![json!(1)]);
    }
}
