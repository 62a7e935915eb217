//! `call` / `iterate` and their raw variants.

use super::port::NodeRef;
use super::structure::{expand_returns, shrink_args, JsonRegistry, StructureRegistry};
use super::target::resolve_target;
use crate::assigner::{AssignRequest, Assigner};
use crate::context::{current_assignation, current_caller};
use crate::error::AssignError;
use crate::stream::{AssignationStream, YieldStream};
use courier_event::{AssignFlags, Hook, Target};
use courier_types::{AssignationId, ReservationId};
use futures::stream::{BoxStream, StreamExt};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Stream of expanded `YIELD` payloads, each unpacked with
/// [`Returns::into_value`].
pub type ValueStream = BoxStream<'static, Result<Value, AssignError>>;

/// Per-call settings.
///
/// An explicit `parent` or `user` overrides the ambient assignation's.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallOptions {
    pub parent: Option<AssignationId>,
    pub user: Option<String>,
    pub timeout: Option<Duration>,
    pub flags: AssignFlags,
    pub hooks: Vec<Hook>,
}

impl CallOptions {
    #[must_use]
    pub fn with_parent(mut self, parent: AssignationId) -> Self {
        self.parent = Some(parent);
        self
    }

    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: AssignFlags) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn with_hook(mut self, hook: Hook) -> Self {
        self.hooks.push(hook);
        self
    }
}

/// One `YIELD` payload.
///
/// # Example
///
/// ```
/// use courier_runtime::Returns;
/// use serde_json::json;
///
/// assert_eq!(Returns(vec![json!(4)]).into_value(), json!(4));
/// assert_eq!(Returns(vec![json!(1), json!("a")]).into_value(), json!([1, "a"]));
/// assert_eq!(Returns(vec![]).into_value(), json!([]));
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Returns(pub Vec<Value>);

impl Returns {
    /// A single value is returned bare; anything else as a list.
    #[must_use]
    pub fn into_value(mut self) -> Value {
        if self.0.len() == 1 {
            self.0.pop().unwrap_or(Value::Null)
        } else {
            Value::Array(self.0)
        }
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<Value> {
        self.0
    }
}

impl From<Vec<Value>> for Returns {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

/// Calls functions through an [`Assigner`].
///
/// A `Caller` is what [`crate::with_caller`] makes ambient; the free
/// functions [`call`], [`iterate`], [`call_raw`] and [`iterate_raw`] use
/// the ambient one.
#[derive(Clone)]
pub struct Caller {
    assigner: Arc<dyn Assigner>,
    registry: Arc<dyn StructureRegistry>,
    default_timeout: Option<Duration>,
}

impl Caller {
    /// Creates a caller with a [`JsonRegistry`] without codecs.
    #[must_use]
    pub fn new(assigner: Arc<dyn Assigner>) -> Self {
        Self {
            assigner,
            registry: Arc::new(JsonRegistry::new()),
            default_timeout: None,
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: Arc<dyn StructureRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Timeout applied when [`CallOptions::timeout`] is unset.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    #[must_use]
    pub fn assigner(&self) -> &Arc<dyn Assigner> {
        &self.assigner
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<dyn StructureRegistry> {
        &self.registry
    }

    /// Calls `node` and returns its last `YIELD`, expanded and unpacked.
    pub async fn call(
        &self,
        node: &NodeRef,
        kwargs: Map<String, Value>,
        options: CallOptions,
    ) -> Result<Value, AssignError> {
        self.call_on(None, node, kwargs, options).await
    }

    /// Calls `node` and streams every `YIELD`, expanded and unpacked.
    pub async fn iterate(
        &self,
        node: &NodeRef,
        kwargs: Map<String, Value>,
        options: CallOptions,
    ) -> Result<ValueStream, AssignError> {
        self.iterate_on(None, node, kwargs, options).await
    }

    /// Calls `target` with wire-form `args`; returns the last `YIELD` as is.
    pub async fn call_raw(
        &self,
        target: Target,
        args: Map<String, Value>,
        options: CallOptions,
    ) -> Result<Vec<Value>, AssignError> {
        self.submit(target, args, options).await?.returns().await
    }

    /// Calls `target` with wire-form `args`; streams `YIELD` payloads as is.
    pub async fn iterate_raw(
        &self,
        target: Target,
        args: Map<String, Value>,
        options: CallOptions,
    ) -> Result<YieldStream, AssignError> {
        Ok(self.submit(target, args, options).await?.into_yields())
    }

    pub(crate) async fn call_on(
        &self,
        reservation: Option<&ReservationId>,
        node: &NodeRef,
        kwargs: Map<String, Value>,
        options: CallOptions,
    ) -> Result<Value, AssignError> {
        let args = shrink_args(self.registry.as_ref(), &node.definition, kwargs).await?;
        let target = resolve_target(reservation, node);
        let returns = self.submit(target, args, options).await?.returns().await?;
        let expanded = expand_returns(self.registry.as_ref(), &node.definition, returns).await?;
        Ok(Returns(expanded).into_value())
    }

    pub(crate) async fn iterate_on(
        &self,
        reservation: Option<&ReservationId>,
        node: &NodeRef,
        kwargs: Map<String, Value>,
        options: CallOptions,
    ) -> Result<ValueStream, AssignError> {
        let args = shrink_args(self.registry.as_ref(), &node.definition, kwargs).await?;
        let target = resolve_target(reservation, node);
        let yields = self.submit(target, args, options).await?.into_yields();

        let registry = Arc::clone(&self.registry);
        let definition = Arc::new(node.definition.clone());
        let values = yields.then(move |item| {
            let registry = Arc::clone(&registry);
            let definition = Arc::clone(&definition);
            async move {
                let expanded = expand_returns(registry.as_ref(), &definition, item?).await?;
                Ok::<_, AssignError>(Returns(expanded).into_value())
            }
        });
        Ok(values.boxed())
    }

    async fn submit(
        &self,
        target: Target,
        args: Map<String, Value>,
        options: CallOptions,
    ) -> Result<AssignationStream, AssignError> {
        let ambient = current_assignation().ok();
        let parent = options
            .parent
            .or_else(|| ambient.as_ref().map(|a| a.id.clone()));
        let user = options.user.or_else(|| ambient.and_then(|a| a.user));
        debug!(%target, parent = ?parent, "submitting call");

        let request = AssignRequest::new(target)
            .with_args(args)
            .with_parent(parent)
            .with_user(user)
            .with_flags(options.flags)
            .with_hooks(options.hooks);
        let stream = self.assigner.assign(request).await?;

        Ok(match options.timeout.or(self.default_timeout) {
            Some(timeout) => stream.with_timeout(timeout),
            None => stream,
        })
    }
}

impl std::fmt::Debug for Caller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Caller")
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

/// [`Caller::call`] on the ambient caller.
pub async fn call(
    node: &NodeRef,
    kwargs: Map<String, Value>,
    options: CallOptions,
) -> Result<Value, AssignError> {
    current_caller()?.call(node, kwargs, options).await
}

/// [`Caller::iterate`] on the ambient caller.
pub async fn iterate(
    node: &NodeRef,
    kwargs: Map<String, Value>,
    options: CallOptions,
) -> Result<ValueStream, AssignError> {
    current_caller()?.iterate(node, kwargs, options).await
}

/// [`Caller::call_raw`] on the ambient caller.
pub async fn call_raw(
    target: Target,
    args: Map<String, Value>,
    options: CallOptions,
) -> Result<Vec<Value>, AssignError> {
    current_caller()?.call_raw(target, args, options).await
}

/// [`Caller::iterate_raw`] on the ambient caller.
pub async fn iterate_raw(
    target: Target,
    args: Map<String, Value>,
    options: CallOptions,
) -> Result<YieldStream, AssignError> {
    current_caller()?.iterate_raw(target, args, options).await
}
