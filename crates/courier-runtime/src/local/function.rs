//! Handler functions for in-process actors.

use super::supervisor::EventSink;
use courier_event::{AssignationEvent, Assignation};
use courier_types::ErrorCode;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a handler.
///
/// | Variant | Code | Event |
/// |---------|------|-------|
/// | `Recoverable` | `FUNCTION_RECOVERABLE` | `ERROR` |
/// | `Critical` | `FUNCTION_CRITICAL` | `CRITICAL` |
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FunctionError {
    #[error("{0}")]
    Recoverable(String),
    #[error("{0}")]
    Critical(String),
}

impl ErrorCode for FunctionError {
    fn code(&self) -> &'static str {
        match self {
            Self::Recoverable(_) => "FUNCTION_RECOVERABLE",
            Self::Critical(_) => "FUNCTION_CRITICAL",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable(_))
    }
}

impl FunctionError {
    /// Converts the failure into its terminal event.
    #[must_use]
    pub fn into_event(self, assignation: &Assignation) -> AssignationEvent {
        match self {
            Self::Recoverable(msg) => AssignationEvent::error(assignation.reference, msg),
            Self::Critical(msg) => AssignationEvent::critical(assignation.reference, msg),
        }
    }
}

/// Handle a running handler uses to report progress.
#[derive(Debug, Clone)]
pub struct AssignationContext {
    assignation: Assignation,
    sink: EventSink,
}

impl AssignationContext {
    pub(crate) fn new(assignation: Assignation, sink: EventSink) -> Self {
        Self { assignation, sink }
    }

    #[must_use]
    pub fn assignation(&self) -> &Assignation {
        &self.assignation
    }

    /// Emits a `YIELD` event.
    pub fn yield_returns(&self, returns: Vec<Value>) {
        self.sink
            .emit(AssignationEvent::yielded(self.assignation.reference, returns));
    }

    /// Emits a `LOG` event.
    pub fn log(&self, message: impl Into<String>) {
        self.sink
            .emit(AssignationEvent::log(self.assignation.reference, message));
    }

    /// Emits a `PROGRESS` event.
    pub fn progress(&self, percent: u8, message: Option<String>) {
        self.sink.emit(AssignationEvent::progress(
            self.assignation.reference,
            percent,
            message,
        ));
    }
}

/// Future returned by a [`Function`].
pub type FunctionFuture = BoxFuture<'static, Result<(), FunctionError>>;

/// A handler hosted by an in-process actor.
///
/// Implemented for every `Fn(Map, AssignationContext) -> impl Future`.
/// Results are reported through the context; returning `Ok(())` emits
/// `DONE`.
pub trait Function: Send + Sync + 'static {
    fn call(&self, args: Map<String, Value>, ctx: AssignationContext) -> FunctionFuture;
}

impl<F, Fut> Function for F
where
    F: Fn(Map<String, Value>, AssignationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), FunctionError>> + Send + 'static,
{
    fn call(&self, args: Map<String, Value>, ctx: AssignationContext) -> FunctionFuture {
        Box::pin(self(args, ctx))
    }
}

/// Interface name → handler.
///
/// # Example
///
/// ```
/// use courier_runtime::FunctionRegistry;
///
/// let mut registry = FunctionRegistry::new();
/// registry.register("echo", |args, ctx| async move {
///     ctx.yield_returns(vec![serde_json::Value::Object(args)]);
///     Ok(())
/// });
/// assert!(registry.get("echo").is_some());
/// ```
#[derive(Default, Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn Function>>,
}

impl FunctionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a closure under `interface`, replacing any previous one.
    pub fn register<F, Fut>(&mut self, interface: impl Into<String>, function: F) -> &mut Self
    where
        F: Fn(Map<String, Value>, AssignationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), FunctionError>> + Send + 'static,
    {
        self.register_function(interface, Arc::new(function))
    }

    /// Registers a shared [`Function`] under `interface`.
    pub fn register_function(
        &mut self,
        interface: impl Into<String>,
        function: Arc<dyn Function>,
    ) -> &mut Self {
        self.functions.insert(interface.into(), function);
        self
    }

    #[must_use]
    pub fn get(&self, interface: &str) -> Option<Arc<dyn Function>> {
        self.functions.get(interface).cloned()
    }

    /// Registered interface names, sorted.
    #[must_use]
    pub fn interfaces(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("interfaces", &self.interfaces())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_types::{assert_error_codes, AssignationId, Reference};

    #[test]
    fn all_error_codes_valid() {
        assert_error_codes(
            &[
                FunctionError::Recoverable("x".into()),
                FunctionError::Critical("x".into()),
            ],
            "FUNCTION_",
        );
    }

    #[test]
    fn failure_events() {
        let a = Assignation::new(AssignationId::from("A"), Reference::new());
        let ev = FunctionError::Recoverable("bad".into()).into_event(&a);
        assert_eq!(ev.kind, courier_event::EventKind::Error);
        assert_eq!(ev.reference, a.reference);
        let ev = FunctionError::Critical("worse".into()).into_event(&a);
        assert_eq!(ev.kind, courier_event::EventKind::Critical);
    }

    #[test]
    fn registry_lists_sorted() {
        let mut registry = FunctionRegistry::new();
        registry
            .register("b", |_args, _ctx| async { Ok(()) })
            .register("a", |_args, _ctx| async { Ok(()) });
        assert_eq!(registry.interfaces(), vec!["a", "b"]);
        assert!(registry.get("c").is_none());
    }
}
