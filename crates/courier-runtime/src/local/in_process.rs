//! In-process actors backed by a [`FunctionRegistry`].
//!
//! Each actor is one tokio task reading [`ActorMessage`]s; each assignation
//! runs as its own task so that a cancel can abort it.
//!
//! ```text
//! spawn ──► BOUND
//! Assign ─► ASSIGN ─► (YIELD | LOG | PROGRESS)* ─► DONE | ERROR | CRITICAL
//! Cancel ─► abort handler ─► CANCELLED
//! ```
//!
//! A handler panic is reported as `CRITICAL`.

use super::function::{AssignationContext, Function, FunctionError, FunctionRegistry};
use super::supervisor::{Actor, EventSink, Supervisor, Template};
use crate::assigner::Assigner;
use crate::context::{with_assigner, within_assignation};
use crate::error::AssignError;
use async_trait::async_trait;
use courier_event::{ActorMessage, Assign, AssignationEvent};
use courier_types::{AssignationId, Reference};
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Hosts templates whose interface names a registered function.
///
/// Handlers run inside the assignation's ambient scope, so nested calls
/// through the caller API pick up the parent automatically. If an
/// assigner is attached with [`InProcessSupervisor::with_assigner`] it is
/// also made ambient for handlers.
#[derive(Clone)]
pub struct InProcessSupervisor {
    registry: Arc<FunctionRegistry>,
    assigner: Option<Arc<dyn Assigner>>,
}

impl InProcessSupervisor {
    #[must_use]
    pub fn new(registry: FunctionRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            assigner: None,
        }
    }

    /// Makes `assigner` ambient inside every handler.
    #[must_use]
    pub fn with_assigner(mut self, assigner: Arc<dyn Assigner>) -> Self {
        self.assigner = Some(assigner);
        self
    }

    #[must_use]
    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }
}

#[async_trait]
impl Supervisor for InProcessSupervisor {
    async fn spawn(
        &self,
        template: &Template,
        sink: EventSink,
    ) -> Result<Arc<dyn Actor>, AssignError> {
        let function = self.registry.get(&template.interface).ok_or_else(|| {
            AssignError::Spawn(format!(
                "no function registered for interface '{}'",
                template.interface
            ))
        })?;
        let actor = InProcessActor::start(
            template.clone(),
            function,
            sink,
            self.assigner.clone(),
        );
        Ok(Arc::new(actor))
    }
}

/// Handle to an in-process actor task.
pub struct InProcessActor {
    template: Template,
    tx: mpsc::UnboundedSender<ActorMessage>,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl InProcessActor {
    fn start(
        template: Template,
        function: Arc<dyn Function>,
        sink: EventSink,
        assigner: Option<Arc<dyn Assigner>>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let runner = ActorLoop {
            template: template.clone(),
            function,
            sink,
            assigner,
            running: HashMap::new(),
        };
        let task = tokio::spawn(runner.run(rx, stop_rx));
        Self {
            template,
            tx,
            stop: Mutex::new(Some(stop_tx)),
            task: Mutex::new(Some(task)),
        }
    }

    #[must_use]
    pub fn template(&self) -> &Template {
        &self.template
    }
}

#[async_trait]
impl Actor for InProcessActor {
    async fn send(&self, message: ActorMessage) -> Result<(), AssignError> {
        self.tx.send(message).map_err(|_| {
            AssignError::Critical(format!("actor for template {} is not running", self.template.id))
        })
    }

    async fn stop(&self) {
        if let Some(stop) = self.stop.lock().take() {
            let _ = stop.send(());
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!(template = %self.template.id, error = %err, "actor task ended abnormally");
            }
        }
    }
}

struct Running {
    reference: Reference,
    task: JoinHandle<()>,
}

struct ActorLoop {
    template: Template,
    function: Arc<dyn Function>,
    sink: EventSink,
    assigner: Option<Arc<dyn Assigner>>,
    running: HashMap<AssignationId, Running>,
}

impl ActorLoop {
    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<ActorMessage>,
        mut stop: oneshot::Receiver<()>,
    ) {
        info!(template = %self.template.id, interface = %self.template.interface, "actor started");
        self.sink.bound();

        loop {
            tokio::select! {
                biased;
                _ = &mut stop => break,
                msg = rx.recv() => match msg {
                    Some(ActorMessage::Assign(assign)) => self.start(assign),
                    Some(ActorMessage::Cancel { id }) => self.cancel(&id).await,
                    None => break,
                },
            }
        }

        let ids: Vec<AssignationId> = self.running.keys().cloned().collect();
        for id in ids {
            self.cancel(&id).await;
        }
        info!(template = %self.template.id, "actor stopped");
    }

    fn start(&mut self, assign: Assign) {
        self.running.retain(|_, r| !r.task.is_finished());
        let id = assign.id.clone();
        let reference = assign.reference;
        let task = tokio::spawn(execute(
            Arc::clone(&self.function),
            assign,
            self.sink.clone(),
            self.assigner.clone(),
        ));
        debug!(assignation = %id, "assignation started");
        self.running.insert(id, Running { reference, task });
    }

    async fn cancel(&mut self, id: &AssignationId) {
        let Some(running) = self.running.remove(id) else {
            debug!(assignation = %id, "cancel for unknown assignation");
            return;
        };
        if running.task.is_finished() {
            debug!(assignation = %id, "cancel after completion");
            return;
        }
        running.task.abort();
        let _ = running.task.await;
        self.sink.emit(AssignationEvent::cancelled(running.reference));
        debug!(assignation = %id, "assignation cancelled");
    }
}

/// Runs one assignation to its terminal event.
async fn execute(
    function: Arc<dyn Function>,
    assign: Assign,
    sink: EventSink,
    assigner: Option<Arc<dyn Assigner>>,
) {
    let assignation = assign.assignation();
    sink.emit(AssignationEvent::assigned(assignation.reference));

    let ctx = AssignationContext::new(assignation.clone(), sink.clone());
    let body = within_assignation(assignation.clone(), function.call(assign.args, ctx));
    let outcome = match assigner {
        Some(assigner) => AssertUnwindSafe(with_assigner(assigner, body)).catch_unwind().await,
        None => AssertUnwindSafe(body).catch_unwind().await,
    };

    let terminal = match outcome {
        Ok(Ok(())) => AssignationEvent::done(assignation.reference),
        Ok(Err(err)) => {
            debug!(assignation = %assignation.id, error = %err, "handler failed");
            err.into_event(&assignation)
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            warn!(assignation = %assignation.id, %message, "handler panicked");
            FunctionError::Critical(message).into_event(&assignation)
        }
    };
    sink.emit(terminal);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlator::Correlator;
    use courier_event::EventKind;
    use serde_json::{json, Map};
    use std::time::Duration;

    fn registry() -> FunctionRegistry {
        let mut registry = FunctionRegistry::new();
        registry
            .register("double", |args, ctx| async move {
                let x = args.get("x").and_then(serde_json::Value::as_i64).unwrap_or(0);
                ctx.yield_returns(vec![json!(x * 2)]);
                Ok(())
            })
            .register("hang", |_args, _ctx| async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
            .register("boom", |_args, _ctx| async move {
                if true {
                    panic!("kaboom");
                }
                Ok(())
            });
        registry
    }

    async fn next_kind(rx: &mut crate::correlator::EventReceiver) -> EventKind {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event in time")
            .expect("queue open")
            .kind
    }

    #[tokio::test]
    async fn unknown_interface_fails_spawn() {
        let supervisor = InProcessSupervisor::new(registry());
        let correlator = Arc::new(Correlator::new());
        let sink = EventSink::new(correlator, Reference::new());
        let result = supervisor.spawn(&Template::new("t", "missing"), sink).await;
        assert!(matches!(result, Err(AssignError::Spawn(_))));
    }

    #[tokio::test]
    async fn assign_runs_handler() {
        let supervisor = InProcessSupervisor::new(registry());
        let correlator = Arc::new(Correlator::new());
        let actor_ref = Reference::new();
        let mut actor_rx = correlator.register(actor_ref).expect("register actor");
        let actor = supervisor
            .spawn(&Template::new("t", "double"), EventSink::new(Arc::clone(&correlator), actor_ref))
            .await
            .expect("spawn");
        assert_eq!(next_kind(&mut actor_rx).await, EventKind::Bound);

        let reference = Reference::new();
        let mut rx = correlator.register(reference).expect("register call");
        let mut args = Map::new();
        args.insert("x".into(), json!(21));
        actor
            .send(ActorMessage::Assign(Assign {
                id: AssignationId::local(),
                reference,
                args,
                parent: None,
                user: None,
            }))
            .await
            .expect("send");

        assert_eq!(next_kind(&mut rx).await, EventKind::Assign);
        let yielded = rx.recv().await.expect("yield");
        assert_eq!(yielded.returns, Some(vec![json!(42)]));
        assert_eq!(next_kind(&mut rx).await, EventKind::Done);
        actor.stop().await;
    }

    #[tokio::test]
    async fn cancel_aborts_and_reports() {
        let supervisor = InProcessSupervisor::new(registry());
        let correlator = Arc::new(Correlator::new());
        let actor = supervisor
            .spawn(&Template::new("t", "hang"), EventSink::new(Arc::clone(&correlator), Reference::new()))
            .await
            .expect("spawn");

        let reference = Reference::new();
        let id = AssignationId::local();
        let mut rx = correlator.register(reference).expect("register");
        actor
            .send(ActorMessage::Assign(Assign {
                id: id.clone(),
                reference,
                args: Map::new(),
                parent: None,
                user: None,
            }))
            .await
            .expect("assign");
        assert_eq!(next_kind(&mut rx).await, EventKind::Assign);

        actor.send(ActorMessage::Cancel { id }).await.expect("cancel");
        assert_eq!(next_kind(&mut rx).await, EventKind::Cancelled);
        actor.stop().await;
    }

    #[tokio::test]
    async fn panic_becomes_critical() {
        let supervisor = InProcessSupervisor::new(registry());
        let correlator = Arc::new(Correlator::new());
        let actor = supervisor
            .spawn(&Template::new("t", "boom"), EventSink::new(Arc::clone(&correlator), Reference::new()))
            .await
            .expect("spawn");

        let reference = Reference::new();
        let mut rx = correlator.register(reference).expect("register");
        actor
            .send(ActorMessage::Assign(Assign {
                id: AssignationId::local(),
                reference,
                args: Map::new(),
                parent: None,
                user: None,
            }))
            .await
            .expect("assign");

        assert_eq!(next_kind(&mut rx).await, EventKind::Assign);
        let critical = rx.recv().await.expect("critical");
        assert_eq!(critical.kind, EventKind::Critical);
        assert_eq!(critical.message.as_deref(), Some("kaboom"));
        actor.stop().await;
    }

    #[tokio::test]
    async fn stop_cancels_running() {
        let supervisor = InProcessSupervisor::new(registry());
        let correlator = Arc::new(Correlator::new());
        let actor = supervisor
            .spawn(&Template::new("t", "hang"), EventSink::new(Arc::clone(&correlator), Reference::new()))
            .await
            .expect("spawn");

        let reference = Reference::new();
        let mut rx = correlator.register(reference).expect("register");
        actor
            .send(ActorMessage::Assign(Assign {
                id: AssignationId::local(),
                reference,
                args: Map::new(),
                parent: None,
                user: None,
            }))
            .await
            .expect("assign");
        assert_eq!(next_kind(&mut rx).await, EventKind::Assign);

        actor.stop().await;
        assert_eq!(next_kind(&mut rx).await, EventKind::Cancelled);
        assert!(actor.send(ActorMessage::Cancel { id: AssignationId::local() }).await.is_err());
    }
}
