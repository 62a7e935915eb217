//! Running one template in-process.

use super::supervisor::{Actor, EventSink, Supervisor, Template};
use crate::assigner::{AssignRequest, Assigner};
use crate::config::LocalConfig;
use crate::correlator::{Correlator, EventReceiver};
use crate::error::AssignError;
use crate::stream::{AssignationStream, CancelAck, Dispatcher};
use async_trait::async_trait;
use courier_event::{ActorMessage, Assign, EventKind, Target};
use courier_types::{AssignationId, Reference};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Executes assignments against a locally hosted actor.
///
/// Created with [`LocalExecutor::enter`], which spawns the actor and waits
/// for it to bind. Cancellation of a local assignation waits for the actor
/// to confirm with `CANCELLED`; if it does not within the configured
/// grace period the cancel fails.
///
/// # Example
///
/// ```ignore
/// let supervisor = InProcessSupervisor::new(registry);
/// let executor = LocalExecutor::enter(&supervisor, Template::new("t1", "add-one"), LocalConfig::default()).await?;
/// let returns = executor.call(args, None).await?;
/// executor.exit().await;
/// ```
#[derive(Clone)]
pub struct LocalExecutor {
    inner: Arc<Inner>,
}

struct Inner {
    template: Template,
    actor: Arc<dyn Actor>,
    correlator: Arc<Correlator>,
    dispatcher: Arc<LocalDispatcher>,
    stopped: AtomicBool,
}

impl LocalExecutor {
    /// Spawns the actor for `template` and waits for `BOUND`.
    ///
    /// # Errors
    ///
    /// - [`AssignError::Spawn`] if the supervisor refuses the template or
    ///   the actor does not bind within `config.bound_timeout`
    /// - the mapped error if the actor reports a failure before binding
    pub async fn enter(
        supervisor: &dyn Supervisor,
        template: Template,
        config: LocalConfig,
    ) -> Result<Self, AssignError> {
        let correlator = Arc::new(Correlator::new());
        let actor_reference = Reference::new();
        let mut lifecycle = correlator.register(actor_reference)?;
        let sink = EventSink::new(Arc::clone(&correlator), actor_reference);

        let actor = match supervisor.spawn(&template, sink).await {
            Ok(actor) => actor,
            Err(err) => {
                correlator.unregister(&actor_reference);
                return Err(err);
            }
        };

        let bound_timeout = config.bound_timeout();
        let outcome = tokio::time::timeout(bound_timeout, wait_for_bound(&mut lifecycle)).await;
        correlator.unregister(&actor_reference);

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(_) => Some(AssignError::Spawn(format!(
                "actor for template {} did not bind within {bound_timeout:?}",
                template.id
            ))),
        };
        if let Some(err) = failure {
            warn!(template = %template.id, error = %err, "actor failed to start");
            actor.stop().await;
            return Err(err);
        }

        info!(template = %template.id, "local executor entered");
        let dispatcher = Arc::new(LocalDispatcher {
            actor: Arc::clone(&actor),
            grace: config.cancel_grace(),
        });
        Ok(Self {
            inner: Arc::new(Inner {
                template,
                actor,
                correlator,
                dispatcher,
                stopped: AtomicBool::new(false),
            }),
        })
    }

    #[must_use]
    pub fn template(&self) -> &Template {
        &self.inner.template
    }

    /// Number of assignations whose terminal event has not been consumed.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.correlator.len()
    }

    /// Starts one assignation and returns its event stream.
    pub async fn iterate(
        &self,
        args: Map<String, Value>,
        parent: Option<AssignationId>,
    ) -> Result<AssignationStream, AssignError> {
        self.start(args, parent, None).await
    }

    /// Runs one assignation and returns its last `YIELD` payload.
    pub async fn call(
        &self,
        args: Map<String, Value>,
        parent: Option<AssignationId>,
    ) -> Result<Vec<Value>, AssignError> {
        self.iterate(args, parent).await?.returns().await
    }

    /// Stops the actor. Pending streams end with `CANCELLED`. Idempotent.
    pub async fn exit(&self) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.actor.stop().await;
        let drained = self.inner.correlator.cancel_all();
        info!(template = %self.inner.template.id, drained, "local executor exited");
    }

    async fn start(
        &self,
        args: Map<String, Value>,
        parent: Option<AssignationId>,
        user: Option<String>,
    ) -> Result<AssignationStream, AssignError> {
        if self.inner.stopped.load(Ordering::Acquire) {
            return Err(AssignError::Postman("local executor has exited".into()));
        }

        let correlator = &self.inner.correlator;
        let reference = Reference::new();
        let events = correlator.register(reference)?;
        let id = AssignationId::local();
        correlator.bind(&reference, id.clone());

        let message = ActorMessage::Assign(Assign {
            id: id.clone(),
            reference,
            args,
            parent,
            user,
        });
        if let Err(err) = self.inner.actor.send(message).await {
            correlator.unregister(&reference);
            return Err(err);
        }
        debug!(assignation = %id, template = %self.inner.template.id, "local assignation sent");

        Ok(AssignationStream::new(
            reference,
            id,
            events,
            Arc::clone(correlator),
            Arc::clone(&self.inner.dispatcher) as Arc<dyn Dispatcher>,
        ))
    }
}

#[async_trait]
impl Assigner for LocalExecutor {
    /// Runs the request on the hosted template. The target designator is
    /// not consulted: a local executor hosts exactly one template.
    async fn assign(&self, request: AssignRequest) -> Result<AssignationStream, AssignError> {
        if let Target::Template(id) = &request.target {
            if id != &self.inner.template.id {
                debug!(requested = %id, hosted = %self.inner.template.id, "template mismatch ignored");
            }
        }
        self.start(request.args, request.parent, request.user).await
    }
}

impl std::fmt::Debug for LocalExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalExecutor")
            .field("template", &self.inner.template)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

async fn wait_for_bound(lifecycle: &mut EventReceiver) -> Result<(), AssignError> {
    while let Some(event) = lifecycle.recv().await {
        if event.kind == EventKind::Bound {
            return Ok(());
        }
        if event.is_terminal() {
            return Err(AssignError::from_terminal(&event)
                .unwrap_or_else(|| AssignError::Spawn("actor finished before binding".into())));
        }
    }
    Err(AssignError::Spawn("actor lifecycle queue closed".into()))
}

/// Cancels by messaging the actor, then waits for its confirmation.
struct LocalDispatcher {
    actor: Arc<dyn Actor>,
    grace: Duration,
}

#[async_trait]
impl Dispatcher for LocalDispatcher {
    async fn cancel(&self, assignation: &AssignationId, mut ack: CancelAck) -> Result<(), AssignError> {
        self.actor
            .send(ActorMessage::Cancel {
                id: assignation.clone(),
            })
            .await?;

        match ack.wait_terminal(self.grace).await {
            Some(kind) => {
                debug!(%assignation, %kind, "local cancel confirmed");
                Ok(())
            }
            None => Err(AssignError::Critical(format!(
                "assignation {assignation} did not confirm cancellation within {:?}",
                self.grace
            ))),
        }
    }

    async fn interrupt(&self, _assignation: &AssignationId) -> Result<(), AssignError> {
        Err(AssignError::Unsupported("interrupt of local assignations"))
    }

    fn awaits_acknowledgement(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::{FunctionError, FunctionRegistry, InProcessSupervisor};
    use futures::StreamExt;
    use serde_json::json;

    fn args(x: i64) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("x".into(), json!(x));
        m
    }

    fn supervisor() -> InProcessSupervisor {
        let mut registry = FunctionRegistry::new();
        registry
            .register("add-one", |args, ctx| async move {
                let x = args
                    .get("x")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| FunctionError::Recoverable("x must be an integer".into()))?;
                ctx.yield_returns(vec![json!(x + 1)]);
                Ok(())
            })
            .register("count", |args, ctx| async move {
                let n = args.get("n").and_then(Value::as_i64).unwrap_or(3);
                for i in 0..n {
                    ctx.yield_returns(vec![json!(i)]);
                }
                Ok(())
            })
            .register("hang", |_args, _ctx| async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            });
        InProcessSupervisor::new(registry)
    }

    async fn enter(interface: &str) -> LocalExecutor {
        LocalExecutor::enter(
            &supervisor(),
            Template::new("t1", interface),
            LocalConfig::default(),
        )
        .await
        .expect("enter")
    }

    #[tokio::test]
    async fn call_returns_last_yield() {
        let executor = enter("add-one").await;
        assert_eq!(executor.call(args(4), None).await.expect("call"), vec![json!(5)]);
        assert_eq!(executor.in_flight(), 0);
        executor.exit().await;
    }

    #[tokio::test]
    async fn handler_error_is_recoverable() {
        let executor = enter("add-one").await;
        let err = executor.call(Map::new(), None).await.expect_err("no x");
        assert!(matches!(err, AssignError::Recoverable(ref m) if m.contains("integer")));
        executor.exit().await;
    }

    #[tokio::test]
    async fn iterate_streams_yields() {
        let executor = enter("count").await;
        let mut a = Map::new();
        a.insert("n".into(), json!(3));
        let yields: Vec<Vec<Value>> = executor
            .iterate(a, None)
            .await
            .expect("iterate")
            .into_yields()
            .map(|item| item.expect("yield"))
            .collect()
            .await;
        assert_eq!(yields, vec![vec![json!(0)], vec![json!(1)], vec![json!(2)]]);
        executor.exit().await;
    }

    #[tokio::test]
    async fn explicit_cancel_waits_for_confirmation() {
        let executor = enter("hang").await;
        let mut stream = executor.iterate(Map::new(), None).await.expect("iterate");
        let first = stream.next().await.expect("assign").expect("ok");
        assert_eq!(first.kind, EventKind::Assign);

        stream.cancel().await.expect("cancel confirmed");
        assert_eq!(executor.in_flight(), 0);
        executor.exit().await;
    }

    #[tokio::test]
    async fn unknown_interface_fails_enter() {
        let result = LocalExecutor::enter(
            &supervisor(),
            Template::new("t1", "nope"),
            LocalConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(AssignError::Spawn(_))));
    }

    #[tokio::test]
    async fn calls_after_exit_fail() {
        let executor = enter("add-one").await;
        executor.exit().await;
        executor.exit().await;
        assert!(matches!(
            executor.call(args(1), None).await,
            Err(AssignError::Postman(_))
        ));
    }

    struct SilentSupervisor;

    struct SilentActor;

    #[async_trait]
    impl Actor for SilentActor {
        async fn send(&self, _message: ActorMessage) -> Result<(), AssignError> {
            Ok(())
        }

        async fn stop(&self) {}
    }

    #[async_trait]
    impl Supervisor for SilentSupervisor {
        async fn spawn(&self, _t: &Template, _sink: EventSink) -> Result<Arc<dyn Actor>, AssignError> {
            Ok(Arc::new(SilentActor))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn actor_that_never_binds_times_out() {
        let config = LocalConfig {
            bound_timeout_ms: 100,
            ..LocalConfig::default()
        };
        let result = LocalExecutor::enter(&SilentSupervisor, Template::new("t1", "x"), config).await;
        match result {
            Err(AssignError::Spawn(msg)) => assert!(msg.contains("did not bind")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
