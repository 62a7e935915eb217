//! Integration tests for local execution: in-process functions reached
//! through the same caller surface as remote ones.

use async_trait::async_trait;
use courier_event::{ActorMessage, AssignationEvent, EventKind, Target};
use courier_runtime::config::LocalConfig;
use courier_runtime::testing::MockTransport;
use courier_runtime::{
    call_raw, current_assignation, Actor, AssignError, Assigner, CallOptions, Caller, Definition,
    EventSink, FunctionError, FunctionRegistry, InProcessSupervisor, LocalExecutor, NodeRef, Port,
    Postman, Supervisor, Template, Transport,
};
use courier_types::NodeHash;
use futures::StreamExt;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

fn kwargs(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

fn registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    registry
        .register("add-one", |args, ctx| async move {
            let x = args
                .get("x")
                .and_then(Value::as_i64)
                .ok_or_else(|| FunctionError::Recoverable("x must be an integer".into()))?;
            ctx.log(format!("adding one to {x}"));
            ctx.yield_returns(vec![json!(x + 1)]);
            Ok(())
        })
        .register("hang", |_args, ctx| async move {
            ctx.progress(10, Some("waiting".into()));
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        })
        .register("fatal", |_args, _ctx| async move {
            Err(FunctionError::Critical("disk on fire".into()))
        });
    registry
}

async fn enter(supervisor: &InProcessSupervisor, interface: &str) -> LocalExecutor {
    LocalExecutor::enter(supervisor, Template::new("t1", interface), LocalConfig::default())
        .await
        .expect("enter")
}

#[tokio::test]
async fn caller_api_runs_local_functions() {
    let supervisor = InProcessSupervisor::new(registry());
    let executor = enter(&supervisor, "add-one").await;
    let caller = Caller::new(Arc::new(executor.clone()));

    let node = NodeRef::new(
        "add-one",
        Definition::new(vec![Port::int("x")], vec![Port::int("y")]),
    )
    .with_template("t1");
    let value = caller
        .call(&node, kwargs(json!({"x": 41})), CallOptions::default())
        .await
        .expect("call");

    assert_eq!(value, json!(42));
    assert_eq!(executor.in_flight(), 0);
    executor.exit().await;
}

#[tokio::test]
async fn event_kinds_match_the_remote_path() {
    let supervisor = InProcessSupervisor::new(registry());
    let executor = enter(&supervisor, "add-one").await;

    let stream = executor
        .iterate(kwargs(json!({"x": 1})), None)
        .await
        .expect("iterate");
    let kinds: Vec<EventKind> = stream
        .map(|item| item.expect("event").kind)
        .collect()
        .await;

    assert_eq!(
        kinds,
        vec![EventKind::Assign, EventKind::Log, EventKind::Yield, EventKind::Done]
    );
    executor.exit().await;
}

#[tokio::test]
async fn critical_handler_error() {
    let supervisor = InProcessSupervisor::new(registry());
    let executor = enter(&supervisor, "fatal").await;

    let err = executor.call(Map::new(), None).await.expect_err("critical");
    assert!(matches!(err, AssignError::Critical(ref m) if m == "disk on fire"));
    executor.exit().await;
}

/// A handler calling out through the ambient caller links the nested
/// assignment to its own assignation.
#[tokio::test]
async fn nested_call_inherits_local_parent() {
    let transport = Arc::new(MockTransport::new().with_responder(|input| {
        vec![
            AssignationEvent::yielded(input.reference, vec![json!("remote")]),
            AssignationEvent::done(input.reference),
        ]
    }));
    let postman = Postman::new(Arc::clone(&transport) as Arc<dyn Transport>, "nested");

    let mut functions = FunctionRegistry::new();
    functions.register("outer", |_args, ctx| async move {
        let own = current_assignation().map_err(|e| FunctionError::Critical(e.to_string()))?;
        assert_eq!(&own, ctx.assignation());

        let returns = call_raw(
            Target::Hash(NodeHash::from("inner")),
            Map::new(),
            CallOptions::default(),
        )
        .await
        .map_err(|e| FunctionError::Recoverable(e.to_string()))?;
        ctx.yield_returns(returns);
        Ok(())
    });
    let supervisor =
        InProcessSupervisor::new(functions).with_assigner(Arc::new(postman.clone()) as Arc<dyn Assigner>);
    let executor = enter(&supervisor, "outer").await;

    let stream = executor.iterate(Map::new(), None).await.expect("iterate");
    let outer_id = stream.assignation().clone();
    let returns = stream.returns().await.expect("outer call");

    assert_eq!(returns, vec![json!("remote")]);
    let assigns = transport.assigns();
    assert_eq!(assigns.len(), 1);
    assert_eq!(assigns[0].parent.as_ref(), Some(&outer_id));
    assert!(outer_id.is_local());

    executor.exit().await;
    postman.close().await;
}

#[tokio::test]
async fn dropped_stream_cancels_the_handler() {
    let supervisor = InProcessSupervisor::new(registry());
    let executor = enter(&supervisor, "hang").await;

    let mut stream = executor.iterate(Map::new(), None).await.expect("iterate");
    assert_eq!(stream.next().await.expect("assign").expect("ok").kind, EventKind::Assign);
    assert_eq!(stream.next().await.expect("progress").expect("ok").kind, EventKind::Progress);
    drop(stream);

    for _ in 0..200 {
        if executor.in_flight() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(executor.in_flight(), 0);
    executor.exit().await;
}

#[tokio::test]
async fn exit_ends_pending_streams() {
    let supervisor = InProcessSupervisor::new(registry());
    let executor = enter(&supervisor, "hang").await;

    let stream = executor.iterate(Map::new(), None).await.expect("iterate");
    let pending = tokio::spawn(stream.returns());
    tokio::time::sleep(Duration::from_millis(10)).await;

    executor.exit().await;
    let err = pending.await.expect("join").expect_err("cancelled");
    assert!(err.is_cancellation());
}

/// Actor that binds and starts work but never acknowledges a cancel.
struct StubbornSupervisor;

struct StubbornActor {
    sink: EventSink,
}

#[async_trait]
impl Actor for StubbornActor {
    async fn send(&self, message: ActorMessage) -> Result<(), AssignError> {
        if let ActorMessage::Assign(assign) = message {
            self.sink.emit(AssignationEvent::assigned(assign.reference));
        }
        Ok(())
    }

    async fn stop(&self) {}
}

#[async_trait]
impl Supervisor for StubbornSupervisor {
    async fn spawn(&self, _template: &Template, sink: EventSink) -> Result<Arc<dyn Actor>, AssignError> {
        sink.bound();
        Ok(Arc::new(StubbornActor { sink }))
    }
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_cancel_is_an_error() {
    let config = LocalConfig {
        cancel_grace_ms: 50,
        ..LocalConfig::default()
    };
    let executor = LocalExecutor::enter(&StubbornSupervisor, Template::new("t", "any"), config)
        .await
        .expect("enter");

    let mut stream = executor.iterate(Map::new(), None).await.expect("iterate");
    assert_eq!(stream.next().await.expect("assign").expect("ok").kind, EventKind::Assign);

    let err = stream.cancel().await.expect_err("no confirmation");
    assert!(matches!(err, AssignError::Critical(ref m) if m.contains("did not confirm")));
    assert_eq!(executor.in_flight(), 0);
}

#[tokio::test]
async fn local_interrupt_is_unsupported() {
    let supervisor = InProcessSupervisor::new(registry());
    let executor = enter(&supervisor, "hang").await;
    let stream = executor.iterate(Map::new(), None).await.expect("iterate");

    assert!(matches!(
        stream.interrupt().await,
        Err(AssignError::Unsupported(_))
    ));
    stream.cancel().await.expect("cancel");
    executor.exit().await;
}
