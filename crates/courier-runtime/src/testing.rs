//! Test utilities.
//!
//! - [`MockTransport`]: an in-memory broker that records every request and
//!   lets a test drive the subscription by hand.
//! - [`MemoryCodec`]: a [`StructureCodec`] backed by a map.

use crate::caller::{StructureCodec, StructureError};
use crate::transport::{Transport, TransportError, WatchStream};
use async_trait::async_trait;
use courier_event::{
    Agent, AssignInput, Assignation, AssignationEvent, EnsureAgentInput, Reservation,
    ReservationStatus, ReserveInput, WatchMessage,
};
use courier_types::{AgentId, AssignationId, InstanceId, Reference, ReservationId};
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

type Watcher = mpsc::UnboundedSender<Result<WatchMessage, TransportError>>;

/// Builds the broker's events for an accepted assignment.
pub type Responder = Box<dyn Fn(&AssignInput) -> Vec<AssignationEvent> + Send + Sync>;

/// In-memory [`Transport`].
///
/// Every accepted assignment gets a sequential id (`a-1`, `a-2`, ...) and
/// a `create` notice on the subscription. With a responder installed
/// ([`MockTransport::with_responder`]) its events are published before
/// `assign` returns, which is the earliest a real broker could send them.
///
/// A cancel or interrupt publishes the matching terminal event, as the
/// broker would.
///
/// # Example
///
/// ```ignore
/// let transport = Arc::new(MockTransport::new().with_responder(|input| {
///     vec![
///         AssignationEvent::yielded(input.reference, vec![json!(4)]),
///         AssignationEvent::done(input.reference),
///     ]
/// }));
/// let postman = Postman::new(transport.clone(), "test");
/// ```
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<State>,
    responder: Option<Responder>,
    assignments: Mutex<Option<mpsc::UnboundedSender<AssignInput>>>,
    assignment_rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<AssignInput>>>,
    watch_count: AtomicUsize,
}

#[derive(Default)]
struct State {
    watchers: Vec<Watcher>,
    assigns: Vec<AssignInput>,
    cancels: Vec<AssignationId>,
    interrupts: Vec<AssignationId>,
    reserves: Vec<ReserveInput>,
    unreserves: Vec<ReservationId>,
    references: HashMap<AssignationId, Reference>,
    next_id: usize,
    fail_next_assign: Option<TransportError>,
    failing_watches: usize,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            assignments: Mutex::new(Some(tx)),
            assignment_rx: tokio::sync::Mutex::new(Some(rx)),
            ..Self::default()
        }
    }

    /// Publishes `responder(input)` for every accepted assignment.
    #[must_use]
    pub fn with_responder(
        mut self,
        responder: impl Fn(&AssignInput) -> Vec<AssignationEvent> + Send + Sync + 'static,
    ) -> Self {
        self.responder = Some(Box::new(responder));
        self
    }

    /// Publishes an event on every open subscription.
    pub fn emit(&self, event: AssignationEvent) {
        self.publish(WatchMessage::event(event));
    }

    /// Publishes a creation notice on every open subscription.
    pub fn emit_create(&self, assignation: Assignation) {
        self.publish(WatchMessage::create(assignation));
    }

    /// Publishes a raw message, malformed ones included.
    pub fn publish(&self, msg: WatchMessage) {
        let mut state = self.state.lock();
        state.watchers.retain(|tx| tx.send(Ok(msg.clone())).is_ok());
    }

    /// Ends every open subscription stream.
    pub fn disconnect(&self) {
        self.state.lock().watchers.clear();
    }

    /// Ends every open subscription stream with an error item.
    pub fn break_subscriptions(&self, err: TransportError) {
        let watchers = std::mem::take(&mut self.state.lock().watchers);
        for tx in watchers {
            let _ = tx.send(Err(err.clone()));
        }
    }

    /// Rejects the next `assign` with `err`.
    pub fn fail_next_assign(&self, err: TransportError) {
        self.state.lock().fail_next_assign = Some(err);
    }

    /// Fails the next `n` subscription attempts with a connection error.
    pub fn fail_next_watches(&self, n: usize) {
        self.state.lock().failing_watches = n;
    }

    /// Waits for the next accepted assignment.
    ///
    /// # Panics
    ///
    /// Panics if called concurrently from two tasks.
    pub async fn next_assignment(&self) -> AssignInput {
        let mut guard = self.assignment_rx.lock().await;
        let rx = guard.as_mut().expect("MockTransport::new was not used");
        rx.recv().await.expect("assignment channel closed")
    }

    /// Number of `watch_assignations` calls, failed ones included.
    #[must_use]
    pub fn watch_count(&self) -> usize {
        self.watch_count.load(Ordering::SeqCst)
    }

    /// Number of currently open subscription streams.
    #[must_use]
    pub fn open_watchers(&self) -> usize {
        let mut state = self.state.lock();
        state.watchers.retain(|tx| !tx.is_closed());
        state.watchers.len()
    }

    #[must_use]
    pub fn assigns(&self) -> Vec<AssignInput> {
        self.state.lock().assigns.clone()
    }

    #[must_use]
    pub fn cancels(&self) -> Vec<AssignationId> {
        self.state.lock().cancels.clone()
    }

    #[must_use]
    pub fn interrupts(&self) -> Vec<AssignationId> {
        self.state.lock().interrupts.clone()
    }

    #[must_use]
    pub fn reserves(&self) -> Vec<ReserveInput> {
        self.state.lock().reserves.clone()
    }

    #[must_use]
    pub fn unreserves(&self) -> Vec<ReservationId> {
        self.state.lock().unreserves.clone()
    }

    fn reference_of(&self, id: &AssignationId) -> Result<Reference, TransportError> {
        self.state
            .lock()
            .references
            .get(id)
            .copied()
            .ok_or_else(|| TransportError::Rejected(format!("unknown assignation {id}")))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn reserve(&self, input: ReserveInput) -> Result<Reservation, TransportError> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let reservation = Reservation {
            id: ReservationId::new(format!("r-{}", state.next_id)),
            node: input.node.clone(),
            status: ReservationStatus::Active,
            title: input.title.clone(),
            reference: input.reference.clone(),
            binds: input.binds.clone(),
        };
        state.reserves.push(input);
        Ok(reservation)
    }

    async fn unreserve(&self, id: &ReservationId) -> Result<ReservationId, TransportError> {
        self.state.lock().unreserves.push(id.clone());
        Ok(id.clone())
    }

    async fn assign(&self, input: AssignInput) -> Result<Assignation, TransportError> {
        let assignation = {
            let mut state = self.state.lock();
            if let Some(err) = state.fail_next_assign.take() {
                return Err(err);
            }
            state.next_id += 1;
            let mut assignation = Assignation::new(
                AssignationId::new(format!("a-{}", state.next_id)),
                input.reference,
            );
            assignation.parent = input.parent.clone();
            assignation.user = input.user.clone();
            state
                .references
                .insert(assignation.id.clone(), input.reference);
            state.assigns.push(input.clone());
            assignation
        };

        self.emit_create(assignation.clone());
        if let Some(responder) = &self.responder {
            for event in responder(&input) {
                self.emit(event);
            }
        }
        if let Some(tx) = self.assignments.lock().as_ref() {
            let _ = tx.send(input);
        }
        Ok(assignation)
    }

    async fn cancel(&self, id: &AssignationId) -> Result<Assignation, TransportError> {
        let reference = self.reference_of(id)?;
        self.state.lock().cancels.push(id.clone());
        self.emit(AssignationEvent::cancelled(reference));
        Ok(Assignation::new(id.clone(), reference))
    }

    async fn interrupt(&self, id: &AssignationId) -> Result<Assignation, TransportError> {
        let reference = self.reference_of(id)?;
        self.state.lock().interrupts.push(id.clone());
        self.emit(AssignationEvent::interrupted(reference));
        Ok(Assignation::new(id.clone(), reference))
    }

    async fn ensure_agent(&self, input: EnsureAgentInput) -> Result<Agent, TransportError> {
        Ok(Agent {
            id: AgentId::new(format!("agent-{}", input.instance_id)),
            instance_id: input.instance_id,
            name: input.name,
        })
    }

    async fn watch_assignations(
        &self,
        _instance_id: &InstanceId,
    ) -> Result<WatchStream, TransportError> {
        self.watch_count.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if state.failing_watches > 0 {
            state.failing_watches -= 1;
            return Err(TransportError::Connection("broker unreachable".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.watchers.push(tx);
        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        })
        .boxed())
    }
}

/// [`StructureCodec`] keeping objects in memory.
///
/// Objects carrying a string `id` field are stored under that id; others
/// get a fresh uuid.
#[derive(Debug, Default)]
pub struct MemoryCodec {
    objects: Mutex<HashMap<String, Value>>,
}

impl MemoryCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }
}

#[async_trait]
impl StructureCodec for MemoryCodec {
    async fn shrink(&self, value: Value) -> Result<String, StructureError> {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);
        self.objects.lock().insert(id.clone(), value);
        Ok(id)
    }

    async fn expand(&self, id: &str) -> Result<Value, StructureError> {
        self.objects
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StructureError::Codec(format!("no object with id '{id}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn failing_watches_count_down() {
        let transport = MockTransport::new();
        transport.fail_next_watches(1);
        let instance = InstanceId::from("i");

        assert!(transport.watch_assignations(&instance).await.is_err());
        assert!(transport.watch_assignations(&instance).await.is_ok());
        assert_eq!(transport.watch_count(), 2);
        assert_eq!(transport.open_watchers(), 1);
    }

    #[tokio::test]
    async fn published_messages_reach_open_streams() {
        let transport = MockTransport::new();
        let mut stream = transport
            .watch_assignations(&InstanceId::from("i"))
            .await
            .expect("watch");

        let reference = Reference::new();
        transport.emit(AssignationEvent::done(reference));
        let msg = stream.next().await.expect("item").expect("ok");
        assert_eq!(msg.event.map(|e| e.reference), Some(reference));

        transport.disconnect();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn memory_codec_keys_by_id_field() {
        let codec = MemoryCodec::new();
        let id = codec.shrink(json!({"id": "x1"})).await.expect("shrink");
        assert_eq!(id, "x1");
        let anonymous = codec.shrink(json!({"v": 1})).await.expect("shrink");
        assert_eq!(codec.len(), 2);
        assert_eq!(codec.expand(&anonymous).await.expect("expand"), json!({"v": 1}));
        assert!(codec.expand("missing").await.is_err());
    }
}
